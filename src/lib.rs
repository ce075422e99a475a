//! Worksheet market
//!
//! Backend for a points-based marketplace of learning materials: accounts,
//! listings and their files, a points ledger with purchases, feedback
//! refunds, daily rewards and admin-run events, plus a client library that
//! keeps a local balance and cart consistent with the server.

pub mod account;
pub mod admin;
pub mod api;
pub mod assistant;
pub mod auth;
pub mod cart;
pub mod catalog;
pub mod client;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod jobs;
pub mod ledger;
pub mod mailer;
pub mod metrics;
pub mod notifications;
pub mod rate_limit;
pub mod server;
pub mod storage;
pub mod validation;

pub use config::ServerConfig;
pub use context::AppContext;
pub use error::{MarketError, MarketResult};
