/// Client library
///
/// Typed client-side state for market front ends: the last known balance,
/// the cart, the ledger call path and the session lifecycle. Balance-changing
/// calls go through [`ledger::LedgerClient`] only.

pub mod backend;
pub mod balance;
pub mod cart;
pub mod ledger;
pub mod requests;
pub mod roulette;
pub mod session;

pub use backend::{HttpLedgerBackend, LedgerBackend, LocalLedgerBackend, SessionBackend};
pub use balance::BalanceStore;
pub use cart::{CartAggregate, CartTotals};
pub use ledger::LedgerClient;
pub use requests::LatestOnly;
pub use session::{AuthEvent, SessionState, SessionStore};

use crate::account::Credentials;
use serde::{Deserialize, Serialize};

/// Signed-in account as seen by a backend call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientSession {
    pub account_id: String,
    pub credentials: Credentials,
}
