/// API routes and handlers
pub mod account;
pub mod admin;
pub mod cart;
pub mod events;
pub mod files;
pub mod health;
pub mod ledger;
pub mod listings;
pub mod middleware;
pub mod notifications;

use crate::context::AppContext;
use axum::Router;

/// Build API routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .merge(health::routes())
        .merge(account::routes())
        .merge(listings::routes())
        .merge(files::routes())
        .merge(cart::routes())
        .merge(ledger::routes())
        .merge(events::routes())
        .merge(notifications::routes())
        .merge(admin::routes())
}
