/// Background task implementations
use crate::{context::AppContext, error::MarketResult};
use chrono::Utc;

/// Delete sessions whose refresh token has expired
pub async fn cleanup_expired_sessions(ctx: &AppContext) -> MarketResult<u64> {
    ctx.account_manager.cleanup_expired_sessions().await
}

/// Move scheduled events whose window opened to active, and active events
/// whose window closed to ended
pub async fn advance_event_lifecycle(ctx: &AppContext) -> MarketResult<(u64, u64)> {
    ctx.events.run_lifecycle(Utc::now()).await
}
