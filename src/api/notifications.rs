/// In-app notifications of the caller
use crate::{
    auth::AuthContext, context::AppContext, db::models::NotificationRow, error::MarketResult,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/notifications", get(list))
        .route("/api/notifications/unread-count", get(unread_count))
        .route("/api/notifications/read-all", post(mark_all_read))
        .route("/api/notifications/:id/read", post(mark_read))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListQuery {
    #[serde(default)]
    unread_only: bool,
    limit: Option<i64>,
}

async fn list(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Query(query): Query<ListQuery>,
) -> MarketResult<Json<Vec<NotificationRow>>> {
    let rows = ctx
        .notifications
        .list(auth.account_id(), query.unread_only, query.limit.unwrap_or(50))
        .await?;
    Ok(Json(rows))
}

async fn unread_count(State(ctx): State<AppContext>, auth: AuthContext) -> MarketResult<Json<serde_json::Value>> {
    let count = ctx.notifications.unread_count(auth.account_id()).await?;
    Ok(Json(serde_json::json!({ "count": count })))
}

async fn mark_read(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<i64>,
) -> MarketResult<StatusCode> {
    ctx.notifications.mark_read(auth.account_id(), id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn mark_all_read(State(ctx): State<AppContext>, auth: AuthContext) -> MarketResult<Json<serde_json::Value>> {
    let updated = ctx.notifications.mark_all_read(auth.account_id()).await?;
    Ok(Json(serde_json::json!({ "updated": updated })))
}
