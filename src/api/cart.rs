/// Server-side cart lines
use crate::{
    auth::AuthContext,
    cart::{AddLineRequest, CartLine},
    context::AppContext,
    error::MarketResult,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get},
    Json, Router,
};

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/cart", get(list_lines).post(add_line).delete(clear))
        .route("/api/cart/:listing_id", delete(remove_line))
}

async fn list_lines(State(ctx): State<AppContext>, auth: AuthContext) -> MarketResult<Json<Vec<CartLine>>> {
    Ok(Json(ctx.cart.list_lines(auth.account_id()).await?))
}

async fn add_line(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Json(req): Json<AddLineRequest>,
) -> MarketResult<(StatusCode, Json<Vec<CartLine>>)> {
    ctx.cart.add_line(auth.account_id(), &req.listing_id).await?;
    Ok((StatusCode::CREATED, Json(ctx.cart.list_lines(auth.account_id()).await?)))
}

async fn remove_line(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(listing_id): Path<String>,
) -> MarketResult<StatusCode> {
    ctx.cart.remove_line(auth.account_id(), &listing_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn clear(State(ctx): State<AppContext>, auth: AuthContext) -> MarketResult<StatusCode> {
    ctx.cart.clear(auth.account_id()).await?;
    Ok(StatusCode::NO_CONTENT)
}
