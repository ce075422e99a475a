/// Balance-changing operations of the caller
use crate::{
    auth::AuthContext,
    context::AppContext,
    error::MarketResult,
    ledger::{
        AttendanceOutcome, CheckoutOutcome, CheckoutRequest, DailyStatus, FeedbackOutcome,
        FeedbackRequest, RouletteOutcome,
    },
};
use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/ledger/checkout", post(checkout))
        .route("/api/ledger/feedback", post(feedback))
        .route("/api/ledger/attendance", post(attendance))
        .route("/api/ledger/roulette", post(roulette).get(roulette_table))
        .route("/api/ledger/daily", get(daily_status))
}

async fn checkout(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Json(req): Json<CheckoutRequest>,
) -> MarketResult<Json<CheckoutOutcome>> {
    Ok(Json(ctx.ledger.checkout(auth.account_id(), &req.listing_ids).await?))
}

async fn feedback(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Json(req): Json<FeedbackRequest>,
) -> MarketResult<Json<FeedbackOutcome>> {
    let outcome = ctx
        .ledger
        .submit_feedback(auth.account_id(), &req.purchase_id, req.rating, &req.comment)
        .await?;
    Ok(Json(outcome))
}

async fn attendance(State(ctx): State<AppContext>, auth: AuthContext) -> MarketResult<Json<AttendanceOutcome>> {
    Ok(Json(ctx.ledger.check_attendance(auth.account_id()).await?))
}

async fn roulette(State(ctx): State<AppContext>, auth: AuthContext) -> MarketResult<Json<RouletteOutcome>> {
    Ok(Json(ctx.ledger.spin_roulette(auth.account_id()).await?))
}

/// Prize table, for drawing the wheel before a spin
async fn roulette_table(State(ctx): State<AppContext>) -> Json<Vec<i64>> {
    Json(ctx.ledger.policy().roulette_prizes.clone())
}

async fn daily_status(State(ctx): State<AppContext>, auth: AuthContext) -> MarketResult<Json<DailyStatus>> {
    Ok(Json(ctx.ledger.daily_status(auth.account_id()).await?))
}
