/// Signup, sessions and the caller's own account
use crate::{
    account::{
        AccountProfile, CreateAccountRequest, Credentials, LoginRequest, RefreshSessionRequest,
        SessionResponse, UpdateNicknameRequest,
    },
    auth::AuthContext,
    catalog::PurchaseSummary,
    context::AppContext,
    db::models::{AccountRow, PointTransactionRow, SessionRow},
    error::MarketResult,
};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use validator::Validate;

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/auth/signup", post(signup))
        .route("/api/auth/login", post(login))
        .route("/api/auth/refresh", post(refresh))
        .route("/api/auth/logout", post(logout))
        .route("/api/me", get(me))
        .route("/api/me/nickname", put(update_nickname))
        .route("/api/me/transactions", get(transactions))
        .route("/api/me/purchases", get(purchases))
}

fn session_response(account: &AccountRow, session: SessionRow) -> MarketResult<SessionResponse> {
    Ok(SessionResponse {
        account: AccountProfile::from_row(account)?,
        credentials: Credentials {
            access_token: session.access_token,
            refresh_token: session.refresh_token,
        },
    })
}

async fn signup(
    State(ctx): State<AppContext>,
    Json(req): Json<CreateAccountRequest>,
) -> MarketResult<(StatusCode, Json<SessionResponse>)> {
    req.validate()?;

    let account = ctx
        .account_manager
        .create_account(&req.email, &req.nickname, &req.password, req.role)
        .await?;
    let session = ctx.account_manager.create_session(&account.id).await?;

    Ok((StatusCode::CREATED, Json(session_response(&account, session)?)))
}

async fn login(
    State(ctx): State<AppContext>,
    Json(req): Json<LoginRequest>,
) -> MarketResult<Json<SessionResponse>> {
    let (account, session) = ctx.account_manager.login(&req.email, &req.password).await?;
    tracing::info!(account_id = %account.id, "Session created");

    Ok(Json(session_response(&account, session)?))
}

async fn refresh(
    State(ctx): State<AppContext>,
    Json(req): Json<RefreshSessionRequest>,
) -> MarketResult<Json<SessionResponse>> {
    let session = ctx.account_manager.refresh_session(&req.refresh_token).await?;
    let account = ctx.account_manager.get_account(&session.account_id).await?;

    Ok(Json(session_response(&account, session)?))
}

async fn logout(
    State(ctx): State<AppContext>,
    auth: AuthContext,
) -> MarketResult<Json<serde_json::Value>> {
    ctx.account_manager.delete_session(&auth.session.session_id).await?;
    tracing::info!(account_id = %auth.account_id(), "Session deleted");

    Ok(Json(serde_json::json!({ "success": true })))
}

async fn me(State(ctx): State<AppContext>, auth: AuthContext) -> MarketResult<Json<AccountProfile>> {
    Ok(Json(ctx.account_manager.get_profile(auth.account_id()).await?))
}

async fn update_nickname(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Json(req): Json<UpdateNicknameRequest>,
) -> MarketResult<Json<AccountProfile>> {
    ctx.account_manager
        .update_nickname(auth.account_id(), &req.nickname)
        .await?;

    Ok(Json(ctx.account_manager.get_profile(auth.account_id()).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionsQuery {
    limit: Option<i64>,
    before: Option<i64>,
}

async fn transactions(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Query(params): Query<TransactionsQuery>,
) -> MarketResult<Json<Vec<PointTransactionRow>>> {
    let rows = ctx
        .ledger
        .list_transactions(auth.account_id(), params.limit.unwrap_or(50), params.before)
        .await?;

    Ok(Json(rows))
}

async fn purchases(
    State(ctx): State<AppContext>,
    auth: AuthContext,
) -> MarketResult<Json<Vec<PurchaseSummary>>> {
    Ok(Json(ctx.listings.list_purchases(auth.account_id()).await?))
}
