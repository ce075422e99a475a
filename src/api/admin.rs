/// Admin endpoints: event authoring, participation review, roles
use crate::{
    account::AccountProfile,
    admin::{events::EventQuestion, AuditLogEntry, Event, EventDefinition, EventStatus, Role},
    assistant::{QuizDraft, QuizRequest},
    auth::AdminAuthContext,
    context::AppContext,
    db::models::ParticipationRow,
    error::MarketResult,
    ledger::{ApprovalOutcome, ApprovalRequest, BalanceCheck},
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;

pub fn routes() -> Router<AppContext> {
    Router::new()
        // Events
        .route("/api/admin/events", get(list_events).post(create_event))
        .route("/api/admin/events/:id", get(get_event).put(update_event))
        .route("/api/admin/events/:id/schedule", post(schedule_event))
        .route("/api/admin/events/:id/activate", post(activate_event))
        .route("/api/admin/events/:id/end", post(end_event))
        .route("/api/admin/events/:id/questions", get(questions).put(accept_questions))
        .route("/api/admin/quiz-drafts", post(generate_quiz_drafts))
        // Participations
        .route("/api/admin/participations", get(pending_participations))
        .route("/api/admin/participations/:id/decision", post(decide_participation))
        // Accounts and roles
        .route("/api/admin/accounts", get(list_accounts))
        .route("/api/admin/accounts/:id/balance-check", get(balance_check))
        .route("/api/admin/accounts/:id/role", put(set_role))
        .route("/api/admin/audit-log", get(audit_log))
}

// ============================================================================
// Events
// ============================================================================

#[derive(Debug, Deserialize)]
struct EventListQuery {
    status: Option<EventStatus>,
}

async fn list_events(
    State(ctx): State<AppContext>,
    _auth: AdminAuthContext,
    Query(query): Query<EventListQuery>,
) -> MarketResult<Json<Vec<Event>>> {
    Ok(Json(ctx.events.list_events(query.status).await?))
}

async fn create_event(
    State(ctx): State<AppContext>,
    auth: AdminAuthContext,
    Json(definition): Json<EventDefinition>,
) -> MarketResult<(StatusCode, Json<Event>)> {
    let event = ctx.events.create_event(auth.account_id(), &definition).await?;
    Ok((StatusCode::CREATED, Json(event)))
}

async fn get_event(
    State(ctx): State<AppContext>,
    _auth: AdminAuthContext,
    Path(id): Path<String>,
) -> MarketResult<Json<Event>> {
    Ok(Json(ctx.events.get_event(&id).await?))
}

async fn update_event(
    State(ctx): State<AppContext>,
    auth: AdminAuthContext,
    Path(id): Path<String>,
    Json(definition): Json<EventDefinition>,
) -> MarketResult<Json<Event>> {
    Ok(Json(ctx.events.update_event(auth.account_id(), &id, &definition).await?))
}

async fn schedule_event(
    State(ctx): State<AppContext>,
    auth: AdminAuthContext,
    Path(id): Path<String>,
) -> MarketResult<Json<Event>> {
    Ok(Json(ctx.events.schedule(auth.account_id(), &id).await?))
}

async fn activate_event(
    State(ctx): State<AppContext>,
    auth: AdminAuthContext,
    Path(id): Path<String>,
) -> MarketResult<Json<Event>> {
    Ok(Json(ctx.events.activate(auth.account_id(), &id).await?))
}

async fn end_event(
    State(ctx): State<AppContext>,
    auth: AdminAuthContext,
    Path(id): Path<String>,
) -> MarketResult<Json<Event>> {
    Ok(Json(ctx.events.end(auth.account_id(), &id).await?))
}

async fn questions(
    State(ctx): State<AppContext>,
    auth: AdminAuthContext,
    Path(id): Path<String>,
) -> MarketResult<Json<Vec<EventQuestion>>> {
    Ok(Json(ctx.events.questions(auth.account_id(), &id).await?))
}

async fn accept_questions(
    State(ctx): State<AppContext>,
    auth: AdminAuthContext,
    Path(id): Path<String>,
    Json(drafts): Json<Vec<QuizDraft>>,
) -> MarketResult<Json<Vec<EventQuestion>>> {
    Ok(Json(ctx.events.accept_questions(auth.account_id(), &id, &drafts).await?))
}

/// Drafts are returned for review only; nothing is stored until accepted
async fn generate_quiz_drafts(
    State(ctx): State<AppContext>,
    auth: AdminAuthContext,
    Json(request): Json<QuizRequest>,
) -> MarketResult<Json<Vec<QuizDraft>>> {
    Ok(Json(ctx.events.generate_quiz_drafts(auth.account_id(), &request).await?))
}

// ============================================================================
// Participations
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PendingQuery {
    event_id: Option<String>,
}

async fn pending_participations(
    State(ctx): State<AppContext>,
    auth: AdminAuthContext,
    Query(query): Query<PendingQuery>,
) -> MarketResult<Json<Vec<ParticipationRow>>> {
    let rows = ctx
        .events
        .list_pending_participations(auth.account_id(), query.event_id.as_deref())
        .await?;
    Ok(Json(rows))
}

async fn decide_participation(
    State(ctx): State<AppContext>,
    auth: AdminAuthContext,
    Path(id): Path<String>,
    Json(req): Json<ApprovalRequest>,
) -> MarketResult<Json<ApprovalOutcome>> {
    let outcome = ctx
        .ledger
        .approve_event_participation(auth.account_id(), &id, req.approved, req.adjusted_score)
        .await?;
    Ok(Json(outcome))
}

// ============================================================================
// Accounts and roles
// ============================================================================

#[derive(Debug, Deserialize)]
struct AccountListQuery {
    limit: Option<i64>,
    cursor: Option<String>,
}

async fn list_accounts(
    State(ctx): State<AppContext>,
    _auth: AdminAuthContext,
    Query(query): Query<AccountListQuery>,
) -> MarketResult<Json<Vec<AccountProfile>>> {
    let accounts = ctx
        .account_manager
        .list_accounts(query.limit.unwrap_or(50), query.cursor.as_deref())
        .await?;
    Ok(Json(accounts))
}

async fn balance_check(
    State(ctx): State<AppContext>,
    _auth: AdminAuthContext,
    Path(id): Path<String>,
) -> MarketResult<Json<BalanceCheck>> {
    Ok(Json(ctx.ledger.verify_balance(&id).await?))
}

#[derive(Debug, Deserialize)]
struct SetRoleRequest {
    role: Role,
}

async fn set_role(
    State(ctx): State<AppContext>,
    auth: AdminAuthContext,
    Path(id): Path<String>,
    Json(req): Json<SetRoleRequest>,
) -> MarketResult<Json<AccountProfile>> {
    ctx.role_manager.set_role(auth.account_id(), &id, req.role).await?;
    Ok(Json(ctx.account_manager.get_profile(&id).await?))
}

#[derive(Debug, Deserialize)]
struct AuditLogQuery {
    limit: Option<i64>,
}

async fn audit_log(
    State(ctx): State<AppContext>,
    _auth: AdminAuthContext,
    Query(query): Query<AuditLogQuery>,
) -> MarketResult<Json<Vec<AuditLogEntry>>> {
    Ok(Json(ctx.role_manager.list_audit_log(query.limit.unwrap_or(100)).await?))
}
