/// Event browsing and participation
use crate::{
    admin::{events::PublicQuestion, Event, EventKind, EventStatus},
    auth::AuthContext,
    context::AppContext,
    error::{MarketError, MarketResult},
    ledger::{
        CommentOutcome, CommentRequest, FirstComeOutcome, FirstComeRequest, QuizAnswersRequest,
        QuizOutcome,
    },
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/events", get(list_active))
        .route("/api/events/:id", get(detail))
        .route("/api/events/:id/quiz", post(submit_quiz))
        .route("/api/events/:id/first-come", post(first_come))
        .route("/api/events/:id/comment", post(comment))
}

/// Event with its questions, answers withheld
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDetail {
    pub event: Event,
    pub questions: Vec<PublicQuestion>,
}

async fn list_active(State(ctx): State<AppContext>) -> MarketResult<Json<Vec<Event>>> {
    Ok(Json(ctx.events.list_events(Some(EventStatus::Active)).await?))
}

async fn detail(State(ctx): State<AppContext>, Path(id): Path<String>) -> MarketResult<Json<EventDetail>> {
    let event = ctx.events.get_event(&id).await?;
    if matches!(event.status, EventStatus::Draft | EventStatus::Scheduled) {
        return Err(MarketError::NotFound(format!("Event {} not found", id)));
    }

    let questions = if event.kind == EventKind::Quiz {
        ctx.events.public_questions(&id).await?
    } else {
        Vec::new()
    };

    Ok(Json(EventDetail { event, questions }))
}

async fn submit_quiz(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<String>,
    Json(req): Json<QuizAnswersRequest>,
) -> MarketResult<Json<QuizOutcome>> {
    let outcome = ctx
        .ledger
        .submit_quiz_participation(auth.account_id(), &id, &req.answers)
        .await?;
    Ok(Json(outcome))
}

async fn first_come(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<String>,
    Json(req): Json<FirstComeRequest>,
) -> MarketResult<Json<FirstComeOutcome>> {
    let outcome = ctx
        .ledger
        .participate_first_come(auth.account_id(), &id, req.comment.as_deref())
        .await?;
    Ok(Json(outcome))
}

async fn comment(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<String>,
    Json(req): Json<CommentRequest>,
) -> MarketResult<(StatusCode, Json<CommentOutcome>)> {
    let outcome = ctx
        .ledger
        .submit_comment_participation(auth.account_id(), &id, &req.comment)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(outcome)))
}
