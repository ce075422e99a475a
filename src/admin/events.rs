/// Admin event authoring
///
/// Events define the reward parameters that ledger operations consume.
/// Lifecycle: draft -> scheduled -> active -> ended, with draft -> active
/// allowed for immediate launches.
use crate::{
    admin::roles::{record_audit, role_of, Capability},
    assistant::{QuestionKind, QuizAssistant, QuizDraft, QuizRequest},
    db::models::{EventRow, ParticipationRow},
    error::{MarketError, MarketResult},
    notifications::{self, NewNotification, NotificationKind},
    validation::{self, FieldErrors},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqliteConnection, SqlitePool};
use std::sync::Arc;
use uuid::Uuid;

/// Event type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Quiz,
    FirstCome,
    Comment,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Quiz => "quiz",
            EventKind::FirstCome => "first_come",
            EventKind::Comment => "comment",
        }
    }

    pub fn parse(s: &str) -> MarketResult<Self> {
        match s {
            "quiz" => Ok(EventKind::Quiz),
            "first_come" => Ok(EventKind::FirstCome),
            "comment" => Ok(EventKind::Comment),
            _ => Err(MarketError::Validation(format!("Invalid event kind: {}", s))),
        }
    }
}

/// Event lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Draft,
    Scheduled,
    Active,
    Ended,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Draft => "draft",
            EventStatus::Scheduled => "scheduled",
            EventStatus::Active => "active",
            EventStatus::Ended => "ended",
        }
    }

    pub fn parse(s: &str) -> MarketResult<Self> {
        match s {
            "draft" => Ok(EventStatus::Draft),
            "scheduled" => Ok(EventStatus::Scheduled),
            "active" => Ok(EventStatus::Active),
            "ended" => Ok(EventStatus::Ended),
            _ => Err(MarketError::Validation(format!("Invalid event status: {}", s))),
        }
    }

    /// Whether `self -> next` is a legal transition
    pub fn can_move_to(&self, next: EventStatus) -> bool {
        matches!(
            (self, next),
            (EventStatus::Draft, EventStatus::Scheduled)
                | (EventStatus::Draft, EventStatus::Active)
                | (EventStatus::Scheduled, EventStatus::Active)
                | (EventStatus::Active, EventStatus::Ended)
        )
    }
}

/// Event definition submitted by an admin
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDefinition {
    pub kind: EventKind,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub points: Option<i64>,
    pub min_points: Option<i64>,
    pub max_points: Option<i64>,
    pub min_length: Option<i64>,
    pub review_criteria: Option<String>,
    pub max_participants: Option<i64>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
}

impl EventDefinition {
    /// Check reward parameters for the event kind
    pub fn validate(&self) -> MarketResult<()> {
        let mut errors = FieldErrors::new();
        validation::check_text(&mut errors, "title", &self.title, validation::TITLE_MAX);
        errors.check(
            self.description.chars().count() <= validation::DESCRIPTION_MAX,
            "description",
            format!("must be at most {} characters", validation::DESCRIPTION_MAX),
        );
        errors.check(
            self.starts_at < self.ends_at,
            "endsAt",
            "must be after startsAt",
        );

        match self.kind {
            EventKind::Quiz | EventKind::FirstCome => {
                errors.check(
                    self.points.map_or(false, |p| p >= 1),
                    "points",
                    "must be at least 1",
                );
            }
            EventKind::Comment => {
                errors.check(
                    self.review_criteria
                        .as_deref()
                        .map_or(false, |c| !c.trim().is_empty()),
                    "reviewCriteria",
                    "is required for comment events",
                );
                errors.check(
                    self.min_length.map_or(false, |l| l >= 1),
                    "minLength",
                    "must be at least 1",
                );
                match (self.min_points, self.max_points) {
                    (Some(min), Some(max)) => errors.check(
                        0 <= min && min <= max,
                        "minPoints",
                        "must satisfy 0 <= minPoints <= maxPoints",
                    ),
                    _ => errors.push("minPoints", "minPoints and maxPoints are required"),
                }
            }
        }

        if let Some(cap) = self.max_participants {
            errors.check(cap >= 1, "maxParticipants", "must be at least 1");
        }

        errors.into_result()
    }
}

/// Event as exposed over the API
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: String,
    pub kind: EventKind,
    pub title: String,
    pub description: String,
    pub status: EventStatus,
    pub points: Option<i64>,
    pub min_points: Option<i64>,
    pub max_points: Option<i64>,
    pub min_length: Option<i64>,
    pub review_criteria: Option<String>,
    pub max_participants: Option<i64>,
    pub current_participants: i64,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub created_by: String,
}

impl Event {
    pub fn from_row(row: EventRow) -> MarketResult<Self> {
        Ok(Self {
            kind: EventKind::parse(&row.kind)?,
            status: EventStatus::parse(&row.status)?,
            id: row.id,
            title: row.title,
            description: row.description,
            points: row.points,
            min_points: row.min_points,
            max_points: row.max_points,
            min_length: row.min_length,
            review_criteria: row.review_criteria,
            max_participants: row.max_participants,
            current_participants: row.current_participants,
            starts_at: row.starts_at,
            ends_at: row.ends_at,
            created_by: row.created_by,
        })
    }

    /// Fail with `EventClosed` unless participation is open at `now`
    pub fn ensure_open(&self, now: DateTime<Utc>) -> MarketResult<()> {
        if self.status != EventStatus::Active {
            return Err(MarketError::EventClosed(format!(
                "Event is {}",
                self.status.as_str()
            )));
        }
        if now < self.starts_at {
            return Err(MarketError::EventClosed("Event has not started".to_string()));
        }
        if now > self.ends_at {
            return Err(MarketError::EventClosed("Event has ended".to_string()));
        }
        Ok(())
    }
}

/// Stored quiz question, including its answer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventQuestion {
    pub id: i64,
    pub position: i64,
    pub prompt: String,
    pub kind: QuestionKind,
    pub choices: Vec<String>,
    pub correct_answer: String,
    pub explanation: Option<String>,
}

/// Question as shown to participants
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicQuestion {
    pub position: i64,
    pub prompt: String,
    pub kind: QuestionKind,
    pub choices: Vec<String>,
}

impl From<EventQuestion> for PublicQuestion {
    fn from(q: EventQuestion) -> Self {
        Self {
            position: q.position,
            prompt: q.prompt,
            kind: q.kind,
            choices: q.choices,
        }
    }
}

const EVENT_COLUMNS: &str = "id, kind, title, description, status, points, min_points, max_points, \
     min_length, review_criteria, max_participants, current_participants, starts_at, ends_at, \
     created_by, created_at, updated_at";

/// Load an event through the caller's connection or transaction
pub async fn load_event(conn: &mut SqliteConnection, event_id: &str) -> MarketResult<Event> {
    let row = sqlx::query_as::<_, EventRow>(&format!(
        "SELECT {} FROM events WHERE id = ?1",
        EVENT_COLUMNS
    ))
    .bind(event_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| MarketError::NotFound(format!("Event {} not found", event_id)))?;

    Event::from_row(row)
}

/// Questions of an event in position order
pub async fn load_questions(
    conn: &mut SqliteConnection,
    event_id: &str,
) -> MarketResult<Vec<EventQuestion>> {
    let rows = sqlx::query(
        "SELECT id, position, prompt, kind, choices, correct_answer, explanation
         FROM event_questions WHERE event_id = ?1 ORDER BY position",
    )
    .bind(event_id)
    .fetch_all(&mut *conn)
    .await?;

    let mut questions = Vec::with_capacity(rows.len());
    for row in rows {
        let kind: String = row.try_get("kind")?;
        let choices: Option<String> = row.try_get("choices")?;
        let choices = match choices {
            Some(raw) => serde_json::from_str(&raw)
                .map_err(|e| MarketError::Internal(format!("Corrupt question choices: {}", e)))?,
            None => Vec::new(),
        };

        questions.push(EventQuestion {
            id: row.try_get("id")?,
            position: row.try_get("position")?,
            prompt: row.try_get("prompt")?,
            kind: QuestionKind::parse(&kind)?,
            choices,
            correct_answer: row.try_get("correct_answer")?,
            explanation: row.try_get("explanation")?,
        });
    }

    Ok(questions)
}

fn validate_draft(index: usize, draft: &QuizDraft, errors: &mut FieldErrors) {
    let path = format!("questions[{}]", index);
    errors.check(!draft.prompt.trim().is_empty(), &path, "prompt is required");
    errors.check(
        !draft.correct_answer.trim().is_empty(),
        &path,
        "correct answer is required",
    );

    match draft.kind {
        QuestionKind::MultipleChoice => {
            errors.check(draft.choices.len() >= 2, &path, "needs at least two choices");
            errors.check(
                draft
                    .choices
                    .iter()
                    .any(|c| c.trim() == draft.correct_answer.trim()),
                &path,
                "correct answer must be one of the choices",
            );
        }
        QuestionKind::Ox => {
            let answer = draft.correct_answer.trim().to_uppercase();
            errors.check(answer == "O" || answer == "X", &path, "answer must be O or X");
        }
        QuestionKind::ShortAnswer => {}
    }
}

/// Event authoring manager
#[derive(Clone)]
pub struct EventManager {
    db: SqlitePool,
    assistant: Arc<dyn QuizAssistant>,
}

impl EventManager {
    pub fn new(db: SqlitePool, assistant: Arc<dyn QuizAssistant>) -> Self {
        Self { db, assistant }
    }

    async fn require(&self, account_id: &str, capability: Capability) -> MarketResult<()> {
        let mut conn = self.db.acquire().await?;
        role_of(&mut conn, account_id).await?.require(capability)
    }

    /// Create a draft event
    pub async fn create_event(&self, admin_id: &str, definition: &EventDefinition) -> MarketResult<Event> {
        self.require(admin_id, Capability::ManageEvents).await?;
        definition.validate()?;

        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        let mut tx = self.db.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO events (id, kind, title, description, status, points, min_points, max_points,
                                min_length, review_criteria, max_participants, current_participants,
                                starts_at, ends_at, created_by, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, 'draft', ?5, ?6, ?7, ?8, ?9, ?10, 0, ?11, ?12, ?13, ?14, ?14)
            "#,
        )
        .bind(&id)
        .bind(definition.kind.as_str())
        .bind(definition.title.trim())
        .bind(&definition.description)
        .bind(definition.points)
        .bind(definition.min_points)
        .bind(definition.max_points)
        .bind(definition.min_length)
        .bind(&definition.review_criteria)
        .bind(definition.max_participants)
        .bind(definition.starts_at)
        .bind(definition.ends_at)
        .bind(admin_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        record_audit(&mut tx, admin_id, "event.create", Some(&id), Some(definition.kind.as_str())).await?;
        let event = load_event(&mut tx, &id).await?;
        tx.commit().await?;

        tracing::info!(event_id = %id, kind = definition.kind.as_str(), "Event created");
        Ok(event)
    }

    /// Replace the definition of a draft or scheduled event
    pub async fn update_event(
        &self,
        admin_id: &str,
        event_id: &str,
        definition: &EventDefinition,
    ) -> MarketResult<Event> {
        self.require(admin_id, Capability::ManageEvents).await?;
        definition.validate()?;

        let mut tx = self.db.begin().await?;
        let current = load_event(&mut tx, event_id).await?;
        if !matches!(current.status, EventStatus::Draft | EventStatus::Scheduled) {
            return Err(MarketError::Validation(format!(
                "Cannot edit an event that is {}",
                current.status.as_str()
            )));
        }
        if current.kind != definition.kind {
            return Err(MarketError::Validation("Event kind cannot change".to_string()));
        }

        sqlx::query(
            r#"
            UPDATE events SET title = ?1, description = ?2, points = ?3, min_points = ?4,
                max_points = ?5, min_length = ?6, review_criteria = ?7, max_participants = ?8,
                starts_at = ?9, ends_at = ?10, updated_at = ?11
            WHERE id = ?12
            "#,
        )
        .bind(definition.title.trim())
        .bind(&definition.description)
        .bind(definition.points)
        .bind(definition.min_points)
        .bind(definition.max_points)
        .bind(definition.min_length)
        .bind(&definition.review_criteria)
        .bind(definition.max_participants)
        .bind(definition.starts_at)
        .bind(definition.ends_at)
        .bind(Utc::now())
        .bind(event_id)
        .execute(&mut *tx)
        .await?;

        record_audit(&mut tx, admin_id, "event.update", Some(event_id), None).await?;
        let event = load_event(&mut tx, event_id).await?;
        tx.commit().await?;

        Ok(event)
    }

    pub async fn get_event(&self, event_id: &str) -> MarketResult<Event> {
        let mut conn = self.db.acquire().await?;
        load_event(&mut conn, event_id).await
    }

    /// All events, optionally filtered by status, newest first
    pub async fn list_events(&self, status: Option<EventStatus>) -> MarketResult<Vec<Event>> {
        let rows = sqlx::query_as::<_, EventRow>(&format!(
            "SELECT {} FROM events WHERE (?1 IS NULL OR status = ?1) ORDER BY starts_at DESC",
            EVENT_COLUMNS
        ))
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(Event::from_row).collect()
    }

    /// Move an event to `next`, fanning out availability notifications on activation
    pub async fn transition(&self, admin_id: &str, event_id: &str, next: EventStatus) -> MarketResult<Event> {
        self.require(admin_id, Capability::ManageEvents).await?;

        let mut tx = self.db.begin().await?;
        let event = load_event(&mut tx, event_id).await?;

        Self::check_transition(&mut tx, &event, next).await?;
        Self::set_status(&mut tx, &event, next).await?;
        record_audit(&mut tx, admin_id, "event.transition", Some(event_id), Some(next.as_str())).await?;
        let updated = load_event(&mut tx, event_id).await?;
        tx.commit().await?;

        tracing::info!(event_id, from = event.status.as_str(), to = next.as_str(), "Event transitioned");
        Ok(updated)
    }

    pub async fn schedule(&self, admin_id: &str, event_id: &str) -> MarketResult<Event> {
        self.transition(admin_id, event_id, EventStatus::Scheduled).await
    }

    pub async fn activate(&self, admin_id: &str, event_id: &str) -> MarketResult<Event> {
        self.transition(admin_id, event_id, EventStatus::Active).await
    }

    pub async fn end(&self, admin_id: &str, event_id: &str) -> MarketResult<Event> {
        self.transition(admin_id, event_id, EventStatus::Ended).await
    }

    /// Guards shared by admin transitions and the lifecycle job
    async fn check_transition(conn: &mut SqliteConnection, event: &Event, next: EventStatus) -> MarketResult<()> {
        if !event.status.can_move_to(next) {
            return Err(MarketError::Validation(format!(
                "Cannot move event from {} to {}",
                event.status.as_str(),
                next.as_str()
            )));
        }

        if next == EventStatus::Active && event.kind == EventKind::Quiz {
            let count: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM event_questions WHERE event_id = ?1")
                    .bind(&event.id)
                    .fetch_one(&mut *conn)
                    .await?;
            if count == 0 {
                return Err(MarketError::Validation(
                    "Quiz events need accepted questions before activation".to_string(),
                ));
            }
        }

        Ok(())
    }

    async fn set_status(conn: &mut SqliteConnection, event: &Event, next: EventStatus) -> MarketResult<()> {
        let result = sqlx::query("UPDATE events SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status = ?4")
            .bind(next.as_str())
            .bind(Utc::now())
            .bind(&event.id)
            .bind(event.status.as_str())
            .execute(&mut *conn)
            .await?;

        if result.rows_affected() == 0 {
            return Err(MarketError::Conflict("Event status changed concurrently".to_string()));
        }

        if next == EventStatus::Active {
            let recipients: Vec<String> =
                sqlx::query_scalar("SELECT id FROM accounts WHERE role != 'admin'")
                    .fetch_all(&mut *conn)
                    .await?;

            let body = format!("{} is now open", event.title);
            notifications::notify_many(
                conn,
                &recipients,
                &NewNotification {
                    kind: NotificationKind::EventAvailable,
                    title: "New event",
                    body: &body,
                    related_id: Some(&event.id),
                },
            )
            .await?;
        }

        Ok(())
    }

    /// Activate scheduled events whose start has passed and end active events
    /// whose window has closed. Returns (activated, ended).
    pub async fn run_lifecycle(&self, now: DateTime<Utc>) -> MarketResult<(u64, u64)> {
        let mut tx = self.db.begin().await?;

        let due: Vec<String> = sqlx::query_scalar(
            "SELECT id FROM events WHERE status = 'scheduled' AND starts_at <= ?1 AND ends_at > ?1",
        )
        .bind(now)
        .fetch_all(&mut *tx)
        .await?;

        let mut activated = 0;
        for id in &due {
            let event = load_event(&mut tx, id).await?;
            match Self::check_transition(&mut tx, &event, EventStatus::Active).await {
                Ok(()) => {}
                Err(MarketError::Validation(reason)) => {
                    tracing::warn!(event_id = %id, "Scheduled event not activated: {}", reason);
                    continue;
                }
                Err(e) => return Err(e),
            }
            Self::set_status(&mut tx, &event, EventStatus::Active).await?;
            activated += 1;
        }

        // Only active events end; a scheduled event that never opened stays scheduled
        let ended = sqlx::query(
            "UPDATE events SET status = 'ended', updated_at = ?1
             WHERE status = 'active' AND ends_at <= ?1",
        )
        .bind(now)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;

        if activated > 0 || ended > 0 {
            tracing::info!(activated, ended, "Event lifecycle tick");
        }
        Ok((activated, ended))
    }

    /// Ask the assistant for draft questions. Nothing is stored.
    pub async fn generate_quiz_drafts(&self, admin_id: &str, request: &QuizRequest) -> MarketResult<Vec<QuizDraft>> {
        self.require(admin_id, Capability::ManageEvents).await?;

        if request.topic.trim().is_empty() || !(1..=20).contains(&request.question_count) {
            return Err(MarketError::Validation(
                "topic is required and questionCount must be between 1 and 20".to_string(),
            ));
        }

        self.assistant.generate_quiz(request).await
    }

    /// Replace an event's questions with reviewed drafts
    pub async fn accept_questions(
        &self,
        admin_id: &str,
        event_id: &str,
        drafts: &[QuizDraft],
    ) -> MarketResult<Vec<EventQuestion>> {
        self.require(admin_id, Capability::ManageEvents).await?;

        if drafts.is_empty() {
            return Err(MarketError::Validation("At least one question is required".to_string()));
        }
        let mut errors = FieldErrors::new();
        for (index, draft) in drafts.iter().enumerate() {
            validate_draft(index, draft, &mut errors);
        }
        errors.into_result()?;

        let mut tx = self.db.begin().await?;
        let event = load_event(&mut tx, event_id).await?;
        if event.kind != EventKind::Quiz {
            return Err(MarketError::Validation("Only quiz events have questions".to_string()));
        }
        if !matches!(event.status, EventStatus::Draft | EventStatus::Scheduled) {
            return Err(MarketError::Validation(format!(
                "Cannot change questions of an event that is {}",
                event.status.as_str()
            )));
        }

        sqlx::query("DELETE FROM event_questions WHERE event_id = ?1")
            .bind(event_id)
            .execute(&mut *tx)
            .await?;

        for (position, draft) in drafts.iter().enumerate() {
            let choices = if draft.choices.is_empty() {
                None
            } else {
                Some(
                    serde_json::to_string(&draft.choices)
                        .map_err(|e| MarketError::Internal(format!("Failed to encode choices: {}", e)))?,
                )
            };

            sqlx::query(
                "INSERT INTO event_questions (event_id, position, prompt, kind, choices, correct_answer, explanation)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )
            .bind(event_id)
            .bind(position as i64)
            .bind(draft.prompt.trim())
            .bind(draft.kind.as_str())
            .bind(choices)
            .bind(draft.correct_answer.trim())
            .bind(&draft.explanation)
            .execute(&mut *tx)
            .await?;
        }

        record_audit(
            &mut tx,
            admin_id,
            "event.questions",
            Some(event_id),
            Some(&drafts.len().to_string()),
        )
        .await?;
        let questions = load_questions(&mut tx, event_id).await?;
        tx.commit().await?;

        tracing::info!(event_id, count = questions.len(), "Quiz questions accepted");
        Ok(questions)
    }

    /// Questions with answers, for admins
    pub async fn questions(&self, admin_id: &str, event_id: &str) -> MarketResult<Vec<EventQuestion>> {
        self.require(admin_id, Capability::ManageEvents).await?;
        let mut conn = self.db.acquire().await?;
        load_questions(&mut conn, event_id).await
    }

    /// Questions without answers, for participants of an open event
    pub async fn public_questions(&self, event_id: &str) -> MarketResult<Vec<PublicQuestion>> {
        let mut conn = self.db.acquire().await?;
        let event = load_event(&mut conn, event_id).await?;
        if matches!(event.status, EventStatus::Draft | EventStatus::Scheduled) {
            return Err(MarketError::NotFound(format!("Event {} not found", event_id)));
        }
        Ok(load_questions(&mut conn, event_id)
            .await?
            .into_iter()
            .map(PublicQuestion::from)
            .collect())
    }

    /// Comment submissions awaiting a decision
    pub async fn list_pending_participations(
        &self,
        admin_id: &str,
        event_id: Option<&str>,
    ) -> MarketResult<Vec<ParticipationRow>> {
        self.require(admin_id, Capability::ApproveParticipations).await?;

        let rows = sqlx::query_as::<_, ParticipationRow>(
            r#"
            SELECT id, event_id, account_id, status, answers, comment, correct_count, ai_score,
                   final_score, points_awarded, position, decided_by, decided_at, created_at
            FROM event_participations
            WHERE status = 'pending' AND (?1 IS NULL OR event_id = ?1)
            ORDER BY created_at
            "#,
        )
        .bind(event_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::CannedQuizAssistant;
    use crate::db;
    use chrono::Duration;

    async fn setup() -> (SqlitePool, EventManager) {
        let pool = db::connect_in_memory().await.unwrap();
        for (id, role) in [("root", "admin"), ("kim", "teacher"), ("lee", "parent")] {
            sqlx::query(
                "INSERT INTO accounts (id, email, nickname, password_hash, role, points, created_at)
                 VALUES (?1, ?2, ?1, 'x', ?3, 0, ?4)",
            )
            .bind(id)
            .bind(format!("{}@example.com", id))
            .bind(role)
            .bind(Utc::now())
            .execute(&pool)
            .await
            .unwrap();
        }

        let assistant = CannedQuizAssistant {
            drafts: vec![QuizDraft {
                prompt: "Capital of Korea?".to_string(),
                kind: QuestionKind::ShortAnswer,
                choices: vec![],
                correct_answer: "Seoul".to_string(),
                explanation: None,
            }],
            score: Some(70),
        };
        let manager = EventManager::new(pool.clone(), Arc::new(assistant));
        (pool, manager)
    }

    fn comment_event() -> EventDefinition {
        EventDefinition {
            kind: EventKind::Comment,
            title: "Share a teaching tip".to_string(),
            description: String::new(),
            points: None,
            min_points: Some(10),
            max_points: Some(50),
            min_length: Some(20),
            review_criteria: Some("Specific and actionable".to_string()),
            max_participants: None,
            starts_at: Utc::now() - Duration::hours(1),
            ends_at: Utc::now() + Duration::days(7),
        }
    }

    #[test]
    fn test_definition_validation() {
        assert!(comment_event().validate().is_ok());

        let mut inverted = comment_event();
        inverted.min_points = Some(60);
        assert!(inverted.validate().is_err());

        let mut no_criteria = comment_event();
        no_criteria.review_criteria = Some("  ".to_string());
        assert!(no_criteria.validate().is_err());

        let mut quiz = comment_event();
        quiz.kind = EventKind::Quiz;
        assert!(quiz.validate().is_err());
        quiz.points = Some(20);
        assert!(quiz.validate().is_ok());

        let mut window = comment_event();
        window.ends_at = window.starts_at;
        assert!(window.validate().is_err());
    }

    #[test]
    fn test_transition_table() {
        assert!(EventStatus::Draft.can_move_to(EventStatus::Scheduled));
        assert!(EventStatus::Scheduled.can_move_to(EventStatus::Active));
        assert!(EventStatus::Active.can_move_to(EventStatus::Ended));
        assert!(!EventStatus::Ended.can_move_to(EventStatus::Active));
        assert!(!EventStatus::Active.can_move_to(EventStatus::Draft));
    }

    #[tokio::test]
    async fn test_only_admins_create_events() {
        let (_pool, manager) = setup().await;

        let result = manager.create_event("kim", &comment_event()).await;
        assert!(matches!(result, Err(MarketError::Forbidden(_))));

        let event = manager.create_event("root", &comment_event()).await.unwrap();
        assert_eq!(event.status, EventStatus::Draft);
    }

    #[tokio::test]
    async fn test_activation_notifies_non_admins() {
        let (pool, manager) = setup().await;

        let event = manager.create_event("root", &comment_event()).await.unwrap();
        manager.schedule("root", &event.id).await.unwrap();
        let active = manager.activate("root", &event.id).await.unwrap();
        assert_eq!(active.status, EventStatus::Active);

        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications WHERE kind = 'event_available' AND related_id = ?1",
        )
        .bind(&event.id)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(count, 2);

        let again = manager.activate("root", &event.id).await;
        assert!(matches!(again, Err(MarketError::Validation(_))));
    }

    #[tokio::test]
    async fn test_quiz_drafts_are_not_stored_until_accepted() {
        let (pool, manager) = setup().await;

        let mut definition = comment_event();
        definition.kind = EventKind::Quiz;
        definition.points = Some(20);
        let event = manager.create_event("root", &definition).await.unwrap();

        let drafts = manager
            .generate_quiz_drafts(
                "root",
                &QuizRequest {
                    topic: "geography".to_string(),
                    grade: None,
                    subject: None,
                    question_count: 5,
                    difficulty: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(drafts.len(), 1);

        let stored: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM event_questions")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(stored, 0);

        // Quiz cannot go live without questions
        assert!(manager.activate("root", &event.id).await.is_err());

        let accepted = manager.accept_questions("root", &event.id, &drafts).await.unwrap();
        assert_eq!(accepted.len(), 1);
        manager.activate("root", &event.id).await.unwrap();

        let public = manager.public_questions(&event.id).await.unwrap();
        assert_eq!(public[0].prompt, "Capital of Korea?");
    }

    #[tokio::test]
    async fn test_accept_rejects_bad_multiple_choice() {
        let (_pool, manager) = setup().await;

        let mut definition = comment_event();
        definition.kind = EventKind::Quiz;
        definition.points = Some(20);
        let event = manager.create_event("root", &definition).await.unwrap();

        let bad = QuizDraft {
            prompt: "2 + 2?".to_string(),
            kind: QuestionKind::MultipleChoice,
            choices: vec!["3".to_string(), "5".to_string()],
            correct_answer: "4".to_string(),
            explanation: None,
        };
        let result = manager.accept_questions("root", &event.id, &[bad]).await;
        assert!(matches!(result, Err(MarketError::Validation(_))));
    }

    #[tokio::test]
    async fn test_lifecycle_tick() {
        let (_pool, manager) = setup().await;

        let event = manager.create_event("root", &comment_event()).await.unwrap();
        manager.schedule("root", &event.id).await.unwrap();

        let (activated, ended) = manager.run_lifecycle(Utc::now()).await.unwrap();
        assert_eq!((activated, ended), (1, 0));

        let (activated, ended) = manager
            .run_lifecycle(Utc::now() + Duration::days(8))
            .await
            .unwrap();
        assert_eq!((activated, ended), (0, 1));
        assert_eq!(
            manager.get_event(&event.id).await.unwrap().status,
            EventStatus::Ended
        );
    }

    #[tokio::test]
    async fn test_lifecycle_applies_transition_guards() {
        let (_pool, manager) = setup().await;

        let mut definition = comment_event();
        definition.kind = EventKind::Quiz;
        definition.points = Some(20);
        let quiz = manager.create_event("root", &definition).await.unwrap();
        manager.schedule("root", &quiz.id).await.unwrap();

        // No accepted questions: the tick leaves the quiz scheduled
        let (activated, ended) = manager.run_lifecycle(Utc::now()).await.unwrap();
        assert_eq!((activated, ended), (0, 0));
        assert_eq!(
            manager.get_event(&quiz.id).await.unwrap().status,
            EventStatus::Scheduled
        );

        // A scheduled event past its window never jumps to ended
        let comment = manager.create_event("root", &comment_event()).await.unwrap();
        manager.schedule("root", &comment.id).await.unwrap();
        let (activated, ended) = manager
            .run_lifecycle(Utc::now() + Duration::days(8))
            .await
            .unwrap();
        assert_eq!((activated, ended), (0, 0));
        assert_eq!(
            manager.get_event(&comment.id).await.unwrap().status,
            EventStatus::Scheduled
        );
    }
}
