/// Ledger manager: every balance-changing operation of the market
use super::{
    apply_points, balance_of,
    policy::{self, Clock, PrizePicker, RandomPrizePicker, SystemClock},
    ApprovalOutcome, AttendanceOutcome, BalanceCheck, CheckoutOutcome, CommentOutcome,
    DailyStatus, FeedbackOutcome, FirstComeOutcome, QuizOutcome, RouletteOutcome,
    TransactionKind,
};
use crate::{
    admin::{
        events::{load_event, load_questions, Event, EventKind},
        roles::{record_audit, role_of, Capability},
    },
    assistant::QuizAssistant,
    config::PointsPolicy,
    db::models::PointTransactionRow,
    error::{is_unique_violation, MarketError, MarketResult},
    metrics,
    notifications::{self, NewNotification, NotificationKind},
    validation,
};
use chrono::{Duration, NaiveDate, Utc};
use sqlx::{Row, SqliteConnection, SqlitePool};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Ledger manager
///
/// Operations run in a single SQLite transaction each. A process-wide write
/// gate serialises them so check-then-act sequences (participant caps, once
/// per day rewards) cannot interleave; conditional updates and UNIQUE
/// constraints back the same guarantees at the SQL level.
pub struct LedgerManager {
    db: SqlitePool,
    policy: PointsPolicy,
    assistant: Arc<dyn QuizAssistant>,
    clock: Arc<dyn Clock>,
    prize_picker: Arc<dyn PrizePicker>,
    write_gate: Mutex<()>,
}

impl LedgerManager {
    pub fn new(db: SqlitePool, policy: PointsPolicy, assistant: Arc<dyn QuizAssistant>) -> Self {
        Self {
            db,
            policy,
            assistant,
            clock: Arc::new(SystemClock),
            prize_picker: Arc::new(RandomPrizePicker),
            write_gate: Mutex::new(()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_prize_picker(mut self, prize_picker: Arc<dyn PrizePicker>) -> Self {
        self.prize_picker = prize_picker;
        self
    }

    pub fn policy(&self) -> &PointsPolicy {
        &self.policy
    }

    fn today(&self) -> NaiveDate {
        policy::calendar_day(self.clock.now(), self.policy.timezone_offset_hours)
    }

    // ========== Purchases ==========

    /// Purchase every listing in `listing_ids` with one debit, or nothing
    pub async fn checkout(&self, buyer_id: &str, listing_ids: &[String]) -> MarketResult<CheckoutOutcome> {
        let result = self.checkout_inner(buyer_id, listing_ids).await;
        metrics::record_ledger_operation("checkout", &result);
        result
    }

    async fn checkout_inner(&self, buyer_id: &str, listing_ids: &[String]) -> MarketResult<CheckoutOutcome> {
        if listing_ids.is_empty() {
            return Err(MarketError::Validation("Cart is empty".to_string()));
        }
        let mut seen = HashSet::new();
        if !listing_ids.iter().all(|id| seen.insert(id.as_str())) {
            return Err(MarketError::DuplicateLine);
        }

        let _gate = self.write_gate.lock().await;
        let mut tx = self.db.begin().await?;

        let mut total = 0i64;
        let mut lines = Vec::with_capacity(listing_ids.len());
        for listing_id in listing_ids {
            let row = sqlx::query("SELECT seller_id, price, is_active FROM listings WHERE id = ?1")
                .bind(listing_id)
                .fetch_optional(&mut *tx)
                .await?;

            let row = match row {
                Some(row) if row.try_get::<bool, _>("is_active")? => row,
                _ => return Err(MarketError::NotFound(format!("Listing {} not found", listing_id))),
            };

            let seller_id: String = row.try_get("seller_id")?;
            if seller_id == buyer_id {
                return Err(MarketError::SelfPurchase);
            }

            let owned: Option<i64> = sqlx::query_scalar(
                "SELECT 1 FROM purchases WHERE buyer_id = ?1 AND listing_id = ?2",
            )
            .bind(buyer_id)
            .bind(listing_id)
            .fetch_optional(&mut *tx)
            .await?;
            if owned.is_some() {
                return Err(MarketError::AlreadyOwned);
            }

            let price: i64 = row.try_get("price")?;
            total += price;
            lines.push((listing_id, price));
        }

        let available = balance_of(&mut tx, buyer_id).await?;
        if available < total {
            return Err(MarketError::InsufficientBalance {
                required: total,
                available,
            });
        }

        let now = Utc::now();
        let mut purchase_ids = Vec::with_capacity(lines.len());
        for &(listing_id, price) in &lines {
            let purchase_id = Uuid::new_v4().to_string();
            sqlx::query(
                "INSERT INTO purchases (id, buyer_id, listing_id, price_paid, feedback_given, created_at)
                 VALUES (?1, ?2, ?3, ?4, 0, ?5)",
            )
            .bind(&purchase_id)
            .bind(buyer_id)
            .bind(listing_id)
            .bind(price)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    MarketError::AlreadyOwned
                } else {
                    MarketError::Database(e)
                }
            })?;

            sqlx::query("UPDATE listings SET sales_count = sales_count + 1 WHERE id = ?1")
                .bind(listing_id)
                .execute(&mut *tx)
                .await?;

            sqlx::query("DELETE FROM cart_items WHERE account_id = ?1 AND listing_id = ?2")
                .bind(buyer_id)
                .bind(listing_id)
                .execute(&mut *tx)
                .await?;

            purchase_ids.push(purchase_id);
        }

        let description = format!("Purchase of {} item(s)", lines.len());
        let new_balance = apply_points(
            &mut tx,
            buyer_id,
            -total,
            TransactionKind::Purchase,
            purchase_ids.first().map(String::as_str),
            Some(&description),
        )
        .await?;

        tx.commit().await?;

        tracing::info!(buyer_id, items = lines.len(), total, new_balance, "Checkout completed");

        Ok(CheckoutOutcome {
            new_balance,
            purchase_ids,
            total,
        })
    }

    /// Leave feedback on a purchase and credit the one-time refund
    pub async fn submit_feedback(
        &self,
        account_id: &str,
        purchase_id: &str,
        rating: i64,
        comment: &str,
    ) -> MarketResult<FeedbackOutcome> {
        let result = self
            .submit_feedback_inner(account_id, purchase_id, rating, comment)
            .await;
        metrics::record_ledger_operation("feedback", &result);
        result
    }

    async fn submit_feedback_inner(
        &self,
        account_id: &str,
        purchase_id: &str,
        rating: i64,
        comment: &str,
    ) -> MarketResult<FeedbackOutcome> {
        validation::validate_feedback(rating, comment)?;
        let comment = comment.trim();

        let _gate = self.write_gate.lock().await;
        let mut tx = self.db.begin().await?;

        let purchase = sqlx::query(
            "SELECT p.buyer_id, p.listing_id, l.seller_id, l.title
             FROM purchases p JOIN listings l ON l.id = p.listing_id
             WHERE p.id = ?1",
        )
        .bind(purchase_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| MarketError::NotFound(format!("Purchase {} not found", purchase_id)))?;

        let buyer_id: String = purchase.try_get("buyer_id")?;
        if buyer_id != account_id {
            return Err(MarketError::Forbidden(
                "Purchase belongs to another account".to_string(),
            ));
        }
        let listing_id: String = purchase.try_get("listing_id")?;
        let seller_id: String = purchase.try_get("seller_id")?;
        let title: String = purchase.try_get("title")?;

        let marked = sqlx::query(
            "UPDATE purchases SET feedback_given = 1 WHERE id = ?1 AND feedback_given = 0",
        )
        .bind(purchase_id)
        .execute(&mut *tx)
        .await?;
        if marked.rows_affected() == 0 {
            return Err(MarketError::AlreadyReviewed);
        }

        sqlx::query(
            "INSERT INTO feedback (purchase_id, account_id, listing_id, rating, comment, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(purchase_id)
        .bind(account_id)
        .bind(&listing_id)
        .bind(rating)
        .bind(comment)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                MarketError::AlreadyReviewed
            } else {
                MarketError::Database(e)
            }
        })?;

        sqlx::query(
            "UPDATE listings SET rating_sum = rating_sum + ?1, rating_count = rating_count + 1 WHERE id = ?2",
        )
        .bind(rating)
        .bind(&listing_id)
        .execute(&mut *tx)
        .await?;

        let refund = self.policy.feedback_refund;
        let new_balance = apply_points(
            &mut tx,
            account_id,
            refund,
            TransactionKind::FeedbackRefund,
            Some(purchase_id),
            Some("Feedback refund"),
        )
        .await?;

        let body = format!("{} received a {}-star review", title, rating);
        notifications::notify(
            &mut tx,
            &seller_id,
            &NewNotification {
                kind: NotificationKind::FeedbackReceived,
                title: "New review",
                body: &body,
                related_id: Some(&listing_id),
            },
        )
        .await?;

        tx.commit().await?;

        tracing::info!(account_id, purchase_id, rating, refund, "Feedback recorded");
        Ok(FeedbackOutcome { refund, new_balance })
    }

    // ========== Daily rewards ==========

    /// Once-per-day check-in with streak bonus
    pub async fn check_attendance(&self, account_id: &str) -> MarketResult<AttendanceOutcome> {
        let result = self.check_attendance_inner(account_id).await;
        metrics::record_ledger_operation("attendance", &result);
        result
    }

    async fn check_attendance_inner(&self, account_id: &str) -> MarketResult<AttendanceOutcome> {
        let today = self.today();
        let yesterday = today - Duration::days(1);

        let _gate = self.write_gate.lock().await;
        let mut tx = self.db.begin().await?;

        let existing: Option<i64> = sqlx::query_scalar(
            "SELECT 1 FROM daily_attendance WHERE account_id = ?1 AND attended_on = ?2",
        )
        .bind(account_id)
        .bind(today)
        .fetch_optional(&mut *tx)
        .await?;
        if existing.is_some() {
            return Err(MarketError::AlreadyCheckedIn);
        }

        let previous: Option<i64> = sqlx::query_scalar(
            "SELECT streak FROM daily_attendance WHERE account_id = ?1 AND attended_on = ?2",
        )
        .bind(account_id)
        .bind(yesterday)
        .fetch_optional(&mut *tx)
        .await?;

        let streak = previous.map_or(1, |s| s + 1);
        let base_points = self.policy.attendance_base;
        let bonus_points = policy::milestone_bonus(streak, &self.policy.attendance_milestones);

        let description = format!("Day {} check-in", streak);
        let new_balance = apply_points(
            &mut tx,
            account_id,
            base_points + bonus_points,
            TransactionKind::Attendance,
            None,
            Some(&description),
        )
        .await?;

        sqlx::query(
            "INSERT INTO daily_attendance (account_id, attended_on, streak, base_points, bonus_points, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(account_id)
        .bind(today)
        .bind(streak)
        .bind(base_points)
        .bind(bonus_points)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                MarketError::AlreadyCheckedIn
            } else {
                MarketError::Database(e)
            }
        })?;

        tx.commit().await?;

        tracing::info!(account_id, %today, streak, bonus_points, "Attendance checked");
        Ok(AttendanceOutcome {
            streak,
            base_points,
            bonus_points,
            new_balance,
        })
    }

    /// Once-per-day roulette; the prize is decided before anything is written
    pub async fn spin_roulette(&self, account_id: &str) -> MarketResult<RouletteOutcome> {
        let result = self.spin_roulette_inner(account_id).await;
        metrics::record_ledger_operation("roulette", &result);
        result
    }

    async fn spin_roulette_inner(&self, account_id: &str) -> MarketResult<RouletteOutcome> {
        let prizes = self.policy.roulette_prizes.clone();
        if prizes.is_empty() {
            return Err(MarketError::Internal("Roulette prize table is empty".to_string()));
        }
        let today = self.today();

        let _gate = self.write_gate.lock().await;
        let mut tx = self.db.begin().await?;

        let existing: Option<i64> = sqlx::query_scalar(
            "SELECT 1 FROM daily_roulette WHERE account_id = ?1 AND spun_on = ?2",
        )
        .bind(account_id)
        .bind(today)
        .fetch_optional(&mut *tx)
        .await?;
        if existing.is_some() {
            return Err(MarketError::AlreadyDone("Roulette already spun today".to_string()));
        }

        let prize_index = self.prize_picker.pick(prizes.len()).min(prizes.len() - 1);
        let prize = prizes[prize_index];

        let new_balance = apply_points(
            &mut tx,
            account_id,
            prize,
            TransactionKind::Roulette,
            None,
            Some("Daily roulette"),
        )
        .await?;

        sqlx::query(
            "INSERT INTO daily_roulette (account_id, spun_on, prize_index, prize, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(account_id)
        .bind(today)
        .bind(prize_index as i64)
        .bind(prize)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                MarketError::AlreadyDone("Roulette already spun today".to_string())
            } else {
                MarketError::Database(e)
            }
        })?;

        tx.commit().await?;

        tracing::info!(account_id, prize_index, prize, "Roulette spun");
        Ok(RouletteOutcome {
            prize_index,
            prize,
            prizes,
            new_balance,
        })
    }

    /// What the account has already claimed today
    pub async fn daily_status(&self, account_id: &str) -> MarketResult<DailyStatus> {
        let today = self.today();
        let yesterday = today - Duration::days(1);

        let latest: Option<(NaiveDate, i64)> = sqlx::query_as(
            "SELECT attended_on, streak FROM daily_attendance
             WHERE account_id = ?1 ORDER BY attended_on DESC LIMIT 1",
        )
        .bind(account_id)
        .fetch_optional(&self.db)
        .await?;

        let spun: Option<i64> = sqlx::query_scalar(
            "SELECT 1 FROM daily_roulette WHERE account_id = ?1 AND spun_on = ?2",
        )
        .bind(account_id)
        .bind(today)
        .fetch_optional(&self.db)
        .await?;

        let (checked_in_today, current_streak) = match latest {
            Some((day, streak)) if day == today => (true, streak),
            Some((day, streak)) if day == yesterday => (false, streak),
            _ => (false, 0),
        };

        Ok(DailyStatus {
            checked_in_today,
            current_streak,
            spun_today: spun.is_some(),
        })
    }

    // ========== Events ==========

    async fn ensure_not_participated(
        conn: &mut SqliteConnection,
        event_id: &str,
        account_id: &str,
    ) -> MarketResult<()> {
        let existing: Option<i64> = sqlx::query_scalar(
            "SELECT 1 FROM event_participations WHERE event_id = ?1 AND account_id = ?2",
        )
        .bind(event_id)
        .bind(account_id)
        .fetch_optional(&mut *conn)
        .await?;

        if existing.is_some() {
            return Err(MarketError::AlreadyDone("Already participated in this event".to_string()));
        }
        Ok(())
    }

    /// Guarded increment of the participant counter; returns the admission position
    async fn admit(conn: &mut SqliteConnection, event: &Event) -> MarketResult<i64> {
        let position: Option<i64> = sqlx::query_scalar(
            "UPDATE events SET current_participants = current_participants + 1, updated_at = ?1
             WHERE id = ?2 AND (max_participants IS NULL OR current_participants < max_participants)
             RETURNING current_participants",
        )
        .bind(Utc::now())
        .bind(&event.id)
        .fetch_optional(&mut *conn)
        .await?;

        position.ok_or(MarketError::EventFull)
    }

    #[allow(clippy::too_many_arguments)]
    async fn insert_participation(
        conn: &mut SqliteConnection,
        event_id: &str,
        account_id: &str,
        status: &str,
        answers: Option<&str>,
        comment: Option<&str>,
        correct_count: Option<i64>,
        ai_score: Option<i64>,
        points_awarded: i64,
        position: Option<i64>,
    ) -> MarketResult<String> {
        let id = Uuid::new_v4().to_string();
        sqlx::query(
            r#"
            INSERT INTO event_participations (id, event_id, account_id, status, answers, comment,
                                              correct_count, ai_score, points_awarded, position, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(&id)
        .bind(event_id)
        .bind(account_id)
        .bind(status)
        .bind(answers)
        .bind(comment)
        .bind(correct_count)
        .bind(ai_score)
        .bind(points_awarded)
        .bind(position)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                MarketError::AlreadyDone("Already participated in this event".to_string())
            } else {
                MarketError::Database(e)
            }
        })?;

        Ok(id)
    }

    /// Submit quiz answers; points only when every answer is correct
    pub async fn submit_quiz_participation(
        &self,
        account_id: &str,
        event_id: &str,
        answers: &[String],
    ) -> MarketResult<QuizOutcome> {
        let result = self
            .submit_quiz_participation_inner(account_id, event_id, answers)
            .await;
        metrics::record_ledger_operation("quiz", &result);
        result
    }

    async fn submit_quiz_participation_inner(
        &self,
        account_id: &str,
        event_id: &str,
        answers: &[String],
    ) -> MarketResult<QuizOutcome> {
        let _gate = self.write_gate.lock().await;
        let mut tx = self.db.begin().await?;

        let event = load_event(&mut tx, event_id).await?;
        if event.kind != EventKind::Quiz {
            return Err(MarketError::Validation("Event is not a quiz".to_string()));
        }
        event.ensure_open(self.clock.now())?;

        let questions = load_questions(&mut tx, event_id).await?;
        if questions.is_empty() {
            return Err(MarketError::EventClosed("Quiz has no questions".to_string()));
        }
        if answers.len() != questions.len() {
            return Err(MarketError::Validation(format!(
                "Expected {} answers, got {}",
                questions.len(),
                answers.len()
            )));
        }

        Self::ensure_not_participated(&mut tx, event_id, account_id).await?;

        let correct_count = questions
            .iter()
            .zip(answers)
            .filter(|(q, a)| policy::normalize_answer(&q.correct_answer) == policy::normalize_answer(a))
            .count() as i64;
        let total_questions = questions.len() as i64;
        let points_awarded = if correct_count == total_questions {
            event.points.unwrap_or(0)
        } else {
            0
        };

        let position = Self::admit(&mut tx, &event).await?;
        let answers_json = serde_json::to_string(answers)
            .map_err(|e| MarketError::Internal(format!("Failed to encode answers: {}", e)))?;
        let participation_id = Self::insert_participation(
            &mut tx,
            event_id,
            account_id,
            "completed",
            Some(&answers_json),
            None,
            Some(correct_count),
            None,
            points_awarded,
            Some(position),
        )
        .await?;

        let new_balance = if points_awarded > 0 {
            apply_points(
                &mut tx,
                account_id,
                points_awarded,
                TransactionKind::EventReward,
                Some(event_id),
                Some(&event.title),
            )
            .await?
        } else {
            balance_of(&mut tx, account_id).await?
        };

        tx.commit().await?;

        tracing::info!(account_id, event_id, correct_count, total_questions, points_awarded, "Quiz submitted");
        Ok(QuizOutcome {
            participation_id,
            correct_count,
            total_questions,
            points_awarded,
            new_balance,
        })
    }

    /// Claim a first-come slot
    pub async fn participate_first_come(
        &self,
        account_id: &str,
        event_id: &str,
        comment: Option<&str>,
    ) -> MarketResult<FirstComeOutcome> {
        let result = self
            .participate_first_come_inner(account_id, event_id, comment)
            .await;
        metrics::record_ledger_operation("first_come", &result);
        result
    }

    async fn participate_first_come_inner(
        &self,
        account_id: &str,
        event_id: &str,
        comment: Option<&str>,
    ) -> MarketResult<FirstComeOutcome> {
        if let Some(comment) = comment {
            if comment.chars().count() > validation::FEEDBACK_COMMENT_MAX {
                return Err(MarketError::Validation(format!(
                    "comment: must be at most {} characters",
                    validation::FEEDBACK_COMMENT_MAX
                )));
            }
        }

        let _gate = self.write_gate.lock().await;
        let mut tx = self.db.begin().await?;

        let event = load_event(&mut tx, event_id).await?;
        if event.kind != EventKind::FirstCome {
            return Err(MarketError::Validation("Event is not first-come".to_string()));
        }
        event.ensure_open(self.clock.now())?;
        Self::ensure_not_participated(&mut tx, event_id, account_id).await?;

        // A failed insert below drops the transaction, rolling back this increment
        let position = Self::admit(&mut tx, &event).await?;
        let points_awarded = event.points.unwrap_or(0);

        let participation_id = Self::insert_participation(
            &mut tx,
            event_id,
            account_id,
            "completed",
            None,
            comment.map(str::trim),
            None,
            None,
            points_awarded,
            Some(position),
        )
        .await?;

        let new_balance = if points_awarded > 0 {
            apply_points(
                &mut tx,
                account_id,
                points_awarded,
                TransactionKind::EventReward,
                Some(event_id),
                Some(&event.title),
            )
            .await?
        } else {
            balance_of(&mut tx, account_id).await?
        };

        tx.commit().await?;

        tracing::info!(account_id, event_id, position, "First-come slot claimed");
        Ok(FirstComeOutcome {
            participation_id,
            position,
            points_awarded,
            new_balance,
        })
    }

    /// Submit a comment for review; the assistant pre-scores it
    pub async fn submit_comment_participation(
        &self,
        account_id: &str,
        event_id: &str,
        comment: &str,
    ) -> MarketResult<CommentOutcome> {
        let result = self
            .submit_comment_participation_inner(account_id, event_id, comment)
            .await;
        metrics::record_ledger_operation("comment", &result);
        result
    }

    async fn submit_comment_participation_inner(
        &self,
        account_id: &str,
        event_id: &str,
        comment: &str,
    ) -> MarketResult<CommentOutcome> {
        let comment = comment.trim();

        // Checks before the assistant call, which runs outside the write gate
        let criteria = {
            let mut conn = self.db.acquire().await?;
            let event = load_event(&mut conn, event_id).await?;
            Self::check_comment_event(&event, comment, self.clock.now())?;
            Self::ensure_not_participated(&mut conn, event_id, account_id).await?;
            event.review_criteria.unwrap_or_default()
        };

        let ai_score = match self.assistant.score_comment(&criteria, comment).await {
            Ok(score) => Some(score.clamp(0, 100)),
            Err(e) => {
                tracing::warn!(event_id, error = %e, "Comment scoring failed; leaving score empty");
                None
            }
        };

        let _gate = self.write_gate.lock().await;
        let mut tx = self.db.begin().await?;

        let event = load_event(&mut tx, event_id).await?;
        Self::check_comment_event(&event, comment, self.clock.now())?;
        Self::ensure_not_participated(&mut tx, event_id, account_id).await?;
        let position = Self::admit(&mut tx, &event).await?;

        let participation_id = Self::insert_participation(
            &mut tx,
            event_id,
            account_id,
            "pending",
            None,
            Some(comment),
            None,
            ai_score,
            0,
            Some(position),
        )
        .await?;

        tx.commit().await?;

        tracing::info!(account_id, event_id, ?ai_score, "Comment submitted for review");
        Ok(CommentOutcome {
            participation_id,
            ai_score,
            status: "pending".to_string(),
        })
    }

    fn check_comment_event(event: &Event, comment: &str, now: chrono::DateTime<Utc>) -> MarketResult<()> {
        if event.kind != EventKind::Comment {
            return Err(MarketError::Validation("Event is not a comment event".to_string()));
        }
        event.ensure_open(now)?;

        let min_length = event.min_length.unwrap_or(1).max(1);
        let length = comment.chars().count() as i64;
        if length < min_length || length > validation::FEEDBACK_COMMENT_MAX as i64 {
            return Err(MarketError::Validation(format!(
                "comment: must be between {} and {} characters",
                min_length,
                validation::FEEDBACK_COMMENT_MAX
            )));
        }
        Ok(())
    }

    /// Decide a pending comment participation exactly once (admin only)
    pub async fn approve_event_participation(
        &self,
        admin_id: &str,
        participation_id: &str,
        approved: bool,
        adjusted_score: Option<i64>,
    ) -> MarketResult<ApprovalOutcome> {
        let result = self
            .approve_event_participation_inner(admin_id, participation_id, approved, adjusted_score)
            .await;
        metrics::record_ledger_operation("approval", &result);
        result
    }

    async fn approve_event_participation_inner(
        &self,
        admin_id: &str,
        participation_id: &str,
        approved: bool,
        adjusted_score: Option<i64>,
    ) -> MarketResult<ApprovalOutcome> {
        if let Some(score) = adjusted_score {
            if !(0..=100).contains(&score) {
                return Err(MarketError::Validation(
                    "adjustedScore: must be between 0 and 100".to_string(),
                ));
            }
        }

        let _gate = self.write_gate.lock().await;
        let mut tx = self.db.begin().await?;

        role_of(&mut tx, admin_id)
            .await?
            .require(Capability::ApproveParticipations)?;

        let row = sqlx::query(
            "SELECT p.account_id, p.event_id, p.status, p.ai_score, e.kind, e.title, e.min_points, e.max_points
             FROM event_participations p JOIN events e ON e.id = p.event_id
             WHERE p.id = ?1",
        )
        .bind(participation_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| MarketError::NotFound(format!("Participation {} not found", participation_id)))?;

        let kind: String = row.try_get("kind")?;
        if EventKind::parse(&kind)? != EventKind::Comment {
            return Err(MarketError::Validation(
                "Only comment participations need approval".to_string(),
            ));
        }
        let status: String = row.try_get("status")?;
        if status != "pending" {
            return Err(MarketError::AlreadyDecided);
        }

        let account_id: String = row.try_get("account_id")?;
        let event_id: String = row.try_get("event_id")?;
        let title: String = row.try_get("title")?;
        let ai_score: Option<i64> = row.try_get("ai_score")?;
        let min_points: i64 = row.try_get::<Option<i64>, _>("min_points")?.unwrap_or(0);
        let max_points: i64 = row.try_get::<Option<i64>, _>("max_points")?.unwrap_or(min_points);

        let final_score = adjusted_score.or(ai_score);
        let points_awarded = if approved {
            let score = final_score.ok_or_else(|| {
                MarketError::Validation(
                    "adjustedScore: required when the submission has no AI score".to_string(),
                )
            })?;
            policy::interpolate_payout(min_points, max_points, score)
        } else {
            0
        };

        let decided = sqlx::query(
            "UPDATE event_participations
             SET status = ?1, final_score = ?2, points_awarded = ?3, decided_by = ?4, decided_at = ?5
             WHERE id = ?6 AND status = 'pending'",
        )
        .bind(if approved { "approved" } else { "rejected" })
        .bind(final_score)
        .bind(points_awarded)
        .bind(admin_id)
        .bind(Utc::now())
        .bind(participation_id)
        .execute(&mut *tx)
        .await?;
        if decided.rows_affected() == 0 {
            return Err(MarketError::AlreadyDecided);
        }

        let new_balance = if points_awarded > 0 {
            Some(
                apply_points(
                    &mut tx,
                    &account_id,
                    points_awarded,
                    TransactionKind::EventReward,
                    Some(participation_id),
                    Some(&title),
                )
                .await?,
            )
        } else {
            None
        };

        let body = if approved {
            format!("Your entry for {} was approved: +{} points", title, points_awarded)
        } else {
            format!("Your entry for {} was not selected", title)
        };
        notifications::notify(
            &mut tx,
            &account_id,
            &NewNotification {
                kind: NotificationKind::ParticipationDecided,
                title: "Event result",
                body: &body,
                related_id: Some(&event_id),
            },
        )
        .await?;

        record_audit(
            &mut tx,
            admin_id,
            if approved { "participation.approve" } else { "participation.reject" },
            Some(participation_id),
            Some(&points_awarded.to_string()),
        )
        .await?;

        tx.commit().await?;

        tracing::info!(admin_id, participation_id, approved, points_awarded, "Participation decided");
        Ok(ApprovalOutcome {
            participation_id: participation_id.to_string(),
            account_id,
            approved,
            final_score,
            points_awarded,
            new_balance,
        })
    }

    // ========== Reads ==========

    /// Compare the stored balance with the sum of the account's transactions
    pub async fn verify_balance(&self, account_id: &str) -> MarketResult<BalanceCheck> {
        let mut conn = self.db.acquire().await?;
        let stored = balance_of(&mut conn, account_id).await?;
        let computed: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(amount), 0) FROM point_transactions WHERE account_id = ?1",
        )
        .bind(account_id)
        .fetch_one(&mut *conn)
        .await?;

        if stored != computed {
            tracing::error!(account_id, stored, computed, "Balance does not match ledger");
        }

        Ok(BalanceCheck {
            account_id: account_id.to_string(),
            stored,
            computed,
            consistent: stored == computed,
        })
    }

    pub async fn get_balance(&self, account_id: &str) -> MarketResult<i64> {
        let mut conn = self.db.acquire().await?;
        balance_of(&mut conn, account_id).await
    }

    /// Ledger history, newest first, paged by transaction id
    pub async fn list_transactions(
        &self,
        account_id: &str,
        limit: i64,
        before_id: Option<i64>,
    ) -> MarketResult<Vec<PointTransactionRow>> {
        let rows = sqlx::query_as::<_, PointTransactionRow>(
            r#"
            SELECT id, account_id, kind, amount, balance_after, related_id, description, created_at
            FROM point_transactions
            WHERE account_id = ?1 AND (?2 IS NULL OR id < ?2)
            ORDER BY id DESC
            LIMIT ?3
            "#,
        )
        .bind(account_id)
        .bind(before_id)
        .bind(limit.clamp(1, 100))
        .fetch_all(&self.db)
        .await?;

        Ok(rows)
    }
}
