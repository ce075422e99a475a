/// Points ledger
///
/// Every balance change in the system goes through [`apply_points`], which
/// applies a signed amount with a non-negative guard and appends the matching
/// point transaction with the resulting balance. The [`LedgerManager`] runs
/// each ledger operation as one SQLite transaction.

mod manager;
pub mod policy;

pub use manager::LedgerManager;
pub use policy::{Clock, FixedClock, FixedPrizePicker, PrizePicker, RandomPrizePicker, SystemClock};

use crate::{
    error::{MarketError, MarketResult},
    metrics,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;

/// Kind of a point transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    SignupBonus,
    Purchase,
    FeedbackRefund,
    Attendance,
    Roulette,
    EventReward,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::SignupBonus => "signup_bonus",
            TransactionKind::Purchase => "purchase",
            TransactionKind::FeedbackRefund => "feedback_refund",
            TransactionKind::Attendance => "attendance",
            TransactionKind::Roulette => "roulette",
            TransactionKind::EventReward => "event_reward",
        }
    }
}

/// Apply a signed amount to an account and append the point transaction.
///
/// Returns the new balance. A debit that would take the balance below zero
/// fails with `InsufficientBalance` and changes nothing.
pub async fn apply_points(
    conn: &mut SqliteConnection,
    account_id: &str,
    amount: i64,
    kind: TransactionKind,
    related_id: Option<&str>,
    description: Option<&str>,
) -> MarketResult<i64> {
    let new_balance: Option<i64> = sqlx::query_scalar(
        "UPDATE accounts SET points = points + ?1
         WHERE id = ?2 AND points + ?1 >= 0
         RETURNING points",
    )
    .bind(amount)
    .bind(account_id)
    .fetch_optional(&mut *conn)
    .await?;

    let new_balance = match new_balance {
        Some(balance) => balance,
        None => {
            let available: Option<i64> =
                sqlx::query_scalar("SELECT points FROM accounts WHERE id = ?1")
                    .bind(account_id)
                    .fetch_optional(&mut *conn)
                    .await?;

            return Err(match available {
                Some(available) => MarketError::InsufficientBalance {
                    required: -amount,
                    available,
                },
                None => MarketError::NotFound(format!("Account {} not found", account_id)),
            });
        }
    };

    sqlx::query(
        "INSERT INTO point_transactions (account_id, kind, amount, balance_after, related_id, description, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )
    .bind(account_id)
    .bind(kind.as_str())
    .bind(amount)
    .bind(new_balance)
    .bind(related_id)
    .bind(description)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;

    metrics::record_points(kind.as_str(), amount);
    tracing::debug!(account_id, amount, kind = kind.as_str(), new_balance, "Points applied");

    Ok(new_balance)
}

/// Current balance read through the caller's connection
pub async fn balance_of(conn: &mut SqliteConnection, account_id: &str) -> MarketResult<i64> {
    sqlx::query_scalar("SELECT points FROM accounts WHERE id = ?1")
        .bind(account_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| MarketError::NotFound(format!("Account {} not found", account_id)))
}

/// Checkout request body
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub listing_ids: Vec<String>,
}

/// Feedback request body
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackRequest {
    pub purchase_id: String,
    pub rating: i64,
    pub comment: String,
}

/// Quiz answers, in question order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizAnswersRequest {
    pub answers: Vec<String>,
}

/// First-come request body
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FirstComeRequest {
    pub comment: Option<String>,
}

/// Comment event request body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentRequest {
    pub comment: String,
}

/// Admin decision on a pending participation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalRequest {
    pub approved: bool,
    pub adjusted_score: Option<i64>,
}

/// Result of a successful checkout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutOutcome {
    pub new_balance: i64,
    pub purchase_ids: Vec<String>,
    pub total: i64,
}

/// Result of a feedback submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackOutcome {
    pub refund: i64,
    pub new_balance: i64,
}

/// Result of a daily check-in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceOutcome {
    pub streak: i64,
    pub base_points: i64,
    pub bonus_points: i64,
    pub new_balance: i64,
}

/// Result of a daily roulette spin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouletteOutcome {
    pub prize_index: usize,
    pub prize: i64,
    /// Full prize table so the wheel can be drawn around the decided slot
    pub prizes: Vec<i64>,
    pub new_balance: i64,
}

/// Result of a quiz submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizOutcome {
    pub participation_id: String,
    pub correct_count: i64,
    pub total_questions: i64,
    pub points_awarded: i64,
    pub new_balance: i64,
}

/// Result of a first-come admission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirstComeOutcome {
    pub participation_id: String,
    pub position: i64,
    pub points_awarded: i64,
    pub new_balance: i64,
}

/// Result of a comment submission (awaiting review)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentOutcome {
    pub participation_id: String,
    pub ai_score: Option<i64>,
    pub status: String,
}

/// Result of an approval decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalOutcome {
    pub participation_id: String,
    pub account_id: String,
    pub approved: bool,
    pub final_score: Option<i64>,
    pub points_awarded: i64,
    /// Participant's balance after the payout, if any
    pub new_balance: Option<i64>,
}

/// Today's reward state for an account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyStatus {
    pub checked_in_today: bool,
    pub current_streak: i64,
    pub spun_today: bool,
}

/// Stored balance compared with the ledger sum
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceCheck {
    pub account_id: String,
    pub stored: i64,
    pub computed: i64,
    pub consistent: bool,
}
