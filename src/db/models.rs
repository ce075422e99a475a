/// Database row models
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Account record in the database
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AccountRow {
    pub id: String,
    pub email: String,
    pub nickname: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: String,
    pub points: i64,
    pub created_at: DateTime<Utc>,
}

/// Session record in the database
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SessionRow {
    pub id: String,
    pub account_id: String,
    pub access_token: String,
    pub refresh_token: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
}

/// Listing record in the database
#[derive(Debug, Clone, FromRow)]
pub struct ListingRow {
    pub id: String,
    pub seller_id: String,
    pub title: String,
    pub description: String,
    pub grade: String,
    pub subject: String,
    pub category: String,
    pub price: i64,
    pub file_key: String,
    pub file_mime: String,
    pub file_size: i64,
    pub preview_key: Option<String>,
    pub page_count: i64,
    pub sales_count: i64,
    pub rating_sum: i64,
    pub rating_count: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Purchase record
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseRow {
    pub id: String,
    pub buyer_id: String,
    pub listing_id: String,
    pub price_paid: i64,
    pub feedback_given: bool,
    pub created_at: DateTime<Utc>,
}

/// Point transaction (append-only)
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointTransactionRow {
    pub id: i64,
    pub account_id: String,
    pub kind: String,
    pub amount: i64,
    pub balance_after: i64,
    pub related_id: Option<String>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Event record
#[derive(Debug, Clone, FromRow)]
pub struct EventRow {
    pub id: String,
    pub kind: String,
    pub title: String,
    pub description: String,
    pub status: String,
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
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Event participation record
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipationRow {
    pub id: String,
    pub event_id: String,
    pub account_id: String,
    pub status: String,
    pub answers: Option<String>,
    pub comment: Option<String>,
    pub correct_count: Option<i64>,
    pub ai_score: Option<i64>,
    pub final_score: Option<i64>,
    pub points_awarded: i64,
    pub position: Option<i64>,
    pub decided_by: Option<String>,
    pub decided_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Daily attendance record
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRow {
    pub id: i64,
    pub account_id: String,
    pub attended_on: NaiveDate,
    pub streak: i64,
    pub base_points: i64,
    pub bonus_points: i64,
    pub created_at: DateTime<Utc>,
}

/// Notification record
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRow {
    pub id: i64,
    pub account_id: String,
    pub kind: String,
    pub title: String,
    pub body: String,
    pub related_id: Option<String>,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
