/// Notification fan-out
///
/// Read-side only. Notifications never touch balances; ledger and listing
/// operations write them inside their own transactions.
use crate::{
    db::models::NotificationRow,
    error::{MarketError, MarketResult},
    metrics,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};

/// Kind of notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    ListingEdited,
    EventAvailable,
    ParticipationDecided,
    FeedbackReceived,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::ListingEdited => "listing_edited",
            NotificationKind::EventAvailable => "event_available",
            NotificationKind::ParticipationDecided => "participation_decided",
            NotificationKind::FeedbackReceived => "feedback_received",
        }
    }
}

/// Notification content, addressed later to one or more accounts
#[derive(Debug, Clone)]
pub struct NewNotification<'a> {
    pub kind: NotificationKind,
    pub title: &'a str,
    pub body: &'a str,
    pub related_id: Option<&'a str>,
}

/// Write one notification through the caller's connection or transaction
pub async fn notify(
    conn: &mut SqliteConnection,
    account_id: &str,
    notification: &NewNotification<'_>,
) -> MarketResult<()> {
    sqlx::query(
        "INSERT INTO notifications (account_id, kind, title, body, related_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )
    .bind(account_id)
    .bind(notification.kind.as_str())
    .bind(notification.title)
    .bind(notification.body)
    .bind(notification.related_id)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;

    metrics::record_notifications(1);
    Ok(())
}

/// Write the same notification for many accounts. Returns how many were written.
pub async fn notify_many(
    conn: &mut SqliteConnection,
    account_ids: &[String],
    notification: &NewNotification<'_>,
) -> MarketResult<u64> {
    let now = Utc::now();
    let mut written = 0;

    for account_id in account_ids {
        sqlx::query(
            "INSERT INTO notifications (account_id, kind, title, body, related_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(account_id)
        .bind(notification.kind.as_str())
        .bind(notification.title)
        .bind(notification.body)
        .bind(notification.related_id)
        .bind(now)
        .execute(&mut *conn)
        .await?;
        written += 1;
    }

    metrics::record_notifications(written);
    Ok(written)
}

/// Notification manager
#[derive(Clone)]
pub struct NotificationManager {
    db: SqlitePool,
}

impl NotificationManager {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// List an account's notifications, newest first
    pub async fn list(
        &self,
        account_id: &str,
        unread_only: bool,
        limit: i64,
    ) -> MarketResult<Vec<NotificationRow>> {
        let rows = sqlx::query_as::<_, NotificationRow>(
            r#"
            SELECT id, account_id, kind, title, body, related_id, read_at, created_at
            FROM notifications
            WHERE account_id = ?1 AND (?2 = 0 OR read_at IS NULL)
            ORDER BY id DESC
            LIMIT ?3
            "#,
        )
        .bind(account_id)
        .bind(unread_only)
        .bind(limit.clamp(1, 100))
        .fetch_all(&self.db)
        .await?;

        Ok(rows)
    }

    pub async fn unread_count(&self, account_id: &str) -> MarketResult<i64> {
        let count = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications WHERE account_id = ?1 AND read_at IS NULL",
        )
        .bind(account_id)
        .fetch_one(&self.db)
        .await?;

        Ok(count)
    }

    /// Mark one of the account's own notifications as read
    pub async fn mark_read(&self, account_id: &str, notification_id: i64) -> MarketResult<()> {
        let owner: Option<String> =
            sqlx::query_scalar("SELECT account_id FROM notifications WHERE id = ?1")
                .bind(notification_id)
                .fetch_optional(&self.db)
                .await?;

        match owner {
            None => Err(MarketError::NotFound("Notification not found".to_string())),
            Some(owner) if owner != account_id => Err(MarketError::Forbidden(
                "Notification belongs to another account".to_string(),
            )),
            Some(_) => {
                sqlx::query(
                    "UPDATE notifications SET read_at = ?1 WHERE id = ?2 AND read_at IS NULL",
                )
                .bind(Utc::now())
                .bind(notification_id)
                .execute(&self.db)
                .await?;
                Ok(())
            }
        }
    }

    /// Mark every unread notification as read. Returns how many changed.
    pub async fn mark_all_read(&self, account_id: &str) -> MarketResult<u64> {
        let result = sqlx::query(
            "UPDATE notifications SET read_at = ?1 WHERE account_id = ?2 AND read_at IS NULL",
        )
        .bind(Utc::now())
        .bind(account_id)
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    async fn setup() -> (SqlitePool, NotificationManager) {
        let pool = db::connect_in_memory().await.unwrap();
        for id in ["alice", "bob"] {
            sqlx::query(
                "INSERT INTO accounts (id, email, nickname, password_hash, role, points, created_at)
                 VALUES (?1, ?2, ?1, 'x', 'parent', 0, ?3)",
            )
            .bind(id)
            .bind(format!("{}@example.com", id))
            .bind(Utc::now())
            .execute(&pool)
            .await
            .unwrap();
        }
        let manager = NotificationManager::new(pool.clone());
        (pool, manager)
    }

    fn edited() -> NewNotification<'static> {
        NewNotification {
            kind: NotificationKind::ListingEdited,
            title: "Listing updated",
            body: "price: 200 → 300",
            related_id: Some("listing-1"),
        }
    }

    #[tokio::test]
    async fn test_notify_many_and_read() {
        let (pool, manager) = setup().await;

        let mut conn = pool.acquire().await.unwrap();
        let written = notify_many(
            &mut conn,
            &["alice".to_string(), "bob".to_string()],
            &edited(),
        )
        .await
        .unwrap();
        drop(conn);
        assert_eq!(written, 2);

        assert_eq!(manager.unread_count("alice").await.unwrap(), 1);
        let list = manager.list("alice", true, 20).await.unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].kind, "listing_edited");

        manager.mark_read("alice", list[0].id).await.unwrap();
        assert_eq!(manager.unread_count("alice").await.unwrap(), 0);
        assert_eq!(manager.list("alice", false, 20).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_mark_read_rejects_other_accounts() {
        let (pool, manager) = setup().await;

        let mut conn = pool.acquire().await.unwrap();
        notify(&mut conn, "alice", &edited()).await.unwrap();
        drop(conn);

        let id = manager.list("alice", false, 10).await.unwrap()[0].id;
        let result = manager.mark_read("bob", id).await;
        assert!(matches!(result, Err(MarketError::Forbidden(_))));

        assert_eq!(manager.mark_all_read("alice").await.unwrap(), 1);
        assert_eq!(manager.mark_all_read("alice").await.unwrap(), 0);
    }
}
