/// Listing manager
use super::{
    total_pages, EditNotificationOutcome, EditOutcome, EditRecord, Listing, ListingDraft,
    ListingUpdate, PurchaseSummary, SearchPage, SearchQuery, LISTING_COLUMNS,
};
use crate::{
    admin::{roles::role_of, Capability},
    config::PointsPolicy,
    db::models::ListingRow,
    error::{MarketError, MarketResult},
    mailer::Mailer,
    notifications::{self, NewNotification, NotificationKind},
    storage::{load_stored_file, Bucket},
};
use chrono::{DateTime, Utc};
use sqlx::{Row, SqliteConnection, SqlitePool};
use uuid::Uuid;

/// Bound value for a dynamically built search
enum SearchBind {
    Text(String),
    Int(i64),
}

/// Listing manager
#[derive(Clone)]
pub struct ListingManager {
    db: SqlitePool,
    min_price: i64,
    max_price: i64,
    mailer: Mailer,
    public_url: String,
}

/// Fail unless `key` is an uploaded file in `bucket` owned by `owner_id`
async fn ensure_owned_file(
    conn: &mut SqliteConnection,
    key: &str,
    bucket: Bucket,
    owner_id: &str,
) -> MarketResult<(String, i64)> {
    match load_stored_file(conn, key).await? {
        Some(file) if file.bucket == bucket && file.owner_id == owner_id => {
            Ok((file.mime_type, file.size))
        }
        _ => Err(MarketError::Validation(format!(
            "Unknown {} file: {}",
            bucket.as_str(),
            key
        ))),
    }
}

async fn load_listing_row(conn: &mut SqliteConnection, listing_id: &str) -> MarketResult<ListingRow> {
    sqlx::query_as::<_, ListingRow>(&format!(
        "SELECT {} FROM listings WHERE id = ?1",
        LISTING_COLUMNS
    ))
    .bind(listing_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| MarketError::NotFound(format!("Listing {} not found", listing_id)))
}

fn record_change(changes: &mut Vec<String>, field: &str, old: &str, new: &str) {
    if old != new {
        changes.push(format!("{}: {} → {}", field, old, new));
    }
}

impl ListingManager {
    pub fn new(db: SqlitePool, policy: &PointsPolicy, mailer: Mailer, public_url: &str) -> Self {
        Self {
            db,
            min_price: policy.min_price,
            max_price: policy.max_price,
            mailer,
            public_url: public_url.trim_end_matches('/').to_string(),
        }
    }

    /// Publish a new listing
    pub async fn create_listing(&self, seller_id: &str, draft: &ListingDraft) -> MarketResult<Listing> {
        draft.validate(self.min_price, self.max_price)?;

        let mut tx = self.db.begin().await?;
        role_of(&mut tx, seller_id).await?.require(Capability::Sell)?;

        let (file_mime, file_size) =
            ensure_owned_file(&mut tx, &draft.file_key, Bucket::ListingFiles, seller_id).await?;
        if let Some(preview_key) = &draft.preview_key {
            ensure_owned_file(&mut tx, preview_key, Bucket::Previews, seller_id).await?;
        }

        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO listings (id, seller_id, title, description, grade, subject, category, price,
                                  file_key, file_mime, file_size, preview_key, page_count, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?14)
            "#,
        )
        .bind(&id)
        .bind(seller_id)
        .bind(draft.title.trim())
        .bind(draft.description.trim())
        .bind(draft.grade.trim())
        .bind(draft.subject.trim())
        .bind(draft.category.trim())
        .bind(draft.price)
        .bind(&draft.file_key)
        .bind(&file_mime)
        .bind(file_size)
        .bind(&draft.preview_key)
        .bind(draft.page_count)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let listing = Listing::from(load_listing_row(&mut tx, &id).await?);
        tx.commit().await?;

        tracing::info!(listing_id = %id, seller_id, price = draft.price, "Created listing");
        Ok(listing)
    }

    /// Apply an edit by the owner and record what changed.
    ///
    /// Purchasers are not told; see `send_edit_notification`.
    pub async fn edit_listing(
        &self,
        editor_id: &str,
        listing_id: &str,
        update: &ListingUpdate,
    ) -> MarketResult<EditOutcome> {
        let mut tx = self.db.begin().await?;
        let current = load_listing_row(&mut tx, listing_id).await?;

        if current.seller_id != editor_id {
            return Err(MarketError::Forbidden(
                "Only the seller can edit this listing".to_string(),
            ));
        }

        let title = update.title.as_deref().unwrap_or(&current.title).trim().to_string();
        let description = update
            .description
            .as_deref()
            .unwrap_or(&current.description)
            .trim()
            .to_string();
        let grade = update.grade.as_deref().unwrap_or(&current.grade).trim().to_string();
        let subject = update.subject.as_deref().unwrap_or(&current.subject).trim().to_string();
        let category = update.category.as_deref().unwrap_or(&current.category).trim().to_string();
        let price = update.price.unwrap_or(current.price);
        let page_count = update.page_count.unwrap_or(current.page_count);
        let file_key = update.file_key.clone().unwrap_or_else(|| current.file_key.clone());
        let preview_key = match (&update.preview_key, update.remove_preview) {
            (Some(_), true) => {
                return Err(MarketError::Validation(
                    "previewKey and removePreview cannot be combined".to_string(),
                ))
            }
            (_, true) => None,
            (Some(key), false) => Some(key.clone()),
            (None, false) => current.preview_key.clone(),
        };

        ListingDraft {
            title: title.clone(),
            description: description.clone(),
            grade: grade.clone(),
            subject: subject.clone(),
            category: category.clone(),
            price,
            file_key: file_key.clone(),
            preview_key: preview_key.clone(),
            page_count,
        }
        .validate(self.min_price, self.max_price)?;

        let mut changes = Vec::new();
        record_change(&mut changes, "title", &current.title, &title);
        if description != current.description {
            changes.push("description: updated".to_string());
        }
        record_change(&mut changes, "grade", &current.grade, &grade);
        record_change(&mut changes, "subject", &current.subject, &subject);
        record_change(&mut changes, "category", &current.category, &category);
        record_change(&mut changes, "price", &current.price.to_string(), &price.to_string());
        record_change(
            &mut changes,
            "pages",
            &current.page_count.to_string(),
            &page_count.to_string(),
        );

        let (file_mime, file_size) = if file_key != current.file_key {
            changes.push("file: replaced".to_string());
            ensure_owned_file(&mut tx, &file_key, Bucket::ListingFiles, editor_id).await?
        } else {
            (current.file_mime.clone(), current.file_size)
        };
        if preview_key != current.preview_key {
            match &preview_key {
                Some(key) => {
                    ensure_owned_file(&mut tx, key, Bucket::Previews, editor_id).await?;
                    changes.push("preview: replaced".to_string());
                }
                None => changes.push("preview: removed".to_string()),
            }
        }

        if changes.is_empty() {
            let listing = Listing::from(current);
            tx.commit().await?;
            return Ok(EditOutcome { listing, edit: None });
        }

        let now = Utc::now();
        sqlx::query(
            r#"
            UPDATE listings
            SET title = ?1, description = ?2, grade = ?3, subject = ?4, category = ?5, price = ?6,
                file_key = ?7, file_mime = ?8, file_size = ?9, preview_key = ?10, page_count = ?11,
                updated_at = ?12
            WHERE id = ?13
            "#,
        )
        .bind(&title)
        .bind(&description)
        .bind(&grade)
        .bind(&subject)
        .bind(&category)
        .bind(price)
        .bind(&file_key)
        .bind(&file_mime)
        .bind(file_size)
        .bind(&preview_key)
        .bind(page_count)
        .bind(now)
        .bind(listing_id)
        .execute(&mut *tx)
        .await?;

        let changes = changes.join("\n");
        let edit_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO listing_edits (listing_id, editor_id, changes, created_at)
            VALUES (?1, ?2, ?3, ?4)
            RETURNING id
            "#,
        )
        .bind(listing_id)
        .bind(editor_id)
        .bind(&changes)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        let listing = Listing::from(load_listing_row(&mut tx, listing_id).await?);
        tx.commit().await?;

        tracing::info!(listing_id, edit_id, "Recorded listing edit");

        Ok(EditOutcome {
            listing,
            edit: Some(EditRecord {
                id: edit_id,
                listing_id: listing_id.to_string(),
                editor_id: editor_id.to_string(),
                changes,
                created_at: now,
                notified_at: None,
            }),
        })
    }

    /// Announce a recorded edit to every purchaser of the listing, once
    pub async fn send_edit_notification(
        &self,
        account_id: &str,
        listing_id: &str,
        edit_id: i64,
    ) -> MarketResult<EditNotificationOutcome> {
        let mut tx = self.db.begin().await?;

        let row = sqlx::query(
            r#"
            SELECT e.changes, l.seller_id, l.title
            FROM listing_edits e JOIN listings l ON l.id = e.listing_id
            WHERE e.id = ?1 AND e.listing_id = ?2
            "#,
        )
        .bind(edit_id)
        .bind(listing_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| MarketError::NotFound(format!("Edit {} not found", edit_id)))?;

        let seller_id: String = row.try_get("seller_id")?;
        let title: String = row.try_get("title")?;
        let changes: String = row.try_get("changes")?;

        if seller_id != account_id {
            return Err(MarketError::Forbidden(
                "Only the seller can announce edits".to_string(),
            ));
        }

        let marked = sqlx::query(
            "UPDATE listing_edits SET notified_at = ?1 WHERE id = ?2 AND notified_at IS NULL",
        )
        .bind(Utc::now())
        .bind(edit_id)
        .execute(&mut *tx)
        .await?;
        if marked.rows_affected() == 0 {
            return Err(MarketError::AlreadyDone(
                "Edit notification already sent".to_string(),
            ));
        }

        let purchasers = sqlx::query(
            r#"
            SELECT a.id, a.email, a.nickname
            FROM purchases p JOIN accounts a ON a.id = p.buyer_id
            WHERE p.listing_id = ?1
            ORDER BY p.created_at
            "#,
        )
        .bind(listing_id)
        .fetch_all(&mut *tx)
        .await?;

        let mut recipients = Vec::with_capacity(purchasers.len());
        let mut addresses = Vec::with_capacity(purchasers.len());
        for row in purchasers {
            recipients.push(row.try_get::<String, _>("id")?);
            addresses.push((
                row.try_get::<String, _>("email")?,
                row.try_get::<String, _>("nickname")?,
            ));
        }

        let notification_title = format!("Updated: {}", title);
        let notified = notifications::notify_many(
            &mut tx,
            &recipients,
            &NewNotification {
                kind: NotificationKind::ListingEdited,
                title: &notification_title,
                body: &changes,
                related_id: Some(listing_id),
            },
        )
        .await?;

        tx.commit().await?;

        tracing::info!(listing_id, edit_id, notified, "Sent listing edit notification");

        if self.mailer.is_configured() {
            for (email, nickname) in &addresses {
                if let Err(e) = self
                    .mailer
                    .send_listing_edited_email(email, nickname, &title, &changes, &self.public_url)
                    .await
                {
                    tracing::warn!(listing_id, "Failed to email purchaser {}: {}", email, e);
                }
            }
        }

        Ok(EditNotificationOutcome { edit_id, notified })
    }

    /// Edit history of a listing, newest first
    pub async fn list_edits(&self, listing_id: &str) -> MarketResult<Vec<EditRecord>> {
        let mut conn = self.db.acquire().await?;
        load_listing_row(&mut conn, listing_id).await?;

        let rows = sqlx::query(
            r#"
            SELECT id, listing_id, editor_id, changes, created_at, notified_at
            FROM listing_edits WHERE listing_id = ?1
            ORDER BY id DESC
            "#,
        )
        .bind(listing_id)
        .fetch_all(&mut *conn)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(EditRecord {
                    id: row.try_get("id")?,
                    listing_id: row.try_get("listing_id")?,
                    editor_id: row.try_get("editor_id")?,
                    changes: row.try_get("changes")?,
                    created_at: row.try_get("created_at")?,
                    notified_at: row.try_get::<Option<DateTime<Utc>>, _>("notified_at")?,
                })
            })
            .collect()
    }

    pub async fn get_listing(&self, listing_id: &str) -> MarketResult<Listing> {
        let mut conn = self.db.acquire().await?;
        Ok(Listing::from(load_listing_row(&mut conn, listing_id).await?))
    }

    /// Search active listings
    pub async fn search(&self, query: &SearchQuery) -> MarketResult<SearchPage> {
        let (page, page_size) = query.paging()?;

        let mut conditions = vec!["is_active = 1".to_string()];
        let mut binds = Vec::new();

        for (column, value) in [
            ("grade", &query.grade),
            ("subject", &query.subject),
            ("category", &query.category),
            ("seller_id", &query.seller_id),
        ] {
            if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
                conditions.push(format!("{} = ?", column));
                binds.push(SearchBind::Text(value.to_string()));
            }
        }
        if let Some(min) = query.min_price {
            conditions.push("price >= ?".to_string());
            binds.push(SearchBind::Int(min));
        }
        if let Some(max) = query.max_price {
            conditions.push("price <= ?".to_string());
            binds.push(SearchBind::Int(max));
        }
        if let Some(text) = query.q.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            conditions.push("(title LIKE ? OR description LIKE ?)".to_string());
            let pattern = format!("%{}%", text);
            binds.push(SearchBind::Text(pattern.clone()));
            binds.push(SearchBind::Text(pattern));
        }

        let where_clause = conditions.join(" AND ");

        let count_sql = format!("SELECT COUNT(*) FROM listings WHERE {}", where_clause);
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
        for bind in &binds {
            count_query = match bind {
                SearchBind::Text(s) => count_query.bind(s.clone()),
                SearchBind::Int(n) => count_query.bind(*n),
            };
        }
        let total = count_query.fetch_one(&self.db).await?;

        let sql = format!(
            "SELECT {} FROM listings WHERE {} ORDER BY {} LIMIT ? OFFSET ?",
            LISTING_COLUMNS,
            where_clause,
            query.sort.unwrap_or_default().order_by()
        );
        let mut items_query = sqlx::query_as::<_, ListingRow>(&sql);
        for bind in &binds {
            items_query = match bind {
                SearchBind::Text(s) => items_query.bind(s.clone()),
                SearchBind::Int(n) => items_query.bind(*n),
            };
        }
        let rows = items_query
            .bind(page_size)
            .bind((page - 1) * page_size)
            .fetch_all(&self.db)
            .await?;

        Ok(SearchPage {
            items: rows.into_iter().map(Listing::from).collect(),
            total,
            page,
            page_size,
            total_pages: total_pages(total, page_size),
        })
    }

    /// Purchases of an account, newest first
    pub async fn list_purchases(&self, account_id: &str) -> MarketResult<Vec<PurchaseSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT p.id, p.listing_id, l.title, p.price_paid, p.feedback_given, p.created_at
            FROM purchases p JOIN listings l ON l.id = p.listing_id
            WHERE p.buyer_id = ?1
            ORDER BY p.created_at DESC, p.id
            "#,
        )
        .bind(account_id)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(PurchaseSummary {
                    id: row.try_get("id")?,
                    listing_id: row.try_get("listing_id")?,
                    title: row.try_get("title")?,
                    price_paid: row.try_get("price_paid")?,
                    feedback_given: row.try_get("feedback_given")?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect()
    }

    /// Ids of every listing the account has bought
    pub async fn owned_listing_ids(&self, account_id: &str) -> MarketResult<Vec<String>> {
        let ids = sqlx::query_scalar("SELECT listing_id FROM purchases WHERE buyer_id = ?1")
            .bind(account_id)
            .fetch_all(&self.db)
            .await?;

        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{catalog::SortOrder, db};

    async fn setup() -> (SqlitePool, ListingManager) {
        let pool = db::connect_in_memory().await.unwrap();
        for (id, role) in [("kim", "teacher"), ("choi", "teacher"), ("lee", "parent"), ("park", "parent")] {
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
        for (key, owner, bucket, mime) in [
            ("kim1.pdf", "kim", "listing-files", "application/pdf"),
            ("kim2.pdf", "kim", "listing-files", "application/pdf"),
            ("choi1.pdf", "choi", "listing-files", "application/pdf"),
            ("kim1.png", "kim", "previews", "image/png"),
        ] {
            sqlx::query(
                "INSERT INTO stored_files (key, bucket, owner_id, mime_type, size, sha256, created_at)
                 VALUES (?1, ?3, ?2, ?4, 1024, 'abc', ?5)",
            )
            .bind(key)
            .bind(owner)
            .bind(bucket)
            .bind(mime)
            .bind(Utc::now())
            .execute(&pool)
            .await
            .unwrap();
        }

        let manager = ListingManager::new(
            pool.clone(),
            &PointsPolicy::default(),
            Mailer::new(None).unwrap(),
            "http://localhost:8080",
        );
        (pool, manager)
    }

    fn draft(title: &str, price: i64, file_key: &str) -> ListingDraft {
        ListingDraft {
            title: title.to_string(),
            description: "Practice problems".to_string(),
            grade: "grade3".to_string(),
            subject: "math".to_string(),
            category: "worksheet".to_string(),
            price,
            file_key: file_key.to_string(),
            preview_key: None,
            page_count: 4,
        }
    }

    async fn purchase(pool: &SqlitePool, buyer: &str, listing_id: &str) {
        sqlx::query(
            "INSERT INTO purchases (id, buyer_id, listing_id, price_paid, created_at) VALUES (?1, ?2, ?3, 200, ?4)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(buyer)
        .bind(listing_id)
        .bind(Utc::now())
        .execute(pool)
        .await
        .unwrap();
    }

    async fn notification_count(pool: &SqlitePool) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM notifications")
            .fetch_one(pool)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_listing_rules() {
        let (_pool, manager) = setup().await;

        let listing = manager
            .create_listing("kim", &draft("Fractions", 200, "kim1.pdf"))
            .await
            .unwrap();
        assert_eq!(listing.price, 200);
        assert_eq!(listing.file_mime, "application/pdf");
        assert_eq!(listing.rating_average, None);

        for price in [99, 501] {
            assert!(matches!(
                manager.create_listing("kim", &draft("Cheap", price, "kim2.pdf")).await,
                Err(MarketError::Validation(_))
            ));
        }
        assert!(matches!(
            manager.create_listing("lee", &draft("Parent", 200, "kim2.pdf")).await,
            Err(MarketError::Forbidden(_))
        ));
        // Another seller's upload
        assert!(matches!(
            manager.create_listing("kim", &draft("Borrowed", 200, "choi1.pdf")).await,
            Err(MarketError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_price_edit_is_recorded_without_notifying() {
        let (pool, manager) = setup().await;
        let listing = manager
            .create_listing("kim", &draft("Fractions", 200, "kim1.pdf"))
            .await
            .unwrap();
        purchase(&pool, "lee", &listing.id).await;
        purchase(&pool, "park", &listing.id).await;

        let outcome = manager
            .edit_listing(
                "kim",
                &listing.id,
                &ListingUpdate {
                    price: Some(300),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let edit = outcome.edit.unwrap();
        assert!(edit.changes.contains("200"));
        assert!(edit.changes.contains("300"));
        assert_eq!(outcome.listing.price, 300);
        assert_eq!(notification_count(&pool).await, 0);

        let sent = manager
            .send_edit_notification("kim", &listing.id, edit.id)
            .await
            .unwrap();
        assert_eq!(sent.notified, 2);
        assert_eq!(notification_count(&pool).await, 2);

        assert!(matches!(
            manager.send_edit_notification("kim", &listing.id, edit.id).await,
            Err(MarketError::AlreadyDone(_))
        ));
        assert_eq!(notification_count(&pool).await, 2);

        let edits = manager.list_edits(&listing.id).await.unwrap();
        assert_eq!(edits.len(), 1);
        assert!(edits[0].notified_at.is_some());
    }

    #[tokio::test]
    async fn test_edit_rules() {
        let (_pool, manager) = setup().await;
        let listing = manager
            .create_listing("kim", &draft("Fractions", 200, "kim1.pdf"))
            .await
            .unwrap();

        let price = ListingUpdate {
            price: Some(300),
            ..Default::default()
        };
        assert!(matches!(
            manager.edit_listing("choi", &listing.id, &price).await,
            Err(MarketError::Forbidden(_))
        ));

        let too_high = ListingUpdate {
            price: Some(600),
            ..Default::default()
        };
        assert!(matches!(
            manager.edit_listing("kim", &listing.id, &too_high).await,
            Err(MarketError::Validation(_))
        ));

        // No-op edits leave no record
        let same = ListingUpdate {
            title: Some("Fractions".to_string()),
            ..Default::default()
        };
        assert!(manager.edit_listing("kim", &listing.id, &same).await.unwrap().edit.is_none());

        let replaced = ListingUpdate {
            file_key: Some("kim2.pdf".to_string()),
            ..Default::default()
        };
        let edit = manager
            .edit_listing("kim", &listing.id, &replaced)
            .await
            .unwrap()
            .edit
            .unwrap();
        assert_eq!(edit.changes, "file: replaced");

        // Only the owner announces
        assert!(matches!(
            manager.send_edit_notification("choi", &listing.id, edit.id).await,
            Err(MarketError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_preview_can_be_removed() {
        let (_pool, manager) = setup().await;
        let mut with_preview = draft("Fractions", 200, "kim1.pdf");
        with_preview.preview_key = Some("kim1.png".to_string());
        let listing = manager.create_listing("kim", &with_preview).await.unwrap();
        assert_eq!(listing.preview_key.as_deref(), Some("kim1.png"));

        // Untouched by edits that leave it out
        let retitled = manager
            .edit_listing(
                "kim",
                &listing.id,
                &ListingUpdate {
                    title: Some("Fractions II".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(retitled.listing.preview_key.as_deref(), Some("kim1.png"));

        let conflicting = ListingUpdate {
            preview_key: Some("kim1.png".to_string()),
            remove_preview: true,
            ..Default::default()
        };
        assert!(matches!(
            manager.edit_listing("kim", &listing.id, &conflicting).await,
            Err(MarketError::Validation(_))
        ));

        let removed = manager
            .edit_listing(
                "kim",
                &listing.id,
                &ListingUpdate {
                    remove_preview: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(removed.listing.preview_key, None);
        assert_eq!(removed.edit.unwrap().changes, "preview: removed");
    }

    #[tokio::test]
    async fn test_search_filters_sort_and_paging() {
        let (pool, manager) = setup().await;
        let mut ids = Vec::new();
        for (title, price) in [("Fractions", 200), ("Decimals", 150), ("Geometry", 400)] {
            let listing = manager
                .create_listing("kim", &draft(title, price, "kim1.pdf"))
                .await
                .unwrap();
            ids.push(listing.id);
        }
        sqlx::query("UPDATE listings SET subject = 'science' WHERE id = ?1")
            .bind(&ids[2])
            .execute(&pool)
            .await
            .unwrap();

        let cheapest_first = manager
            .search(&SearchQuery {
                sort: Some(SortOrder::PriceAsc),
                ..Default::default()
            })
            .await
            .unwrap();
        let prices: Vec<i64> = cheapest_first.items.iter().map(|l| l.price).collect();
        assert_eq!(prices, vec![150, 200, 400]);
        assert_eq!(cheapest_first.total_pages, 1);

        let math = manager
            .search(&SearchQuery {
                subject: Some("math".to_string()),
                max_price: Some(180),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(math.total, 1);
        assert_eq!(math.items[0].title, "Decimals");

        let text = manager
            .search(&SearchQuery {
                q: Some("geo".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(text.total, 1);

        let paged = manager
            .search(&SearchQuery {
                page: Some(2),
                page_size: Some(2),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(paged.total, 3);
        assert_eq!(paged.total_pages, 2);
        assert_eq!(paged.items.len(), 1);

        sqlx::query("UPDATE listings SET is_active = 0 WHERE id = ?1")
            .bind(&ids[0])
            .execute(&pool)
            .await
            .unwrap();
        assert_eq!(manager.search(&SearchQuery::default()).await.unwrap().total, 2);
    }

    #[tokio::test]
    async fn test_purchases_listing() {
        let (pool, manager) = setup().await;
        let listing = manager
            .create_listing("kim", &draft("Fractions", 200, "kim1.pdf"))
            .await
            .unwrap();
        purchase(&pool, "lee", &listing.id).await;

        let purchases = manager.list_purchases("lee").await.unwrap();
        assert_eq!(purchases.len(), 1);
        assert_eq!(purchases[0].title, "Fractions");
        assert!(!purchases[0].feedback_given);
        assert_eq!(manager.owned_listing_ids("lee").await.unwrap(), vec![listing.id]);
        assert!(manager.owned_listing_ids("park").await.unwrap().is_empty());
    }
}
