/// Server-side cart
///
/// Lines are (account, listing) pairs. Adding a line re-checks ownership and
/// duplicates authoritatively; clients treat these rejections as final.
use crate::{
    catalog::{Listing, LISTING_COLUMNS},
    db::models::ListingRow,
    error::{is_unique_violation, MarketError, MarketResult},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};

/// Cart line with its resolved listing (None when the listing is gone or inactive)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub listing_id: String,
    pub listing: Option<Listing>,
    pub added_at: DateTime<Utc>,
}

/// Add-to-cart request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddLineRequest {
    pub listing_id: String,
}

/// Cart manager
#[derive(Clone)]
pub struct CartManager {
    db: SqlitePool,
}

impl CartManager {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Add a listing to the cart
    pub async fn add_line(&self, account_id: &str, listing_id: &str) -> MarketResult<()> {
        let row = sqlx::query("SELECT seller_id, is_active FROM listings WHERE id = ?1")
            .bind(listing_id)
            .fetch_optional(&self.db)
            .await?;

        let seller_id: String = match row {
            Some(row) if row.try_get::<bool, _>("is_active")? => row.try_get("seller_id")?,
            _ => return Err(MarketError::NotFound(format!("Listing {} not found", listing_id))),
        };

        if seller_id == account_id {
            return Err(MarketError::SelfPurchase);
        }

        let owned: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM purchases WHERE buyer_id = ?1 AND listing_id = ?2")
                .bind(account_id)
                .bind(listing_id)
                .fetch_optional(&self.db)
                .await?;
        if owned.is_some() {
            return Err(MarketError::AlreadyOwned);
        }

        sqlx::query("INSERT INTO cart_items (account_id, listing_id, created_at) VALUES (?1, ?2, ?3)")
            .bind(account_id)
            .bind(listing_id)
            .bind(Utc::now())
            .execute(&self.db)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    MarketError::DuplicateLine
                } else {
                    MarketError::Database(e)
                }
            })?;

        tracing::debug!(account_id, listing_id, "Cart line added");
        Ok(())
    }

    /// Remove a line; removing an absent line is not an error
    pub async fn remove_line(&self, account_id: &str, listing_id: &str) -> MarketResult<()> {
        sqlx::query("DELETE FROM cart_items WHERE account_id = ?1 AND listing_id = ?2")
            .bind(account_id)
            .bind(listing_id)
            .execute(&self.db)
            .await?;

        Ok(())
    }

    pub async fn clear(&self, account_id: &str) -> MarketResult<u64> {
        let result = sqlx::query("DELETE FROM cart_items WHERE account_id = ?1")
            .bind(account_id)
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected())
    }

    /// Lines in the order they were added
    pub async fn list_lines(&self, account_id: &str) -> MarketResult<Vec<CartLine>> {
        let rows = sqlx::query(
            "SELECT listing_id, created_at FROM cart_items WHERE account_id = ?1 ORDER BY id",
        )
        .bind(account_id)
        .fetch_all(&self.db)
        .await?;

        let mut lines = Vec::with_capacity(rows.len());
        for row in rows {
            let listing_id: String = row.try_get("listing_id")?;
            let listing = sqlx::query_as::<_, ListingRow>(&format!(
                "SELECT {} FROM listings WHERE id = ?1 AND is_active = 1",
                LISTING_COLUMNS
            ))
            .bind(&listing_id)
            .fetch_optional(&self.db)
            .await?
            .map(Listing::from);

            lines.push(CartLine {
                listing_id,
                listing,
                added_at: row.try_get("created_at")?,
            });
        }

        Ok(lines)
    }
}
