/// Listing catalog
///
/// Sellers publish worksheets as listings; buyers search them. Edits are
/// recorded and only announced to purchasers when the seller asks for it.

mod manager;

pub use manager::ListingManager;

use crate::{
    db::models::ListingRow,
    error::{MarketError, MarketResult},
    validation::{self, FieldErrors, DESCRIPTION_MAX, TITLE_MAX},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Columns selected into `ListingRow`
pub const LISTING_COLUMNS: &str = "id, seller_id, title, description, grade, subject, category, price, \
     file_key, file_mime, file_size, preview_key, page_count, sales_count, rating_sum, rating_count, \
     is_active, created_at, updated_at";

/// Maximum length of grade, subject and category labels
pub const LABEL_MAX: usize = 50;

/// Public view of a listing. The storage key of the source file is never exposed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    pub id: String,
    pub seller_id: String,
    pub title: String,
    pub description: String,
    pub grade: String,
    pub subject: String,
    pub category: String,
    pub price: i64,
    pub file_mime: String,
    pub file_size: i64,
    pub preview_key: Option<String>,
    pub page_count: i64,
    pub sales_count: i64,
    pub rating_average: Option<f64>,
    pub rating_count: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ListingRow> for Listing {
    fn from(row: ListingRow) -> Self {
        let rating_average = if row.rating_count > 0 {
            Some(row.rating_sum as f64 / row.rating_count as f64)
        } else {
            None
        };

        Self {
            id: row.id,
            seller_id: row.seller_id,
            title: row.title,
            description: row.description,
            grade: row.grade,
            subject: row.subject,
            category: row.category,
            price: row.price,
            file_mime: row.file_mime,
            file_size: row.file_size,
            preview_key: row.preview_key,
            page_count: row.page_count,
            sales_count: row.sales_count,
            rating_average,
            rating_count: row.rating_count,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// New listing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingDraft {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub grade: String,
    pub subject: String,
    pub category: String,
    pub price: i64,
    /// Key returned by a listing file upload
    pub file_key: String,
    pub preview_key: Option<String>,
    pub page_count: i64,
}

impl ListingDraft {
    pub fn validate(&self, min_price: i64, max_price: i64) -> MarketResult<()> {
        let mut errors = FieldErrors::new();
        check_fields(
            &mut errors,
            &self.title,
            &self.description,
            [&self.grade, &self.subject, &self.category],
            self.page_count,
        );
        validation::check_price(&mut errors, self.price, min_price, max_price);
        errors.into_result()
    }
}

/// Partial edit; absent fields keep their current value
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub grade: Option<String>,
    pub subject: Option<String>,
    pub category: Option<String>,
    pub price: Option<i64>,
    pub file_key: Option<String>,
    pub preview_key: Option<String>,
    /// Drop the current preview; cannot be combined with `preview_key`
    #[serde(default)]
    pub remove_preview: bool,
    pub page_count: Option<i64>,
}

fn check_fields(
    errors: &mut FieldErrors,
    title: &str,
    description: &str,
    labels: [&str; 3],
    page_count: i64,
) {
    validation::check_text(errors, "title", title, TITLE_MAX);
    errors.check(
        description.chars().count() <= DESCRIPTION_MAX,
        "description",
        format!("must be at most {} characters", DESCRIPTION_MAX),
    );
    for (path, value) in ["grade", "subject", "category"].into_iter().zip(labels) {
        validation::check_text(errors, path, value, LABEL_MAX);
    }
    errors.check(page_count >= 1, "pageCount", "must be at least 1");
}

/// Recorded change to a listing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditRecord {
    pub id: i64,
    pub listing_id: String,
    pub editor_id: String,
    pub changes: String,
    pub created_at: DateTime<Utc>,
    pub notified_at: Option<DateTime<Utc>>,
}

/// Result of an edit; `edit` is None when nothing changed
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditOutcome {
    pub listing: Listing,
    pub edit: Option<EditRecord>,
}

/// Result of announcing an edit to purchasers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditNotificationOutcome {
    pub edit_id: i64,
    pub notified: u64,
}

/// Search ordering
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Latest,
    Popular,
    Rating,
    PriceAsc,
    PriceDesc,
}

impl SortOrder {
    fn order_by(&self) -> &'static str {
        match self {
            SortOrder::Latest => "created_at DESC, id",
            SortOrder::Popular => "sales_count DESC, created_at DESC, id",
            SortOrder::Rating => {
                "CASE WHEN rating_count = 0 THEN 0.0 ELSE CAST(rating_sum AS REAL) / rating_count END DESC, \
                 rating_count DESC, id"
            }
            SortOrder::PriceAsc => "price ASC, created_at DESC, id",
            SortOrder::PriceDesc => "price DESC, created_at DESC, id",
        }
    }
}

pub const DEFAULT_PAGE_SIZE: i64 = 12;
pub const MAX_PAGE_SIZE: i64 = 50;

/// Listing search parameters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    pub grade: Option<String>,
    pub subject: Option<String>,
    pub category: Option<String>,
    pub seller_id: Option<String>,
    pub min_price: Option<i64>,
    pub max_price: Option<i64>,
    /// Matched against title and description
    pub q: Option<String>,
    pub sort: Option<SortOrder>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

impl SearchQuery {
    /// Effective (page, page_size)
    pub fn paging(&self) -> MarketResult<(i64, i64)> {
        let page = self.page.unwrap_or(1);
        let page_size = self.page_size.unwrap_or(DEFAULT_PAGE_SIZE);

        if page < 1 {
            return Err(MarketError::Validation("page: must be at least 1".to_string()));
        }
        if !(1..=MAX_PAGE_SIZE).contains(&page_size) {
            return Err(MarketError::Validation(format!(
                "pageSize: must be between 1 and {}",
                MAX_PAGE_SIZE
            )));
        }
        Ok((page, page_size))
    }
}

/// One page of search results
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchPage {
    pub items: Vec<Listing>,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
    pub total_pages: i64,
}

/// Ceiling division; zero results still means zero pages
pub fn total_pages(total: i64, page_size: i64) -> i64 {
    if total <= 0 {
        0
    } else {
        (total + page_size - 1) / page_size
    }
}

/// Purchase record joined with its listing title
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseSummary {
    pub id: String,
    pub listing_id: String,
    pub title: String,
    pub price_paid: i64,
    pub feedback_given: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> ListingDraft {
        ListingDraft {
            title: "Fractions practice".to_string(),
            description: "Twenty problems".to_string(),
            grade: "grade3".to_string(),
            subject: "math".to_string(),
            category: "worksheet".to_string(),
            price: 200,
            file_key: "k.pdf".to_string(),
            preview_key: None,
            page_count: 4,
        }
    }

    #[test]
    fn test_draft_validation() {
        assert!(draft().validate(100, 500).is_ok());

        let mut cheap = draft();
        cheap.price = 99;
        assert!(cheap.validate(100, 500).is_err());

        let mut untitled = draft();
        untitled.title = "   ".to_string();
        assert!(untitled.validate(100, 500).is_err());

        let mut no_pages = draft();
        no_pages.page_count = 0;
        assert!(no_pages.validate(100, 500).is_err());
    }

    #[test]
    fn test_paging() {
        assert_eq!(SearchQuery::default().paging().unwrap(), (1, 12));

        let query = SearchQuery {
            page: Some(0),
            ..Default::default()
        };
        assert!(query.paging().is_err());

        let query = SearchQuery {
            page_size: Some(51),
            ..Default::default()
        };
        assert!(query.paging().is_err());
    }

    #[test]
    fn test_total_pages() {
        assert_eq!(total_pages(0, 12), 0);
        assert_eq!(total_pages(12, 12), 1);
        assert_eq!(total_pages(13, 12), 2);
    }
}
