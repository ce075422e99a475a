/// File storage
///
/// Two logical buckets: listing source files (documents, private, served
/// through short-lived signed tokens) and preview images (public).

pub mod disk;
pub mod naming;
mod store;

pub use store::{load_stored_file, FileContents, FileStore, SignedDownload};

use crate::error::{MarketError, MarketResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Storage backend trait
///
/// Implementations handle the actual storage and retrieval of file data.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Store a file under `key` in `bucket`
    async fn put(&self, bucket: Bucket, key: &str, data: Vec<u8>) -> MarketResult<()>;

    /// Retrieve a file
    async fn get(&self, bucket: Bucket, key: &str) -> MarketResult<Option<Vec<u8>>>;

    /// Delete a file
    async fn delete(&self, bucket: Bucket, key: &str) -> MarketResult<()>;

    /// Check if a file exists
    async fn exists(&self, bucket: Bucket, key: &str) -> MarketResult<bool>;
}

/// Logical storage bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Bucket {
    ListingFiles,
    Previews,
}

const LISTING_FILE_TYPES: &[(&str, &str)] = &[
    ("application/pdf", "pdf"),
    ("application/x-hwp", "hwp"),
    ("application/haansofthwp", "hwp"),
    ("application/vnd.hancom.hwp", "hwp"),
    ("application/msword", "doc"),
    (
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "docx",
    ),
    ("application/vnd.ms-powerpoint", "ppt"),
    (
        "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        "pptx",
    ),
    ("application/zip", "zip"),
    ("application/x-zip-compressed", "zip"),
];

const PREVIEW_TYPES: &[(&str, &str)] = &[
    ("image/jpeg", "jpg"),
    ("image/png", "png"),
    ("image/gif", "gif"),
    ("image/webp", "webp"),
];

impl Bucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            Bucket::ListingFiles => "listing-files",
            Bucket::Previews => "previews",
        }
    }

    fn types(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            Bucket::ListingFiles => LISTING_FILE_TYPES,
            Bucket::Previews => PREVIEW_TYPES,
        }
    }

    /// File extension for an accepted MIME type
    pub fn extension_for(&self, mime_type: &str) -> MarketResult<&'static str> {
        let mime = mime_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_lowercase();

        self.types()
            .iter()
            .find(|(m, _)| *m == mime)
            .map(|(_, ext)| *ext)
            .ok_or_else(|| {
                MarketError::Validation(format!(
                    "File type {} is not accepted for {}",
                    mime_type,
                    self.as_str()
                ))
            })
    }

    /// MIME type to serve for a stored key, from its extension
    pub fn mime_for_key(&self, key: &str) -> &'static str {
        let ext = key.rsplit('.').next().unwrap_or_default();
        self.types()
            .iter()
            .find(|(_, e)| *e == ext)
            .map(|(m, _)| *m)
            .unwrap_or("application/octet-stream")
    }
}

/// Metadata of an uploaded file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredFile {
    pub key: String,
    pub bucket: Bucket,
    pub owner_id: String,
    pub mime_type: String,
    pub size: i64,
    pub sha256: String,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Descriptive fields that name a listing file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingFileMeta {
    pub grade: String,
    pub subject: String,
    pub category: String,
    pub page_count: i64,
}
