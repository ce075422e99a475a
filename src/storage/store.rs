/// File store manager
///
/// Coordinates the storage backend with `stored_files` metadata and issues
/// short-lived signed download tokens for listing files.
use crate::{
    admin::{roles::role_of, Capability},
    config::StorageConfig,
    error::{MarketError, MarketResult},
    metrics,
    storage::{naming, Bucket, ListingFileMeta, StorageBackend, StoredFile},
};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::{Row, SqliteConnection, SqlitePool};
use std::sync::Arc;

const DOWNLOAD_TOKEN_TYPE: &str = "download";

/// Signed download claims
#[derive(Debug, Serialize, Deserialize)]
struct DownloadClaims {
    sub: String,
    key: String,
    lid: String,
    typ: String,
    exp: i64,
}

/// Signed, expiring download link for a listing file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedDownload {
    pub url: String,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Resolved file contents
#[derive(Debug, Clone)]
pub struct FileContents {
    pub key: String,
    pub mime_type: String,
    pub data: Vec<u8>,
}

/// Metadata row for a key, read through an open connection or transaction
pub async fn load_stored_file(
    conn: &mut SqliteConnection,
    key: &str,
) -> MarketResult<Option<StoredFile>> {
    let row = sqlx::query(
        r#"
        SELECT key, bucket, owner_id, mime_type, size, sha256, width, height, created_at
        FROM stored_files WHERE key = ?1
        "#,
    )
    .bind(key)
    .fetch_optional(&mut *conn)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let bucket = match row.try_get::<String, _>("bucket")?.as_str() {
        "listing-files" => Bucket::ListingFiles,
        _ => Bucket::Previews,
    };

    Ok(Some(StoredFile {
        key: row.try_get("key")?,
        bucket,
        owner_id: row.try_get("owner_id")?,
        mime_type: row.try_get("mime_type")?,
        size: row.try_get("size")?,
        sha256: row.try_get("sha256")?,
        width: row.try_get("width")?,
        height: row.try_get("height")?,
        created_at: row.try_get("created_at")?,
    }))
}

/// File store
#[derive(Clone)]
pub struct FileStore {
    backend: Arc<dyn StorageBackend>,
    db: SqlitePool,
    max_listing_file_size: usize,
    max_preview_size: usize,
    signing_secret: String,
    signed_url_ttl: Duration,
    public_url: String,
}

impl FileStore {
    pub fn new(
        backend: Arc<dyn StorageBackend>,
        db: SqlitePool,
        storage: &StorageConfig,
        signing_secret: &str,
        public_url: &str,
    ) -> Self {
        Self {
            backend,
            db,
            max_listing_file_size: storage.max_listing_file_size,
            max_preview_size: storage.max_preview_size,
            signing_secret: signing_secret.to_string(),
            signed_url_ttl: Duration::seconds(storage.signed_url_ttl),
            public_url: public_url.trim_end_matches('/').to_string(),
        }
    }

    fn check_size(&self, bucket: Bucket, size: usize) -> MarketResult<()> {
        let limit = match bucket {
            Bucket::ListingFiles => self.max_listing_file_size,
            Bucket::Previews => self.max_preview_size,
        };

        if size == 0 {
            return Err(MarketError::Validation("File is empty".to_string()));
        }
        if size > limit {
            return Err(MarketError::Validation(format!(
                "File too large: {} bytes (max {} bytes)",
                size, limit
            )));
        }
        Ok(())
    }

    /// Upload a listing source file. Only accounts that may sell can upload.
    pub async fn upload_listing_file(
        &self,
        owner_id: &str,
        meta: &ListingFileMeta,
        mime_type: &str,
        data: Vec<u8>,
    ) -> MarketResult<StoredFile> {
        {
            let mut conn = self.db.acquire().await?;
            role_of(&mut conn, owner_id).await?.require(Capability::Sell)?;
        }

        self.check_size(Bucket::ListingFiles, data.len())?;
        let extension = Bucket::ListingFiles.extension_for(mime_type)?;
        if meta.page_count < 1 {
            return Err(MarketError::Validation("pageCount must be at least 1".to_string()));
        }

        let key = naming::listing_file_key(
            &meta.grade,
            &meta.subject,
            &meta.category,
            meta.page_count,
            owner_id,
            Utc::now().timestamp_millis(),
            extension,
        );

        self.store(Bucket::ListingFiles, key, owner_id, mime_type, data, None)
            .await
    }

    /// Upload a preview image. The bytes must decode as an image.
    pub async fn upload_preview(
        &self,
        owner_id: &str,
        mime_type: &str,
        data: Vec<u8>,
    ) -> MarketResult<StoredFile> {
        self.check_size(Bucket::Previews, data.len())?;
        let extension = Bucket::Previews.extension_for(mime_type)?;

        let image = image::load_from_memory(&data)
            .map_err(|e| MarketError::Validation(format!("Preview is not a valid image: {}", e)))?;
        let dimensions = (image.width() as i64, image.height() as i64);

        let key = naming::preview_key(
            owner_id,
            Utc::now().timestamp_millis(),
            rand::random::<u32>(),
            extension,
        );

        self.store(Bucket::Previews, key, owner_id, mime_type, data, Some(dimensions))
            .await
    }

    async fn store(
        &self,
        bucket: Bucket,
        key: String,
        owner_id: &str,
        mime_type: &str,
        data: Vec<u8>,
        dimensions: Option<(i64, i64)>,
    ) -> MarketResult<StoredFile> {
        let sha256 = hex::encode(Sha256::digest(&data));
        let size = data.len() as i64;

        self.backend.put(bucket, &key, data).await?;

        let file = StoredFile {
            key,
            bucket,
            owner_id: owner_id.to_string(),
            mime_type: mime_type.to_string(),
            size,
            sha256,
            width: dimensions.map(|(w, _)| w),
            height: dimensions.map(|(_, h)| h),
            created_at: Utc::now(),
        };

        let inserted = sqlx::query(
            r#"
            INSERT INTO stored_files (key, bucket, owner_id, mime_type, size, sha256, width, height, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&file.key)
        .bind(bucket.as_str())
        .bind(&file.owner_id)
        .bind(&file.mime_type)
        .bind(file.size)
        .bind(&file.sha256)
        .bind(file.width)
        .bind(file.height)
        .bind(file.created_at)
        .execute(&self.db)
        .await;

        if let Err(e) = inserted {
            // Don't leave an orphaned object behind
            if let Err(cleanup) = self.backend.delete(bucket, &file.key).await {
                tracing::warn!("Failed to remove orphaned file {}: {}", file.key, cleanup);
            }
            return Err(e.into());
        }

        metrics::record_file_upload(bucket.as_str());
        tracing::info!(
            key = %file.key,
            bucket = bucket.as_str(),
            owner_id,
            size = file.size,
            "Stored file"
        );

        Ok(file)
    }

    /// Metadata of a listing file
    pub async fn listing_file_info(&self, key: &str) -> MarketResult<StoredFile> {
        let mut conn = self.db.acquire().await?;
        match load_stored_file(&mut conn, key).await? {
            Some(file) if file.bucket == Bucket::ListingFiles => Ok(file),
            _ => Err(MarketError::NotFound(format!("File {} not found", key))),
        }
    }

    /// Issue a download token for a listing's file.
    ///
    /// Only the seller and accounts that purchased the listing may download.
    pub async fn sign_download(&self, account_id: &str, listing_id: &str) -> MarketResult<SignedDownload> {
        let row = sqlx::query("SELECT seller_id, file_key FROM listings WHERE id = ?1")
            .bind(listing_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| MarketError::NotFound(format!("Listing {} not found", listing_id)))?;

        let seller_id: String = row.try_get("seller_id")?;
        let file_key: String = row.try_get("file_key")?;

        if seller_id != account_id {
            let purchased: Option<i64> = sqlx::query_scalar(
                "SELECT 1 FROM purchases WHERE buyer_id = ?1 AND listing_id = ?2",
            )
            .bind(account_id)
            .bind(listing_id)
            .fetch_optional(&self.db)
            .await?;

            if purchased.is_none() {
                return Err(MarketError::Forbidden(
                    "Only the seller or a purchaser can download this file".to_string(),
                ));
            }
        }

        let expires_at = Utc::now() + self.signed_url_ttl;
        let claims = DownloadClaims {
            sub: account_id.to_string(),
            key: file_key,
            lid: listing_id.to_string(),
            typ: DOWNLOAD_TOKEN_TYPE.to_string(),
            exp: expires_at.timestamp(),
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.signing_secret.as_bytes()),
        )
        .map_err(|e| MarketError::Internal(format!("Failed to sign download: {}", e)))?;

        tracing::info!(account_id, listing_id, "Signed listing download");

        Ok(SignedDownload {
            url: format!("{}/files/download?token={}", self.public_url, token),
            token,
            expires_at,
        })
    }

    /// Verify a download token and return the file it grants
    pub async fn resolve_download(&self, token: &str) -> MarketResult<FileContents> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        let claims = decode::<DownloadClaims>(
            token,
            &DecodingKey::from_secret(self.signing_secret.as_bytes()),
            &validation,
        )
        .map_err(|e| MarketError::Forbidden(format!("Invalid download token: {}", e)))?
        .claims;

        if claims.typ != DOWNLOAD_TOKEN_TYPE {
            return Err(MarketError::Forbidden("Invalid download token".to_string()));
        }

        let data = self
            .backend
            .get(Bucket::ListingFiles, &claims.key)
            .await?
            .ok_or_else(|| MarketError::NotFound(format!("File {} not found", claims.key)))?;

        tracing::debug!(account_id = %claims.sub, listing_id = %claims.lid, "Serving listing file");

        Ok(FileContents {
            mime_type: Bucket::ListingFiles.mime_for_key(&claims.key).to_string(),
            key: claims.key,
            data,
        })
    }

    /// Public preview image
    pub async fn get_preview(&self, key: &str) -> MarketResult<FileContents> {
        let data = self
            .backend
            .get(Bucket::Previews, key)
            .await?
            .ok_or_else(|| MarketError::NotFound(format!("Preview {} not found", key)))?;

        Ok(FileContents {
            key: key.to_string(),
            mime_type: Bucket::Previews.mime_for_key(key).to_string(),
            data,
        })
    }
}
