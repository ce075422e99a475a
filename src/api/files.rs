/// File uploads and downloads
///
/// Uploads take the raw file as the request body with its type in
/// `Content-Type`. Bodies are buffered up to the configured bucket limit.
use crate::{
    auth::AuthContext,
    context::AppContext,
    error::{MarketError, MarketResult},
    storage::{FileContents, ListingFileMeta, StoredFile},
};
use axum::{
    body::{to_bytes, Body},
    extract::{DefaultBodyLimit, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/files/listing", post(upload_listing_file))
        .route("/api/files/preview", post(upload_preview))
        .layer(DefaultBodyLimit::disable())
        .route("/files/download", get(download))
        .route("/files/previews/:key", get(preview))
}

fn content_type(headers: &HeaderMap) -> MarketResult<String> {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.split(';').next().unwrap_or(value).trim().to_ascii_lowercase())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| MarketError::Validation("Content-Type header is required".to_string()))
}

async fn read_body(body: Body, limit: usize) -> MarketResult<Vec<u8>> {
    let bytes = to_bytes(body, limit)
        .await
        .map_err(|_| MarketError::Validation(format!("File too large (max {} bytes)", limit)))?;
    Ok(bytes.to_vec())
}

async fn upload_listing_file(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    headers: HeaderMap,
    Query(meta): Query<ListingFileMeta>,
    body: Body,
) -> MarketResult<(StatusCode, Json<StoredFile>)> {
    let mime_type = content_type(&headers)?;
    let data = read_body(body, ctx.config.storage.max_listing_file_size).await?;

    let stored = ctx
        .files
        .upload_listing_file(auth.account_id(), &meta, &mime_type, data)
        .await?;
    Ok((StatusCode::CREATED, Json(stored)))
}

async fn upload_preview(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    headers: HeaderMap,
    body: Body,
) -> MarketResult<(StatusCode, Json<StoredFile>)> {
    let mime_type = content_type(&headers)?;
    let data = read_body(body, ctx.config.storage.max_preview_size).await?;

    let stored = ctx
        .files
        .upload_preview(auth.account_id(), &mime_type, data)
        .await?;
    Ok((StatusCode::CREATED, Json(stored)))
}

#[derive(Debug, Deserialize)]
struct DownloadQuery {
    token: String,
}

fn file_response(contents: FileContents, disposition: &str) -> Response {
    (
        [
            (header::CONTENT_TYPE, contents.mime_type),
            (
                header::CONTENT_DISPOSITION,
                format!("{}; filename=\"{}\"", disposition, contents.key),
            ),
        ],
        contents.data,
    )
        .into_response()
}

async fn download(
    State(ctx): State<AppContext>,
    Query(query): Query<DownloadQuery>,
) -> MarketResult<Response> {
    let contents = ctx.files.resolve_download(&query.token).await?;
    Ok(file_response(contents, "attachment"))
}

async fn preview(State(ctx): State<AppContext>, Path(key): Path<String>) -> MarketResult<Response> {
    let contents = ctx.files.get_preview(&key).await?;
    Ok(file_response(contents, "inline"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_content_type_strips_parameters() {
        let mut headers = HeaderMap::new();
        assert!(content_type(&headers).is_err());

        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("Application/PDF; charset=binary"));
        assert_eq!(content_type(&headers).unwrap(), "application/pdf");
    }

    #[tokio::test]
    async fn test_read_body_enforces_limit() {
        assert_eq!(read_body(Body::from("abc"), 3).await.unwrap(), b"abc".to_vec());
        assert!(matches!(
            read_body(Body::from("abcd"), 3).await,
            Err(MarketError::Validation(_))
        ));
    }
}
