/// Health and metrics endpoints
///
/// Liveness only says the process answers. Readiness checks the database and
/// the file store directory; the detailed view reports each component.
use crate::{
    context::AppContext,
    error::{MarketError, MarketResult},
    metrics,
};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Health status response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    /// "healthy", "degraded" or "unhealthy"
    pub status: String,
    pub version: String,
    pub uptime_seconds: i64,
    pub checks: Vec<ComponentHealth>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Health status of one component
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub name: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ComponentHealth {
    fn from_check(name: &str, start: Instant, result: MarketResult<serde_json::Value>) -> Self {
        let response_time_ms = Some(start.elapsed().as_millis() as u64);
        match result {
            Ok(details) => Self {
                name: name.to_string(),
                status: "healthy".to_string(),
                response_time_ms,
                error: None,
                details: Some(details),
            },
            Err(e) => Self {
                name: name.to_string(),
                status: "unhealthy".to_string(),
                response_time_ms,
                error: Some(e.to_string()),
                details: None,
            },
        }
    }
}

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/health", get(health_basic))
        .route("/health/live", get(liveness_probe))
        .route("/health/ready", get(readiness_probe))
        .route("/health/detailed", get(health_detailed))
        .route("/metrics", get(metrics_endpoint))
}

pub async fn health_basic(State(ctx): State<AppContext>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": ctx.config.service.version,
    }))
}

pub async fn liveness_probe() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "alive" }))
}

pub async fn readiness_probe(State(ctx): State<AppContext>) -> Result<Json<serde_json::Value>, StatusCode> {
    if let Err(e) = check_database(&ctx).await {
        tracing::warn!(error = %e, "Readiness failed: database check");
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }
    if let Err(e) = check_file_store(&ctx).await {
        tracing::warn!(error = %e, "Readiness failed: file store check");
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }

    Ok(Json(serde_json::json!({ "status": "ready" })))
}

pub async fn health_detailed(State(ctx): State<AppContext>) -> (StatusCode, Json<HealthStatus>) {
    let start = Instant::now();
    let checks = vec![
        ComponentHealth::from_check("database", Instant::now(), check_database(&ctx).await),
        ComponentHealth::from_check("file_store", Instant::now(), check_file_store(&ctx).await),
    ];

    let status = determine_overall_status(&checks);
    let code = if status == "unhealthy" {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    tracing::debug!(status, duration_ms = start.elapsed().as_millis() as u64, "Health check completed");

    let health = HealthStatus {
        status: status.to_string(),
        version: ctx.config.service.version.clone(),
        uptime_seconds: metrics::uptime_seconds(),
        message: (status != "healthy").then(|| "One or more components are unhealthy".to_string()),
        checks,
    };
    (code, Json(health))
}

/// Prometheus text exposition
pub async fn metrics_endpoint() -> Result<impl IntoResponse, MarketError> {
    let body = metrics::render_metrics()?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    ))
}

async fn check_database(ctx: &AppContext) -> MarketResult<serde_json::Value> {
    sqlx::query("SELECT 1").fetch_one(&ctx.db).await?;
    Ok(serde_json::json!({
        "type": "sqlite",
        "pool_size": ctx.db.size(),
    }))
}

async fn check_file_store(ctx: &AppContext) -> MarketResult<serde_json::Value> {
    let dir = &ctx.config.storage.files_directory;
    let meta = tokio::fs::metadata(dir).await?;
    if !meta.is_dir() {
        return Err(MarketError::Internal(format!("{:?} is not a directory", dir)));
    }
    Ok(serde_json::json!({ "type": "disk" }))
}

fn determine_overall_status(checks: &[ComponentHealth]) -> &'static str {
    if checks.iter().any(|c| c.status == "unhealthy") {
        "unhealthy"
    } else if checks.iter().any(|c| c.status == "degraded") {
        "degraded"
    } else {
        "healthy"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(name: &str, status: &str) -> ComponentHealth {
        ComponentHealth {
            name: name.to_string(),
            status: status.to_string(),
            response_time_ms: Some(1),
            error: None,
            details: None,
        }
    }

    #[test]
    fn test_determine_overall_status() {
        assert_eq!(
            determine_overall_status(&[check("database", "healthy"), check("file_store", "healthy")]),
            "healthy"
        );
        assert_eq!(
            determine_overall_status(&[check("database", "healthy"), check("file_store", "degraded")]),
            "degraded"
        );
        assert_eq!(
            determine_overall_status(&[check("database", "unhealthy"), check("file_store", "degraded")]),
            "unhealthy"
        );
    }

    #[test]
    fn test_failed_check_carries_error() {
        let health = ComponentHealth::from_check(
            "file_store",
            Instant::now(),
            Err(MarketError::Internal("missing".to_string())),
        );
        assert_eq!(health.status, "unhealthy");
        assert!(health.error.unwrap().contains("missing"));
    }
}
