/// Health check endpoints for liveness and readiness probes
///
/// The database is the only hard dependency. The ledger gateway, content
/// store and mailer are reported as configured or disabled; a disabled
/// collaborator degrades trust guarantees but never stops the service.
use crate::{context::AppContext, db};
use axum::{extract::State, http::StatusCode, response::Json, routing::get, Router};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Health status response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    /// Overall status: "healthy", "degraded", or "unhealthy"
    pub status: String,

    pub version: String,

    /// Individual component checks
    pub checks: Vec<ComponentHealth>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Health status of individual component
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub name: String,

    /// Status: "healthy", "degraded", or "unhealthy"
    pub status: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ComponentHealth {
    fn collaborator(name: &str, configured: bool) -> Self {
        Self {
            name: name.to_string(),
            status: if configured { "healthy" } else { "degraded" }.to_string(),
            response_time_ms: None,
            error: (!configured).then(|| "not configured".to_string()),
        }
    }
}

/// Build health check routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/health", get(health_detailed))
        .route("/health/live", get(liveness_probe))
        .route("/health/ready", get(readiness_probe))
}

/// Liveness probe - responds as long as the process can serve requests
pub async fn liveness_probe() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "alive",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Readiness probe - 503 until the database answers
pub async fn readiness_probe(
    State(ctx): State<AppContext>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    if let Err(e) = db::test_connection(&ctx.db).await {
        tracing::warn!(error = %e, "readiness_probe_failed: database check failed");
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }

    Ok(Json(serde_json::json!({
        "status": "ready",
        "version": env!("CARGO_PKG_VERSION")
    })))
}

/// Health check with all component statuses
pub async fn health_detailed(State(ctx): State<AppContext>) -> (StatusCode, Json<HealthStatus>) {
    let checks = vec![
        check_database(&ctx).await,
        ComponentHealth::collaborator("ledger", ctx.config.ledger.is_some()),
        ComponentHealth::collaborator("content_store", ctx.config.content_store.is_some()),
        ComponentHealth::collaborator("mailer", ctx.config.email.is_some()),
    ];

    let overall_status = determine_overall_status(&checks);
    let status_code = match overall_status.as_str() {
        "unhealthy" => StatusCode::SERVICE_UNAVAILABLE,
        // Degraded still serves traffic
        _ => StatusCode::OK,
    };

    let health = HealthStatus {
        message: match overall_status.as_str() {
            "healthy" => None,
            _ => Some("One or more components are unavailable".to_string()),
        },
        status: overall_status,
        version: ctx.config.service.version.clone(),
        checks,
    };

    (status_code, Json(health))
}

async fn check_database(ctx: &AppContext) -> ComponentHealth {
    let start = Instant::now();
    let result = db::test_connection(&ctx.db).await;

    ComponentHealth {
        name: "database".to_string(),
        status: if result.is_ok() { "healthy" } else { "unhealthy" }.to_string(),
        response_time_ms: Some(start.elapsed().as_millis() as u64),
        error: result.err().map(|e| e.to_string()),
    }
}

/// Determine overall health status from individual checks
fn determine_overall_status(checks: &[ComponentHealth]) -> String {
    if checks.iter().any(|c| c.status == "unhealthy") {
        "unhealthy".to_string()
    } else if checks.iter().any(|c| c.status == "degraded") {
        "degraded".to_string()
    } else {
        "healthy".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn component(name: &str, status: &str) -> ComponentHealth {
        ComponentHealth {
            name: name.to_string(),
            status: status.to_string(),
            response_time_ms: Some(5),
            error: None,
        }
    }

    #[test]
    fn test_determine_overall_status() {
        assert_eq!(
            determine_overall_status(&[component("database", "healthy")]),
            "healthy"
        );
        assert_eq!(
            determine_overall_status(&[
                component("database", "healthy"),
                ComponentHealth::collaborator("ledger", false),
            ]),
            "degraded"
        );
        assert_eq!(
            determine_overall_status(&[
                component("database", "unhealthy"),
                ComponentHealth::collaborator("ledger", true),
            ]),
            "unhealthy"
        );
    }

    #[test]
    fn test_disabled_collaborator_reports_reason() {
        let ledger = ComponentHealth::collaborator("ledger", false);
        assert_eq!(ledger.status, "degraded");
        assert_eq!(ledger.error.as_deref(), Some("not configured"));

        let json = serde_json::to_string(&ComponentHealth::collaborator("mailer", true)).unwrap();
        assert!(!json.contains("error"));
    }
}
