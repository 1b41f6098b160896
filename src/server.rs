/// HTTP server setup and routing
use crate::{
    api::middleware::track_http_metrics,
    context::AppContext,
    error::{CertError, CertResult},
    metrics,
    rate_limit::rate_limit_middleware,
};
use axum::{
    http::{header, HeaderValue, Method, StatusCode},
    middleware,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use serde_json::json;
use std::net::SocketAddr;
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

/// Build the main application router
/// Returns Router<()> because state is already provided
pub fn build_router(ctx: AppContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(allowed_origin(ctx.config.service.frontend_origin.as_deref()))
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new()
        .route("/metrics", get(metrics_handler))
        .merge(crate::api::routes())
        // Route templates are only known once a route matched
        .route_layer(middleware::from_fn(track_http_metrics))
        // Provide state - converts Router<AppContext> to Router<()>
        .with_state(ctx.clone())
        .layer(middleware::from_fn_with_state(ctx, rate_limit_middleware))
        .layer(cors)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .fallback(not_found)
}

/// Restrict CORS to the configured frontend, or allow any origin when unset
fn allowed_origin(frontend_origin: Option<&str>) -> AllowOrigin {
    match frontend_origin.map(HeaderValue::from_str) {
        Some(Ok(origin)) => AllowOrigin::exact(origin),
        Some(Err(e)) => {
            tracing::warn!("Ignoring invalid frontend origin: {}", e);
            Any.into()
        }
        None => Any.into(),
    }
}

/// Prometheus scrape endpoint
async fn metrics_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::render_metrics(),
    )
}

/// 404 handler
async fn not_found() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": "NotFound",
            "message": "Endpoint not found"
        })),
    )
}

/// Start the HTTP server
pub async fn serve(ctx: AppContext) -> CertResult<()> {
    let addr = format!("{}:{}", ctx.config.service.hostname, ctx.config.service.port);

    info!("CertVerify listening on {}", addr);
    info!("   Service URL: {}", ctx.service_url());
    info!("   Public URL: {}", ctx.config.service.public_url);

    let app = build_router(ctx);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| CertError::Internal(format!("Failed to bind to {}: {}", addr, e)))?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .map_err(|e| CertError::Internal(format!("Server error: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{RateLimitConfig, ServerConfig},
        content::DisabledContentStore,
        db,
        ledger::DisabledLedger,
        mailer::fake::RecordingNotifier,
    };
    use axum::{
        body::{to_bytes, Body},
        http::Request,
    };
    use serde_json::Value;
    use std::sync::Arc;
    use tower::ServiceExt;

    async fn app() -> Router {
        app_with(ServerConfig::for_tests()).await
    }

    async fn app_with(config: ServerConfig) -> Router {
        let ctx = AppContext::with_collaborators(
            config,
            db::test_pool().await,
            Arc::new(DisabledLedger),
            Arc::new(DisabledContentStore),
            Arc::new(RecordingNotifier::default()),
        );
        build_router(ctx)
    }

    async fn send(
        app: &Router,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    async fn admin_token(app: &Router) -> String {
        let (status, body) = send(
            app,
            Method::POST,
            "/api/auth/admin-signup",
            None,
            Some(json!({
                "name": "Root Admin",
                "email": "root@example.com",
                "password": "hunter22",
                "adminSecret": "let-me-in"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        body["token"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_unknown_route_returns_json_404() {
        let app = app().await;
        let (status, body) = send(&app, Method::GET, "/nope", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "NotFound");
    }

    #[tokio::test]
    async fn test_health_reports_disabled_collaborators() {
        let app = app().await;
        let (status, body) = send(&app, Method::GET, "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "degraded");
    }

    #[tokio::test]
    async fn test_issue_requires_bearer_token() {
        let app = app().await;
        let (status, body) = send(
            &app,
            Method::POST,
            "/api/cert/issue",
            None,
            Some(json!({"certificateId": "CERT-0001"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "AuthenticationRequired");
    }

    #[tokio::test]
    async fn test_pending_issuer_cannot_issue() {
        let app = app().await;
        let (status, body) = send(
            &app,
            Method::POST,
            "/api/auth/signup",
            None,
            Some(json!({
                "name": "Uni Registrar",
                "email": "registrar@example.com",
                "password": "hunter22",
                "role": "issuer"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["user"]["approvalStatus"], "pending");
        let token = body["token"].as_str().unwrap().to_string();

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/cert/issue",
            Some(&token),
            Some(json!({
                "certificateId": "CERT-0001",
                "recipientName": "Ada Lovelace",
                "courseName": "Analytical Engines",
                "issuedOn": "2024-05-01"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "NotApproved");
    }

    #[tokio::test]
    async fn test_issue_verify_and_revoke_over_http() {
        let app = app().await;
        let token = admin_token(&app).await;

        let (status, issued) = send(
            &app,
            Method::POST,
            "/api/cert/issue",
            Some(&token),
            Some(json!({
                "certificateId": "CERT-0001",
                "recipientName": "Ada Lovelace",
                "courseName": "Analytical Engines",
                "issuedOn": "2024-05-01"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(issued["ledgerStatus"], "unanchored");
        let verify_url = issued["verifyUrl"].as_str().unwrap();
        let path = verify_url.trim_start_matches("http://localhost:4000");
        assert!(path.starts_with("/api/cert/verify?token="));

        let (status, verdict) = send(&app, Method::GET, path, None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(verdict["certificate"]["certificateId"], "CERT-0001");
        // No ledger and unanchored records are not accepted by default
        assert_eq!(verdict["isValid"], false);

        let (status, _) = send(
            &app,
            Method::POST,
            "/api/cert/revoke/CERT-0001",
            Some(&token),
            Some(json!({"reason": "  "})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/cert/revoke/CERT-0001",
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "AlreadyRevoked");

        let (status, detail) =
            send(&app, Method::GET, "/api/cert/CERT-0001", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(detail["certificate"]["status"], "revoked");
        assert_eq!(detail["certificate"]["revokeReason"], "No reason provided");
    }

    #[tokio::test]
    async fn test_verify_without_token_is_invalid_input() {
        let app = app().await;
        let (status, body) = send(&app, Method::GET, "/api/cert/verify", None, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["issues"][0]["field"], "token");
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let app = app().await;
        let response = app
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    async fn admitted_requests(app: &Router, token: Option<&str>, attempts: usize) -> usize {
        let mut admitted = 0;
        for _ in 0..attempts {
            let (status, _) = send(app, Method::GET, "/api/cert/verify", token, None).await;
            if status != StatusCode::TOO_MANY_REQUESTS {
                admitted += 1;
            }
        }
        admitted
    }

    #[tokio::test]
    async fn test_unverified_bearer_is_charged_as_anonymous() {
        let mut config = ServerConfig::for_tests();
        config.rate_limit = RateLimitConfig {
            enabled: true,
            anonymous_rps: 1,
            authenticated_rps: 100,
            admin_rps: 1000,
            burst_size: 5,
        };

        let anonymous = admitted_requests(&app_with(config.clone()).await, None, 10).await;
        let junk = admitted_requests(&app_with(config).await, Some("junk"), 10).await;

        assert_eq!(anonymous, 1);
        assert_eq!(junk, anonymous);
    }

    #[tokio::test]
    async fn test_signed_in_caller_uses_own_quota() {
        let mut config = ServerConfig::for_tests();
        config.rate_limit = RateLimitConfig {
            enabled: true,
            anonymous_rps: 1,
            authenticated_rps: 100,
            admin_rps: 1000,
            burst_size: 5,
        };
        let app = app_with(config).await;
        let token = admin_token(&app).await;

        // Anonymous budget is a single request; the admin is charged separately
        assert_eq!(admitted_requests(&app, Some(&token), 3).await, 3);
    }
}
