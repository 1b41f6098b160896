/// API routes and handlers
pub mod admin;
pub mod auth;
pub mod cert;
pub mod health;
pub mod middleware;

use crate::context::AppContext;
use axum::Router;

/// Build API routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .merge(health::routes())
        .merge(auth::routes())
        .merge(cert::routes())
        .merge(admin::routes())
}
