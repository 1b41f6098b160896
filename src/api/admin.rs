/// Admin API Endpoints
/// Account listing, role management and issuer approval
use crate::{
    account::{AccountSummary, ApprovalAction},
    auth::AdminAuthContext,
    context::AppContext,
    db::account::Role,
    error::{CertError, CertResult},
};
use axum::{
    extract::{Path, State},
    routing::{get, patch, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

/// Build admin API routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/admin/users", get(list_users))
        .route("/api/admin/users/:id/role", patch(update_role))
        .route("/api/admin/users/:id/active", post(set_active))
        // Issuer approval
        .route("/api/admin/issuers/:id/approve", post(approve_issuer))
        .route("/api/admin/issuers/:id/reject", post(reject_issuer))
}

#[derive(Debug, Serialize)]
struct UserList {
    users: Vec<AccountSummary>,
    count: usize,
}

#[derive(Debug, Deserialize)]
struct UpdateRoleRequest {
    role: Role,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetActiveRequest {
    is_active: bool,
}

async fn list_users(
    State(ctx): State<AppContext>,
    _auth: AdminAuthContext,
) -> CertResult<Json<UserList>> {
    let users: Vec<AccountSummary> = ctx
        .account_manager
        .list_accounts()
        .await?
        .iter()
        .map(AccountSummary::from)
        .collect();

    Ok(Json(UserList {
        count: users.len(),
        users,
    }))
}

async fn update_role(
    State(ctx): State<AppContext>,
    auth: AdminAuthContext,
    Path(id): Path<String>,
    Json(req): Json<UpdateRoleRequest>,
) -> CertResult<Json<AccountSummary>> {
    if auth.account.id == id && req.role != Role::Admin {
        return Err(CertError::Authorization(
            "Admins cannot demote themselves".to_string(),
        ));
    }

    let account = ctx.account_manager.update_role(&id, req.role).await?;
    tracing::info!(
        "Admin {} changed role of {} to {}",
        auth.account.id,
        account.id,
        account.role.as_str()
    );

    Ok(Json(AccountSummary::from(&account)))
}

async fn set_active(
    State(ctx): State<AppContext>,
    auth: AdminAuthContext,
    Path(id): Path<String>,
    Json(req): Json<SetActiveRequest>,
) -> CertResult<Json<AccountSummary>> {
    if auth.account.id == id && !req.is_active {
        return Err(CertError::Authorization(
            "Admins cannot deactivate themselves".to_string(),
        ));
    }

    let account = ctx.account_manager.set_active(&id, req.is_active).await?;
    tracing::info!(
        "Admin {} set {} active={}",
        auth.account.id,
        account.id,
        account.is_active
    );

    Ok(Json(AccountSummary::from(&account)))
}

async fn approve_issuer(
    State(ctx): State<AppContext>,
    auth: AdminAuthContext,
    Path(id): Path<String>,
) -> CertResult<Json<AccountSummary>> {
    decide(&ctx, &auth, &id, ApprovalAction::Approve).await
}

async fn reject_issuer(
    State(ctx): State<AppContext>,
    auth: AdminAuthContext,
    Path(id): Path<String>,
) -> CertResult<Json<AccountSummary>> {
    decide(&ctx, &auth, &id, ApprovalAction::Reject).await
}

async fn decide(
    ctx: &AppContext,
    auth: &AdminAuthContext,
    id: &str,
    action: ApprovalAction,
) -> CertResult<Json<AccountSummary>> {
    let account = ctx
        .account_manager
        .apply_approval(&auth.account, id, action)
        .await?;

    tracing::info!(
        "Admin {} applied {} to issuer {}",
        auth.account.id,
        action.as_str(),
        account.id
    );

    Ok(Json(AccountSummary::from(&account)))
}
