/// Account endpoints: signup, login, session and access requests
use crate::{
    account::{
        AccountSummary, AdminSignupRequest, ApprovalAction, LoginRequest, SessionResponse,
        SignupRequest,
    },
    auth::AuthContext,
    context::AppContext,
    db::account::Role,
    error::{CertError, CertResult},
};
use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use validator::Validate;

/// Build auth routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/auth/signup", post(signup))
        .route("/api/auth/admin-signup", post(admin_signup))
        .route("/api/auth/login", post(login))
        .route("/api/auth/me", get(me))
        .route("/api/auth/request-access", post(request_access))
}

/// Self-service signup as issuer or verifier
async fn signup(
    State(ctx): State<AppContext>,
    Json(req): Json<SignupRequest>,
) -> CertResult<(StatusCode, Json<SessionResponse>)> {
    req.validate()?;

    let role = req.role.unwrap_or(Role::Verifier);
    if role == Role::Admin {
        return Err(CertError::Authorization(
            "Admin accounts must use admin signup".to_string(),
        ));
    }

    let account = ctx
        .account_manager
        .create_account(&req.name, &req.email, &req.password, role, req.organization)
        .await?;
    let token = ctx.account_manager.issue_token(&account)?;

    Ok((
        StatusCode::CREATED,
        Json(SessionResponse {
            token,
            user: AccountSummary::from(&account),
        }),
    ))
}

/// Admin signup gated by the configured secret
async fn admin_signup(
    State(ctx): State<AppContext>,
    Json(req): Json<AdminSignupRequest>,
) -> CertResult<(StatusCode, Json<SessionResponse>)> {
    req.validate()?;

    let account = ctx
        .account_manager
        .create_admin_account(
            &req.name,
            &req.email,
            &req.password,
            req.organization,
            &req.admin_secret,
        )
        .await?;
    let token = ctx.account_manager.issue_token(&account)?;

    tracing::info!("Admin account created: {}", account.email);

    Ok((
        StatusCode::CREATED,
        Json(SessionResponse {
            token,
            user: AccountSummary::from(&account),
        }),
    ))
}

async fn login(
    State(ctx): State<AppContext>,
    Json(req): Json<LoginRequest>,
) -> CertResult<Json<SessionResponse>> {
    req.validate()?;

    let (account, token) = ctx.account_manager.login(&req.email, &req.password).await?;

    Ok(Json(SessionResponse {
        token,
        user: AccountSummary::from(&account),
    }))
}

async fn me(auth: AuthContext) -> Json<AccountSummary> {
    Json(AccountSummary::from(&auth.account))
}

/// Issuer asks an admin for (renewed) issuing rights
async fn request_access(
    State(ctx): State<AppContext>,
    auth: AuthContext,
) -> CertResult<Json<AccountSummary>> {
    let account = ctx
        .account_manager
        .apply_approval(&auth.account, &auth.account.id, ApprovalAction::Request)
        .await?;

    Ok(Json(AccountSummary::from(&account)))
}
