/// Authentication extractors
use crate::{
    api::middleware::extract_bearer_token,
    context::AppContext,
    db::account::{Account, Role},
    error::CertError,
};
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

/// Authenticated context - resolves the bearer token to an active account
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub account: Account,
}

#[async_trait]
impl FromRequestParts<AppContext> for AuthContext {
    type Rejection = CertError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(&parts.headers)
            .ok_or_else(|| CertError::Authentication("Missing authorization header".to_string()))?;

        let account = state.account_manager.authenticate_token(&token).await?;

        Ok(AuthContext { account })
    }
}

/// Issuer context - admins or approved issuers
#[derive(Debug, Clone)]
pub struct IssuerAuthContext {
    pub account: Account,
}

#[async_trait]
impl FromRequestParts<AppContext> for IssuerAuthContext {
    type Rejection = CertError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let AuthContext { account } = AuthContext::from_request_parts(parts, state).await?;

        if account.role == Role::Verifier {
            return Err(CertError::Authorization("Issuer role required".to_string()));
        }

        Ok(IssuerAuthContext { account })
    }
}

/// Admin authentication context - requires admin role
#[derive(Debug, Clone)]
pub struct AdminAuthContext {
    pub account: Account,
}

#[async_trait]
impl FromRequestParts<AppContext> for AdminAuthContext {
    type Rejection = CertError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let AuthContext { account } = AuthContext::from_request_parts(parts, state).await?;

        if account.role != Role::Admin {
            tracing::warn!("Account {} attempted an admin action", account.id);
            return Err(CertError::Authorization("Admin role required".to_string()));
        }

        Ok(AdminAuthContext { account })
    }
}
