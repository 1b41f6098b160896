/// Rate Limiting System
///
/// Quotas are charged per caller: anonymous requests by client address,
/// signed-in requests by account. The class comes from the account a bearer
/// token resolves to, so an unverifiable token is charged as anonymous.
use crate::{
    api::middleware::extract_bearer_token,
    config::RateLimitConfig,
    context::AppContext,
    db::account::{Account, Role},
    error::{CertError, CertResult},
};
use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter as GovernorLimiter};
use std::{net::SocketAddr, num::NonZeroU32, sync::Arc, time::Duration};

/// Key used when the peer address is unknown
const UNKNOWN_CLIENT: &str = "unknown";

/// Which quota a request is charged against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateClass {
    Anonymous,
    Authenticated,
    Admin,
}

impl RateClass {
    /// Class for the account a request authenticated as, if any
    pub fn for_account(account: Option<&Account>) -> Self {
        match account.map(|a| a.role) {
            Some(Role::Admin) => RateClass::Admin,
            Some(_) => RateClass::Authenticated,
            None => RateClass::Anonymous,
        }
    }
}

fn non_zero(value: u32, fallback: u32) -> NonZeroU32 {
    NonZeroU32::new(value)
        .or_else(|| NonZeroU32::new(fallback))
        .unwrap_or(NonZeroU32::MIN)
}

/// Rate limiter manager
#[derive(Clone)]
pub struct RateLimiter {
    enabled: bool,
    limits: [u32; 3],
    anonymous: Arc<DefaultKeyedRateLimiter<String>>,
    authenticated: Arc<DefaultKeyedRateLimiter<String>>,
    admin: Arc<DefaultKeyedRateLimiter<String>>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        let burst = config.burst_size;

        let anonymous_quota = Quota::per_second(non_zero(config.anonymous_rps, 10))
            .allow_burst(non_zero(burst / 5, 10));
        let authenticated_quota = Quota::per_second(non_zero(config.authenticated_rps, 100))
            .allow_burst(non_zero(burst, 50));
        let admin_quota = Quota::per_second(non_zero(config.admin_rps, 1000))
            .allow_burst(non_zero(burst.saturating_mul(2), 100));

        Self {
            enabled: config.enabled,
            limits: [
                config.anonymous_rps,
                config.authenticated_rps,
                config.admin_rps,
            ],
            anonymous: Arc::new(GovernorLimiter::keyed(anonymous_quota)),
            authenticated: Arc::new(GovernorLimiter::keyed(authenticated_quota)),
            admin: Arc::new(GovernorLimiter::keyed(admin_quota)),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Requests per second allowed for a class
    pub fn limit_for(&self, class: RateClass) -> u32 {
        match class {
            RateClass::Anonymous => self.limits[0],
            RateClass::Authenticated => self.limits[1],
            RateClass::Admin => self.limits[2],
        }
    }

    /// Charge one request by `caller` against the class quota
    pub fn check(&self, class: RateClass, caller: &str) -> CertResult<()> {
        let limiter = match class {
            RateClass::Anonymous => &self.anonymous,
            RateClass::Authenticated => &self.authenticated,
            RateClass::Admin => &self.admin,
        };

        limiter
            .check_key(&caller.to_string())
            .map_err(|_| CertError::RateLimitExceeded {
                retry_after: Duration::from_secs(1),
            })
    }
}

/// Peer address of the request, when the server was started with connect info
fn client_key(request: &Request) -> String {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

/// Rate limiting middleware
pub async fn rate_limit_middleware(
    State(ctx): State<AppContext>,
    request: Request,
    next: Next,
) -> Result<Response, CertError> {
    if !ctx.rate_limiter.is_enabled() {
        return Ok(next.run(request).await);
    }

    let account = match extract_bearer_token(request.headers()) {
        Some(token) => ctx.account_manager.authenticate_token(&token).await.ok(),
        None => None,
    };
    let class = RateClass::for_account(account.as_ref());
    let caller = match &account {
        Some(account) => account.id.clone(),
        None => client_key(&request),
    };

    if let Err(e) = ctx.rate_limiter.check(class, &caller) {
        tracing::debug!(
            "Rate limit exceeded for {:?} caller {} on {}",
            class,
            caller,
            request.uri().path()
        );
        return Err(e);
    }

    let mut response = next.run(request).await;
    response.headers_mut().insert(
        "X-RateLimit-Limit",
        HeaderValue::from(ctx.rate_limiter.limit_for(class)),
    );

    Ok(response)
}
