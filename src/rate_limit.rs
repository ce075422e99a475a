/// Request rate limiting
use crate::{
    api::middleware::extract_bearer_token,
    config::RateLimitConfig,
    context::AppContext,
    error::{MarketError, MarketResult},
};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter as GovernorLimiter,
};
use std::{num::NonZeroU32, sync::Arc, time::Duration};

type DirectLimiter = GovernorLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Two tiers: requests carrying a bearer token and anonymous ones
#[derive(Clone)]
pub struct RateLimiter {
    enabled: bool,
    authenticated: Arc<DirectLimiter>,
    anonymous: Arc<DirectLimiter>,
}

fn quota(rps: u32) -> Quota {
    // Burst of twice the steady rate
    let rate = NonZeroU32::new(rps).unwrap_or(NonZeroU32::MIN);
    let burst = NonZeroU32::new(rps.saturating_mul(2)).unwrap_or(rate);
    Quota::per_second(rate).allow_burst(burst)
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            enabled: config.enabled,
            authenticated: Arc::new(GovernorLimiter::direct(quota(config.authenticated_rps))),
            anonymous: Arc::new(GovernorLimiter::direct(quota(config.anonymous_rps))),
        }
    }

    fn check(limiter: &DirectLimiter) -> MarketResult<()> {
        limiter.check().map_err(|_| MarketError::RateLimitExceeded {
            retry_after: Duration::from_secs(1),
        })
    }

    pub fn check_authenticated(&self) -> MarketResult<()> {
        if !self.enabled {
            return Ok(());
        }
        Self::check(&self.authenticated)
    }

    pub fn check_anonymous(&self) -> MarketResult<()> {
        if !self.enabled {
            return Ok(());
        }
        Self::check(&self.anonymous)
    }
}

/// Rate limiting middleware
///
/// The tier is picked from the presence of a bearer token; the token itself
/// is validated later by the extractors.
pub async fn rate_limit_middleware(
    State(ctx): State<AppContext>,
    request: Request,
    next: Next,
) -> Result<Response, MarketError> {
    if request.uri().path().starts_with("/health") {
        return Ok(next.run(request).await);
    }

    if extract_bearer_token(request.headers()).is_some() {
        ctx.rate_limiter.check_authenticated()?;
    } else {
        ctx.rate_limiter.check_anonymous()?;
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(enabled: bool) -> RateLimitConfig {
        RateLimitConfig {
            enabled,
            authenticated_rps: 3,
            anonymous_rps: 1,
        }
    }

    #[test]
    fn test_burst_then_limit() {
        let limiter = RateLimiter::new(&config(true));

        for _ in 0..6 {
            assert!(limiter.check_authenticated().is_ok());
        }
        assert!(matches!(
            limiter.check_authenticated(),
            Err(MarketError::RateLimitExceeded { .. })
        ));

        // Tiers are independent
        assert!(limiter.check_anonymous().is_ok());
    }

    #[test]
    fn test_disabled_never_limits() {
        let limiter = RateLimiter::new(&config(false));
        for _ in 0..100 {
            assert!(limiter.check_anonymous().is_ok());
        }
    }

    #[test]
    fn test_zero_rate_falls_back_to_one() {
        let limiter = RateLimiter::new(&RateLimitConfig {
            enabled: true,
            authenticated_rps: 0,
            anonymous_rps: 0,
        });
        assert!(limiter.check_anonymous().is_ok());
    }
}
