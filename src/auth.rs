/// Authentication extractors
use crate::{
    account::ValidatedSession,
    admin::Role,
    api::middleware::extract_bearer_token,
    context::AppContext,
    error::MarketError,
};
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

/// Authenticated context - extracts and validates the session from the request
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub session: ValidatedSession,
}

impl AuthContext {
    pub fn account_id(&self) -> &str {
        &self.session.account_id
    }
}

#[async_trait]
impl FromRequestParts<AppContext> for AuthContext {
    type Rejection = MarketError;

    async fn from_request_parts(parts: &mut Parts, state: &AppContext) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(&parts.headers)
            .ok_or_else(|| MarketError::Unauthenticated("Missing authorization header".to_string()))?;

        let session = state.account_manager.validate_access_token(&token).await?;

        Ok(AuthContext { session })
    }
}

/// Optional authenticated context - does not fail if no auth provided
#[derive(Debug, Clone)]
pub struct OptionalAuthContext {
    pub auth: Option<AuthContext>,
}

impl OptionalAuthContext {
    pub fn account_id(&self) -> Option<&str> {
        self.auth.as_ref().map(|auth| auth.account_id())
    }
}

#[async_trait]
impl FromRequestParts<AppContext> for OptionalAuthContext {
    type Rejection = MarketError;

    async fn from_request_parts(parts: &mut Parts, state: &AppContext) -> Result<Self, Self::Rejection> {
        let auth = match extract_bearer_token(&parts.headers) {
            Some(token) => match state.account_manager.validate_access_token(&token).await {
                Ok(session) => Some(AuthContext { session }),
                Err(e) => {
                    tracing::debug!("Ignoring invalid optional token: {}", e);
                    None
                }
            },
            None => None,
        };

        Ok(OptionalAuthContext { auth })
    }
}

/// Admin authentication context - requires the admin role
#[derive(Debug, Clone)]
pub struct AdminAuthContext {
    pub session: ValidatedSession,
}

impl AdminAuthContext {
    pub fn account_id(&self) -> &str {
        &self.session.account_id
    }
}

#[async_trait]
impl FromRequestParts<AppContext> for AdminAuthContext {
    type Rejection = MarketError;

    async fn from_request_parts(parts: &mut Parts, state: &AppContext) -> Result<Self, Self::Rejection> {
        let AuthContext { session } = AuthContext::from_request_parts(parts, state).await?;

        // The token carries the role at issue time; the stored role wins
        let role = state.role_manager.get_role(&session.account_id).await?;
        if role != Role::Admin {
            tracing::warn!(account_id = %session.account_id, "Non-admin attempted admin access");
            return Err(MarketError::Forbidden("Admin access required".to_string()));
        }

        Ok(AdminAuthContext {
            session: ValidatedSession { role, ..session },
        })
    }
}
