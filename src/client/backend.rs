/// Backends the client library talks to
///
/// `LocalLedgerBackend` calls the ledger in-process; `HttpLedgerBackend`
/// calls the HTTP API and rebuilds typed errors from their wire codes.
use crate::{
    account::{AccountManager, AccountProfile, Credentials},
    client::ClientSession,
    error::{ErrorResponse, MarketError, MarketResult},
    ledger::{
        AttendanceOutcome, CheckoutOutcome, CheckoutRequest, CommentOutcome, CommentRequest,
        FeedbackOutcome, FeedbackRequest, FirstComeOutcome, FirstComeRequest, LedgerManager,
        QuizAnswersRequest, QuizOutcome, RouletteOutcome,
    },
};
use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Balance-changing operations and the balance read used after failures
#[async_trait]
pub trait LedgerBackend: Send + Sync {
    async fn checkout(&self, session: &ClientSession, listing_ids: Vec<String>) -> MarketResult<CheckoutOutcome>;

    async fn submit_feedback(
        &self,
        session: &ClientSession,
        purchase_id: String,
        rating: i64,
        comment: String,
    ) -> MarketResult<FeedbackOutcome>;

    async fn check_attendance(&self, session: &ClientSession) -> MarketResult<AttendanceOutcome>;

    async fn spin_roulette(&self, session: &ClientSession) -> MarketResult<RouletteOutcome>;

    async fn submit_quiz(
        &self,
        session: &ClientSession,
        event_id: String,
        answers: Vec<String>,
    ) -> MarketResult<QuizOutcome>;

    async fn participate_first_come(
        &self,
        session: &ClientSession,
        event_id: String,
        comment: Option<String>,
    ) -> MarketResult<FirstComeOutcome>;

    async fn submit_comment(
        &self,
        session: &ClientSession,
        event_id: String,
        comment: String,
    ) -> MarketResult<CommentOutcome>;

    async fn fetch_balance(&self, session: &ClientSession) -> MarketResult<i64>;
}

/// Profile lookup and sign-out for the session lifecycle
#[async_trait]
pub trait SessionBackend: Send + Sync {
    async fn fetch_profile(&self, credentials: &Credentials) -> MarketResult<AccountProfile>;

    async fn sign_out(&self, credentials: &Credentials) -> MarketResult<()>;
}

/// In-process backend
#[derive(Clone)]
pub struct LocalLedgerBackend {
    ledger: Arc<LedgerManager>,
    accounts: Arc<AccountManager>,
}

impl LocalLedgerBackend {
    pub fn new(ledger: Arc<LedgerManager>, accounts: Arc<AccountManager>) -> Self {
        Self { ledger, accounts }
    }
}

#[async_trait]
impl LedgerBackend for LocalLedgerBackend {
    async fn checkout(&self, session: &ClientSession, listing_ids: Vec<String>) -> MarketResult<CheckoutOutcome> {
        self.ledger.checkout(&session.account_id, &listing_ids).await
    }

    async fn submit_feedback(
        &self,
        session: &ClientSession,
        purchase_id: String,
        rating: i64,
        comment: String,
    ) -> MarketResult<FeedbackOutcome> {
        self.ledger
            .submit_feedback(&session.account_id, &purchase_id, rating, &comment)
            .await
    }

    async fn check_attendance(&self, session: &ClientSession) -> MarketResult<AttendanceOutcome> {
        self.ledger.check_attendance(&session.account_id).await
    }

    async fn spin_roulette(&self, session: &ClientSession) -> MarketResult<RouletteOutcome> {
        self.ledger.spin_roulette(&session.account_id).await
    }

    async fn submit_quiz(
        &self,
        session: &ClientSession,
        event_id: String,
        answers: Vec<String>,
    ) -> MarketResult<QuizOutcome> {
        self.ledger
            .submit_quiz_participation(&session.account_id, &event_id, &answers)
            .await
    }

    async fn participate_first_come(
        &self,
        session: &ClientSession,
        event_id: String,
        comment: Option<String>,
    ) -> MarketResult<FirstComeOutcome> {
        self.ledger
            .participate_first_come(&session.account_id, &event_id, comment.as_deref())
            .await
    }

    async fn submit_comment(
        &self,
        session: &ClientSession,
        event_id: String,
        comment: String,
    ) -> MarketResult<CommentOutcome> {
        self.ledger
            .submit_comment_participation(&session.account_id, &event_id, &comment)
            .await
    }

    async fn fetch_balance(&self, session: &ClientSession) -> MarketResult<i64> {
        self.ledger.get_balance(&session.account_id).await
    }
}

#[async_trait]
impl SessionBackend for LocalLedgerBackend {
    async fn fetch_profile(&self, credentials: &Credentials) -> MarketResult<AccountProfile> {
        let session = self
            .accounts
            .validate_access_token(&credentials.access_token)
            .await?;
        self.accounts.get_profile(&session.account_id).await
    }

    async fn sign_out(&self, credentials: &Credentials) -> MarketResult<()> {
        let session = self
            .accounts
            .validate_access_token(&credentials.access_token)
            .await?;
        self.accounts.delete_session(&session.session_id).await
    }
}

/// HTTP backend against the market API
#[derive(Clone)]
pub struct HttpLedgerBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpLedgerBackend {
    pub fn new(base_url: &str, timeout: Duration) -> MarketResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MarketError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn call<B, T>(&self, method: Method, path: &str, token: &str, body: Option<&B>) -> MarketResult<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.client.request(method, &url).bearer_auth(token);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| MarketError::UpstreamFailure(format!("Request to {} failed: {}", path, e)))?;

        let status = response.status();
        if status.is_success() {
            return response.json::<T>().await.map_err(|e| {
                MarketError::UpstreamFailure(format!("Invalid response from {}: {}", path, e))
            });
        }

        Err(decode_error(status, response.json::<ErrorResponse>().await.ok()))
    }
}

/// Rebuild the typed error from the response body
fn decode_error(status: StatusCode, body: Option<ErrorResponse>) -> MarketError {
    match body {
        Some(body) => MarketError::from_response(body),
        None if status.is_server_error() => {
            MarketError::UpstreamFailure(format!("Server returned {}", status))
        }
        None => MarketError::Internal(format!("Unexpected status {}", status)),
    }
}

#[async_trait]
impl LedgerBackend for HttpLedgerBackend {
    async fn checkout(&self, session: &ClientSession, listing_ids: Vec<String>) -> MarketResult<CheckoutOutcome> {
        self.call(
            Method::POST,
            "/api/ledger/checkout",
            &session.credentials.access_token,
            Some(&CheckoutRequest { listing_ids }),
        )
        .await
    }

    async fn submit_feedback(
        &self,
        session: &ClientSession,
        purchase_id: String,
        rating: i64,
        comment: String,
    ) -> MarketResult<FeedbackOutcome> {
        self.call(
            Method::POST,
            "/api/ledger/feedback",
            &session.credentials.access_token,
            Some(&FeedbackRequest {
                purchase_id,
                rating,
                comment,
            }),
        )
        .await
    }

    async fn check_attendance(&self, session: &ClientSession) -> MarketResult<AttendanceOutcome> {
        self.call::<(), _>(
            Method::POST,
            "/api/ledger/attendance",
            &session.credentials.access_token,
            None,
        )
        .await
    }

    async fn spin_roulette(&self, session: &ClientSession) -> MarketResult<RouletteOutcome> {
        self.call::<(), _>(
            Method::POST,
            "/api/ledger/roulette",
            &session.credentials.access_token,
            None,
        )
        .await
    }

    async fn submit_quiz(
        &self,
        session: &ClientSession,
        event_id: String,
        answers: Vec<String>,
    ) -> MarketResult<QuizOutcome> {
        self.call(
            Method::POST,
            &format!("/api/events/{}/quiz", event_id),
            &session.credentials.access_token,
            Some(&QuizAnswersRequest { answers }),
        )
        .await
    }

    async fn participate_first_come(
        &self,
        session: &ClientSession,
        event_id: String,
        comment: Option<String>,
    ) -> MarketResult<FirstComeOutcome> {
        self.call(
            Method::POST,
            &format!("/api/events/{}/first-come", event_id),
            &session.credentials.access_token,
            Some(&FirstComeRequest { comment }),
        )
        .await
    }

    async fn submit_comment(
        &self,
        session: &ClientSession,
        event_id: String,
        comment: String,
    ) -> MarketResult<CommentOutcome> {
        self.call(
            Method::POST,
            &format!("/api/events/{}/comment", event_id),
            &session.credentials.access_token,
            Some(&CommentRequest { comment }),
        )
        .await
    }

    async fn fetch_balance(&self, session: &ClientSession) -> MarketResult<i64> {
        let profile: AccountProfile = self
            .call::<(), _>(Method::GET, "/api/me", &session.credentials.access_token, None)
            .await?;
        Ok(profile.points)
    }
}

#[async_trait]
impl SessionBackend for HttpLedgerBackend {
    async fn fetch_profile(&self, credentials: &Credentials) -> MarketResult<AccountProfile> {
        self.call::<(), _>(Method::GET, "/api/me", &credentials.access_token, None)
            .await
    }

    async fn sign_out(&self, credentials: &Credentials) -> MarketResult<()> {
        let _: serde_json::Value = self
            .call::<(), _>(Method::POST, "/api/auth/logout", &credentials.access_token, None)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_error_uses_wire_code() {
        let err = decode_error(
            StatusCode::CONFLICT,
            Some(ErrorResponse {
                error: "AlreadyCheckedIn".to_string(),
                message: "Already checked in today".to_string(),
                details: None,
            }),
        );
        assert!(matches!(err, MarketError::AlreadyCheckedIn));

        assert!(matches!(
            decode_error(StatusCode::BAD_GATEWAY, None),
            MarketError::UpstreamFailure(_)
        ));
        assert!(matches!(
            decode_error(StatusCode::IM_A_TEAPOT, None),
            MarketError::Internal(_)
        ));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_upstream_failure() {
        let backend = HttpLedgerBackend::new("http://127.0.0.1:9", Duration::from_millis(200)).unwrap();
        let session = ClientSession {
            account_id: "lee".to_string(),
            credentials: Credentials {
                access_token: "a".to_string(),
                refresh_token: "r".to_string(),
            },
        };

        assert!(matches!(
            backend.check_attendance(&session).await,
            Err(MarketError::UpstreamFailure(_))
        ));
    }
}
