/// Session state-holder
///
/// Lifecycle: `Uninitialized → Loading → Authenticated | Anonymous`.
/// Initialization runs once with a bounded timeout. External auth events
/// funnel through one debounced handler so a burst of them causes a single
/// profile refetch.
use crate::{
    account::{AccountProfile, Credentials},
    client::{BalanceStore, SessionBackend},
    error::MarketResult,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, OnceCell, RwLock};

pub const DEFAULT_INIT_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

/// Where the session currently stands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Loading,
    Authenticated(AccountProfile),
    Anonymous,
}

/// Auth event raised outside the store (sign-in form, token refresher, other tabs)
#[derive(Debug, Clone)]
pub enum AuthEvent {
    SignedIn(Credentials),
    TokenRefreshed(Credentials),
    SignedOut,
}

struct Inner {
    state: RwLock<SessionState>,
    balance: Arc<BalanceStore>,
    backend: Arc<dyn SessionBackend>,
}

impl Inner {
    async fn load_profile(&self, credentials: Credentials) {
        match self.backend.fetch_profile(&credentials).await {
            Ok(profile) => {
                if let Err(e) = self.balance.set_account(profile.clone(), credentials).await {
                    tracing::warn!("Failed to persist session: {}", e);
                }
                *self.state.write().await = SessionState::Authenticated(profile);
            }
            Err(e) => {
                tracing::warn!("Profile fetch failed, signing out locally: {}", e);
                self.sign_out_locally().await;
            }
        }
    }

    async fn sign_out_locally(&self) {
        if let Err(e) = self.balance.clear().await {
            tracing::warn!("Failed to clear session cache: {}", e);
        }
        *self.state.write().await = SessionState::Anonymous;
    }

    async fn handle(&self, event: AuthEvent) {
        match event {
            AuthEvent::SignedIn(credentials) | AuthEvent::TokenRefreshed(credentials) => {
                self.load_profile(credentials).await
            }
            AuthEvent::SignedOut => self.sign_out_locally().await,
        }
    }
}

/// Session store
pub struct SessionStore {
    inner: Arc<Inner>,
    events: mpsc::UnboundedSender<AuthEvent>,
    init: OnceCell<()>,
    init_timeout: Duration,
}

impl SessionStore {
    /// Create the store and start its event handler
    pub fn new(
        balance: Arc<BalanceStore>,
        backend: Arc<dyn SessionBackend>,
        init_timeout: Duration,
        debounce: Duration,
    ) -> Self {
        let inner = Arc::new(Inner {
            state: RwLock::new(SessionState::Uninitialized),
            balance,
            backend,
        });

        let (events, receiver) = mpsc::unbounded_channel();
        tokio::spawn(run_event_loop(inner.clone(), receiver, debounce));

        Self {
            inner,
            events,
            init: OnceCell::new(),
            init_timeout,
        }
    }

    pub async fn state(&self) -> SessionState {
        self.inner.state.read().await.clone()
    }

    /// Restore the persisted session, once. Timeout or failure leaves the
    /// store anonymous with the cached account and balance cleared.
    pub async fn initialize(&self) -> SessionState {
        self.init
            .get_or_init(|| async {
                *self.inner.state.write().await = SessionState::Loading;

                let Some(credentials) = self.inner.balance.credentials().await else {
                    *self.inner.state.write().await = SessionState::Anonymous;
                    return;
                };

                let restore = self.inner.load_profile(credentials);
                if tokio::time::timeout(self.init_timeout, restore).await.is_err() {
                    tracing::warn!(
                        timeout_ms = self.init_timeout.as_millis() as u64,
                        "Session restore timed out"
                    );
                    self.inner.sign_out_locally().await;
                }
            })
            .await;

        self.state().await
    }

    /// Queue an external auth event for the debounced handler
    pub fn dispatch(&self, event: AuthEvent) {
        if self.events.send(event).is_err() {
            tracing::debug!("Session event handler stopped, dropping event");
        }
    }

    /// Clear local state first, then tell the backend
    pub async fn logout(&self) -> MarketResult<()> {
        let credentials = self.inner.balance.credentials().await;
        self.inner.sign_out_locally().await;

        match credentials {
            Some(credentials) => self.inner.backend.sign_out(&credentials).await,
            None => Ok(()),
        }
    }
}

/// Collapse bursts: after an event arrives, keep taking events until the
/// channel has been quiet for `debounce`, then handle the last one.
async fn run_event_loop(
    inner: Arc<Inner>,
    mut receiver: mpsc::UnboundedReceiver<AuthEvent>,
    debounce: Duration,
) {
    while let Some(mut event) = receiver.recv().await {
        loop {
            match tokio::time::timeout(debounce, receiver.recv()).await {
                Ok(Some(next)) => event = next,
                Ok(None) => {
                    inner.handle(event).await;
                    return;
                }
                Err(_) => break,
            }
        }
        inner.handle(event).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{admin::Role, error::MarketError};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[derive(Default)]
    struct FakeBackend {
        fetches: AtomicU64,
        sign_outs: AtomicU64,
        delay: Duration,
        reject: bool,
    }

    #[async_trait]
    impl SessionBackend for FakeBackend {
        async fn fetch_profile(&self, _: &Credentials) -> MarketResult<AccountProfile> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if self.reject {
                return Err(MarketError::Unauthenticated("expired".to_string()));
            }
            Ok(AccountProfile {
                id: "lee".to_string(),
                email: "lee@example.com".to_string(),
                nickname: "lee".to_string(),
                role: Role::Parent,
                points: 1000,
            })
        }

        async fn sign_out(&self, _: &Credentials) -> MarketResult<()> {
            self.sign_outs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn credentials() -> Credentials {
        Credentials {
            access_token: "a".to_string(),
            refresh_token: "r".to_string(),
        }
    }

    async fn balance_with_credentials() -> Arc<BalanceStore> {
        let balance = Arc::new(BalanceStore::new(None));
        balance.set_credentials(credentials()).await.unwrap();
        balance
    }

    #[tokio::test]
    async fn test_initialize_without_credentials_is_anonymous() {
        let backend = Arc::new(FakeBackend::default());
        let store = SessionStore::new(
            Arc::new(BalanceStore::new(None)),
            backend.clone(),
            DEFAULT_INIT_TIMEOUT,
            DEFAULT_DEBOUNCE,
        );

        assert_eq!(store.state().await, SessionState::Uninitialized);
        assert_eq!(store.initialize().await, SessionState::Anonymous);
        assert_eq!(backend.fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_initialize_restores_once() {
        let backend = Arc::new(FakeBackend::default());
        let balance = balance_with_credentials().await;
        let store = SessionStore::new(balance.clone(), backend.clone(), DEFAULT_INIT_TIMEOUT, DEFAULT_DEBOUNCE);

        assert!(matches!(store.initialize().await, SessionState::Authenticated(_)));
        assert!(matches!(store.initialize().await, SessionState::Authenticated(_)));
        assert_eq!(backend.fetches.load(Ordering::SeqCst), 1);
        assert_eq!(balance.balance().await, Some(1000));
    }

    #[tokio::test]
    async fn test_initialize_timeout_falls_back_to_anonymous() {
        let backend = Arc::new(FakeBackend {
            delay: Duration::from_millis(500),
            ..Default::default()
        });
        let balance = Arc::new(BalanceStore::new(None));
        let cached = AccountProfile {
            id: "lee".to_string(),
            email: "lee@example.com".to_string(),
            nickname: "lee".to_string(),
            role: Role::Parent,
            points: 970,
        };
        balance.set_account(cached, credentials()).await.unwrap();

        let store = SessionStore::new(balance.clone(), backend, Duration::from_millis(20), DEFAULT_DEBOUNCE);

        assert_eq!(store.initialize().await, SessionState::Anonymous);
        assert_eq!(balance.balance().await, None);
        assert!(balance.credentials().await.is_none());
        assert!(matches!(balance.session().await, Err(MarketError::Unauthenticated(_))));
    }

    #[tokio::test]
    async fn test_rejected_credentials_clear_local_state() {
        let backend = Arc::new(FakeBackend {
            reject: true,
            ..Default::default()
        });
        let balance = balance_with_credentials().await;
        let store = SessionStore::new(balance.clone(), backend, DEFAULT_INIT_TIMEOUT, DEFAULT_DEBOUNCE);

        assert_eq!(store.initialize().await, SessionState::Anonymous);
        assert!(balance.credentials().await.is_none());
    }

    #[tokio::test]
    async fn test_event_burst_causes_single_refetch() {
        let backend = Arc::new(FakeBackend::default());
        let store = SessionStore::new(
            Arc::new(BalanceStore::new(None)),
            backend.clone(),
            DEFAULT_INIT_TIMEOUT,
            Duration::from_millis(50),
        );

        store.dispatch(AuthEvent::SignedIn(credentials()));
        store.dispatch(AuthEvent::TokenRefreshed(credentials()));
        store.dispatch(AuthEvent::TokenRefreshed(credentials()));

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(backend.fetches.load(Ordering::SeqCst), 1);
        assert!(matches!(store.state().await, SessionState::Authenticated(_)));
    }

    #[tokio::test]
    async fn test_logout_clears_before_backend_sign_out() {
        let backend = Arc::new(FakeBackend::default());
        let balance = balance_with_credentials().await;
        let store = SessionStore::new(balance.clone(), backend.clone(), DEFAULT_INIT_TIMEOUT, DEFAULT_DEBOUNCE);
        store.initialize().await;

        store.logout().await.unwrap();
        assert_eq!(store.state().await, SessionState::Anonymous);
        assert!(balance.account().await.is_none());
        assert_eq!(backend.sign_outs.load(Ordering::SeqCst), 1);
    }
}
