/// Ledger client
///
/// The only client path to balance-changing backend operations. Each call:
///
/// * fails fast with `OperationPending` while the same operation is in flight
/// * runs on a spawned task, so dropping the caller's future does not cancel
///   the backend call or the balance refresh that follows it
/// * never retries; after an `UpstreamFailure` it re-reads the balance instead
use crate::{
    client::{BalanceStore, CartAggregate, ClientSession, LedgerBackend},
    error::{MarketError, MarketResult},
    ledger::{
        AttendanceOutcome, CheckoutOutcome, CommentOutcome, FeedbackOutcome, FirstComeOutcome,
        QuizOutcome, RouletteOutcome,
    },
    validation,
};
use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex;

/// Outcomes that carry the account's confirmed balance
pub trait BalanceBearing {
    fn new_balance(&self) -> Option<i64>;
}

macro_rules! balance_bearing {
    ($($outcome:ty),*) => {
        $(impl BalanceBearing for $outcome {
            fn new_balance(&self) -> Option<i64> {
                Some(self.new_balance)
            }
        })*
    };
}

balance_bearing!(
    CheckoutOutcome,
    FeedbackOutcome,
    AttendanceOutcome,
    RouletteOutcome,
    QuizOutcome,
    FirstComeOutcome
);

impl BalanceBearing for CommentOutcome {
    fn new_balance(&self) -> Option<i64> {
        None
    }
}

/// Releases an in-flight key when the backend call finishes
struct PendingGuard {
    key: String,
    pending: Arc<StdMutex<HashSet<String>>>,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        pending.remove(&self.key);
    }
}

/// Ledger client
#[derive(Clone)]
pub struct LedgerClient {
    backend: Arc<dyn LedgerBackend>,
    balance: Arc<BalanceStore>,
    cart: Arc<Mutex<CartAggregate>>,
    pending: Arc<StdMutex<HashSet<String>>>,
}

impl LedgerClient {
    pub fn new(
        backend: Arc<dyn LedgerBackend>,
        balance: Arc<BalanceStore>,
        cart: Arc<Mutex<CartAggregate>>,
    ) -> Self {
        Self {
            backend,
            balance,
            cart,
            pending: Arc::new(StdMutex::new(HashSet::new())),
        }
    }

    pub fn cart(&self) -> Arc<Mutex<CartAggregate>> {
        self.cart.clone()
    }

    /// True while an operation with this key is in flight
    pub fn is_pending(&self, key: &str) -> bool {
        let pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        pending.contains(key)
    }

    fn acquire(&self, key: String) -> MarketResult<PendingGuard> {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        if !pending.insert(key.clone()) {
            tracing::debug!(operation = %key, "Rejecting duplicate submission");
            return Err(MarketError::OperationPending(key));
        }

        Ok(PendingGuard {
            key,
            pending: self.pending.clone(),
        })
    }

    /// Run one backend mutation on its own task and fold the result into the
    /// balance store.
    async fn run<T, F, Fut>(&self, key: String, op: F) -> MarketResult<T>
    where
        T: BalanceBearing + Send + 'static,
        F: FnOnce(Arc<dyn LedgerBackend>, ClientSession) -> Fut + Send + 'static,
        Fut: Future<Output = MarketResult<T>> + Send + 'static,
    {
        let session = self.balance.session().await?;
        let guard = self.acquire(key)?;

        let backend = self.backend.clone();
        let balance = self.balance.clone();

        let handle = tokio::spawn(async move {
            let _guard = guard;
            let result = op(backend.clone(), session.clone()).await;

            match &result {
                Ok(outcome) => {
                    if let Some(new_balance) = outcome.new_balance() {
                        balance.update_balance(&session.account_id, new_balance).await;
                    }
                }
                Err(MarketError::UpstreamFailure(reason)) => {
                    tracing::warn!("Ledger call failed upstream, refreshing balance: {}", reason);
                    refresh(&*backend, &balance, &session).await;
                }
                Err(_) => {}
            }

            result
        });

        handle
            .await
            .map_err(|e| MarketError::Internal(format!("Ledger task failed: {}", e)))?
    }

    /// Buy every resolved cart line in one backend call.
    ///
    /// On success the bought lines leave the cart; on failure the cart and
    /// balance are left as they were.
    pub async fn checkout(&self) -> MarketResult<CheckoutOutcome> {
        let listing_ids = {
            let cart = self.cart.lock().await;
            let listing_ids = cart.resolved_listing_ids();
            if listing_ids.is_empty() {
                return Err(MarketError::Validation("Cart is empty".to_string()));
            }
            if let Some(balance) = self.balance.balance().await {
                let total = cart.compute_totals().total;
                if !cart.can_afford(balance) {
                    return Err(MarketError::InsufficientBalance {
                        required: total,
                        available: balance,
                    });
                }
            }
            listing_ids
        };

        let cart = self.cart.clone();
        self.run("checkout".to_string(), move |backend, session| async move {
            let outcome = backend.checkout(&session, listing_ids.clone()).await?;
            cart.lock().await.mark_purchased(&listing_ids);
            Ok(outcome)
        })
        .await
    }

    pub async fn submit_feedback(
        &self,
        purchase_id: &str,
        rating: i64,
        comment: &str,
    ) -> MarketResult<FeedbackOutcome> {
        validation::validate_feedback(rating, comment)?;

        let purchase_id = purchase_id.to_string();
        let comment = comment.to_string();
        self.run(
            format!("feedback:{}", purchase_id),
            move |backend, session| async move {
                backend
                    .submit_feedback(&session, purchase_id, rating, comment)
                    .await
            },
        )
        .await
    }

    pub async fn check_attendance(&self) -> MarketResult<AttendanceOutcome> {
        self.run("attendance".to_string(), |backend, session| async move {
            backend.check_attendance(&session).await
        })
        .await
    }

    pub async fn spin_roulette(&self) -> MarketResult<RouletteOutcome> {
        self.run("roulette".to_string(), |backend, session| async move {
            backend.spin_roulette(&session).await
        })
        .await
    }

    pub async fn submit_quiz(&self, event_id: &str, answers: Vec<String>) -> MarketResult<QuizOutcome> {
        let event_id = event_id.to_string();
        self.run(
            format!("event:{}", event_id),
            move |backend, session| async move { backend.submit_quiz(&session, event_id, answers).await },
        )
        .await
    }

    pub async fn participate_first_come(
        &self,
        event_id: &str,
        comment: Option<String>,
    ) -> MarketResult<FirstComeOutcome> {
        let event_id = event_id.to_string();
        self.run(
            format!("event:{}", event_id),
            move |backend, session| async move {
                backend
                    .participate_first_come(&session, event_id, comment)
                    .await
            },
        )
        .await
    }

    pub async fn submit_comment(&self, event_id: &str, comment: &str) -> MarketResult<CommentOutcome> {
        let event_id = event_id.to_string();
        let comment = comment.to_string();
        self.run(
            format!("event:{}", event_id),
            move |backend, session| async move { backend.submit_comment(&session, event_id, comment).await },
        )
        .await
    }

    /// Re-read the balance from the backend
    pub async fn refresh_balance(&self) -> MarketResult<i64> {
        let session = self.balance.session().await?;
        let balance = self.backend.fetch_balance(&session).await?;
        self.balance.update_balance(&session.account_id, balance).await;
        Ok(balance)
    }
}

async fn refresh(backend: &dyn LedgerBackend, balance: &BalanceStore, session: &ClientSession) {
    match backend.fetch_balance(session).await {
        Ok(current) => {
            balance.update_balance(&session.account_id, current).await;
        }
        Err(e) => tracing::warn!("Balance refresh failed: {}", e),
    }
}
