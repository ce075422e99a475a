/// Balance store
///
/// Holds the signed-in account, its last confirmed balance and the session
/// credentials. The balance only changes from confirmed ledger responses;
/// nothing here computes one.
use crate::{
    account::{AccountProfile, Credentials},
    client::ClientSession,
    error::{MarketError, MarketResult},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snapshot {
    account: Option<AccountProfile>,
    balance: Option<i64>,
    credentials: Option<Credentials>,
}

/// Balance store with optional JSON persistence
pub struct BalanceStore {
    state: RwLock<Snapshot>,
    cache_path: Option<PathBuf>,
}

impl BalanceStore {
    /// Empty store; `cache_path` enables persistence
    pub fn new(cache_path: Option<PathBuf>) -> Self {
        Self {
            state: RwLock::new(Snapshot::default()),
            cache_path,
        }
    }

    /// Load a previously persisted store. A missing file yields an empty store.
    pub async fn restore(cache_path: PathBuf) -> MarketResult<Self> {
        let snapshot = match tokio::fs::read(&cache_path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                tracing::warn!("Discarding unreadable session cache {:?}: {}", cache_path, e);
                Snapshot::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Snapshot::default(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            state: RwLock::new(snapshot),
            cache_path: Some(cache_path),
        })
    }

    /// Replace identity, balance and credentials wholesale
    pub async fn set_account(&self, account: AccountProfile, credentials: Credentials) -> MarketResult<()> {
        let mut state = self.state.write().await;
        state.balance = Some(account.points);
        state.account = Some(account);
        state.credentials = Some(credentials);
        self.persist(&state).await
    }

    /// Replace the credentials only (token refresh)
    pub async fn set_credentials(&self, credentials: Credentials) -> MarketResult<()> {
        let mut state = self.state.write().await;
        state.credentials = Some(credentials);
        self.persist(&state).await
    }

    /// Record a confirmed balance.
    ///
    /// Returns false, changing nothing, when no account is held or the
    /// response belongs to a different account.
    pub async fn update_balance(&self, account_id: &str, new_balance: i64) -> bool {
        let mut state = self.state.write().await;

        let held = state.account.as_ref().map(|a| a.id.as_str());
        if held != Some(account_id) {
            tracing::debug!(
                account_id,
                held = ?held,
                "Discarding balance update for another account"
            );
            return false;
        }

        state.balance = Some(new_balance);
        if let Some(account) = state.account.as_mut() {
            account.points = new_balance;
        }
        if let Err(e) = self.persist(&state).await {
            tracing::warn!("Failed to persist balance: {}", e);
        }
        true
    }

    /// Wipe everything, in memory and on disk
    pub async fn clear(&self) -> MarketResult<()> {
        let mut state = self.state.write().await;
        *state = Snapshot::default();

        if let Some(path) = &self.cache_path {
            match tokio::fs::remove_file(path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    pub async fn balance(&self) -> Option<i64> {
        self.state.read().await.balance
    }

    pub async fn account(&self) -> Option<AccountProfile> {
        self.state.read().await.account.clone()
    }

    pub async fn credentials(&self) -> Option<Credentials> {
        self.state.read().await.credentials.clone()
    }

    /// Current session, or `Unauthenticated`
    pub async fn session(&self) -> MarketResult<ClientSession> {
        let state = self.state.read().await;
        match (&state.account, &state.credentials) {
            (Some(account), Some(credentials)) => Ok(ClientSession {
                account_id: account.id.clone(),
                credentials: credentials.clone(),
            }),
            _ => Err(MarketError::Unauthenticated("Not signed in".to_string())),
        }
    }

    async fn persist(&self, snapshot: &Snapshot) -> MarketResult<()> {
        let Some(path) = &self.cache_path else {
            return Ok(());
        };
        write_atomically(path, snapshot).await
    }
}

/// Write to a sibling temp file, then rename over the target
async fn write_atomically(path: &Path, snapshot: &Snapshot) -> MarketResult<()> {
    let bytes = serde_json::to_vec(snapshot)
        .map_err(|e| MarketError::Internal(format!("Failed to encode session cache: {}", e)))?;

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let temp = path.with_extension("tmp");
    tokio::fs::write(&temp, bytes).await?;
    tokio::fs::rename(&temp, path).await?;
    Ok(())
}
