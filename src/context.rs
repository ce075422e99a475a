/// Application context and dependency injection
use crate::{
    account::AccountManager,
    admin::{EventManager, RoleManager},
    assistant::{self, QuizAssistant},
    cart::CartManager,
    catalog::ListingManager,
    config::ServerConfig,
    db,
    error::{MarketError, MarketResult},
    ledger::LedgerManager,
    mailer::Mailer,
    notifications::NotificationManager,
    rate_limit::RateLimiter,
    storage::{disk::DiskBackend, FileStore, StorageBackend},
};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub db: SqlitePool,
    pub account_manager: Arc<AccountManager>,
    pub role_manager: Arc<RoleManager>,
    pub ledger: Arc<LedgerManager>,
    pub listings: Arc<ListingManager>,
    pub cart: Arc<CartManager>,
    pub events: Arc<EventManager>,
    pub notifications: Arc<NotificationManager>,
    pub files: Arc<FileStore>,
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: ServerConfig) -> MarketResult<Self> {
        config.validate()?;

        Self::ensure_directories(&config).await?;

        let db = db::create_pool(&config.storage.database, db::DatabaseOptions::default()).await?;
        db::run_migrations(&db).await?;
        db::test_connection(&db).await?;

        let assistant = assistant::from_config(&config.assistant)?;
        let backend: Arc<dyn StorageBackend> =
            Arc::new(DiskBackend::new(config.storage.files_directory.clone()));

        Self::from_parts(config, db, assistant, backend)
    }

    /// Wire the managers over an existing pool, assistant and storage backend
    pub fn from_parts(
        config: ServerConfig,
        db: SqlitePool,
        assistant: Arc<dyn QuizAssistant>,
        backend: Arc<dyn StorageBackend>,
    ) -> MarketResult<Self> {
        let config = Arc::new(config);
        let mailer = Mailer::new(config.email.clone())?;
        if !mailer.is_configured() {
            tracing::info!("SMTP not configured, edit notifications are in-app only");
        }

        let account_manager = Arc::new(AccountManager::new(db.clone(), Arc::clone(&config)));
        let role_manager = Arc::new(RoleManager::new(db.clone()));
        let ledger = Arc::new(LedgerManager::new(
            db.clone(),
            config.points.clone(),
            Arc::clone(&assistant),
        ));
        let listings = Arc::new(ListingManager::new(
            db.clone(),
            &config.points,
            mailer,
            &config.service.public_url,
        ));
        let cart = Arc::new(CartManager::new(db.clone()));
        let events = Arc::new(EventManager::new(db.clone(), assistant));
        let notifications = Arc::new(NotificationManager::new(db.clone()));
        let files = Arc::new(FileStore::new(
            backend,
            db.clone(),
            &config.storage,
            &config.authentication.jwt_secret,
            &config.service.public_url,
        ));
        let rate_limiter = Arc::new(RateLimiter::new(&config.rate_limit));

        Ok(Self {
            config,
            db,
            account_manager,
            role_manager,
            ledger,
            listings,
            cart,
            events,
            notifications,
            files,
            rate_limiter,
        })
    }

    /// Ensure required directories exist
    async fn ensure_directories(config: &ServerConfig) -> MarketResult<()> {
        let dirs = [&config.storage.data_directory, &config.storage.files_directory];

        for dir in dirs {
            if !dir.exists() {
                tokio::fs::create_dir_all(dir).await.map_err(|e| {
                    MarketError::Internal(format!("Failed to create directory {:?}: {}", dir, e))
                })?;
            }
        }

        Ok(())
    }
}
