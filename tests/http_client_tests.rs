/// Client library against the served HTTP API
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tempfile::TempDir;
use tokio::sync::Mutex;
use tokio_test::{assert_err, assert_ok};
use worksheet_market::{
    account::Credentials,
    admin::Role,
    assistant::DisabledQuizAssistant,
    catalog::ListingDraft,
    client::{
        session::DEFAULT_DEBOUNCE, BalanceStore, CartAggregate, ClientSession, HttpLedgerBackend,
        LedgerBackend, LedgerClient, SessionState, SessionStore,
    },
    db, server,
    storage::{disk::DiskBackend, ListingFileMeta},
    AppContext, MarketError, ServerConfig,
};

struct LiveMarket {
    ctx: AppContext,
    addr: SocketAddr,
    seller_id: String,
    _dir: TempDir,
}

impl LiveMarket {
    async fn start() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ServerConfig::for_tests(dir.path().to_path_buf());
        config.points.signup_bonus = 300;

        let pool = db::connect_in_memory().await.unwrap();
        let backend = Arc::new(DiskBackend::new(config.storage.files_directory.clone()));
        let ctx = AppContext::from_parts(config, pool, Arc::new(DisabledQuizAssistant), backend).unwrap();

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = server::build_router(ctx.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let seller = ctx
            .account_manager
            .create_account("kim@example.com", "teacher_kim", "correct horse", Role::Teacher)
            .await
            .unwrap();

        Self {
            ctx,
            addr,
            seller_id: seller.id,
            _dir: dir,
        }
    }

    fn backend(&self) -> Arc<HttpLedgerBackend> {
        Arc::new(HttpLedgerBackend::new(&format!("http://{}", self.addr), Duration::from_secs(5)).unwrap())
    }

    async fn publish(&self, title: &str, price: i64) -> String {
        let meta = ListingFileMeta {
            grade: "grade3".to_string(),
            subject: "math".to_string(),
            category: "worksheet".to_string(),
            page_count: 1,
        };
        let stored = self
            .ctx
            .files
            .upload_listing_file(&self.seller_id, &meta, "application/pdf", b"%PDF-1.4".to_vec())
            .await
            .unwrap();

        let draft = ListingDraft {
            title: title.to_string(),
            description: String::new(),
            grade: "grade3".to_string(),
            subject: "math".to_string(),
            category: "worksheet".to_string(),
            price,
            file_key: stored.key,
            preview_key: None,
            page_count: 1,
        };
        self.ctx
            .listings
            .create_listing(&self.seller_id, &draft)
            .await
            .unwrap()
            .id
    }

    async fn buyer(&self, nickname: &str) -> (String, Credentials) {
        let account = self
            .ctx
            .account_manager
            .create_account(&format!("{}@example.com", nickname), nickname, "correct horse", Role::Parent)
            .await
            .unwrap();
        let session = self.ctx.account_manager.create_session(&account.id).await.unwrap();
        (
            account.id,
            Credentials {
                access_token: session.access_token,
                refresh_token: session.refresh_token,
            },
        )
    }
}

#[tokio::test]
async fn test_session_checkout_and_attendance_over_http() {
    let market = LiveMarket::start().await;
    let ids = vec![market.publish("Addition", 100).await, market.publish("Subtraction", 150).await];
    let (buyer_id, credentials) = market.buyer("parent_lee").await;
    let backend = market.backend();

    // Profile restore decodes GET /api/me
    let balance = Arc::new(BalanceStore::new(None));
    balance.set_credentials(credentials).await.unwrap();
    let sessions = SessionStore::new(balance.clone(), backend.clone(), Duration::from_secs(5), DEFAULT_DEBOUNCE);
    match sessions.initialize().await {
        SessionState::Authenticated(profile) => assert_eq!(profile.id, buyer_id),
        other => panic!("expected authenticated session, got {:?}", other),
    }
    assert_eq!(balance.balance().await, Some(300));

    let mut cart = CartAggregate::new(Some(buyer_id.clone()));
    for id in &ids {
        cart.add_line(market.ctx.listings.get_listing(id).await.unwrap()).unwrap();
    }
    let client = LedgerClient::new(backend, balance.clone(), Arc::new(Mutex::new(cart)));

    let outcome = assert_ok!(client.checkout().await);
    assert_eq!(outcome.new_balance, 50);
    assert_eq!(outcome.purchase_ids.len(), 2);
    assert_eq!(balance.balance().await, Some(50));
    assert!(client.cart().lock().await.is_empty());

    let attendance = assert_ok!(client.check_attendance().await);
    assert_eq!(attendance.streak, 1);
    assert_eq!(balance.balance().await, Some(attendance.new_balance));

    let err = assert_err!(client.check_attendance().await);
    assert!(matches!(err, MarketError::AlreadyCheckedIn));
    assert_eq!(balance.balance().await, Some(attendance.new_balance));

    assert_eq!(
        market.ctx.ledger.get_balance(&buyer_id).await.unwrap(),
        attendance.new_balance
    );
}

#[tokio::test]
async fn test_insufficient_balance_keeps_amounts_over_http() {
    let market = LiveMarket::start().await;
    let ids = vec![market.publish("Addition", 100).await, market.publish("Subtraction", 150).await];
    let warmup = market.publish("Warm-up", 200).await;
    let (buyer_id, credentials) = market.buyer("parent_lee").await;
    market.ctx.ledger.checkout(&buyer_id, &[warmup]).await.unwrap();

    // Straight to the backend, past the client's local affordability check
    let session = ClientSession {
        account_id: buyer_id.clone(),
        credentials,
    };
    let err = assert_err!(market.backend().checkout(&session, ids).await);
    assert!(matches!(
        err,
        MarketError::InsufficientBalance { required: 250, available: 100 }
    ));
    assert_eq!(err.to_string(), "Insufficient balance: need 250, have 100");
    assert_eq!(market.ctx.ledger.get_balance(&buyer_id).await.unwrap(), 100);
}
