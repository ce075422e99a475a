/// HTTP API tests against the full router with an in-memory database
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;
use worksheet_market::{
    assistant::CannedQuizAssistant,
    db,
    server::build_router,
    storage::{disk::DiskBackend, StorageBackend},
    AppContext, ServerConfig,
};

struct TestApp {
    router: Router,
    ctx: AppContext,
    _dir: TempDir,
}

impl TestApp {
    async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig::for_tests(dir.path().to_path_buf());
        tokio::fs::create_dir_all(&config.storage.files_directory).await.unwrap();

        let pool = db::connect_in_memory().await.unwrap();
        let assistant = Arc::new(CannedQuizAssistant {
            drafts: vec![],
            score: Some(80),
        });
        let backend: Arc<dyn StorageBackend> =
            Arc::new(DiskBackend::new(config.storage.files_directory.clone()));

        let ctx = AppContext::from_parts(config, pool, assistant, backend).unwrap();
        Self {
            router: build_router(ctx.clone()),
            ctx,
            _dir: dir,
        }
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, body.to_vec())
    }

    async fn call(&self, method: Method, path: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let (status, bytes) = self.send(request).await;
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    /// Sign up and return (account id, access token)
    async fn signup(&self, nickname: &str, role: &str) -> (String, String) {
        let (status, body) = self
            .call(
                Method::POST,
                "/api/auth/signup",
                None,
                Some(json!({
                    "email": format!("{}@example.com", nickname),
                    "nickname": nickname,
                    "password": "correct horse",
                    "role": role,
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        (
            body["account"]["id"].as_str().unwrap().to_string(),
            body["credentials"]["accessToken"].as_str().unwrap().to_string(),
        )
    }

    async fn make_admin(&self, account_id: &str) {
        sqlx::query("UPDATE accounts SET role = 'admin' WHERE id = ?1")
            .bind(account_id)
            .execute(&self.ctx.db)
            .await
            .unwrap();
    }

    /// Upload a PDF and create a listing at `price`; returns the listing id
    async fn publish(&self, token: &str, title: &str, price: i64) -> String {
        let upload = Request::builder()
            .method(Method::POST)
            .uri("/api/files/listing?grade=grade3&subject=math&category=worksheet&pageCount=2")
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .header(header::CONTENT_TYPE, "application/pdf")
            .body(Body::from(format!("%PDF-1.4 {}", title)))
            .unwrap();
        let (status, bytes) = self.send(upload).await;
        assert_eq!(status, StatusCode::CREATED);
        let stored: Value = serde_json::from_slice(&bytes).unwrap();

        let (status, listing) = self
            .call(
                Method::POST,
                "/api/listings",
                Some(token),
                Some(json!({
                    "title": title,
                    "description": "Two pages of practice",
                    "grade": "grade3",
                    "subject": "math",
                    "category": "worksheet",
                    "price": price,
                    "fileKey": stored["key"],
                    "pageCount": 2,
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", listing);
        listing["id"].as_str().unwrap().to_string()
    }
}

#[tokio::test]
async fn test_health_metrics_and_fallback() {
    let app = TestApp::new().await;

    let (status, body) = app.call(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, body) = app.call(Method::GET, "/health/ready", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");

    let (status, _) = app.call(Method::GET, "/health/live", None, None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, metrics) = app
        .send(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(String::from_utf8(metrics).unwrap().contains("http_requests_total"));

    let (status, body) = app.call(Method::GET, "/nope", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "NotFound");
}

#[tokio::test]
async fn test_signup_session_lifecycle() {
    let app = TestApp::new().await;

    let (status, body) = app.call(Method::GET, "/api/me", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Unauthenticated");

    let (_, token) = app.signup("parent_lee", "parent").await;
    let (status, me) = app.call(Method::GET, "/api/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["points"], 1000);
    assert_eq!(me["role"], "parent");

    let (status, history) = app.call(Method::GET, "/api/me/transactions", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history.as_array().unwrap().len(), 1);
    assert_eq!(history[0]["amount"], 1000);

    // Duplicate email
    let (status, body) = app
        .call(
            Method::POST,
            "/api/auth/signup",
            None,
            Some(json!({
                "email": "parent_lee@example.com",
                "nickname": "someone_else",
                "password": "correct horse",
                "role": "parent",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "Conflict");

    // Admin cannot be chosen at signup
    let (status, _) = app
        .call(
            Method::POST,
            "/api/auth/signup",
            None,
            Some(json!({
                "email": "boss@example.com",
                "nickname": "boss",
                "password": "correct horse",
                "role": "admin",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, login) = app
        .call(
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "email": "parent_lee@example.com", "password": "correct horse" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let refresh_token = login["credentials"]["refreshToken"].as_str().unwrap().to_string();

    let (status, refreshed) = app
        .call(
            Method::POST,
            "/api/auth/refresh",
            None,
            Some(json!({ "refreshToken": refresh_token })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let new_token = refreshed["credentials"]["accessToken"].as_str().unwrap().to_string();

    // Refresh tokens are single-use
    let (status, _) = app
        .call(
            Method::POST,
            "/api/auth/refresh",
            None,
            Some(json!({ "refreshToken": refresh_token })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app.call(Method::POST, "/api/auth/logout", Some(&new_token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let (status, _) = app.call(Method::GET, "/api/me", Some(&new_token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_purchase_download_and_feedback_flow() {
    let app = TestApp::new().await;
    let (_, seller) = app.signup("teacher_kim", "teacher").await;
    let (_, buyer) = app.signup("parent_lee", "parent").await;

    let listing_id = app.publish(&seller, "Fractions drill", 300).await;

    // Parents cannot sell
    let (status, _) = app
        .send(
            Request::builder()
                .method(Method::POST)
                .uri("/api/files/listing?grade=g&subject=s&category=c&pageCount=1")
                .header(header::AUTHORIZATION, format!("Bearer {}", buyer))
                .header(header::CONTENT_TYPE, "application/pdf")
                .body(Body::from("%PDF-1.4"))
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Sellers cannot cart their own listing
    let (status, body) = app
        .call(Method::POST, "/api/cart", Some(&seller), Some(json!({ "listingId": listing_id })))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "SelfPurchase");

    let (status, lines) = app
        .call(Method::POST, "/api/cart", Some(&buyer), Some(json!({ "listingId": listing_id })))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(lines.as_array().unwrap().len(), 1);

    let (status, body) = app
        .call(Method::POST, "/api/cart", Some(&buyer), Some(json!({ "listingId": listing_id })))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "DuplicateLine");

    // Nobody may download before buying
    let (status, _) = app
        .call(Method::POST, &format!("/api/listings/{}/download", listing_id), Some(&buyer), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, outcome) = app
        .call(
            Method::POST,
            "/api/ledger/checkout",
            Some(&buyer),
            Some(json!({ "listingIds": [listing_id] })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", outcome);
    assert_eq!(outcome["newBalance"], 700);
    assert_eq!(outcome["total"], 300);
    let purchase_id = outcome["purchaseIds"][0].as_str().unwrap().to_string();

    let (_, lines) = app.call(Method::GET, "/api/cart", Some(&buyer), None).await;
    assert!(lines.as_array().unwrap().is_empty());

    let (status, body) = app
        .call(
            Method::POST,
            "/api/ledger/checkout",
            Some(&buyer),
            Some(json!({ "listingIds": [listing_id] })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "AlreadyOwned");

    let (status, signed) = app
        .call(Method::POST, &format!("/api/listings/{}/download", listing_id), Some(&buyer), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let url = signed["url"].as_str().unwrap();
    let path = url.strip_prefix("http://localhost:8080").unwrap();

    let (status, bytes) = app
        .send(Request::builder().uri(path).body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(bytes, b"%PDF-1.4 Fractions drill".to_vec());

    let (status, _) = app
        .send(Request::builder().uri("/files/download?token=forged").body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let feedback = json!({ "purchaseId": purchase_id, "rating": 5, "comment": "Very clear pages" });
    let (status, refund) = app
        .call(Method::POST, "/api/ledger/feedback", Some(&buyer), Some(feedback.clone()))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(refund["refund"], 30);
    assert_eq!(refund["newBalance"], 730);

    let (status, body) = app
        .call(Method::POST, "/api/ledger/feedback", Some(&buyer), Some(feedback))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "AlreadyReviewed");

    let (status, purchases) = app.call(Method::GET, "/api/me/purchases", Some(&buyer), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(purchases[0]["feedbackGiven"], true);
}

#[tokio::test]
async fn test_insufficient_balance_keeps_cart() {
    let app = TestApp::new().await;
    let (_, seller) = app.signup("teacher_kim", "teacher").await;
    let (_, buyer) = app.signup("parent_lee", "parent").await;

    let mut ids = Vec::new();
    for (index, price) in [500, 500, 100].into_iter().enumerate() {
        let id = app.publish(&seller, &format!("Sheet {}", index), price).await;
        app.call(Method::POST, "/api/cart", Some(&buyer), Some(json!({ "listingId": id })))
            .await;
        ids.push(id);
    }

    let (status, body) = app
        .call(Method::POST, "/api/ledger/checkout", Some(&buyer), Some(json!({ "listingIds": ids })))
        .await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body["error"], "InsufficientBalance");

    let (_, me) = app.call(Method::GET, "/api/me", Some(&buyer), None).await;
    assert_eq!(me["points"], 1000);
    let (_, lines) = app.call(Method::GET, "/api/cart", Some(&buyer), None).await;
    assert_eq!(lines.as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_listing_edit_is_announced_once() {
    let app = TestApp::new().await;
    let (_, seller) = app.signup("teacher_kim", "teacher").await;
    let (_, buyer) = app.signup("parent_lee", "parent").await;
    let listing_id = app.publish(&seller, "Spelling list", 200).await;

    app.call(
        Method::POST,
        "/api/ledger/checkout",
        Some(&buyer),
        Some(json!({ "listingIds": [listing_id] })),
    )
    .await;

    let (status, body) = app
        .call(
            Method::PUT,
            &format!("/api/listings/{}", listing_id),
            Some(&seller),
            Some(json!({ "price": 600 })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "ValidationFailed");

    let (status, outcome) = app
        .call(
            Method::PUT,
            &format!("/api/listings/{}", listing_id),
            Some(&seller),
            Some(json!({ "price": 250 })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let changes = outcome["edit"]["changes"].as_str().unwrap();
    assert!(changes.contains("200") && changes.contains("250"));
    let edit_id = outcome["edit"]["id"].as_i64().unwrap();

    let (_, count) = app
        .call(Method::GET, "/api/notifications/unread-count", Some(&buyer), None)
        .await;
    assert_eq!(count["count"], 0);

    let notify = format!("/api/listings/{}/edits/{}/notify", listing_id, edit_id);
    let (status, _) = app.call(Method::POST, &notify, Some(&buyer), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, sent) = app.call(Method::POST, &notify, Some(&seller), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(sent["notified"], 1);

    let (status, body) = app.call(Method::POST, &notify, Some(&seller), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "AlreadyDone");

    let (_, notes) = app.call(Method::GET, "/api/notifications", Some(&buyer), None).await;
    assert_eq!(notes.as_array().unwrap().len(), 1);
    let note_id = notes[0]["id"].as_i64().unwrap();

    let (status, _) = app
        .call(Method::POST, &format!("/api/notifications/{}/read", note_id), Some(&buyer), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, count) = app
        .call(Method::GET, "/api/notifications/unread-count", Some(&buyer), None)
        .await;
    assert_eq!(count["count"], 0);
}

#[tokio::test]
async fn test_daily_rewards_once_per_day() {
    let app = TestApp::new().await;
    let (_, token) = app.signup("parent_lee", "parent").await;

    let (status, first) = app.call(Method::POST, "/api/ledger/attendance", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["streak"], 1);

    let (status, body) = app.call(Method::POST, "/api/ledger/attendance", Some(&token), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "AlreadyCheckedIn");

    let (status, spin) = app.call(Method::POST, "/api/ledger/roulette", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    let prize_index = spin["prizeIndex"].as_u64().unwrap() as usize;
    assert_eq!(spin["prizes"][prize_index], spin["prize"]);

    let (status, _) = app.call(Method::POST, "/api/ledger/roulette", Some(&token), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, daily) = app.call(Method::GET, "/api/ledger/daily", Some(&token), None).await;
    assert_eq!(daily["checkedInToday"], true);
    assert_eq!(daily["spunToday"], true);
}

#[tokio::test]
async fn test_comment_event_review_pays_once() {
    let app = TestApp::new().await;
    let (admin_id, admin) = app.signup("admin_park", "parent").await;
    app.make_admin(&admin_id).await;
    let (participant_id, participant) = app.signup("parent_lee", "parent").await;

    // Non-admins are kept out of the admin surface
    let (status, _) = app.call(Method::GET, "/api/admin/events", Some(&participant), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let now = chrono::Utc::now();
    let (status, event) = app
        .call(
            Method::POST,
            "/api/admin/events",
            Some(&admin),
            Some(json!({
                "kind": "comment",
                "title": "Share a study tip",
                "description": "Tell us how you study",
                "minPoints": 10,
                "maxPoints": 50,
                "minLength": 10,
                "reviewCriteria": "Specific and practical",
                "startsAt": now - chrono::Duration::hours(1),
                "endsAt": now + chrono::Duration::days(1),
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", event);
    let event_id = event["id"].as_str().unwrap().to_string();

    // Drafts are invisible to participants
    let (status, _) = app.call(Method::GET, &format!("/api/events/{}", event_id), None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .call(Method::POST, &format!("/api/admin/events/{}/activate", event_id), Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, active) = app.call(Method::GET, "/api/events", None, None).await;
    assert_eq!(active.as_array().unwrap().len(), 1);

    let (status, submitted) = app
        .call(
            Method::POST,
            &format!("/api/events/{}/comment", event_id),
            Some(&participant),
            Some(json!({ "comment": "I review my notes every evening." })),
        )
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(submitted["aiScore"], 80);
    let participation_id = submitted["participationId"].as_str().unwrap().to_string();

    let (_, pending) = app
        .call(
            Method::GET,
            &format!("/api/admin/participations?eventId={}", event_id),
            Some(&admin),
            None,
        )
        .await;
    assert_eq!(pending.as_array().unwrap().len(), 1);

    let decision = format!("/api/admin/participations/{}/decision", participation_id);
    let (status, outcome) = app
        .call(Method::POST, &decision, Some(&admin), Some(json!({ "approved": true })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["pointsAwarded"], 42);
    assert_eq!(outcome["newBalance"], 1042);

    let (status, body) = app
        .call(Method::POST, &decision, Some(&admin), Some(json!({ "approved": true })))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "AlreadyDecided");

    let (status, check) = app
        .call(
            Method::GET,
            &format!("/api/admin/accounts/{}/balance-check", participant_id),
            Some(&admin),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(check["consistent"], true);
    assert_eq!(check["stored"], 1042);

    let (_, audit) = app.call(Method::GET, "/api/admin/audit-log", Some(&admin), None).await;
    assert!(!audit.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_role_change_enables_selling() {
    let app = TestApp::new().await;
    let (admin_id, admin) = app.signup("admin_park", "parent").await;
    app.make_admin(&admin_id).await;
    let (user_id, user) = app.signup("parent_lee", "parent").await;

    let (status, profile) = app
        .call(
            Method::PUT,
            &format!("/api/admin/accounts/{}/role", user_id),
            Some(&admin),
            Some(json!({ "role": "teacher" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["role"], "teacher");

    let listing_id = app.publish(&user, "Now selling", 100).await;
    let (status, listing) = app.call(Method::GET, &format!("/api/listings/{}", listing_id), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listing["sellerId"], user_id);
    assert!(listing.get("fileKey").is_none());

    let (_, page) = app.call(Method::GET, "/api/listings?subject=math&sort=price_asc", None, None).await;
    assert_eq!(page["total"], 1);
}
