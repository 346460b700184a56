//! End-to-end tests: the real sync client against the router on a random port.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use std::net::SocketAddr;
use std::sync::Arc;

use pretty_assertions::assert_eq;
use revise_core::auth::{Credential, CredentialStore, MemoryCredentialPersistence};
use revise_core::config::ClientConfig;
use revise_core::connectivity::{HttpHealthProbe, ReachabilityProbe};
use revise_core::models::EntityKind;
use revise_core::services::LocalStore;
use revise_core::state::SyncState;
use revise_core::sync::{
    HttpSyncTransport, SkipReason, SyncClient, SyncError, SyncOutcome, SyncReport, SYNC_PATH,
};
use revise_core::{Deck, KnowledgeState};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use crate::auth::issue_test_token;
use crate::config::{test_config, AppConfig};
use crate::routes::{app_router, AppState};
use crate::store::SyncStore;

struct TestServer {
    addr: SocketAddr,
    config: Arc<AppConfig>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl TestServer {
    async fn start() -> Self {
        Self::start_with(&[]).await
    }

    async fn start_with(extra: &[(&str, &str)]) -> Self {
        let config = Arc::new(test_config(extra));
        let store = SyncStore::open_in_memory().unwrap();
        let state = AppState::new(config.clone(), store).unwrap();

        // Port 0 picks a free port
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            let result = axum::serve(listener, app_router(state))
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await;
            if let Err(error) = result {
                eprintln!("Test server error: {error}");
            }
        });

        Self {
            addr,
            config,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    fn token_for(&self, user_id: &str) -> String {
        issue_test_token(&self.config, user_id, Some("learner@example.com"))
    }

    /// A fresh device signed in as `user_id` with its own local store.
    fn device(&self, user_id: &str) -> Device {
        self.device_with_token(user_id, &self.token_for(user_id))
    }

    fn device_with_token(&self, user_id: &str, token: &str) -> Device {
        let credentials = CredentialStore::restore(MemoryCredentialPersistence::default()).unwrap();
        credentials
            .sign_in(Credential::new(token, user_id, None).unwrap())
            .unwrap();
        let client_config = ClientConfig::new(self.base_url()).unwrap();
        let transport = HttpSyncTransport::new(&client_config).unwrap();
        let client = SyncClient::new(
            LocalStore::open_in_memory().unwrap(),
            transport,
            credentials.subscribe(),
        );
        Device {
            client,
            _credentials: credentials,
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

struct Device {
    client: SyncClient<HttpSyncTransport>,
    _credentials: CredentialStore<MemoryCredentialPersistence>,
}

impl Device {
    fn store(&self) -> &LocalStore {
        self.client.store()
    }

    async fn save_deck(&self, id: &str, name: &str) {
        let deck = Deck::from_data(json!({ "id": id, "name": name, "cards": [] })).unwrap();
        self.store().save_deck(&deck).await.unwrap();
    }

    async fn deck_name(&self, id: &str) -> Option<String> {
        self.store()
            .get_deck(&id.parse().unwrap())
            .await
            .unwrap()
            .map(|deck| deck.name().to_string())
    }

    async fn sync(&self) -> SyncReport {
        match self.client.sync_now().await.unwrap() {
            SyncOutcome::Completed(report) => report,
            other => panic!("expected a completed round, got {other:?}"),
        }
    }
}

async fn post_sync(server: &TestServer, token: &str, body: Value) -> reqwest::Response {
    reqwest::Client::new()
        .post(format!("{}{SYNC_PATH}", server.base_url()))
        .bearer_auth(token)
        .json(&body)
        .send()
        .await
        .unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn healthz_reports_ok() {
    let server = TestServer::start().await;
    let body: Value = reqwest::get(format!("{}/healthz", server.base_url()))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["status"], "ok");
    assert_eq!(body["rate_limit"]["sync_allowed"], 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn first_sync_pushes_queue_and_sets_watermark() {
    let server = TestServer::start().await;
    let device = server.device("user-1");
    device.save_deck("d1", "Spanish verbs").await;

    let report = device.sync().await;

    assert_eq!(report.pushed, 1);
    assert_eq!(report.pulled, 1);
    assert_eq!(device.store().pending_count().await.unwrap(), 0);
    assert_eq!(
        device.store().watermark().await.unwrap(),
        Some(report.watermark)
    );
    let cached = device
        .store()
        .get_deck(&"d1".parse().unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(cached.last_modified, Some(report.watermark));
    assert_eq!(device.client.state(), SyncState::Succeeded);
}

#[tokio::test(flavor = "multi_thread")]
async fn second_device_pulls_decks_and_knowledge_states() {
    let server = TestServer::start().await;
    let laptop = server.device("user-1");
    laptop.save_deck("d1", "Spanish verbs").await;
    laptop
        .store()
        .save_knowledge_state(
            &KnowledgeState::from_data(json!({ "cardID": "c1", "box": 3 })).unwrap(),
        )
        .await
        .unwrap();
    laptop.sync().await;

    let phone = server.device("user-1");
    let report = phone.sync().await;

    assert_eq!(report.pushed, 0);
    assert_eq!(report.pulled, 2);
    assert_eq!(phone.deck_name("d1").await.as_deref(), Some("Spanish verbs"));
    let state = phone.store().get_knowledge_state("c1").await.unwrap().unwrap();
    assert_eq!(state.data["box"], 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn later_writer_wins_across_devices() {
    let server = TestServer::start().await;
    let laptop = server.device("user-1");
    let phone = server.device("user-1");
    laptop.save_deck("d1", "Original").await;
    laptop.sync().await;
    phone.sync().await;

    laptop.save_deck("d1", "Laptop edit").await;
    phone.save_deck("d1", "Phone edit").await;
    laptop.sync().await;
    phone.sync().await;
    laptop.sync().await;

    assert_eq!(laptop.deck_name("d1").await.as_deref(), Some("Phone edit"));
    assert_eq!(phone.deck_name("d1").await.as_deref(), Some("Phone edit"));
}

#[tokio::test(flavor = "multi_thread")]
async fn watermark_strictly_increases_across_empty_rounds() {
    let server = TestServer::start().await;
    let device = server.device("user-1");
    device.save_deck("d1", "Verbs").await;

    let first = device.sync().await;
    let second = device.sync().await;
    let third = device.sync().await;

    assert_eq!(second.pulled, 0);
    assert_eq!(third.pulled, 0);
    assert!(second.watermark > first.watermark);
    assert!(third.watermark > second.watermark);
}

#[tokio::test(flavor = "multi_thread")]
async fn other_users_records_stay_private() {
    let server = TestServer::start().await;
    let alice = server.device("alice");
    alice.save_deck("d-alice", "Alice deck").await;
    alice
        .store()
        .save_knowledge_state(&KnowledgeState::from_data(json!({ "cardID": "c1" })).unwrap())
        .await
        .unwrap();
    alice.sync().await;

    let bob = server.device("bob");
    let report = bob.sync().await;

    assert_eq!(report.pulled, 0);
    assert_eq!(bob.deck_name("d-alice").await, None);
}

#[tokio::test(flavor = "multi_thread")]
async fn invalid_token_skips_round_and_keeps_queue() {
    let server = TestServer::start().await;
    let device = server.device_with_token("user-1", "not-a-jwt");
    device.save_deck("d1", "Verbs").await;

    let outcome = device.client.sync_now().await.unwrap();

    assert_eq!(outcome, SyncOutcome::Skipped(SkipReason::Unauthorized));
    assert_eq!(device.store().pending_count().await.unwrap(), 1);
    assert_eq!(device.store().watermark().await.unwrap(), None);
}

#[tokio::test(flavor = "multi_thread")]
async fn deck_owned_by_another_user_is_rejected_and_queue_kept() {
    let server = TestServer::start().await;
    let alice = server.device("alice");
    alice.save_deck("shared-id", "Alice deck").await;
    alice.sync().await;

    let bob = server.device("bob");
    bob.save_deck("shared-id", "Bob deck").await;
    let error = bob.client.sync_now().await.unwrap_err();

    assert!(matches!(error, SyncError::Conflict(_)), "{error:?}");
    assert!(!error.is_retryable());
    assert_eq!(bob.store().pending_count().await.unwrap(), 1);
    assert_eq!(bob.store().watermark().await.unwrap(), None);
    assert_eq!(bob.client.state(), SyncState::Failed);
    assert_eq!(
        alice.deck_name("shared-id").await.as_deref(),
        Some("Alice deck")
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn discarding_conflicting_deck_lets_remaining_changes_sync() {
    let server = TestServer::start().await;
    let alice = server.device("alice");
    alice.save_deck("shared-id", "Alice deck").await;
    alice.sync().await;

    let bob = server.device("bob");
    bob.save_deck("shared-id", "Bob deck").await;
    bob.save_deck("bob-own", "Bob's own").await;
    for _ in 0..2 {
        let error = bob.client.sync_now().await.unwrap_err();
        assert!(matches!(error, SyncError::Conflict(_)), "{error:?}");
    }
    assert_eq!(bob.store().pending_count().await.unwrap(), 2);

    let discarded = bob
        .store()
        .discard_pending(EntityKind::Deck, "shared-id")
        .await
        .unwrap();
    assert_eq!(discarded, 1);
    let report = bob.sync().await;
    assert_eq!(report.pushed, 1);
    assert_eq!(bob.store().pending_count().await.unwrap(), 0);

    let other_device = server.device("bob");
    other_device.sync().await;
    assert_eq!(
        other_device.deck_name("bob-own").await.as_deref(),
        Some("Bob's own")
    );
    assert_eq!(other_device.deck_name("shared-id").await, None);
    assert_eq!(
        alice.deck_name("shared-id").await.as_deref(),
        Some("Alice deck")
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn replayed_batch_is_idempotent() {
    let server = TestServer::start().await;
    let token = server.token_for("user-1");
    let body = json!({
        "dirtyDecks": [{ "id": "d1", "name": "Verbs" }],
        "dirtyKnowledgeStates": [{ "cardID": "c1", "box": 1 }],
    });

    let first: Value = post_sync(&server, &token, body.clone()).await.json().await.unwrap();
    let second: Value = post_sync(&server, &token, body).await.json().await.unwrap();

    assert_eq!(first["updatedDecks"].as_array().unwrap().len(), 1);
    assert_eq!(second["updatedDecks"].as_array().unwrap().len(), 1);
    assert_eq!(second["updatedDecks"][0]["name"], "Verbs");
    assert_eq!(second["updatedKnowledgeStates"][0]["box"], 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn record_without_id_is_bad_request() {
    let server = TestServer::start().await;
    let token = server.token_for("user-1");

    let response = post_sync(&server, &token, json!({ "dirtyDecks": [{ "name": "x" }] })).await;

    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("id"));
}

#[tokio::test(flavor = "multi_thread")]
async fn malformed_body_is_bad_request() {
    let server = TestServer::start().await;
    let token = server.token_for("user-1");

    let response = post_sync(&server, &token, json!({ "dirtyDecks": "nope" })).await;

    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
}

#[tokio::test(flavor = "multi_thread")]
async fn oversized_batch_is_rejected() {
    let server = TestServer::start_with(&[("SYNC_MAX_BATCH", "1")]).await;
    let token = server.token_for("user-1");
    let body = json!({ "dirtyDecks": [{ "id": "d1" }, { "id": "d2" }] });

    let response = post_sync(&server, &token, body).await;

    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
}

#[tokio::test(flavor = "multi_thread")]
async fn sync_without_bearer_is_unauthorized() {
    let server = TestServer::start().await;

    let response = reqwest::Client::new()
        .post(format!("{}{SYNC_PATH}", server.base_url()))
        .json(&json!({}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::UNAUTHORIZED);
}

#[tokio::test(flavor = "multi_thread")]
async fn sync_rate_limit_returns_retry_after() {
    let server = TestServer::start_with(&[("SYNC_RATE_LIMIT_PER_WINDOW", "1")]).await;
    let token = server.token_for("user-1");

    let first = post_sync(&server, &token, json!({})).await;
    let second = post_sync(&server, &token, json!({})).await;

    assert_eq!(first.status(), reqwest::StatusCode::OK);
    assert_eq!(second.status(), reqwest::StatusCode::TOO_MANY_REQUESTS);
    assert!(second.headers().contains_key(reqwest::header::RETRY_AFTER));
}

#[tokio::test(flavor = "multi_thread")]
async fn profile_is_created_on_first_request() {
    let server = TestServer::start().await;
    let token = server.token_for("user-1");

    let profile: Value = reqwest::Client::new()
        .get(format!("{}/v1/profile", server.base_url()))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(profile["id"], "user-1");
    assert_eq!(profile["email"], "learner@example.com");
}

#[tokio::test(flavor = "multi_thread")]
async fn profile_fetches_leave_sync_budget_alone() {
    let server = TestServer::start_with(&[("SYNC_RATE_LIMIT_PER_WINDOW", "1")]).await;
    let token = server.token_for("user-1");

    for _ in 0..3 {
        let response = reqwest::Client::new()
            .get(format!("{}/v1/profile", server.base_url()))
            .bearer_auth(&token)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);
    }

    let sync = post_sync(&server, &token, json!({})).await;
    assert_eq!(sync.status(), reqwest::StatusCode::OK);
}

#[tokio::test(flavor = "multi_thread")]
async fn generation_without_api_key_is_server_error() {
    let server = TestServer::start().await;
    let token = server.token_for("user-1");

    let response = reqwest::Client::new()
        .post(format!("{}/v1/ai/distractors", server.base_url()))
        .bearer_auth(&token)
        .json(&json!({ "question": "2 + 2", "answer": "4" }))
        .send()
        .await
        .unwrap();

    assert_eq!(
        response.status(),
        reqwest::StatusCode::INTERNAL_SERVER_ERROR
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn health_probe_tracks_server_availability() {
    let server = TestServer::start().await;
    let config = ClientConfig::new(server.base_url()).unwrap();
    let probe = HttpHealthProbe::new(&config).unwrap();
    assert!(probe.reachable().await);

    drop(server);
    tokio::time::timeout(std::time::Duration::from_secs(5), async {
        while probe.reachable().await {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}
