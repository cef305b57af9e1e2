//! Integration tests for the onboarding REST surface.
//!
//! Each test spins up an Axum server on a random port backed by the mock
//! backend and drives the wizard over HTTP with reqwest.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::time::timeout;

use tenant_onboard::clock::SystemClock;
use tenant_onboard::config::OnboardingConfig;
use tenant_onboard::onboarding::{
    Collaborators, OnboardingManager, OnboardingRouteState, onboarding_routes,
};
use tenant_onboard::services::MockBackend;
use tenant_onboard::store::{KeyValueStore, MemoryStore, keys};

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(10);

struct TestServer {
    base: String,
    client: reqwest::Client,
    store: Arc<MemoryStore>,
}

impl TestServer {
    /// Start an Axum server on a random port.
    async fn start() -> Self {
        let store = Arc::new(MemoryStore::new());
        let backend = Arc::new(MockBackend::new("onkeypriv.com"));
        let manager = Arc::new(OnboardingManager::new(
            OnboardingConfig::default(),
            Collaborators::from_backend(backend),
            store.clone(),
            Arc::new(SystemClock),
        ));
        let app = onboarding_routes(OnboardingRouteState { manager });

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Give the server a moment to start accepting connections.
        tokio::time::sleep(Duration::from_millis(50)).await;

        Self {
            base: format!("http://127.0.0.1:{port}"),
            client: reqwest::Client::new(),
            store,
        }
    }

    async fn send(&self, method: reqwest::Method, path: &str, body: Value) -> (u16, Value) {
        let resp = self
            .client
            .request(method, format!("{}{path}", self.base))
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = resp.status().as_u16();
        let json = resp.json::<Value>().await.unwrap_or(Value::Null);
        (status, json)
    }

    async fn post(&self, path: &str, body: Value) -> (u16, Value) {
        self.send(reqwest::Method::POST, path, body).await
    }

    async fn put(&self, path: &str, body: Value) -> (u16, Value) {
        self.send(reqwest::Method::PUT, path, body).await
    }

    async fn get(&self, path: &str) -> (u16, Value) {
        let resp = self
            .client
            .get(format!("{}{path}", self.base))
            .send()
            .await
            .unwrap();
        let status = resp.status().as_u16();
        (status, resp.json::<Value>().await.unwrap_or(Value::Null))
    }

    /// Create a session and walk it through email + OTP.
    async fn verified_session(&self, email: &str) -> String {
        let (status, session) = self.post("/api/onboarding/sessions", json!({})).await;
        assert_eq!(status, 201);
        let id = session["id"].as_str().unwrap().to_string();

        let (status, _) = self
            .post(&format!("/api/onboarding/sessions/{id}/email"), json!({ "email": email }))
            .await;
        assert_eq!(status, 200);

        let (status, session) = self
            .post(
                &format!("/api/onboarding/sessions/{id}/otp/verify"),
                json!({ "code": "123456" }),
            )
            .await;
        assert_eq!(status, 200);
        assert_eq!(session["step"], "organization_setup");
        id
    }
}

fn profile() -> Value {
    json!({
        "org_name": "Acme Corp",
        "industry": "technology",
        "company_size": "11-50",
        "country": "US",
        "timezone": "America/New_York",
        "security_email": "security@acme.com"
    })
}

#[tokio::test]
async fn health_check() {
    timeout(TEST_TIMEOUT, async {
        let server = TestServer::start().await;
        let (status, body) = server.get("/health").await;
        assert_eq!(status, 200);
        assert_eq!(body["status"], "ok");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn full_wizard_happy_path() {
    timeout(TEST_TIMEOUT, async {
        let server = TestServer::start().await;
        let id = server.verified_session("founder@acme.com").await;
        let base = format!("/api/onboarding/sessions/{id}");

        let (status, candidate) = server
            .post(
                &format!("{base}/subdomain/check"),
                json!({ "organization_name": "  Acme   Corp!! " }),
            )
            .await;
        assert_eq!(status, 200);
        assert_eq!(candidate["normalized"], "acme-corp");
        assert_eq!(candidate["full_domain"], "acme-corp.onkeypriv.com");
        assert_eq!(candidate["availability"], "available");

        let (status, wizard) = server
            .post(
                &format!("{base}/organization"),
                json!({ "organization_name": "Acme Corp", "country": "US" }),
            )
            .await;
        assert_eq!(status, 200);
        assert_eq!(wizard["session"]["step"], "admin_account");
        assert_eq!(
            wizard["session"]["tenant"]["realm_url"],
            "https://acme-corp.onkeypriv.com"
        );

        let (status, admin) = server
            .post(
                &format!("{base}/admin"),
                json!({
                    "full_name": "Ada Lovelace",
                    "password": "Abcdef1!",
                    "confirm_password": "Abcdef1!"
                }),
            )
            .await;
        assert_eq!(status, 201);
        assert_eq!(admin["email"], "founder@acme.com");

        let (status, _) = server.put(&format!("{base}/profile/draft"), profile()).await;
        assert_eq!(status, 200);

        let (status, session) = server.post(&format!("{base}/profile"), profile()).await;
        assert_eq!(status, 200);
        assert_eq!(session["step"], "complete");
        assert!(session["completed_at"].is_string());

        let (status, wizard) = server.get(&format!("{base}/status")).await;
        assert_eq!(status, 200);
        assert_eq!(wizard["step_index"], 6);
        assert_eq!(wizard["otp"]["state"], "verified");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn taken_name_keeps_organization_step_blocked() {
    timeout(TEST_TIMEOUT, async {
        let server = TestServer::start().await;
        let id = server.verified_session("founder@taken.co").await;
        let base = format!("/api/onboarding/sessions/{id}");

        let (_, candidate) = server
            .post(
                &format!("{base}/subdomain/check"),
                json!({ "organization_name": "Taken Co" }),
            )
            .await;
        assert_eq!(candidate["normalized"], "taken-co");
        assert_eq!(candidate["availability"], "unavailable");

        let (status, err) = server
            .post(
                &format!("{base}/organization"),
                json!({ "organization_name": "Taken Co", "country": "US" }),
            )
            .await;
        assert_eq!(status, 409);
        assert_eq!(err["message_key"], "org-setup.subdomain-taken");

        let (_, session) = server.get(&base).await;
        assert_eq!(session["step"], "organization_setup");

        let (status, wizard) = server
            .post(
                &format!("{base}/organization"),
                json!({ "organization_name": "Fresh Co", "country": "US" }),
            )
            .await;
        assert_eq!(status, 200);
        assert_eq!(wizard["session"]["subdomain"], "fresh-co");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn otp_lockout_over_http() {
    timeout(TEST_TIMEOUT, async {
        let server = TestServer::start().await;
        let (_, session) = server.post("/api/onboarding/sessions", json!({})).await;
        let id = session["id"].as_str().unwrap().to_string();
        let base = format!("/api/onboarding/sessions/{id}");

        server
            .post(&format!("{base}/email"), json!({ "email": "locked@acme.com" }))
            .await;

        let (status, err) = server
            .post(&format!("{base}/otp/verify"), json!({ "code": "123" }))
            .await;
        assert_eq!(status, 422);
        assert_eq!(err["message_key"], "otp.otp-error");

        for _ in 0..4 {
            let (status, err) = server
                .post(&format!("{base}/otp/verify"), json!({ "code": "000000" }))
                .await;
            assert_eq!(status, 401);
            assert_eq!(err["message_key"], "otp.verification-failed");
        }

        let (status, err) = server
            .post(&format!("{base}/otp/verify"), json!({ "code": "000000" }))
            .await;
        assert_eq!(status, 429);
        assert_eq!(err["message_key"], "otp.lockout-error");
        assert_eq!(err["retry_after_secs"], 900);

        let (status, err) = server
            .post(&format!("{base}/otp/verify"), json!({ "code": "123456" }))
            .await;
        assert_eq!(status, 429);
        assert_eq!(err["message_key"], "otp.lockout-error");

        let (_, resend) = server.post(&format!("{base}/otp/resend"), json!({})).await;
        assert_eq!(resend["outcome"], "skipped_locked_out");

        let (_, otp) = server.get(&format!("{base}/otp/status")).await;
        assert_eq!(otp["state"], "locked_out");
        assert_eq!(otp["failed_attempts"], 5);

        // Lockout survives in the store for the next session with this email.
        assert!(
            server
                .store
                .get(&keys::otp_lockout("locked@acme.com"))
                .await
                .unwrap()
                .is_some()
        );
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn failing_tenant_creation_reports_circuit_breaker() {
    timeout(TEST_TIMEOUT, async {
        let server = TestServer::start().await;
        let id = server.verified_session("founder@fail.io").await;

        let (status, err) = server
            .post(
                &format!("/api/onboarding/sessions/{id}/organization"),
                json!({ "organization_name": "Fail Inc", "country": "US" }),
            )
            .await;
        assert_eq!(status, 503);
        assert_eq!(err["circuit_breaker"], true);
        assert_eq!(err["message_key"], "org-setup.circuit-breaker");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn out_of_order_and_unknown_sessions() {
    timeout(TEST_TIMEOUT, async {
        let server = TestServer::start().await;
        let (_, session) = server
            .post("/api/onboarding/sessions", json!({ "locale": "ar-SA" }))
            .await;
        assert_eq!(session["locale"], "ar-SA");
        let id = session["id"].as_str().unwrap();

        let (status, err) = server
            .post(
                &format!("/api/onboarding/sessions/{id}/admin"),
                json!({ "full_name": "Ada", "password": "Abcdef1!", "confirm_password": "Abcdef1!" }),
            )
            .await;
        assert_eq!(status, 409);
        assert_eq!(err["message_key"], "onboarding.wrong-step");

        let (status, _) = server.get("/api/onboarding/sessions/not-a-uuid").await;
        assert_eq!(status, 400);

        let missing = uuid::Uuid::new_v4();
        let (status, err) = server
            .get(&format!("/api/onboarding/sessions/{missing}"))
            .await;
        assert_eq!(status, 404);
        assert_eq!(err["message_key"], "onboarding.session-not-found");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn debounced_subdomain_input_and_offline_autosave() {
    timeout(TEST_TIMEOUT, async {
        let server = TestServer::start().await;
        let id = server.verified_session("founder@quiet.io").await;
        let base = format!("/api/onboarding/sessions/{id}");

        let (status, _) = server
            .post(
                &format!("{base}/subdomain/input"),
                json!({ "organization_name": "Quiet Labs" }),
            )
            .await;
        assert_eq!(status, 202);

        let mut wizard = Value::Null;
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            (_, wizard) = server.get(&format!("{base}/status")).await;
            if wizard["subdomain"]["availability"] == "available" {
                break;
            }
        }
        assert_eq!(wizard["subdomain"]["normalized"], "quiet-labs");
        assert_eq!(wizard["subdomain"]["availability"], "available");

        let (status, err) = server
            .put(&format!("{base}/profile/connectivity"), json!({ "offline": true }))
            .await;
        assert_eq!(status, 409);
        assert_eq!(err["message_key"], "onboarding.wrong-step");

        server
            .post(
                &format!("{base}/organization"),
                json!({ "organization_name": "Quiet Labs", "country": "US" }),
            )
            .await;
        let (status, _) = server
            .post(
                &format!("{base}/admin"),
                json!({
                    "full_name": "Ada Lovelace",
                    "password": "Abcdef1!",
                    "confirm_password": "Abcdef1!"
                }),
            )
            .await;
        assert_eq!(status, 201);

        let (status, _) = server
            .put(&format!("{base}/profile/connectivity"), json!({ "offline": true }))
            .await;
        assert_eq!(status, 200);
        server.put(&format!("{base}/profile/draft"), profile()).await;

        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            (_, wizard) = server.get(&format!("{base}/status")).await;
            if wizard["autosave"]["status"] == "pending_offline" {
                break;
            }
        }
        assert_eq!(wizard["autosave"]["status"], "pending_offline");
        assert!(
            server
                .store
                .get(&keys::org_profile_draft("founder@quiet.io"))
                .await
                .unwrap()
                .is_some()
        );
    })
    .await
    .expect("test timed out");
}
