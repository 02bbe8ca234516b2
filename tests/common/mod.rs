//! Common test utilities for E2E tests

#![allow(dead_code)]

pub mod schema_validator;

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use fedipost::{AppState, config};
use rsa::pkcs1v15::{Signature, VerifyingKey};
use rsa::pkcs8::DecodePublicKey;
use rsa::signature::Verifier;
use rsa::RsaPublicKey;
use sha2::Sha256;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::Mutex;

/// A request captured by [`FakeInbox`]
#[derive(Debug, Clone)]
pub struct ReceivedRequest {
    pub method: Method,
    /// Path and query as received
    pub path: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ReceivedRequest {
    pub fn header(&self, name: &str) -> &str {
        self.headers
            .get(name)
            .unwrap_or_else(|| panic!("missing {name} header"))
            .to_str()
            .expect("ascii header")
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).expect("json body")
    }
}

type Received = Arc<Mutex<Vec<ReceivedRequest>>>;

/// Remote server stand-in that records every request
///
/// Paths under `/broken/` answer 500, paths under `/redirect/` answer 302
/// to `/landing` and paths under `/slow/` stall for five seconds. `/landing`
/// and everything else answer 202.
pub struct FakeInbox {
    pub base_url: String,
    received: Received,
}

impl FakeInbox {
    pub async fn start() -> Self {
        let received: Received = Arc::new(Mutex::new(Vec::new()));

        let app = axum::Router::new()
            .fallback(record_request)
            .with_state(received.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{}", addr),
            received,
        }
    }

    /// Follower actor URI hosted on this server
    pub fn follower(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Host header value a delivery to this server should carry
    pub fn authority(&self) -> String {
        self.base_url.trim_start_matches("http://").to_string()
    }

    pub async fn received(&self) -> Vec<ReceivedRequest> {
        self.received.lock().await.clone()
    }
}

async fn record_request(
    State(received): State<Received>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| uri.path().to_string());

    received.lock().await.push(ReceivedRequest {
        method,
        path: path.clone(),
        headers,
        body,
    });

    if path.starts_with("/broken/") {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    if path.starts_with("/redirect/") {
        return (StatusCode::FOUND, [(header::LOCATION, "/landing")]).into_response();
    }
    if path.starts_with("/slow/") {
        tokio::time::sleep(Duration::from_secs(5)).await;
    }
    StatusCode::ACCEPTED.into_response()
}

/// 1024-bit keypair (private PKCS#8 PEM, public SPKI PEM)
pub fn test_keypair() -> (String, String) {
    fedipost::federation::generate_keypair(1024).expect("keypair")
}

/// Delivery settings that allow loopback followers
pub fn test_delivery_config(timeout_seconds: u64) -> config::DeliveryConfig {
    config::DeliveryConfig {
        timeout_seconds,
        max_concurrent: 4,
        user_agent: "fedipost-test".to_string(),
        allow_private_targets: true,
    }
}

/// Pull a quoted field out of a Signature header
pub fn signature_field<'a>(header: &'a str, field: &str) -> &'a str {
    header
        .split(',')
        .find_map(|part| {
            let (key, value) = part.split_once('=')?;
            (key.trim() == field).then(|| value.trim().trim_matches('"'))
        })
        .unwrap_or_else(|| panic!("missing {field} in Signature header"))
}

/// Verify a captured request's HTTP Signature the way a remote inbox would
pub fn verify_received_signature(request: &ReceivedRequest, public_key_pem: &str) -> bool {
    let signature_header = request.header("signature");
    let signing_string = fedipost::federation::build_signing_string(
        &request.path,
        request.header("host"),
        request.header("date"),
        request.header("digest"),
    );

    let public_key = RsaPublicKey::from_public_key_pem(public_key_pem).expect("public key");
    let verifier = VerifyingKey::<Sha256>::new(public_key);
    let bytes = BASE64
        .decode(signature_field(signature_header, "signature"))
        .expect("base64 signature");
    let Ok(signature) = Signature::try_from(bytes.as_slice()) else {
        return false;
    };

    verifier.verify(signing_string.as_bytes(), &signature).is_ok()
}

/// Test server instance
pub struct TestServer {
    pub addr: String,
    pub state: AppState,
    pub _temp_dir: TempDir,
    pub client: reqwest::Client,
}

impl TestServer {
    /// Create a new test server instance for `example.com`
    pub async fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let config = config::AppConfig {
            server: config::ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
                domain: "example.com".to_string(),
            },
            database: config::DatabaseConfig { path: db_path },
            delivery: test_delivery_config(2),
            account: config::AccountConfig::default(),
            logging: config::LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        };

        let state = AppState::new(config).await.unwrap();

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = fedipost::build_router(state.clone());

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr: format!("http://{}", addr),
            state,
            _temp_dir: temp_dir,
            client,
        }
    }

    /// Get base URL for API requests
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.addr, path)
    }

    /// Create `name@example.com` with a 1024-bit key; returns (api key, public key PEM)
    pub async fn create_account(&self, name: &str) -> (String, String) {
        let actor = fedipost::data::Actor::new(name, "example.com");
        let created = self.state.db.create_account(&actor, 1024).await.unwrap();
        (created.api_key, created.public_key_pem)
    }

    pub async fn send_message(&self, acct: &str, apikey: &str, message: &str) -> reqwest::Response {
        self.client
            .post(self.url("/api/sendMessage"))
            .json(&serde_json::json!({
                "acct": acct,
                "apikey": apikey,
                "message": message,
            }))
            .send()
            .await
            .unwrap()
    }
}
