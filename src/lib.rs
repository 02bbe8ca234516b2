//! fedipost - ActivityPub outbox delivery
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      API Layer (Axum)                        │
//! │  - POST /api/sendMessage (API-key checked)                  │
//! │  - /metrics, /health                                        │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Federation Layer                          │
//! │  - DeliveryDispatcher: per-follower fan-out                 │
//! │  - ActivityFactory: Create/Note construction                │
//! │  - RequestSigner: Digest + HTTP Signature                   │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Data Layer                              │
//! │  - KeyStore / MessageStore traits                           │
//! │  - SQLite (sqlx), in-memory store                           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - `api`: HTTP handlers
//! - `federation`: outbound ActivityPub delivery
//! - `data`: storage traits and implementations
//! - `config`: Configuration management
//! - `error`: Error types
//! - `metrics`: Prometheus instruments

pub mod api;
pub mod config;
pub mod data;
pub mod error;
pub mod federation;
pub mod metrics;

use std::sync::Arc;

/// Key size for accounts created at startup
const ACCOUNT_KEY_BITS: usize = 2048;

/// Dispatcher backed by the SQLite database for both stores
pub type Dispatcher = federation::DeliveryDispatcher<data::Database, data::Database>;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<config::AppConfig>,

    /// Database (accounts and messages)
    pub db: Arc<data::Database>,

    /// Outbox delivery service
    pub dispatcher: Arc<Dispatcher>,
}

impl AppState {
    /// Initialize application state
    ///
    /// # Steps
    /// 1. Connect to SQLite database
    /// 2. Ensure the configured account exists
    /// 3. Build the delivery dispatcher
    ///
    /// # Errors
    /// Returns error if any initialization step fails
    pub async fn new(config: config::AppConfig) -> Result<Self, error::AppError> {
        tracing::info!("Initializing application state...");

        let db = Arc::new(data::Database::connect(&config.database.path).await?);

        if let Some(name) = config.account.name.as_deref() {
            let actor = data::Actor::new(name, config.server.domain.as_str());
            if let Some(created) = Self::ensure_account(&db, &actor, ACCOUNT_KEY_BITS).await? {
                // Shown once on stdout only, so it stays out of log pipelines
                println!("API key for {}: {}", created.account_id, created.api_key);
                tracing::warn!(
                    account = %created.account_id,
                    "New API key printed to stdout; store it now, it is not shown again"
                );
            }
        }

        let dispatcher = federation::DeliveryDispatcher::new(
            Arc::clone(&db),
            Arc::clone(&db),
            &config.delivery,
        )?;

        tracing::info!("Application state initialized successfully");

        Ok(Self {
            config: Arc::new(config),
            db,
            dispatcher: Arc::new(dispatcher),
        })
    }

    /// Create the account with a fresh keypair and API key if it is missing
    ///
    /// Returns the new credentials only when the account was created.
    async fn ensure_account(
        db: &data::Database,
        actor: &data::Actor,
        key_bits: usize,
    ) -> Result<Option<data::NewAccount>, error::AppError> {
        if db.get_account(&actor.account_id()).await?.is_some() {
            tracing::info!(account = %actor.account_id(), "Account exists");
            return Ok(None);
        }

        tracing::info!(account = %actor.account_id(), "Creating account...");
        let created = db.create_account(actor, key_bits).await?;
        tracing::info!(account = %created.account_id, actor = %actor.uri(), "Account created");

        Ok(Some(created))
    }
}

/// Build the Axum router with all routes.
///
/// This is shared by the binary and integration tests to keep route
/// composition consistent across environments.
pub fn build_router(state: AppState) -> axum::Router {
    use axum::Router;
    use tower_http::trace::TraceLayer;

    Router::new()
        .route("/health", axum::routing::get(health_check))
        .merge(api::outbox_router())
        .route("/metrics", axum::routing::get(metrics_text))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}

/// Prometheus text exposition of [`metrics::REGISTRY`]
async fn metrics_text() -> Result<impl axum::response::IntoResponse, error::AppError> {
    use prometheus::Encoder;

    let encoder = prometheus::TextEncoder::new();
    let text = encoder
        .encode_to_string(&metrics::REGISTRY.gather())
        .map_err(|e| error::AppError::Internal(e.into()))?;

    Ok((
        [(axum::http::header::CONTENT_TYPE, encoder.format_type().to_string())],
        text,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn ensure_account_returns_credentials_only_on_creation() {
        let temp_dir = TempDir::new().unwrap();
        let db = data::Database::connect(&temp_dir.path().join("test.db"))
            .await
            .unwrap();
        let actor = data::Actor::new("alice", "example.com");

        let created = AppState::ensure_account(&db, &actor, 1024)
            .await
            .unwrap()
            .expect("first call creates the account");
        assert_eq!(created.account_id, "alice@example.com");
        assert_eq!(
            db.get_api_key("alice@example.com").await.unwrap(),
            Some(created.api_key)
        );

        assert!(AppState::ensure_account(&db, &actor, 1024)
            .await
            .unwrap()
            .is_none());
    }
}
