//! SQLite database operations
//!
//! All database access goes through this module.

use sqlx::SqlitePool;
use std::path::Path;

use super::models::*;
use super::store::{KeyStore, MessageStore};
use crate::error::AppError;

/// Database connection pool wrapper
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Connect to SQLite database
    ///
    /// Creates the file (and parent directory) if needed and runs migrations.
    pub async fn connect(path: &Path) -> Result<Self, AppError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| AppError::Database(sqlx::Error::Io(e)))?;
        }

        let connection_string = format!("sqlite:{}?mode=rwc", path.display());
        let pool = SqlitePool::connect(&connection_string).await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| {
                tracing::error!("Migration failed: {}", e);
                AppError::Internal(anyhow::anyhow!("Migration failed: {}", e))
            })?;

        tracing::info!("Database connected and migrated successfully");
        Ok(Self { pool })
    }

    // =========================================================================
    // Account operations
    // =========================================================================

    /// Get an account row by id (`name@domain`)
    pub async fn get_account(&self, account_id: &str) -> Result<Option<Account>, AppError> {
        let account = sqlx::query_as::<_, Account>(
            "SELECT name, privkey, pubkey, apikey, followers FROM accounts WHERE name = ?",
        )
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(account)
    }

    /// Create an account with a fresh RSA keypair and API key
    ///
    /// # Errors
    /// `Validation` if the account already exists.
    pub async fn create_account(
        &self,
        actor: &Actor,
        key_bits: usize,
    ) -> Result<NewAccount, AppError> {
        let account_id = actor.account_id();
        if self.get_account(&account_id).await?.is_some() {
            return Err(AppError::Validation(format!(
                "Account {} already exists",
                account_id
            )));
        }

        let (private_key_pem, public_key_pem) =
            tokio::task::spawn_blocking(move || crate::federation::generate_keypair(key_bits))
                .await
                .map_err(|e| AppError::Internal(e.into()))??;
        let api_key = Guid::new().0;

        sqlx::query(
            "INSERT INTO accounts (name, privkey, pubkey, apikey, followers) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&account_id)
        .bind(&private_key_pem)
        .bind(&public_key_pem)
        .bind(&api_key)
        .bind("[]")
        .execute(&self.pool)
        .await?;

        tracing::info!(account = %account_id, "Account created");

        Ok(NewAccount {
            account_id,
            api_key,
            public_key_pem,
        })
    }

    /// Insert or replace an account row verbatim
    pub async fn upsert_account(&self, account: &Account) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO accounts (name, privkey, pubkey, apikey, followers)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&account.name)
        .bind(&account.privkey)
        .bind(&account.pubkey)
        .bind(&account.apikey)
        .bind(&account.followers)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// API key of an account, `None` if the account or key is missing
    pub async fn get_api_key(&self, account_id: &str) -> Result<Option<String>, AppError> {
        Ok(self
            .get_account(account_id)
            .await?
            .and_then(|account| account.apikey))
    }

    /// Append a follower URI (no-op if already present)
    ///
    /// # Returns
    /// `true` if the follower was added.
    pub async fn add_follower(&self, account_id: &str, follower_uri: &str) -> Result<bool, AppError> {
        let account = self
            .get_account(account_id)
            .await?
            .ok_or_else(|| AppError::Validation(format!("Unknown account {}", account_id)))?;

        let mut followers = account.follower_uris();
        if followers.iter().any(|existing| existing == follower_uri) {
            return Ok(false);
        }
        followers.push(follower_uri.to_string());

        sqlx::query("UPDATE accounts SET followers = ? WHERE name = ?")
            .bind(serde_json::to_string(&followers)?)
            .bind(account_id)
            .execute(&self.pool)
            .await?;

        Ok(true)
    }

    // =========================================================================
    // Message operations
    // =========================================================================

    /// Get a persisted message by guid
    pub async fn get_message(&self, guid: &str) -> Result<Option<PersistedMessage>, AppError> {
        let message = sqlx::query_as::<_, PersistedMessage>(
            "SELECT guid, message FROM messages WHERE guid = ?",
        )
        .bind(guid)
        .fetch_optional(&self.pool)
        .await?;

        Ok(message)
    }

    /// Count persisted messages
    pub async fn count_messages(&self) -> Result<i64, AppError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM messages")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

impl KeyStore for Database {
    async fn lookup_private_key(&self, account_id: &str) -> Result<Option<String>, AppError> {
        Ok(self
            .get_account(account_id)
            .await?
            .and_then(|account| account.privkey))
    }

    async fn lookup_followers(&self, account_id: &str) -> Result<Vec<String>, AppError> {
        Ok(self
            .get_account(account_id)
            .await?
            .map(|account| account.follower_uris())
            .unwrap_or_default())
    }
}

impl MessageStore for Database {
    async fn put(&self, guid: &str, serialized_activity: &str) -> Result<(), AppError> {
        sqlx::query("INSERT OR REPLACE INTO messages (guid, message) VALUES (?, ?)")
            .bind(guid)
            .bind(serialized_activity)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
