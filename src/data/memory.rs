//! In-process store
//!
//! Volatile implementation of [`KeyStore`] and [`MessageStore`], used by
//! tests and by embedders that keep accounts elsewhere.

use std::collections::HashMap;

use tokio::sync::RwLock;

use super::store::{KeyStore, MessageStore};
use crate::error::AppError;

#[derive(Debug, Clone, Default)]
struct MemoryAccount {
    private_key_pem: Option<String>,
    followers: Option<Vec<String>>,
}

/// Thread-safe in-memory account and message store
#[derive(Debug, Default)]
pub struct MemoryStore {
    accounts: RwLock<HashMap<String, MemoryAccount>>,
    messages: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace an account
    pub async fn insert_account(
        &self,
        account_id: &str,
        private_key_pem: Option<String>,
        followers: Option<Vec<String>>,
    ) {
        self.accounts.write().await.insert(
            account_id.to_string(),
            MemoryAccount {
                private_key_pem,
                followers,
            },
        );
    }

    /// Fetch a stored message by guid
    pub async fn get_message(&self, guid: &str) -> Option<String> {
        self.messages.read().await.get(guid).cloned()
    }

    /// Snapshot of every stored `(guid, message)` pair
    pub async fn messages(&self) -> Vec<(String, String)> {
        self.messages
            .read()
            .await
            .iter()
            .map(|(guid, message)| (guid.clone(), message.clone()))
            .collect()
    }

    pub async fn message_count(&self) -> usize {
        self.messages.read().await.len()
    }
}

impl KeyStore for MemoryStore {
    async fn lookup_private_key(&self, account_id: &str) -> Result<Option<String>, AppError> {
        Ok(self
            .accounts
            .read()
            .await
            .get(account_id)
            .and_then(|account| account.private_key_pem.clone()))
    }

    async fn lookup_followers(&self, account_id: &str) -> Result<Vec<String>, AppError> {
        Ok(self
            .accounts
            .read()
            .await
            .get(account_id)
            .and_then(|account| account.followers.clone())
            .unwrap_or_default())
    }
}

impl MessageStore for MemoryStore {
    async fn put(&self, guid: &str, serialized_activity: &str) -> Result<(), AppError> {
        self.messages
            .write()
            .await
            .insert(guid.to_string(), serialized_activity.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_account_has_no_key_and_no_followers() {
        let store = MemoryStore::new();
        assert!(
            store
                .lookup_private_key("nobody@example.com")
                .await
                .unwrap()
                .is_none()
        );
        assert!(
            store
                .lookup_followers("nobody@example.com")
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn put_replaces_existing_guid() {
        let store = MemoryStore::new();
        store.put("abc", "first").await.unwrap();
        store.put("abc", "second").await.unwrap();

        assert_eq!(store.message_count().await, 1);
        assert_eq!(store.get_message("abc").await.as_deref(), Some("second"));
    }
}
