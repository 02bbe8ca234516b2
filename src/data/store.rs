//! Storage seams consumed by the delivery path
//!
//! Both traits are implemented by [`super::Database`] (SQLite) and
//! [`super::MemoryStore`] (in-process).

use std::future::Future;

use crate::error::AppError;

/// Resolves an account's signing key and followers
pub trait KeyStore: Send + Sync + 'static {
    /// Private key (PEM) for `account_id`, `None` if absent
    fn lookup_private_key(
        &self,
        account_id: &str,
    ) -> impl Future<Output = Result<Option<String>, AppError>> + Send;

    /// Follower actor URIs for `account_id`; empty when unknown
    fn lookup_followers(
        &self,
        account_id: &str,
    ) -> impl Future<Output = Result<Vec<String>, AppError>> + Send;
}

/// Durable guid → serialized activity storage
pub trait MessageStore: Send + Sync + 'static {
    /// Insert-or-replace `serialized_activity` under `guid`
    fn put(
        &self,
        guid: &str,
        serialized_activity: &str,
    ) -> impl Future<Output = Result<(), AppError>> + Send;
}
