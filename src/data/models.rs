//! Data models
//!
//! Local actor identity, account rows and generated identifiers.

use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

// =============================================================================
// ID Types
// =============================================================================

/// Globally unique message identifier (128-bit, lowercase hex, 32 characters)
///
/// Doubles as the last path segment of public `https://{domain}/m/{guid}`
/// URIs, so it is drawn from the OS CSPRNG.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Guid(pub String);

impl Guid {
    /// Generate a new random identifier
    pub fn new() -> Self {
        let mut bytes = [0u8; 16];
        OsRng.fill_bytes(&mut bytes);
        Self(format!("{:032x}", u128::from_be_bytes(bytes)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Guid {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for Guid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Actor
// =============================================================================

/// A local actor, identified by name and domain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub name: String,
    pub domain: String,
}

impl Actor {
    pub fn new(name: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            domain: domain.into(),
        }
    }

    /// Canonical actor URI, also used as the signature `keyId`
    pub fn uri(&self) -> String {
        format!("https://{}/u/{}", self.domain, self.name)
    }

    /// Storage key for key and follower lookups (`name@domain`)
    pub fn account_id(&self) -> String {
        format!("{}@{}", self.name, self.domain)
    }

    /// URI of a message owned by this actor's domain
    pub fn message_uri(&self, guid: &Guid) -> String {
        format!("https://{}/m/{}", self.domain, guid)
    }
}

// =============================================================================
// Account
// =============================================================================

/// Row of the `accounts` table
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Account {
    /// Account id (`name@domain`)
    pub name: String,
    /// RSA private key (PEM format)
    pub privkey: Option<String>,
    /// RSA public key (PEM format)
    pub pubkey: Option<String>,
    pub apikey: Option<String>,
    /// JSON array of follower actor URIs
    pub followers: Option<String>,
}

impl Account {
    /// Decode the follower column; NULL or malformed JSON means no followers.
    pub fn follower_uris(&self) -> Vec<String> {
        self.followers
            .as_deref()
            .and_then(|raw| serde_json::from_str::<Option<Vec<String>>>(raw).ok())
            .flatten()
            .unwrap_or_default()
    }
}

/// Credentials returned when a new account is created
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub account_id: String,
    pub api_key: String,
    pub public_key_pem: String,
}

/// A persisted outbound object
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct PersistedMessage {
    pub guid: String,
    /// Serialized JSON of the Create activity or Note
    pub message: String,
}
