//! Outbound ActivityPub objects
//!
//! Builds the `Create` activity wrapping a `Note` for a single delivery
//! target. Each target gets its own pair with fresh identifiers.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::data::{Actor, Guid, PersistedMessage};
use crate::error::AppError;

/// JSON-LD context for ActivityStreams 2.0
pub const ACTIVITYSTREAMS_CONTEXT: &str = "https://www.w3.org/ns/activitystreams";

/// Public collection addressed in `to`
pub const PUBLIC_COLLECTION: &str = "https://www.w3.org/ns/activitystreams#Public";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoteType {
    Note,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CreateType {
    Create,
}

/// ActivityStreams `Note`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NoteType,
    /// RFC 3339 timestamp with millisecond precision
    pub published: String,
    pub attributed_to: String,
    pub content: String,
    pub to: Vec<String>,
}

/// ActivityStreams `Create` wrapping a [`Note`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateActivity {
    #[serde(rename = "@context")]
    pub context: String,
    pub id: String,
    #[serde(rename = "type")]
    pub kind: CreateType,
    pub actor: String,
    pub to: Vec<String>,
    /// Exactly the one follower this copy is addressed to
    pub cc: Vec<String>,
    pub object: Note,
}

impl CreateActivity {
    /// Wire/body serialization; the digest is computed over these exact bytes.
    pub fn to_json(&self) -> Result<String, AppError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// A Create/Note pair built for one recipient, with their storage keys
#[derive(Debug, Clone)]
pub struct ActivityPair {
    pub create_guid: Guid,
    pub create: CreateActivity,
    pub note_guid: Guid,
    pub note: Note,
}

impl ActivityPair {
    /// The two rows to persist: the Create first, then the Note
    pub fn records(&self) -> Result<[PersistedMessage; 2], AppError> {
        Ok([
            PersistedMessage {
                guid: self.create_guid.0.clone(),
                message: self.create.to_json()?,
            },
            PersistedMessage {
                guid: self.note_guid.0.clone(),
                message: serde_json::to_string(&self.note)?,
            },
        ])
    }
}

/// Builds Create/Note pairs for a local actor
#[derive(Debug, Clone, Copy, Default)]
pub struct ActivityFactory;

impl ActivityFactory {
    pub fn new() -> Self {
        Self
    }

    /// Build a public Note and its Create, addressed (`cc`) to `recipient`
    ///
    /// Pure construction: two fresh identifiers, no storage access.
    pub fn build(&self, content: &str, actor: &Actor, recipient: &str) -> ActivityPair {
        let create_guid = Guid::new();
        let note_guid = Guid::new();
        let actor_uri = actor.uri();
        let published = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let to = vec![PUBLIC_COLLECTION.to_string()];

        let note = Note {
            id: actor.message_uri(&note_guid),
            kind: NoteType::Note,
            published,
            attributed_to: actor_uri.clone(),
            content: content.to_string(),
            to: to.clone(),
        };

        let create = CreateActivity {
            context: ACTIVITYSTREAMS_CONTEXT.to_string(),
            id: actor.message_uri(&create_guid),
            kind: CreateType::Create,
            actor: actor_uri,
            to,
            cc: vec![recipient.to_string()],
            object: note.clone(),
        };

        ActivityPair {
            create_guid,
            create,
            note_guid,
            note,
        }
    }
}
