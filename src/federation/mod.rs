//! ActivityPub federation module
//!
//! Handles the outbound path:
//! - Create/Note construction
//! - HTTP Signatures
//! - Activity delivery (outbox fan-out)

mod activity;
mod delivery;
mod signature;

pub use activity::{
    ACTIVITYSTREAMS_CONTEXT, ActivityFactory, ActivityPair, CreateActivity, CreateType, Note,
    NoteType, PUBLIC_COLLECTION,
};
pub use delivery::{
    ACTIVITY_CONTENT_TYPE, DeliveryDispatcher, DeliveryReport, DeliveryResult, DeliveryStage,
    DeliveryTarget,
};
pub use signature::{
    RequestSigner, SIGNED_HEADERS, SignedRequest, SignedRequestHeaders, build_signing_string,
    generate_digest, generate_keypair, http_date,
};
