//! API layer
//!
//! HTTP handlers for outbox submission (`/api/sendMessage`)

mod outbox;

pub use outbox::{SendMessageRequest, outbox_router};
