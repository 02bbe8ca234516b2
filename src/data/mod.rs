//! Data layer module
//!
//! Handles all data persistence:
//! - Storage traits used by the delivery path
//! - SQLite database operations
//! - In-memory store

mod database;
mod memory;
mod models;
mod store;

pub use database::Database;
pub use memory::MemoryStore;
pub use models::*;
pub use store::{KeyStore, MessageStore};

#[cfg(test)]
mod database_test;
