//! SQLite-backed cache generation store.
//!
//! This module provides the persistent store of named cache generations using
//! SQLite with async access via tokio-rusqlite. It supports:
//!
//! - Request-identity keys using SHA-256 hashing
//! - Automatic schema migrations
//! - WAL mode for concurrent access
//! - Whole-generation deletion with cascading entry removal

pub mod connection;
pub mod generations;
pub mod hash;
pub mod migrations;
pub mod names;

pub use crate::Error;

pub use connection::CacheStore;
pub use names::CacheNames;
