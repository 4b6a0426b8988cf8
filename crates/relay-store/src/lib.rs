//! # relay-store
//!
//! Backing store for Relay: the [`Store`] contract the sync core depends on
//! (profiles, contacts, conversations, messages and a row-level change feed),
//! and a local implementation backed by SQLite.
//!
//! The [`Database`] handle is synchronous and wraps a `rusqlite::Connection`
//! with typed CRUD helpers per table; [`SqliteStore`] puts it behind the async
//! [`Store`] trait and publishes every committed write on the feed.

pub mod contacts;
pub mod conversations;
pub mod database;
pub mod feed;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod profiles;
pub mod rows;
pub mod sqlite;
pub mod store;

mod error;

pub use database::Database;
pub use error::{Result, StoreError};
pub use feed::{ChangeEvent, ChangeFeed, ChangeKind, ColumnFilter, Record, Subscription, Table, WatchFilter};
pub use models::*;
pub use sqlite::SqliteStore;
pub use store::Store;
