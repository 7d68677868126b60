//! # agora-store
//!
//! SQLite persistence for an Agora instance.
//!
//! The crate exposes a synchronous `Database` handle that wraps a
//! `rusqlite::Connection` and provides typed CRUD helpers for the peer
//! registry, local accounts, posts, likes, comments, follow edges and both
//! blocklists.

pub mod blocks;
pub mod comments;
pub mod database;
pub mod follows;
pub mod likes;
pub mod migrations;
pub mod models;
pub mod posts;
pub mod servers;
pub mod users;

mod error;
mod row;

pub use database::Database;
pub use error::{Result, StoreError};
pub use models::*;
pub use posts::PostQuery;
