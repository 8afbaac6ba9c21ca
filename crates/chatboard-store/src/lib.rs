//! # chatboard-store
//!
//! Persistence for the chatboard server: a primary SQLite store that is the
//! sole source of identity assignment and reads, and a secondary document
//! mirror that is written best-effort and never consulted.
//!
//! The crate exposes a synchronous [`Database`] handle that wraps a
//! `rusqlite::Connection` with typed CRUD helpers for every domain model,
//! and an async [`mirror::MirrorStore`] fed by a fire-and-forget writer
//! task.

pub mod database;
pub mod messages;
pub mod migrations;
pub mod mirror;
pub mod notifications;
pub mod temp_files;
pub mod users;

mod error;

pub use database::Database;
pub use error::{MirrorError, StoreError};
pub use mirror::{spawn_mirror_writer, MirrorJob, MirrorStore};
