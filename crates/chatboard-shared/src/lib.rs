//! # chatboard-shared
//!
//! Domain models, wire protocol, and shared constants for the chatboard
//! group-chat server.  Everything here is plain data — no I/O — so it can be
//! used by the store layer, the server binary, and any future client.

pub mod constants;
pub mod models;
pub mod month;
pub mod protocol;

pub use models::*;
