//! Postgres frontend/backend protocol on top of an embedded SQL engine.
pub mod backend;
pub mod catalog;
pub mod codec;
pub mod errors;
pub mod handler;
pub mod messages;
pub mod rewrite;
pub mod session;
pub mod sqlite;
