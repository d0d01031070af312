//! Postgres compatible server backed by SQLite database files.
pub mod registry;
pub mod server;
