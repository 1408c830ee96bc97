//! Storage layer: SQLite database and schema migrations

pub mod database;
pub mod migrations;

pub use database::{Database, DatabaseConfig};
