//! Gitlore storage crate - SQLite persistence for embedded history entities.
//!
//! Provides a WAL-mode SQLite database with migrations and the entity
//! repository behind the durable vector store backend.

pub mod db;
pub mod migrations;
pub mod repository;

pub use db::Database;
pub use repository::{EntityRepository, VersionCount};
