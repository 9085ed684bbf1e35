//! Gitlore core crate - configuration, error taxonomy, and the domain types
//! shared by the indexing and query crates.

pub mod config;
pub mod error;
pub mod logging;
pub mod types;

pub use config::LoreConfig;
pub use error::{LoreError, Result};
pub use types::*;
