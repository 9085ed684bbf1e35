//! gitlore insight crate: structure and change over embedded history.
//!
//! - Cluster analysis of commits (or any entity kind) with labels and themes
//! - Semantic drift of a file across its recorded changes

pub mod cluster;
pub mod drift;
pub mod error;

pub use cluster::{Cluster, ClusterAnalyzer, ClusterMember, ClusterReport, ClusterTheme};
pub use drift::{DriftAnalyzer, DriftBand, DriftPoint, DriftReport};
pub use error::InsightError;
