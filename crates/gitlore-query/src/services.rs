//! Shared components handed to every query handler.

use std::sync::Arc;

use gitlore_core::config::{AnalysisConfig, QueryConfig};
use gitlore_insight::{ClusterAnalyzer, DriftAnalyzer};
use gitlore_vector::{EmbeddingManager, VectorStore};

use crate::collaborators::{DisabledNarrator, GraphAnalytics, Narrator, NoGraphAnalytics};
use crate::error::QueryError;

#[derive(Debug, Clone)]
pub struct QuerySettings {
    pub semantic_top_k: usize,
    pub general_top_k: usize,
    /// Cluster count for evolution and pattern answers.
    pub cluster_k: usize,
    pub narrative_max_items: usize,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self::from_config(&QueryConfig::default(), &AnalysisConfig::default())
    }
}

impl QuerySettings {
    pub fn from_config(query: &QueryConfig, analysis: &AnalysisConfig) -> Self {
        Self {
            semantic_top_k: query.semantic_top_k.max(1),
            general_top_k: query.general_top_k.max(1),
            cluster_k: analysis.default_clusters.max(1),
            narrative_max_items: query.narrative_max_items.max(1),
        }
    }
}

/// Embedding manager, store, analyzers and collaborators for one index
/// version.
pub struct QueryServices {
    pub manager: Arc<EmbeddingManager>,
    pub store: Arc<VectorStore>,
    pub clusters: ClusterAnalyzer,
    pub drift: DriftAnalyzer,
    pub graph: Arc<dyn GraphAnalytics>,
    pub narrator: Arc<dyn Narrator>,
    pub settings: QuerySettings,
}

impl QueryServices {
    /// Fails with a version mismatch when the manager embeds into a
    /// different space than the store holds.
    pub fn new(
        manager: Arc<EmbeddingManager>,
        store: Arc<VectorStore>,
        clusters: ClusterAnalyzer,
        settings: QuerySettings,
    ) -> Result<Self, QueryError> {
        store.ensure_version(&manager.version())?;
        Ok(Self {
            manager,
            store,
            clusters,
            drift: DriftAnalyzer::new(),
            graph: Arc::new(NoGraphAnalytics),
            narrator: Arc::new(DisabledNarrator),
            settings,
        })
    }

    pub fn with_graph(mut self, graph: Arc<dyn GraphAnalytics>) -> Self {
        self.graph = graph;
        self
    }

    pub fn with_narrator(mut self, narrator: Arc<dyn Narrator>) -> Self {
        self.narrator = narrator;
        self
    }
}
