//! Semantic drift of a file across its recorded changes.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use gitlore_core::types::{EmbeddedEntity, EntityKey};
use gitlore_vector::{cosine_similarity, VectorStore};

use crate::error::InsightError;

const INSUFFICIENT_HISTORY: &str = "insufficient history";

/// Interpretation band for a drift score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftBand {
    Stable,
    Evolving,
    Significant,
    Major,
}

impl DriftBand {
    /// `[0, 0.2)` stable, `[0.2, 0.5)` evolving, `[0.5, 0.8)` significant,
    /// anything higher major.
    pub fn from_drift(drift: f64) -> Self {
        if drift < 0.2 {
            DriftBand::Stable
        } else if drift < 0.5 {
            DriftBand::Evolving
        } else if drift < 0.8 {
            DriftBand::Significant
        } else {
            DriftBand::Major
        }
    }

    pub fn interpretation(&self) -> &'static str {
        match self {
            DriftBand::Stable => "Stable: minimal semantic changes over time",
            DriftBand::Evolving => "Evolving: moderate semantic evolution",
            DriftBand::Significant => "Significant evolution: substantial semantic changes",
            DriftBand::Major => "Major transformation: fundamental semantic shifts",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DriftPoint {
    pub key: EntityKey,
    pub timestamp: DateTime<Utc>,
    pub change_type: Option<String>,
    pub similarity_to_first: f64,
    /// `None` for the first point.
    pub similarity_to_previous: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DriftReport {
    pub subject: String,
    pub total_changes: usize,
    pub drift: f64,
    /// `None` when there is too little history to judge.
    pub band: Option<DriftBand>,
    pub interpretation: String,
    pub timeline: Vec<DriftPoint>,
}

/// Measures how far a sequence of embeddings moves away from its first one.
#[derive(Debug, Clone, Copy, Default)]
pub struct DriftAnalyzer;

impl DriftAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Drift over `history`, which must be in time order.
    ///
    /// `drift = mean(1 - cos(e[0], e[i]))` for every later point `i`.
    pub fn analyze(&self, subject: &str, history: &[EmbeddedEntity]) -> DriftReport {
        let timeline: Vec<DriftPoint> = history
            .iter()
            .enumerate()
            .map(|(i, entity)| DriftPoint {
                key: entity.key.clone(),
                timestamp: entity.timestamp,
                change_type: entity.change_type().map(str::to_string),
                similarity_to_first: cosine_similarity(&history[0].embedding, &entity.embedding),
                similarity_to_previous: i
                    .checked_sub(1)
                    .map(|p| cosine_similarity(&history[p].embedding, &entity.embedding)),
            })
            .collect();

        if timeline.len() < 2 {
            return DriftReport {
                subject: subject.to_string(),
                total_changes: timeline.len(),
                drift: 0.0,
                band: None,
                interpretation: INSUFFICIENT_HISTORY.to_string(),
                timeline,
            };
        }

        let later = &timeline[1..];
        let drift = later
            .iter()
            .map(|p| 1.0 - p.similarity_to_first)
            .sum::<f64>()
            / later.len() as f64;
        let band = DriftBand::from_drift(drift);

        debug!(subject, points = timeline.len(), drift, "Drift computed");
        DriftReport {
            subject: subject.to_string(),
            total_changes: timeline.len(),
            drift,
            band: Some(band),
            interpretation: band.interpretation().to_string(),
            timeline,
        }
    }

    /// Drift of `path` across every change the store holds for it.
    pub async fn analyze_drift(
        &self,
        store: &VectorStore,
        path: &str,
    ) -> Result<DriftReport, InsightError> {
        if path.trim().is_empty() {
            return Err(InsightError::InvalidInput("file path is empty".to_string()));
        }
        let history = store.file_history(path).await?;
        Ok(self.analyze(path, &history))
    }
}
