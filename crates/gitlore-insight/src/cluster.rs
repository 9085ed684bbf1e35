//! Semantic clustering of embedded history.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use gitlore_core::config::AnalysisConfig;
use gitlore_core::types::{EmbeddedEntity, EntityKey, EntityKind};
use gitlore_vector::{ClusteringStrategy, SeededKMeans, VectorStore};

use crate::error::InsightError;

const INSUFFICIENT_DATA: &str = "insufficient data";

/// Coarse development theme read off a cluster's representative members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterTheme {
    FeatureDevelopment,
    BugFixing,
    Refactoring,
    Testing,
    Documentation,
    MixedDevelopment,
    Unknown,
}

impl ClusterTheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClusterTheme::FeatureDevelopment => "feature_development",
            ClusterTheme::BugFixing => "bug_fixing",
            ClusterTheme::Refactoring => "refactoring",
            ClusterTheme::Testing => "testing",
            ClusterTheme::Documentation => "documentation",
            ClusterTheme::MixedDevelopment => "mixed_development",
            ClusterTheme::Unknown => "unknown",
        }
    }

    /// First keyword family found in the concatenated headlines wins.
    pub fn from_headlines<'a>(headlines: impl IntoIterator<Item = &'a str>) -> Self {
        let text = headlines
            .into_iter()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();
        if text.trim().is_empty() {
            return ClusterTheme::Unknown;
        }
        let has = |words: &[&str]| words.iter().any(|w| text.contains(w));
        if has(&["feat", "add"]) {
            ClusterTheme::FeatureDevelopment
        } else if has(&["fix", "bug"]) {
            ClusterTheme::BugFixing
        } else if has(&["refactor"]) {
            ClusterTheme::Refactoring
        } else if has(&["test"]) {
            ClusterTheme::Testing
        } else if has(&["doc"]) {
            ClusterTheme::Documentation
        } else {
            ClusterTheme::MixedDevelopment
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ClusterMember {
    pub key: EntityKey,
    pub headline: String,
    pub commit_type: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl From<&EmbeddedEntity> for ClusterMember {
    fn from(entity: &EmbeddedEntity) -> Self {
        Self {
            key: entity.key.clone(),
            headline: entity.headline().to_string(),
            commit_type: entity.commit_type().map(str::to_string),
            timestamp: entity.timestamp,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Cluster {
    pub id: usize,
    pub size: usize,
    pub label: String,
    pub theme: ClusterTheme,
    /// Representative members in corpus order.
    pub samples: Vec<ClusterMember>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClusterReport {
    pub total_analyzed: usize,
    pub num_clusters: usize,
    pub clusters: Vec<Cluster>,
    /// Id of the largest cluster; ties go to the lowest id.
    pub dominant: Option<usize>,
    /// Set when no clustering was performed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl ClusterReport {
    fn insufficient(total_analyzed: usize) -> Self {
        Self {
            total_analyzed,
            num_clusters: 0,
            clusters: Vec::new(),
            dominant: None,
            note: Some(INSUFFICIENT_DATA.to_string()),
        }
    }

    pub fn is_insufficient(&self) -> bool {
        self.note.is_some()
    }

    pub fn dominant_cluster(&self) -> Option<&Cluster> {
        let id = self.dominant?;
        self.clusters.iter().find(|c| c.id == id)
    }
}

/// Groups embedded entities with a [`ClusteringStrategy`] and describes the
/// resulting groups.
pub struct ClusterAnalyzer {
    strategy: Arc<dyn ClusteringStrategy>,
    samples_per_cluster: usize,
}

impl ClusterAnalyzer {
    pub fn new(strategy: Arc<dyn ClusteringStrategy>, samples_per_cluster: usize) -> Self {
        Self {
            strategy,
            samples_per_cluster,
        }
    }

    /// Seeded k-means with the configured seed and sample count.
    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self::new(
            Arc::new(SeededKMeans::with_seed(config.clustering_seed)),
            config.cluster_samples,
        )
    }

    /// Cluster `entities` into `target_k` groups.
    ///
    /// Needs strictly more entities than `target_k`; otherwise the report is
    /// empty and marked insufficient.
    pub fn identify_clusters(
        &self,
        entities: &[EmbeddedEntity],
        target_k: usize,
    ) -> Result<ClusterReport, InsightError> {
        if target_k == 0 {
            return Err(InsightError::InvalidInput(
                "cluster count must be positive".to_string(),
            ));
        }
        let total = entities.len();
        if total <= target_k {
            debug!(total, target_k, "Too few entities to cluster");
            return Ok(ClusterReport::insufficient(total));
        }

        let embeddings: Vec<Vec<f32>> = entities.iter().map(|e| e.embedding.clone()).collect();
        let labels = self.strategy.assign(&embeddings, target_k);

        let mut members: Vec<Vec<&EmbeddedEntity>> = Vec::new();
        for (entity, &label) in entities.iter().zip(&labels) {
            if members.len() <= label {
                members.resize_with(label + 1, Vec::new);
            }
            members[label].push(entity);
        }

        let clusters: Vec<Cluster> = members
            .into_iter()
            .enumerate()
            .filter(|(_, group)| !group.is_empty())
            .map(|(id, group)| {
                let samples: Vec<ClusterMember> = group
                    .iter()
                    .take(self.samples_per_cluster)
                    .map(|e| ClusterMember::from(*e))
                    .collect();
                Cluster {
                    id,
                    size: group.len(),
                    label: generate_cluster_label(group.iter().map(|e| e.headline())),
                    theme: ClusterTheme::from_headlines(samples.iter().map(|s| s.headline.as_str())),
                    samples,
                }
            })
            .collect();

        let dominant = clusters
            .iter()
            .fold(None::<&Cluster>, |best, c| match best {
                Some(b) if b.size >= c.size => Some(b),
                _ => Some(c),
            })
            .map(|c| c.id);

        info!(
            strategy = self.strategy.name(),
            total,
            clusters = clusters.len(),
            "Clustering complete"
        );
        Ok(ClusterReport {
            total_analyzed: total,
            num_clusters: clusters.len(),
            clusters,
            dominant,
            note: None,
        })
    }

    /// Cluster the store's recent corpus of `kind`.
    pub async fn analyze_store(
        &self,
        store: &VectorStore,
        kind: EntityKind,
        target_k: usize,
    ) -> Result<ClusterReport, InsightError> {
        let corpus = store.cluster_corpus(kind).await?;
        self.identify_clusters(&corpus, target_k)
    }
}

/// Human-readable label from the most common headline words.
fn generate_cluster_label<'a>(headlines: impl Iterator<Item = &'a str>) -> String {
    let stopwords = [
        "the", "and", "for", "with", "this", "that", "from", "into", "when", "were",
    ];
    let mut word_freq: HashMap<String, usize> = HashMap::new();
    for headline in headlines {
        for word in headline.split(|c: char| !c.is_alphanumeric() && c != '_') {
            let w = word.to_lowercase();
            if w.chars().count() > 3 && !stopwords.contains(&w.as_str()) {
                *word_freq.entry(w).or_insert(0) += 1;
            }
        }
    }
    let mut sorted: Vec<_> = word_freq.into_iter().collect();
    sorted.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    let top: Vec<String> = sorted
        .into_iter()
        .take(3)
        .map(|(w, _)| {
            let mut c = w.chars();
            match c.next() {
                None => String::new(),
                Some(f) => f.to_uppercase().collect::<String>() + c.as_str(),
            }
        })
        .collect();
    if top.is_empty() {
        "Cluster".to_string()
    } else {
        top.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use gitlore_core::types::{ContextType, IndexVersion};
    use serde_json::json;

    fn entity(i: usize, message: &str, embedding: Vec<f32>) -> EmbeddedEntity {
        EmbeddedEntity {
            key: EntityKey::commit(format!("sha{}", i)),
            version: IndexVersion::new("test", embedding.len()),
            context_type: ContextType::Commit,
            source_text: message.to_string(),
            embedding,
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::hours(i as i64),
            metadata: json!({ "message": message }),
        }
    }

    fn two_groups() -> Vec<EmbeddedEntity> {
        vec![
            entity(0, "fix login crash", vec![1.0, 0.0]),
            entity(1, "add search feature", vec![0.0, 1.0]),
            entity(2, "fix login timeout", vec![0.98, 0.05]),
            entity(3, "add search filters", vec![0.05, 0.97]),
            entity(4, "fix login redirect", vec![0.99, 0.02]),
        ]
    }

    #[test]
    fn test_identify_clusters_groups_and_samples() {
        let analyzer = ClusterAnalyzer::new(Arc::new(SeededKMeans::default()), 5);
        let report = analyzer.identify_clusters(&two_groups(), 2).unwrap();

        assert_eq!(report.total_analyzed, 5);
        assert_eq!(report.num_clusters, 2);
        assert!(!report.is_insufficient());

        // Labels are numbered by first appearance, so the login fixes are 0.
        let login = &report.clusters[0];
        assert_eq!(login.id, 0);
        assert_eq!(login.size, 3);
        let shas: Vec<String> = login.samples.iter().map(|s| s.key.natural_id()).collect();
        assert_eq!(shas, vec!["sha0", "sha2", "sha4"]);
        assert_eq!(login.theme, ClusterTheme::BugFixing);
        assert!(login.label.starts_with("Login"));

        let search = &report.clusters[1];
        assert_eq!(search.size, 2);
        assert_eq!(search.theme, ClusterTheme::FeatureDevelopment);

        assert_eq!(report.dominant, Some(0));
        assert_eq!(report.dominant_cluster().unwrap().size, 3);
    }

    #[test]
    fn test_samples_capped() {
        let analyzer = ClusterAnalyzer::new(Arc::new(SeededKMeans::default()), 2);
        let report = analyzer.identify_clusters(&two_groups(), 2).unwrap();
        assert!(report.clusters.iter().all(|c| c.samples.len() <= 2));
        assert_eq!(report.clusters[0].size, 3);
    }

    #[test]
    fn test_insufficient_data_when_not_more_than_k() {
        let analyzer = ClusterAnalyzer::from_config(&AnalysisConfig::default());
        let entities: Vec<_> = two_groups().into_iter().take(5).collect();
        let report = analyzer.identify_clusters(&entities, 5).unwrap();
        assert_eq!(report.num_clusters, 0);
        assert!(report.clusters.is_empty());
        assert_eq!(report.note.as_deref(), Some("insufficient data"));
        assert_eq!(report.total_analyzed, 5);
    }

    #[test]
    fn test_zero_k_is_rejected() {
        let analyzer = ClusterAnalyzer::from_config(&AnalysisConfig::default());
        let result = analyzer.identify_clusters(&two_groups(), 0);
        assert!(matches!(result, Err(InsightError::InvalidInput(_))));
    }

    #[test]
    fn test_dominant_tie_goes_to_lowest_id() {
        let entities = vec![
            entity(0, "a", vec![1.0, 0.0]),
            entity(1, "b", vec![0.0, 1.0]),
            entity(2, "c", vec![1.0, 0.01]),
            entity(3, "d", vec![0.01, 1.0]),
        ];
        let analyzer = ClusterAnalyzer::new(Arc::new(SeededKMeans::default()), 5);
        let report = analyzer.identify_clusters(&entities, 2).unwrap();
        assert_eq!(report.clusters[0].size, report.clusters[1].size);
        assert_eq!(report.dominant, Some(0));
    }

    #[test]
    fn test_theme_priority() {
        assert_eq!(
            ClusterTheme::from_headlines(["fix bug", "add feature"]),
            ClusterTheme::FeatureDevelopment
        );
        assert_eq!(ClusterTheme::from_headlines(["Fix crash"]), ClusterTheme::BugFixing);
        assert_eq!(ClusterTheme::from_headlines(["refactor io"]), ClusterTheme::Refactoring);
        assert_eq!(ClusterTheme::from_headlines(["more tests"]), ClusterTheme::Testing);
        assert_eq!(ClusterTheme::from_headlines(["update docs"]), ClusterTheme::Documentation);
        assert_eq!(ClusterTheme::from_headlines(["bump version"]), ClusterTheme::MixedDevelopment);
        assert_eq!(ClusterTheme::from_headlines(Vec::<&str>::new()), ClusterTheme::Unknown);
        assert_eq!(ClusterTheme::Testing.as_str(), "testing");
    }

    #[test]
    fn test_label_from_common_words() {
        let label = generate_cluster_label(
            ["fix login crash", "fix login timeout", "login redirect"].into_iter(),
        );
        assert!(label.starts_with("Login"));
        assert_eq!(generate_cluster_label(["a b", "of to"].into_iter()), "Cluster");
    }
}
