//! Answer types produced by query handlers.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

use gitlore_core::types::{EmbeddedEntity, EntityKey, Scored};
use gitlore_insight::{ClusterReport, DriftReport};

use crate::collaborators::{ComplexitySummary, Hotspots, Narrative};

/// Which handler produced an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerType {
    SemanticSearch,
    EvolutionAnalysis,
    ImpactAnalysis,
    PatternAnalysis,
    CollaborationAnalysis,
    General,
}

impl AnswerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnswerType::SemanticSearch => "semantic_search",
            AnswerType::EvolutionAnalysis => "evolution_analysis",
            AnswerType::ImpactAnalysis => "impact_analysis",
            AnswerType::PatternAnalysis => "pattern_analysis",
            AnswerType::CollaborationAnalysis => "collaboration_analysis",
            AnswerType::General => "general",
        }
    }
}

impl std::fmt::Display for AnswerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Optional hints that narrow a question.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryContext {
    pub file_path: Option<String>,
    pub commit_sha: Option<String>,
}

impl QueryContext {
    pub fn with_file(mut self, path: impl Into<String>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    pub fn with_commit(mut self, sha: impl Into<String>) -> Self {
        self.commit_sha = Some(sha.into());
        self
    }
}

/// A search hit without its embedding.
#[derive(Debug, Clone, Serialize)]
pub struct EntityMatch {
    pub key: EntityKey,
    pub headline: String,
    pub commit_type: Option<String>,
    pub author: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub similarity: f64,
}

impl From<&Scored<EmbeddedEntity>> for EntityMatch {
    fn from(hit: &Scored<EmbeddedEntity>) -> Self {
        Self {
            key: hit.item.key.clone(),
            headline: hit.item.headline().to_string(),
            commit_type: hit.item.commit_type().map(str::to_string),
            author: hit.item.author().map(str::to_string),
            timestamp: hit.item.timestamp,
            similarity: hit.similarity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Insight {
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
}

impl Insight {
    pub fn new(kind: &str, description: impl Into<String>) -> Self {
        Self {
            kind: kind.to_string(),
            description: description.into(),
        }
    }
}

/// Commit activity on one calendar day (UTC).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelineDay {
    pub date: NaiveDate,
    pub commits: usize,
    /// Distinct commit types, first-seen order.
    pub types: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Impact {
    FileChange {
        file: String,
        change_type: Option<String>,
        potentially_affected: Vec<String>,
    },
    BreakingChange {
        commit: String,
        message: String,
        files_affected: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub priority: String,
    pub category: String,
    pub recommendation: String,
    pub actions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatternEntry {
    pub pattern: String,
    pub frequency: usize,
    /// Up to three representative headlines.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Contributor {
    pub author: String,
    pub email: Option<String>,
    pub commits: usize,
    /// Distinct commit types, first-seen order.
    pub specializations: Vec<String>,
    pub avg_change_size: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SharedFile {
    pub file: String,
    pub collaborators: Vec<String>,
    pub collaboration_level: usize,
}

/// Handler-specific evidence behind an answer.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SupportingData {
    Semantic {
        results: Vec<EntityMatch>,
        #[serde(skip_serializing_if = "Option::is_none")]
        related_changes: Option<Vec<EntityMatch>>,
    },
    Evolution {
        #[serde(skip_serializing_if = "Option::is_none")]
        drift: Option<DriftReport>,
        clusters: ClusterReport,
        timeline: Vec<TimelineDay>,
    },
    Impact {
        impacts: Vec<Impact>,
        /// Pull requests that include the commit in question.
        pull_requests: Vec<u64>,
        hotspots: Hotspots,
        complexity: ComplexitySummary,
        recommendations: Vec<Recommendation>,
    },
    Pattern {
        patterns: Vec<PatternEntry>,
        weekday_commits: usize,
        weekend_commits: usize,
    },
    Collaboration {
        contributors: Vec<Contributor>,
        shared_files: Vec<SharedFile>,
    },
    General {
        matches: Vec<EntityMatch>,
        suggested_files: Vec<String>,
        commit_types: Vec<(String, usize)>,
    },
}

/// What a handler hands back to the router.
#[derive(Debug, Clone)]
pub struct HandlerOutput {
    pub supporting_data: SupportingData,
    pub insights: Vec<Insight>,
    pub narrative: Option<Narrative>,
    pub summary: String,
}

impl HandlerOutput {
    pub fn new(supporting_data: SupportingData, summary: String) -> Self {
        Self {
            supporting_data,
            insights: Vec::new(),
            narrative: None,
            summary,
        }
    }

    pub fn with_insights(mut self, insights: Vec<Insight>) -> Self {
        self.insights = insights;
        self
    }
}

/// The composed answer to one question.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub id: Uuid,
    pub question: String,
    pub answer_type: AnswerType,
    pub supporting_data: SupportingData,
    pub insights: Vec<Insight>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub narrative: Option<Narrative>,
    pub summary: String,
}

impl Answer {
    pub fn compose(id: Uuid, question: &str, answer_type: AnswerType, output: HandlerOutput) -> Self {
        Self {
            id,
            question: question.to_string(),
            answer_type,
            supporting_data: output.supporting_data,
            insights: output.insights,
            narrative: output.narrative,
            summary: output.summary,
        }
    }
}
