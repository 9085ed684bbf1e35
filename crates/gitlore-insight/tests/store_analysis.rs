//! Cluster and drift analysis over a SQLite-backed store.

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};

use gitlore_core::config::AnalysisConfig;
use gitlore_core::types::{ChangeMetadata, Commit, EntityKind, IndexVersion};
use gitlore_insight::{ClusterAnalyzer, DriftAnalyzer, DriftBand};
use gitlore_storage::Database;
use gitlore_vector::{SqliteBackend, StoreSettings, VectorStore};

fn store(dir: &tempfile::TempDir) -> VectorStore {
    let db = Arc::new(Database::new(&dir.path().join("gitlore.db")).unwrap());
    VectorStore::new(
        Arc::new(SqliteBackend::new(db)),
        IndexVersion::new("test", 2),
        StoreSettings::default(),
    )
}

fn commit(i: i64, message: &str) -> Commit {
    Commit {
        sha: format!("sha{:02}", i),
        message: message.to_string(),
        author_name: "Dana".into(),
        author_email: "dana@example.com".into(),
        timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap() + Duration::hours(i),
        commit_type: None,
        insertions: 3,
        deletions: 1,
    }
}

#[tokio::test]
async fn clusters_recent_commits_from_store() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(&dir);
    for i in 0..8 {
        let (message, vector) = if i % 2 == 0 {
            ("fix parser panic", vec![1.0, 0.05 * i as f32])
        } else {
            ("add export command", vec![0.05 * i as f32, 1.0])
        };
        store.upsert_commit(&commit(i, message), vector).await.unwrap();
    }

    let analyzer = ClusterAnalyzer::from_config(&AnalysisConfig::default());
    let report = analyzer
        .analyze_store(&store, EntityKind::Commit, 2)
        .await
        .unwrap();

    assert_eq!(report.total_analyzed, 8);
    assert_eq!(report.num_clusters, 2);
    assert_eq!(report.clusters.iter().map(|c| c.size).sum::<usize>(), 8);
    assert_eq!(report.clusters[0].samples[0].headline, "fix parser panic");
    assert!(report.dominant.is_some());
}

#[tokio::test]
async fn drift_of_file_history_from_store() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(&dir);
    let vectors = [vec![1.0, 0.0], vec![0.6, 0.8], vec![0.0, 1.0]];
    for (i, vector) in vectors.into_iter().enumerate() {
        let meta = ChangeMetadata {
            source_text: format!("diff {}", i),
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1 + i as u32, 9, 0, 0).unwrap(),
            change_type: Some("modified".into()),
            semantic_similarity: None,
            change_magnitude: None,
            author: Some("Dana".into()),
        };
        store
            .upsert_change(&format!("sha{}", i), "src/parser.rs", vector, meta)
            .await
            .unwrap();
    }

    let report = DriftAnalyzer::new()
        .analyze_drift(&store, "src/parser.rs")
        .await
        .unwrap();

    // Distances from the first point: 0.4 and 1.0.
    assert_eq!(report.total_changes, 3);
    assert!((report.drift - 0.7).abs() < 1e-6);
    assert_eq!(report.band, Some(DriftBand::Significant));

    let unknown = DriftAnalyzer::new()
        .analyze_drift(&store, "src/missing.rs")
        .await
        .unwrap();
    assert_eq!(unknown.interpretation, "insufficient history");
}
