//! gitlore - composition root.
//!
//! Loads configuration, opens the configured store backend, wires the
//! embedding manager, analyzers and query router together, then runs one
//! subcommand and prints its result as JSON.

mod cli;
mod ingest;

use std::sync::Arc;

use clap::Parser;
use serde_json::Value;
use tracing::{info, warn};

use cli::{CliArgs, Command};
use gitlore_core::config::expand_home;
use gitlore_core::error::{LoreError, Result as LoreResult};
use gitlore_core::logging::init_tracing;
use gitlore_core::types::{ContextType, EntityKind};
use gitlore_core::LoreConfig;
use gitlore_insight::{ClusterAnalyzer, DriftAnalyzer};
use gitlore_query::answer::EntityMatch;
use gitlore_query::{
    DisabledNarrator, GraphAnalytics, Narrator, NoGraphAnalytics, OpenAiNarrator, QueryContext,
    QueryRouter, QueryServices, QuerySettings, SnapshotGraphAnalytics,
};
use gitlore_storage::Database;
use gitlore_vector::{
    provider_from_config, EmbeddingManager, ManagerSettings, MemoryBackend, SearchScope,
    SqliteBackend, StoreBackend, StoreSettings, VectorStore,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Logging needs the configured level, so a config failure is reported
    // once the subscriber is up.
    let config_path = args.resolve_config_path();
    let (mut config, config_error) = match LoreConfig::load(&config_path) {
        Ok(config) => (config, None),
        Err(e) => (LoreConfig::default(), Some(e)),
    };
    if let Some(data_dir) = args.resolve_data_dir() {
        config.general.data_dir = data_dir;
    }
    let log_level = args
        .resolve_log_level()
        .unwrap_or_else(|| config.general.log_level.clone());
    init_tracing(&log_level);

    if let Some(e) = config_error {
        warn!(
            "Failed to load config from {}: {}. Using defaults.",
            config_path.display(),
            e
        );
    }
    info!(version = env!("CARGO_PKG_VERSION"), "gitlore starting");

    let backend = open_backend(&config)?;
    let provider = provider_from_config(&config.embedding)?;
    let manager = Arc::new(EmbeddingManager::new(
        Arc::from(provider),
        ManagerSettings::from(&config.embedding),
    ));
    let store = Arc::new(VectorStore::new(
        backend,
        manager.version(),
        StoreSettings::from(&config.store),
    ));

    let output = run(args.command, &config, manager, store).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn run(
    command: Command,
    config: &LoreConfig,
    manager: Arc<EmbeddingManager>,
    store: Arc<VectorStore>,
) -> Result<Value, Box<dyn std::error::Error>> {
    let output = match command {
        Command::Ingest { path } => {
            let export = ingest::HistoryExport::load(&path)?;
            let report = ingest::ingest(&manager, &store, &export).await?;
            serde_json::to_value(report)?
        }
        Command::Ask {
            question,
            file,
            commit,
        } => {
            let router = build_router(config, manager, store)?;
            let context = QueryContext {
                file_path: file,
                commit_sha: commit,
            };
            serde_json::to_value(router.answer(&question, &context).await?)?
        }
        Command::Similar { text, kind, top_k } => {
            let scope = match kind.as_deref() {
                None => SearchScope::all(),
                Some(k) => SearchScope::of_kind(EntityKind::parse(k).ok_or_else(|| {
                    LoreError::InvalidInput(format!("unknown entity kind: {}", k))
                })?),
            };
            let query = manager.generate_embedding(&text, ContextType::Commit).await?;
            let hits = store.semantic_search(&query, &scope, top_k).await?;
            let matches: Vec<EntityMatch> = hits.iter().map(EntityMatch::from).collect();
            serde_json::to_value(matches)?
        }
        Command::Clusters { k } => {
            let k = k.unwrap_or(config.analysis.default_clusters);
            let report = ClusterAnalyzer::from_config(&config.analysis)
                .analyze_store(&store, EntityKind::Commit, k)
                .await?;
            serde_json::to_value(report)?
        }
        Command::Drift { path } => {
            let report = DriftAnalyzer::new().analyze_drift(&store, &path).await?;
            serde_json::to_value(report)?
        }
        Command::Reembed => serde_json::to_value(store.reembed(&manager).await?)?,
        Command::Stats => serde_json::to_value(store.stats().await?)?,
    };
    Ok(output)
}

fn open_backend(config: &LoreConfig) -> LoreResult<Arc<dyn StoreBackend>> {
    match config.store.backend.as_str() {
        "sqlite" => {
            let path = config.database_path();
            let db = Arc::new(Database::new(&path)?);
            info!(path = %path.display(), "SQLite store opened");
            Ok(Arc::new(SqliteBackend::new(db)))
        }
        "memory" => {
            warn!("In-memory store selected, nothing will persist after this run");
            Ok(Arc::new(MemoryBackend::new()))
        }
        other => Err(LoreError::Config(format!("unknown store backend: {}", other))),
    }
}

fn build_router(
    config: &LoreConfig,
    manager: Arc<EmbeddingManager>,
    store: Arc<VectorStore>,
) -> Result<QueryRouter, Box<dyn std::error::Error>> {
    let graph: Arc<dyn GraphAnalytics> = match &config.query.graph_snapshot {
        Some(path) => Arc::new(SnapshotGraphAnalytics::load(&expand_home(path))?),
        None => Arc::new(NoGraphAnalytics),
    };

    let narrator: Arc<dyn Narrator> = if config.query.narrative_enabled {
        match OpenAiNarrator::from_config(&config.embedding, &config.query) {
            Ok(narrator) => Arc::new(narrator),
            Err(e) => {
                warn!(error = %e, "Narrator unavailable, answers will carry no narrative");
                Arc::new(DisabledNarrator)
            }
        }
    } else {
        Arc::new(DisabledNarrator)
    };

    let services = QueryServices::new(
        manager,
        store,
        ClusterAnalyzer::from_config(&config.analysis),
        QuerySettings::from_config(&config.query, &config.analysis),
    )?
    .with_graph(graph)
    .with_narrator(narrator);

    Ok(QueryRouter::new(Arc::new(services))?)
}
