//! Entity repository.
//!
//! One row per embedded commit, change or pull request, keyed by
//! `(kind, natural_id)`. Embeddings are stored as little-endian f32 blobs.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use tracing::debug;

use gitlore_core::error::{LoreError, Result};
use gitlore_core::types::{
    ContextType, EmbeddedEntity, EntityFilter, EntityKey, EntityKind, IndexVersion,
};

use crate::db::Database;

const ENTITY_COLUMNS: &str = "kind, natural_id, commit_sha, file_path, pr_number, model_id, \
     dimensions, context_type, source_text, embedding, timestamp_ms, metadata";

/// Same row shape as `ENTITY_COLUMNS` with the text and vector left empty.
const METADATA_COLUMNS: &str = "kind, natural_id, commit_sha, file_path, pr_number, model_id, \
     dimensions, context_type, '' AS source_text, X'' AS embedding, timestamp_ms, metadata";

/// Number of stored entities per index version.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionCount {
    pub version: IndexVersion,
    pub kind: EntityKind,
    pub count: u64,
}

/// Repository for embedded history entities.
pub struct EntityRepository {
    db: Arc<Database>,
}

impl EntityRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert or replace an entity by natural key.
    ///
    /// `pr_commits` replaces the commit links of a pull request; it is ignored
    /// for other kinds. Entity row and links commit together.
    pub fn upsert(&self, entity: &EmbeddedEntity, pr_commits: &[String]) -> Result<()> {
        self.db.with_conn(|conn| {
            let tx = conn
                .unchecked_transaction()
                .map_err(|e| LoreError::Storage(format!("Failed to begin transaction: {}", e)))?;

            write_entity(&tx, entity)?;

            if let EntityKey::PullRequest { number } = &entity.key {
                tx.execute(
                    "DELETE FROM pr_commits WHERE pr_number = ?1",
                    params![*number as i64],
                )
                .map_err(|e| LoreError::Storage(format!("Failed to clear PR links: {}", e)))?;
                for sha in pr_commits {
                    tx.execute(
                        "INSERT OR IGNORE INTO pr_commits (pr_number, commit_sha) VALUES (?1, ?2)",
                        params![*number as i64, sha],
                    )
                    .map_err(|e| LoreError::Storage(format!("Failed to link PR: {}", e)))?;
                }
            }

            tx.commit()
                .map_err(|e| LoreError::Storage(format!("Failed to commit entity: {}", e)))?;
            debug!(key = %entity.key, version = %entity.version, "Entity stored");
            Ok(())
        })
    }

    /// Find an entity by natural key.
    pub fn get(&self, key: &EntityKey) -> Result<Option<EmbeddedEntity>> {
        self.db.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM entities WHERE kind = ?1 AND natural_id = ?2",
                ENTITY_COLUMNS
            );
            let row = conn
                .query_row(
                    &sql,
                    params![key.kind().as_str(), key.natural_id()],
                    |row| Ok(row_to_entity(row)),
                )
                .optional()
                .map_err(|e| LoreError::Storage(e.to_string()))?;
            row.transpose()
        })
    }

    /// One page of entities matching `filter`, ordered by timestamp then id.
    pub fn scan(
        &self,
        filter: &EntityFilter,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<EmbeddedEntity>> {
        self.scan_columns(ENTITY_COLUMNS, filter, offset, limit)
    }

    /// Like `scan`, but rows come back without source text or embedding.
    pub fn scan_metadata(
        &self,
        filter: &EntityFilter,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<EmbeddedEntity>> {
        self.scan_columns(METADATA_COLUMNS, filter, offset, limit)
    }

    fn scan_columns(
        &self,
        columns: &str,
        filter: &EntityFilter,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<EmbeddedEntity>> {
        self.db.with_conn(|conn| {
            let (clause, mut values) = where_clause(filter);
            let sql = format!(
                "SELECT {} FROM entities{} ORDER BY timestamp_ms ASC, kind ASC, natural_id ASC LIMIT ? OFFSET ?",
                columns, clause
            );
            values.push(SqlValue::Integer(limit as i64));
            values.push(SqlValue::Integer(offset as i64));

            let mut stmt = conn
                .prepare(&sql)
                .map_err(|e| LoreError::Storage(e.to_string()))?;
            let rows = stmt
                .query_map(params_from_iter(values), |row| Ok(row_to_entity(row)))
                .map_err(|e| LoreError::Storage(e.to_string()))?;

            let mut entities = Vec::new();
            for row in rows {
                entities.push(row.map_err(|e| LoreError::Storage(e.to_string()))??);
            }
            Ok(entities)
        })
    }

    /// Number of entities matching `filter`.
    pub fn count(&self, filter: &EntityFilter) -> Result<u64> {
        self.db.with_conn(|conn| {
            let (clause, values) = where_clause(filter);
            let sql = format!("SELECT COUNT(*) FROM entities{}", clause);
            let count: i64 = conn
                .query_row(&sql, params_from_iter(values), |row| row.get(0))
                .map_err(|e| LoreError::Storage(e.to_string()))?;
            Ok(count as u64)
        })
    }

    /// Commit shas linked to a pull request, sorted.
    pub fn pr_commits(&self, pr_number: u64) -> Result<Vec<String>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT commit_sha FROM pr_commits WHERE pr_number = ?1 ORDER BY commit_sha")
                .map_err(|e| LoreError::Storage(e.to_string()))?;
            let rows = stmt
                .query_map(params![pr_number as i64], |row| row.get::<_, String>(0))
                .map_err(|e| LoreError::Storage(e.to_string()))?;
            rows.collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| LoreError::Storage(e.to_string()))
        })
    }

    /// Pull requests that include a commit, ascending.
    pub fn pull_requests_for_commit(&self, sha: &str) -> Result<Vec<u64>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT pr_number FROM pr_commits WHERE commit_sha = ?1 ORDER BY pr_number")
                .map_err(|e| LoreError::Storage(e.to_string()))?;
            let rows = stmt
                .query_map(params![sha], |row| row.get::<_, i64>(0))
                .map_err(|e| LoreError::Storage(e.to_string()))?;
            let mut numbers = Vec::new();
            for row in rows {
                numbers.push(row.map_err(|e| LoreError::Storage(e.to_string()))? as u64);
            }
            Ok(numbers)
        })
    }

    /// Entity counts grouped by index version and kind.
    pub fn version_counts(&self) -> Result<Vec<VersionCount>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT model_id, dimensions, kind, COUNT(*) FROM entities
                     GROUP BY model_id, dimensions, kind
                     ORDER BY model_id, dimensions, kind",
                )
                .map_err(|e| LoreError::Storage(e.to_string()))?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, i64>(3)?,
                    ))
                })
                .map_err(|e| LoreError::Storage(e.to_string()))?;

            let mut counts = Vec::new();
            for row in rows {
                let (model_id, dims, kind, count) =
                    row.map_err(|e| LoreError::Storage(e.to_string()))?;
                let kind = EntityKind::parse(&kind)
                    .ok_or_else(|| LoreError::Storage(format!("Unknown entity kind: {}", kind)))?;
                counts.push(VersionCount {
                    version: IndexVersion::new(model_id, dims as usize),
                    kind,
                    count: count as u64,
                });
            }
            Ok(counts)
        })
    }
}

fn write_entity(conn: &Connection, entity: &EmbeddedEntity) -> Result<()> {
    let pr_number = match &entity.key {
        EntityKey::PullRequest { number } => Some(*number as i64),
        _ => None,
    };
    let metadata = serde_json::to_string(&entity.metadata)?;

    conn.execute(
        "INSERT INTO entities (kind, natural_id, commit_sha, file_path, pr_number, model_id,
                               dimensions, context_type, source_text, embedding, timestamp_ms, metadata)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
         ON CONFLICT (kind, natural_id) DO UPDATE SET
             commit_sha = excluded.commit_sha,
             file_path = excluded.file_path,
             pr_number = excluded.pr_number,
             model_id = excluded.model_id,
             dimensions = excluded.dimensions,
             context_type = excluded.context_type,
             source_text = excluded.source_text,
             embedding = excluded.embedding,
             timestamp_ms = excluded.timestamp_ms,
             metadata = excluded.metadata,
             updated_at = strftime('%s', 'now')",
        params![
            entity.kind().as_str(),
            entity.key.natural_id(),
            entity.key.commit_sha(),
            entity.key.file_path(),
            pr_number,
            entity.version.model_id,
            entity.version.dimensions as i64,
            entity.context_type.as_str(),
            entity.source_text,
            encode_embedding(&entity.embedding),
            entity.timestamp.timestamp_millis(),
            metadata,
        ],
    )
    .map_err(|e| LoreError::Storage(format!("Failed to store entity {}: {}", entity.key, e)))?;
    Ok(())
}

fn where_clause(filter: &EntityFilter) -> (String, Vec<SqlValue>) {
    let mut conditions = Vec::new();
    let mut values = Vec::new();

    if let Some(kind) = filter.kind {
        conditions.push("kind = ?");
        values.push(SqlValue::Text(kind.as_str().to_string()));
    }
    if let Some(version) = &filter.version {
        conditions.push("model_id = ? AND dimensions = ?");
        values.push(SqlValue::Text(version.model_id.clone()));
        values.push(SqlValue::Integer(version.dimensions as i64));
    }
    if let Some(version) = &filter.stale_for {
        conditions.push("NOT (model_id = ? AND dimensions = ?)");
        values.push(SqlValue::Text(version.model_id.clone()));
        values.push(SqlValue::Integer(version.dimensions as i64));
    }
    if let Some(path) = &filter.file_path {
        conditions.push("file_path = ?");
        values.push(SqlValue::Text(path.clone()));
    }
    if let Some(sha) = &filter.commit_sha {
        conditions.push("commit_sha = ?");
        values.push(SqlValue::Text(sha.clone()));
    }

    if conditions.is_empty() {
        (String::new(), values)
    } else {
        (format!(" WHERE {}", conditions.join(" AND ")), values)
    }
}

fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode_embedding(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(LoreError::Storage(format!(
            "Embedding blob length {} is not a multiple of 4",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

fn row_to_entity(row: &Row<'_>) -> Result<EmbeddedEntity> {
    let get_err = |e: rusqlite::Error| LoreError::Storage(e.to_string());

    let kind: String = row.get(0).map_err(get_err)?;
    let natural_id: String = row.get(1).map_err(get_err)?;
    let commit_sha: Option<String> = row.get(2).map_err(get_err)?;
    let file_path: Option<String> = row.get(3).map_err(get_err)?;
    let pr_number: Option<i64> = row.get(4).map_err(get_err)?;
    let model_id: String = row.get(5).map_err(get_err)?;
    let dimensions: i64 = row.get(6).map_err(get_err)?;
    let context_type: String = row.get(7).map_err(get_err)?;
    let source_text: String = row.get(8).map_err(get_err)?;
    let embedding: Vec<u8> = row.get(9).map_err(get_err)?;
    let timestamp_ms: i64 = row.get(10).map_err(get_err)?;
    let metadata: String = row.get(11).map_err(get_err)?;

    let key = match EntityKind::parse(&kind) {
        Some(EntityKind::Commit) => EntityKey::commit(natural_id),
        Some(EntityKind::Change) => match (commit_sha, file_path) {
            (Some(sha), Some(path)) => EntityKey::change(sha, path),
            _ => {
                return Err(LoreError::Storage(format!(
                    "Change {} is missing its commit or path",
                    natural_id
                )))
            }
        },
        Some(EntityKind::PullRequest) => {
            let number = pr_number.ok_or_else(|| {
                LoreError::Storage(format!("Pull request {} has no number", natural_id))
            })?;
            EntityKey::pull_request(number as u64)
        }
        None => return Err(LoreError::Storage(format!("Unknown entity kind: {}", kind))),
    };

    Ok(EmbeddedEntity {
        key,
        version: IndexVersion::new(model_id, dimensions as usize),
        context_type: ContextType::parse(&context_type).unwrap_or_default(),
        source_text,
        embedding: decode_embedding(&embedding)?,
        timestamp: Utc
            .timestamp_millis_opt(timestamp_ms)
            .single()
            .unwrap_or_default(),
        metadata: serde_json::from_str(&metadata)?,
    })
}
