//! Database schema migrations.
//!
//! Version 1 creates the `entities` table (one row per embedded commit,
//! change or pull request) and the `pr_commits` link table. Version 2
//! rewrites change ids to the length-prefixed `{len}:{sha}:{path}` form.

use rusqlite::Connection;
use tracing::info;

use gitlore_core::error::{LoreError, Result};

/// Run all pending database migrations.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );",
    )
    .map_err(|e| LoreError::Storage(format!("Failed to create migrations table: {}", e)))?;

    let current_version = current_version(conn)?;

    if current_version < 1 {
        apply_v1(conn)?;
        info!("Applied migration v1: entities");
    }
    if current_version < 2 {
        apply_v2(conn)?;
        info!("Applied migration v2: unambiguous change ids");
    }

    Ok(())
}

/// Highest applied migration version, 0 for a fresh database.
pub fn current_version(conn: &Connection) -> Result<i64> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )
    .map_err(|e| LoreError::Storage(format!("Failed to query migration version: {}", e)))
}

fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        BEGIN;

        CREATE TABLE IF NOT EXISTS entities (
            kind            TEXT NOT NULL
                            CHECK (kind IN ('commit', 'change', 'pull_request')),
            natural_id      TEXT NOT NULL,
            commit_sha      TEXT,
            file_path       TEXT,
            pr_number       INTEGER,
            model_id        TEXT NOT NULL,
            dimensions      INTEGER NOT NULL,
            context_type    TEXT NOT NULL
                            CHECK (context_type IN ('code', 'commit', 'general')),
            source_text     TEXT NOT NULL DEFAULT '',
            embedding       BLOB NOT NULL,
            timestamp_ms    INTEGER NOT NULL,
            metadata        TEXT NOT NULL DEFAULT 'null',
            updated_at      INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
            PRIMARY KEY (kind, natural_id)
        );

        CREATE INDEX IF NOT EXISTS idx_entities_version
            ON entities (model_id, dimensions, kind, timestamp_ms);

        CREATE INDEX IF NOT EXISTS idx_entities_file_path
            ON entities (file_path, timestamp_ms)
            WHERE file_path IS NOT NULL;

        CREATE INDEX IF NOT EXISTS idx_entities_commit_sha
            ON entities (commit_sha)
            WHERE commit_sha IS NOT NULL;

        CREATE TABLE IF NOT EXISTS pr_commits (
            pr_number   INTEGER NOT NULL,
            commit_sha  TEXT NOT NULL,
            PRIMARY KEY (pr_number, commit_sha)
        );

        CREATE INDEX IF NOT EXISTS idx_pr_commits_sha
            ON pr_commits (commit_sha);

        INSERT INTO schema_migrations (version, name) VALUES (1, 'entities');

        COMMIT;
        ",
    )
    .map_err(|e| LoreError::Storage(format!("Migration v1 failed: {}", e)))
}

fn apply_v2(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        BEGIN;

        UPDATE entities
           SET natural_id = length(commit_sha) || ':' || commit_sha || ':' || file_path
         WHERE kind = 'change';

        INSERT INTO schema_migrations (version, name) VALUES (2, 'change_ids');

        COMMIT;
        ",
    )
    .map_err(|e| LoreError::Storage(format!("Migration v2 failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_apply_once() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();
        assert_eq!(current_version(&conn).unwrap(), 2);

        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_migrations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, 2);
    }

    #[test]
    fn test_v2_rewrites_change_ids() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE schema_migrations (
                version     INTEGER PRIMARY KEY NOT NULL,
                name        TEXT NOT NULL,
                applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
            );",
        )
        .unwrap();
        apply_v1(&conn).unwrap();
        conn.execute(
            "INSERT INTO entities (kind, natural_id, commit_sha, file_path, model_id, dimensions,
                                   context_type, embedding, timestamp_ms)
             VALUES ('change', 'abc_src/lib.rs', 'abc', 'src/lib.rs', 'm', 1, 'code', x'', 0),
                    ('commit', 'abc', 'abc', NULL, 'm', 1, 'commit', x'', 0)",
            [],
        )
        .unwrap();

        run_migrations(&conn).unwrap();

        let ids: Vec<String> = conn
            .prepare("SELECT natural_id FROM entities ORDER BY kind")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<_, _>>()
            .unwrap();
        assert_eq!(ids, vec!["3:abc:src/lib.rs", "abc"]);
    }

    #[test]
    fn test_entities_kind_is_checked() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        let result = conn.execute(
            "INSERT INTO entities (kind, natural_id, model_id, dimensions, context_type, embedding, timestamp_ms)
             VALUES ('tag', 'v1', 'm', 2, 'code', x'00', 0)",
            [],
        );
        assert!(result.is_err());
    }
}
