pub mod models;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, ErrorCode};
use std::path::Path;
use std::time::Duration;

use crate::config::DatabaseConfig;
use crate::state::DbPool;

pub const MIGRATIONS: &[(&str, &str)] = &[
    (
        "001_initial",
        include_str!("../../migrations/001_initial.sql"),
    ),
    (
        "002_notifications",
        include_str!("../../migrations/002_notifications.sql"),
    ),
];

pub fn create_pool(db_path: &Path, config: &DatabaseConfig) -> anyhow::Result<DbPool> {
    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Lock waits and pool checkout share one timeout. foreign_keys and
    // busy_timeout are per-connection, so every pooled connection gets them.
    let timeout = Duration::from_secs(config.timeout_secs);
    let manager = SqliteConnectionManager::file(db_path).with_init(move |conn| {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.busy_timeout(timeout)
    });
    let pool = Pool::builder()
        .max_size(config.pool_size)
        .connection_timeout(timeout)
        .build(manager)?;

    let conn = pool.get()?;
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        ",
    )?;

    Ok(pool)
}

pub fn run_migrations(pool: &DbPool) -> anyhow::Result<()> {
    let conn = pool.get()?;

    // Create migrations tracking table
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            name TEXT PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    for (name, sql) in MIGRATIONS {
        let already_applied: bool = conn.query_row(
            "SELECT COUNT(*) > 0 FROM schema_version WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )?;

        if !already_applied {
            tracing::info!("Applying migration: {}", name);
            conn.execute_batch(sql)?;
            conn.execute(
                "INSERT INTO schema_version (name) VALUES (?1)",
                params![name],
            )?;
        }
    }

    tracing::info!("Database migrations complete");
    Ok(())
}

/// True when the error is a UNIQUE or PRIMARY KEY constraint failure.
pub fn is_unique_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, _) => {
            e.code == ErrorCode::ConstraintViolation
                && (e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY)
        }
        _ => false,
    }
}

/// Current time in the format the schema stores (`created_at` columns).
pub fn now_timestamp() -> String {
    chrono::Utc::now()
        .format("%Y-%m-%dT%H:%M:%S%.3fZ")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_pool() -> (tempfile::TempDir, DbPool) {
        let tmp = tempfile::tempdir().unwrap();
        let pool = create_pool(&tmp.path().join("test.db"), &DatabaseConfig::default()).unwrap();
        (tmp, pool)
    }

    #[test]
    fn create_pool_creates_db_file() {
        let tmp = tempfile::tempdir().unwrap();
        let db_path = tmp.path().join("sub/dir/test.db");
        let pool = create_pool(&db_path, &DatabaseConfig::default()).unwrap();
        assert!(db_path.exists());
        let conn = pool.get().unwrap();
        let mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode, "wal");
    }

    #[test]
    fn every_pooled_connection_enforces_foreign_keys() {
        let (_tmp, pool) = test_pool();
        let a = pool.get().unwrap();
        let b = pool.get().unwrap();
        for conn in [&a, &b] {
            let on: i64 = conn
                .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
                .unwrap();
            assert_eq!(on, 1);
        }
    }

    #[test]
    fn busy_timeout_follows_config() {
        let tmp = tempfile::tempdir().unwrap();
        let config = DatabaseConfig {
            timeout_secs: 2,
            ..DatabaseConfig::default()
        };
        let pool = create_pool(&tmp.path().join("test.db"), &config).unwrap();
        let a = pool.get().unwrap();
        let b = pool.get().unwrap();
        for conn in [&a, &b] {
            let ms: i64 = conn
                .query_row("PRAGMA busy_timeout", [], |row| row.get(0))
                .unwrap();
            assert_eq!(ms, 2000);
        }
    }

    #[test]
    fn migrations_run_successfully() {
        let (_tmp, pool) = test_pool();
        run_migrations(&pool).unwrap();

        let conn = pool.get().unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, MIGRATIONS.len() as i64);

        let tables: Vec<String> = {
            let mut stmt = conn
                .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
                .unwrap();
            stmt.query_map([], |row| row.get(0))
                .unwrap()
                .filter_map(|r| r.ok())
                .collect()
        };
        for table in [
            "users",
            "posts",
            "media",
            "likes",
            "reposts",
            "bookmarks",
            "follows",
            "notifications",
        ] {
            assert!(tables.contains(&table.to_string()), "missing {table}");
        }
    }

    #[test]
    fn migrations_are_idempotent() {
        let (_tmp, pool) = test_pool();
        run_migrations(&pool).unwrap();
        run_migrations(&pool).unwrap();

        let conn = pool.get().unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, MIGRATIONS.len() as i64);
    }

    #[test]
    fn foreign_keys_enforced() {
        let (_tmp, pool) = test_pool();
        run_migrations(&pool).unwrap();

        let conn = pool.get().unwrap();
        let result = conn.execute(
            "INSERT INTO posts (id, author_id, content) VALUES (?1, ?2, ?3)",
            params!["post-1", "nonexistent-user", "hello"],
        );
        assert!(result.is_err());
    }

    #[test]
    fn self_follow_rejected_by_schema() {
        let (_tmp, pool) = test_pool();
        run_migrations(&pool).unwrap();

        let conn = pool.get().unwrap();
        conn.execute(
            "INSERT INTO users (id, email, handler, username, password_hash)
             VALUES ('u1', 'a@example.com', 'a', 'A', 'x')",
            [],
        )
        .unwrap();
        let result = conn.execute(
            "INSERT INTO follows (follower_id, following_id) VALUES ('u1', 'u1')",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn duplicate_relation_is_a_unique_violation() {
        let (_tmp, pool) = test_pool();
        run_migrations(&pool).unwrap();

        let conn = pool.get().unwrap();
        conn.execute_batch(
            "INSERT INTO users (id, email, handler, username, password_hash)
               VALUES ('u1', 'a@example.com', 'a', 'A', 'x');
             INSERT INTO posts (id, author_id, content) VALUES ('p1', 'u1', 'hi');
             INSERT INTO likes (user_id, post_id) VALUES ('u1', 'p1');",
        )
        .unwrap();
        let err = conn
            .execute(
                "INSERT INTO likes (user_id, post_id) VALUES ('u1', 'p1')",
                [],
            )
            .unwrap_err();
        assert!(is_unique_violation(&err));
    }

    #[test]
    fn timestamps_sort_lexicographically() {
        let a = now_timestamp();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = now_timestamp();
        assert!(a < b);
        assert!(a.ends_with('Z'));
    }
}
