//! Schema migrations.
//!
//! Numbered SQL files are embedded at compile time via `include_str!` and each
//! one runs exactly once, tracked by the `schema_version` table. Migrations
//! are additive: later files only create tables or add columns.

use rusqlite::Connection;

struct Migration {
    version: i32,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    sql: include_str!("migrations/001_baseline.sql"),
}];

fn ensure_schema_version_table(conn: &Connection) -> Result<(), String> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )
    .map_err(|e| format!("Failed to create schema_version table: {}", e))
}

/// Return the highest applied migration version, or 0 if none.
fn current_version(conn: &Connection) -> Result<i32, String> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )
    .map_err(|e| format!("Failed to read schema version: {}", e))
}

/// Copy a file-backed database to `<db_path>.pre-migration.bak` before any
/// pending migration touches it. In-memory databases are skipped.
fn backup_before_migration(conn: &Connection) -> Result<(), String> {
    let db_path: String = conn
        .query_row("PRAGMA database_list", [], |row| row.get(2))
        .map_err(|e| format!("Failed to get database path: {}", e))?;

    if db_path.is_empty() || db_path == ":memory:" {
        return Ok(());
    }

    // A brand-new file has nothing worth keeping.
    if current_version(conn)? == 0 {
        return Ok(());
    }

    let backup_path = format!("{}.pre-migration.bak", db_path);
    let mut backup_conn = Connection::open(&backup_path)
        .map_err(|e| format!("Failed to open backup file: {}", e))?;

    let backup = rusqlite::backup::Backup::new(conn, &mut backup_conn)
        .map_err(|e| format!("Failed to initialize pre-migration backup: {}", e))?;

    backup
        .step(-1)
        .map_err(|e| format!("Pre-migration backup failed: {}", e))?;

    log::info!("Pre-migration backup created at {}", backup_path);
    Ok(())
}

/// Run all pending migrations, each inside its own transaction.
///
/// Returns the number of migrations applied. Refuses to open a database whose
/// schema version is newer than anything this build knows about.
pub fn run_migrations(conn: &Connection) -> Result<usize, String> {
    ensure_schema_version_table(conn)?;

    let current = current_version(conn)?;
    let max_known = MIGRATIONS.last().map(|m| m.version).unwrap_or(0);

    if current > max_known {
        return Err(format!(
            "Database schema version ({}) is newer than this version of DealDesk supports ({}). \
             Please update DealDesk to the latest version.",
            current, max_known
        ));
    }

    let pending: Vec<&Migration> = MIGRATIONS.iter().filter(|m| m.version > current).collect();
    if pending.is_empty() {
        return Ok(0);
    }

    backup_before_migration(conn)?;

    for migration in &pending {
        let script = format!(
            "BEGIN;\n{}\nINSERT INTO schema_version (version) VALUES ({});\nCOMMIT;",
            migration.sql, migration.version
        );
        if let Err(e) = conn.execute_batch(&script) {
            let _ = conn.execute_batch("ROLLBACK");
            return Err(format!("Migration v{} failed: {}", migration.version, e));
        }
        log::info!("Applied migration v{}", migration.version);
    }

    Ok(pending.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mem_db() -> Connection {
        Connection::open_in_memory().expect("in-memory db")
    }

    #[test]
    fn test_fresh_db_applies_baseline() {
        let conn = mem_db();
        let applied = run_migrations(&conn).expect("migrations should succeed");
        assert_eq!(applied, 1);
        assert_eq!(current_version(&conn).expect("version"), 1);

        for table in [
            "users",
            "sessions",
            "organizations",
            "contacts",
            "pipelines",
            "pipeline_stages",
            "deals",
            "payments",
            "projects",
            "tasks",
            "quotations",
            "quotation_items",
            "interactions",
        ] {
            let count: i64 = conn
                .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                    row.get(0)
                })
                .unwrap_or_else(|e| panic!("{} should exist: {}", table, e));
            assert_eq!(count, 0, "{} should start empty", table);
        }

        // Optional references accept NULL
        conn.execute(
            "INSERT INTO deals (id, organization_id, contact_id, pipeline_stage_id, title,
                                created_at, updated_at)
             VALUES ('d1', 'o1', 'c1', NULL, 'Deal', '2024-01-01', '2024-01-01')",
            [],
        )
        .expect("deal with no stage");
        conn.execute(
            "INSERT INTO tasks (id, project_id, owner_user_id, title, created_at, updated_at)
             VALUES ('t1', 'p1', NULL, 'Task', '2024-01-01', '2024-01-01')",
            [],
        )
        .expect("task with no owner");
    }

    #[test]
    fn test_quotation_number_is_unique() {
        let conn = mem_db();
        run_migrations(&conn).expect("migrations");
        conn.execute(
            "INSERT INTO quotations (id, deal_id, number, title, created_at, updated_at)
             VALUES ('q1', 'd1', 'QUO-2024-001', 'A', '2024-01-01', '2024-01-01')",
            [],
        )
        .expect("first quotation");
        let dup = conn.execute(
            "INSERT INTO quotations (id, deal_id, number, title, created_at, updated_at)
             VALUES ('q2', 'd1', 'QUO-2024-001', 'B', '2024-01-01', '2024-01-01')",
            [],
        );
        assert!(dup.is_err(), "duplicate number must be rejected");
    }

    #[test]
    fn test_forward_compat_guard() {
        let conn = mem_db();
        ensure_schema_version_table(&conn).unwrap();
        conn.execute("INSERT INTO schema_version (version) VALUES (999)", [])
            .unwrap();

        let err = run_migrations(&conn).unwrap_err();
        assert!(
            err.contains("newer than this version"),
            "error should mention version mismatch: {}",
            err
        );
    }

    #[test]
    fn test_idempotency() {
        let conn = mem_db();
        assert_eq!(run_migrations(&conn).expect("first run"), 1);
        assert_eq!(run_migrations(&conn).expect("second run"), 0);
        assert_eq!(current_version(&conn).expect("version"), 1);
    }

    #[test]
    fn test_fresh_file_skips_backup() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db_path = dir.path().join("fresh.db");

        let conn = Connection::open(&db_path).expect("open db");
        assert_eq!(run_migrations(&conn).expect("migrations"), 1);

        assert!(!dir.path().join("fresh.db.pre-migration.bak").exists());
    }
}
