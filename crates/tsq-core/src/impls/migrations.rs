//! Named, run-once schema migrations for SQLite.
//!
//! Every migration's outcome lands in `schema_version`:
//! - success is recorded in the same transaction as the migration itself
//! - a failure is rolled back, then recorded as failed
//!
//! A recorded failure blocks every later run until someone fixes the database
//! by hand and removes the row. If the rollback or the failure record itself
//! fails, that is logged and the migration's own error is still returned.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use thiserror::Error;
use tracing::{error, info, warn};

pub type MigrationFn = fn(&Transaction<'_>) -> rusqlite::Result<()>;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("migration {version} failed before; manual cleanup required")]
    PreviouslyFailed { version: String },

    #[error("migration {version} failed: {source}")]
    Failed {
        version: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("schema_version bookkeeping failed: {0}")]
    Bookkeeping(#[from] rusqlite::Error),
}

pub struct Migration {
    pub version: &'static str,
    pub migrate: MigrationFn,
}

#[derive(Default)]
pub struct Migrations {
    migrations: Vec<Migration>,
}

const CREATE_SCHEMA_VERSION: &str = "CREATE TABLE IF NOT EXISTS schema_version (
    version TEXT NOT NULL PRIMARY KEY,
    status INTEGER NOT NULL,
    applied_at TEXT NOT NULL
)";

impl Migrations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a migration. Migrations run in registration order.
    pub fn register(mut self, version: &'static str, migrate: MigrationFn) -> Self {
        self.migrations.push(Migration { version, migrate });
        self
    }

    /// Apply every migration not yet recorded. Returns the versions applied now.
    pub fn run(&self, conn: &mut Connection) -> Result<Vec<&'static str>, MigrationError> {
        conn.execute(CREATE_SCHEMA_VERSION, [])?;

        let mut applied = Vec::new();
        for migration in &self.migrations {
            match recorded_status(conn, migration.version)? {
                Some(true) => continue,
                Some(false) => {
                    return Err(MigrationError::PreviouslyFailed {
                        version: migration.version.to_string(),
                    });
                }
                None => {}
            }

            info!(version = migration.version, "running migration");
            let tx = conn.transaction()?;
            match (migration.migrate)(&tx) {
                Ok(()) => {
                    record(&tx, migration.version, true)?;
                    tx.commit()?;
                    applied.push(migration.version);
                }
                Err(source) => {
                    warn!(version = migration.version, error = %source, "migration failed");
                    if let Err(e) = tx.rollback() {
                        error!(version = migration.version, error = %e, "migration rollback failed");
                    } else if let Err(e) = record(conn, migration.version, false) {
                        error!(version = migration.version, error = %e, "failed to record migration failure");
                    }
                    return Err(MigrationError::Failed {
                        version: migration.version.to_string(),
                        source,
                    });
                }
            }
        }
        Ok(applied)
    }
}

fn recorded_status(conn: &Connection, version: &str) -> rusqlite::Result<Option<bool>> {
    conn.query_row(
        "SELECT status FROM schema_version WHERE version = ?1",
        params![version],
        |row| row.get::<_, bool>(0),
    )
    .optional()
}

fn record(conn: &Connection, version: &str, ok: bool) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO schema_version (version, status, applied_at) VALUES (?1, ?2, ?3)",
        params![version, ok, Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_a(tx: &Transaction<'_>) -> rusqlite::Result<()> {
        tx.execute("CREATE TABLE a (x INTEGER)", [])?;
        Ok(())
    }

    fn create_b(tx: &Transaction<'_>) -> rusqlite::Result<()> {
        tx.execute("CREATE TABLE b (y INTEGER)", [])?;
        Ok(())
    }

    fn half_broken(tx: &Transaction<'_>) -> rusqlite::Result<()> {
        tx.execute("CREATE TABLE c (z INTEGER)", [])?;
        tx.execute("THIS IS NOT SQL", [])?;
        Ok(())
    }

    fn table_exists(conn: &Connection, name: &str) -> bool {
        conn.query_row(
            "SELECT count(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![name],
            |row| row.get::<_, i64>(0),
        )
        .unwrap()
            == 1
    }

    #[test]
    fn migrations_run_once_in_order() {
        let mut conn = Connection::open_in_memory().unwrap();
        let migrations = Migrations::new()
            .register("V1__001_a", create_a)
            .register("V1__002_b", create_b);

        let first = migrations.run(&mut conn).unwrap();
        assert_eq!(first, vec!["V1__001_a", "V1__002_b"]);

        let second = migrations.run(&mut conn).unwrap();
        assert!(second.is_empty());

        assert!(table_exists(&conn, "a"));
        assert!(table_exists(&conn, "b"));
    }

    #[test]
    fn new_migrations_are_picked_up_later() {
        let mut conn = Connection::open_in_memory().unwrap();
        Migrations::new()
            .register("V1__001_a", create_a)
            .run(&mut conn)
            .unwrap();

        let applied = Migrations::new()
            .register("V1__001_a", create_a)
            .register("V1__002_b", create_b)
            .run(&mut conn)
            .unwrap();

        assert_eq!(applied, vec!["V1__002_b"]);
    }

    #[test]
    fn failed_migration_is_rolled_back_and_recorded() {
        let mut conn = Connection::open_in_memory().unwrap();
        let migrations = Migrations::new()
            .register("V1__001_a", create_a)
            .register("V1__002_broken", half_broken)
            .register("V1__003_b", create_b);

        let err = migrations.run(&mut conn).unwrap_err();
        assert!(matches!(err, MigrationError::Failed { ref version, .. } if version == "V1__002_broken"));

        // partial work is gone, later migrations never ran
        assert!(table_exists(&conn, "a"));
        assert!(!table_exists(&conn, "c"));
        assert!(!table_exists(&conn, "b"));
        assert_eq!(recorded_status(&conn, "V1__002_broken").unwrap(), Some(false));
    }

    #[test]
    fn previously_failed_migration_blocks_startup() {
        let mut conn = Connection::open_in_memory().unwrap();
        let migrations = Migrations::new()
            .register("V1__001_a", create_a)
            .register("V1__002_broken", half_broken);
        migrations.run(&mut conn).unwrap_err();

        let err = migrations.run(&mut conn).unwrap_err();
        assert!(matches!(
            err,
            MigrationError::PreviouslyFailed { ref version } if version == "V1__002_broken"
        ));
    }

    #[test]
    fn failure_record_error_keeps_the_migration_error() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute(CREATE_SCHEMA_VERSION, []).unwrap();
        conn.execute_batch(
            "CREATE TRIGGER refuse_failures BEFORE INSERT ON schema_version
             WHEN NEW.status = 0
             BEGIN SELECT RAISE(ABORT, 'read only'); END;",
        )
        .unwrap();
        let migrations = Migrations::new()
            .register("V1__001_a", create_a)
            .register("V1__002_broken", half_broken);

        let err = migrations.run(&mut conn).unwrap_err();

        match err {
            MigrationError::Failed { version, source } => {
                assert_eq!(version, "V1__002_broken");
                assert!(source.to_string().contains("syntax error"), "{source}");
            }
            other => panic!("expected Failed, got {other:?}"),
        }
        assert!(table_exists(&conn, "a"));
        assert!(!table_exists(&conn, "c"));
        assert_eq!(recorded_status(&conn, "V1__002_broken").unwrap(), None);
    }
}
