//! SqliteStore - SQLite による永続 JobStore
//!
//! # 実装詳細
//! - 1 job = 1 行（uuid が主キー）
//! - arguments / result は JSON テキスト。値なしは NULL（空文字 `""` とは区別される）
//! - result の JSON `null` はテキスト `null` として保存（未設定の NULL とは別物）
//! - created / updated は固定幅の RFC 3339（ナノ秒, `Z`）なので文字列順 = 時刻順
//! - rusqlite はブロッキング API なので spawn_blocking で実行
//! - start() で接続 + マイグレーション、stop() で切断

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Transaction};
use serde_json::Value;
use tracing::info;

use crate::domain::{IllegalTransition, Job, JobId, JobStatus};
use crate::error::StoreError;
use crate::impls::Migrations;
use crate::ports::{CleanStrategy, JobStore};

pub const DEFAULT_SQLITE_PATH: &str = "./tsq.sqlite3";

const JOB_COLUMNS: &str = "uuid, name, status, arguments, result, created, updated";

fn create_job_table(tx: &Transaction<'_>) -> rusqlite::Result<()> {
    tx.execute(
        "CREATE TABLE job (
            uuid TEXT NOT NULL PRIMARY KEY,
            name TEXT NOT NULL,
            status TEXT NOT NULL,
            arguments TEXT,
            result TEXT,
            created TEXT NOT NULL,
            updated TEXT NOT NULL
        )",
        [],
    )?;
    Ok(())
}

fn create_job_indices(tx: &Transaction<'_>) -> rusqlite::Result<()> {
    tx.execute("CREATE INDEX job_created_index ON job (created)", [])?;
    tx.execute("CREATE INDEX job_status_index ON job (status)", [])?;
    Ok(())
}

/// The job store's schema history. Never edit a registered entry, append a new one.
pub fn job_migrations() -> Migrations {
    Migrations::new()
        .register("V1__001_create_job", create_job_table)
        .register("V1__002_job_indices", create_job_indices)
}

pub struct SqliteStore {
    path: PathBuf,
    conn: Arc<Mutex<Option<Connection>>>,
}

impl SqliteStore {
    /// No I/O happens until `start`.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            conn: Arc::new(Mutex::new(None)),
        }
    }

    /// A private in-memory database; contents are lost on `stop`.
    pub fn in_memory() -> Self {
        Self::new(":memory:")
    }

    /// Run `f` against the open connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|e| StoreError::Blocking(format!("connection lock poisoned: {e}")))?;
            let conn = guard.as_mut().ok_or(StoreError::NotStarted)?;
            f(conn)
        })
        .await
        .map_err(|e| StoreError::Blocking(e.to_string()))?
    }
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_datetime(id: &str, value: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt {
            id: id.to_string(),
            reason: format!("bad timestamp {value:?}: {e}"),
        })
}

/// Arguments: JSON `null` means "no arguments" and is stored as SQL NULL.
fn encode_arguments(arguments: &Value) -> Result<Option<String>, StoreError> {
    match arguments {
        Value::Null => Ok(None),
        value => Ok(Some(serde_json::to_string(value)?)),
    }
}

/// Results: only a missing result is SQL NULL. A runner that returned JSON
/// `null` gets the text `null`, so it reads back as `Some(Value::Null)`.
fn encode_result(result: Option<&Value>) -> Result<Option<String>, StoreError> {
    result
        .map(serde_json::to_string)
        .transpose()
        .map_err(StoreError::from)
}

fn decode(value: Option<String>) -> Result<Option<Value>, StoreError> {
    value
        .map(|text| serde_json::from_str(&text))
        .transpose()
        .map_err(StoreError::from)
}

struct JobRow {
    uuid: String,
    name: String,
    status: String,
    arguments: Option<String>,
    result: Option<String>,
    created: String,
    updated: String,
}

impl JobRow {
    fn read(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            uuid: row.get("uuid")?,
            name: row.get("name")?,
            status: row.get("status")?,
            arguments: row.get("arguments")?,
            result: row.get("result")?,
            created: row.get("created")?,
            updated: row.get("updated")?,
        })
    }

    fn into_job(self) -> Result<Job, StoreError> {
        let status = JobStatus::parse(&self.status).ok_or_else(|| StoreError::Corrupt {
            id: self.uuid.clone(),
            reason: format!("unknown status {:?}", self.status),
        })?;
        Ok(Job {
            created: parse_datetime(&self.uuid, &self.created)?,
            updated: parse_datetime(&self.uuid, &self.updated)?,
            arguments: decode(self.arguments)?.unwrap_or(Value::Null),
            result: decode(self.result)?,
            status,
            name: self.name,
            id: JobId::from(self.uuid),
        })
    }
}

fn current_status(conn: &Connection, id: &JobId) -> Result<Option<JobStatus>, StoreError> {
    let status: Option<String> = conn
        .query_row(
            "SELECT status FROM job WHERE uuid = ?1",
            params![id.as_str()],
            |row| row.get(0),
        )
        .optional()?;
    status
        .map(|s| {
            JobStatus::parse(&s).ok_or_else(|| StoreError::Corrupt {
                id: id.to_string(),
                reason: format!("unknown status {s:?}"),
            })
        })
        .transpose()
}

#[async_trait]
impl JobStore for SqliteStore {
    async fn start(&self) -> Result<(), StoreError> {
        let path = self.path.clone();
        let slot = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || -> Result<(), StoreError> {
            let mut guard = slot
                .lock()
                .map_err(|e| StoreError::Blocking(format!("connection lock poisoned: {e}")))?;
            if guard.is_some() {
                return Ok(());
            }
            let mut conn = Connection::open(&path)?;
            let applied = job_migrations().run(&mut conn)?;
            info!(path = %path.display(), migrations = applied.len(), "sqlite job store opened");
            *guard = Some(conn);
            Ok(())
        })
        .await
        .map_err(|e| StoreError::Blocking(e.to_string()))?
    }

    async fn stop(&self) -> Result<(), StoreError> {
        let slot = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || -> Result<(), StoreError> {
            let mut guard = slot
                .lock()
                .map_err(|e| StoreError::Blocking(format!("connection lock poisoned: {e}")))?;
            if let Some(conn) = guard.take() {
                conn.close().map_err(|(_, e)| StoreError::Sqlite(e))?;
            }
            Ok(())
        })
        .await
        .map_err(|e| StoreError::Blocking(e.to_string()))?
    }

    async fn store(&self, job: &Job) -> Result<(), StoreError> {
        let id = job.id.clone();
        let name = job.name.clone();
        let status = job.status.as_str();
        let arguments = encode_arguments(&job.arguments)?;
        let result = encode_result(job.result.as_ref())?;
        let created = format_datetime(&job.created);
        let updated = format_datetime(&job.updated);

        self.with_conn(move |conn| {
            let inserted = conn.execute(
                "INSERT INTO job (uuid, name, status, arguments, result, created, updated)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![id.as_str(), name, status, arguments, result, created, updated],
            );
            match inserted {
                Ok(_) => Ok(()),
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == ErrorCode::ConstraintViolation =>
                {
                    Err(StoreError::Duplicate(id))
                }
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    async fn get_job(&self, id: &JobId) -> Result<Option<Job>, StoreError> {
        let id = id.clone();
        self.with_conn(move |conn| {
            let row = conn
                .query_row(
                    &format!("SELECT {JOB_COLUMNS} FROM job WHERE uuid = ?1"),
                    params![id.as_str()],
                    JobRow::read,
                )
                .optional()?;
            row.map(JobRow::into_job).transpose()
        })
        .await
    }

    async fn get_jobs(&self) -> Result<Vec<Job>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {JOB_COLUMNS} FROM job ORDER BY created DESC, rowid DESC"
            ))?;
            let rows = stmt
                .query_map([], JobRow::read)?
                .collect::<Result<Vec<_>, _>>()?;
            rows.into_iter().map(JobRow::into_job).collect()
        })
        .await
    }

    async fn set_status(
        &self,
        id: &JobId,
        status: JobStatus,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let id = id.clone();
        let updated = format_datetime(&at);
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let Some(current) = current_status(&tx, &id)? else {
                return Err(StoreError::Missing(id));
            };
            if !current.can_transition_to(status) {
                return Err(StoreError::IllegalTransition {
                    id,
                    source: IllegalTransition {
                        from: current,
                        to: status,
                    },
                });
            }
            tx.execute(
                "UPDATE job SET status = ?1, updated = ?2 WHERE uuid = ?3",
                params![status.as_str(), updated, id.as_str()],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn set_result(&self, id: &JobId, result: &Value) -> Result<(), StoreError> {
        let id = id.clone();
        let result = encode_result(Some(result))?;
        self.with_conn(move |conn| {
            let changed = conn.execute(
                "UPDATE job SET result = ?1 WHERE uuid = ?2",
                params![result, id.as_str()],
            )?;
            if changed == 0 {
                return Err(StoreError::Missing(id));
            }
            Ok(())
        })
        .await
    }

    async fn clean(&self, strategy: &dyn CleanStrategy) -> Result<usize, StoreError> {
        // strategy は spawn_blocking に渡せない（'static でない）ので、
        // 判定は async 側で行い、削除だけを blocking に回す
        let finished: Vec<Job> = self
            .get_jobs()
            .await?
            .into_iter()
            .filter(Job::has_finished)
            .collect();
        let doomed: Vec<JobId> = finished
            .into_iter()
            .filter(|job| !strategy.should_keep(job))
            .map(|job| job.id)
            .collect();
        if doomed.is_empty() {
            return Ok(0);
        }

        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let mut removed = 0;
            {
                // 判定後に状態が変わった行は消さない（完了済みは不変なので保険程度）
                let mut stmt = tx.prepare(
                    "DELETE FROM job WHERE uuid = ?1 AND status IN ('SUCCESS', 'FAILURE')",
                )?;
                for id in &doomed {
                    removed += stmt.execute(params![id.as_str()])?;
                }
            }
            tx.commit()?;
            Ok(removed)
        })
        .await
    }
}
