use std::path::Path;

use rusqlite::params;

use super::{Snapshot, StateStore};
use crate::db::{self, Database, DatabaseError};
use crate::error::StoreError;
use crate::job::{Execution, Job, ScheduleEntry};

/// SQLite-backed store: one row per entity, the full entity kept as a JSON
/// `body` next to a few indexed columns.
#[derive(Clone)]
pub struct SqliteStore {
    db: Database,
}

struct Rows {
    jobs: Vec<(String, String)>,
    executions: Vec<String>,
    schedules: Vec<String>,
}

impl SqliteStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Opens `<data_directory>/harvester.db`, running migrations.
    pub fn open_in_directory<P: AsRef<Path>>(data_directory: P) -> Result<Self, StoreError> {
        let path = db::database_path(data_directory.as_ref());
        Ok(Self::new(Database::open(&path)?))
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Ok(Self::new(Database::open_in_memory()?))
    }

    fn read_rows(&self) -> Result<Rows, DatabaseError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id, body FROM jobs ORDER BY id")?;
            let jobs = stmt
                .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
                .collect::<Result<Vec<_>, _>>()?;

            let mut stmt = conn.prepare("SELECT body FROM executions ORDER BY seq")?;
            let executions = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;

            let mut stmt = conn.prepare("SELECT body FROM schedules ORDER BY job_id")?;
            let schedules = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;

            Ok(Rows {
                jobs,
                executions,
                schedules,
            })
        })
    }
}

impl StateStore for SqliteStore {
    fn load(&self) -> Result<Snapshot, StoreError> {
        let rows = self.read_rows()?;
        let mut snapshot = Snapshot::default();

        for (id, body) in rows.jobs {
            let job: Job = serde_json::from_str(&body)?;
            snapshot.jobs.insert(id, job);
        }
        for body in rows.executions {
            let execution: Execution = serde_json::from_str(&body)?;
            snapshot.executions.push(execution);
        }
        for body in rows.schedules {
            let entry: ScheduleEntry = serde_json::from_str(&body)?;
            snapshot.schedules.insert(entry.job_id.clone(), entry);
        }

        Ok(snapshot)
    }

    fn save(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        let jobs = snapshot
            .jobs
            .values()
            .map(|job| serde_json::to_string(job).map(|body| (job, body)))
            .collect::<Result<Vec<_>, _>>()?;
        let executions = snapshot
            .executions
            .iter()
            .map(|e| serde_json::to_string(e).map(|body| (e, body)))
            .collect::<Result<Vec<_>, _>>()?;
        let schedules = snapshot
            .schedules
            .values()
            .map(|s| serde_json::to_string(s).map(|body| (s, body)))
            .collect::<Result<Vec<_>, _>>()?;

        self.db.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            tx.execute("DELETE FROM jobs", [])?;
            tx.execute("DELETE FROM executions", [])?;
            tx.execute("DELETE FROM schedules", [])?;

            {
                let mut stmt = tx.prepare(
                    "INSERT INTO jobs (id, kind, priority, status, created_at, body)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                )?;
                for (job, body) in &jobs {
                    stmt.execute(params![
                        job.id,
                        job.kind.as_str(),
                        job.priority.as_str(),
                        job.status.as_str(),
                        job.created_at.to_rfc3339(),
                        body,
                    ])?;
                }

                let mut stmt = tx.prepare(
                    "INSERT INTO executions (seq, id, job_id, started_at, body)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                )?;
                for (seq, (execution, body)) in executions.iter().enumerate() {
                    stmt.execute(params![
                        seq as i64,
                        execution.id,
                        execution.job_id,
                        execution.started_at.to_rfc3339(),
                        body,
                    ])?;
                }

                let mut stmt =
                    tx.prepare("INSERT INTO schedules (job_id, kind, body) VALUES (?1, ?2, ?3)")?;
                for (entry, body) in &schedules {
                    stmt.execute(params![entry.job_id, entry.kind().to_string(), body])?;
                }
            }

            tx.commit()?;
            Ok(())
        })?;

        Ok(())
    }

    fn describe(&self) -> String {
        "sqlite database".to_string()
    }
}
