use std::{
    path::{Path, PathBuf},
    sync::{mpsc, Arc},
    thread::{self, JoinHandle},
};

use anyhow::{anyhow, Context, Result};
use log::{error, info, warn};
use rusqlite::Connection;
use tokio::sync::oneshot;

use super::migrations::run_migrations;

type Job = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

/// Owns the job queue. Dropping the last clone closes the queue, which ends
/// the worker loop, and then joins the thread.
struct Worker {
    jobs: Option<mpsc::Sender<Job>>,
    thread: Option<JoinHandle<()>>,
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.jobs.take();
        if let Some(Err(err)) = self.thread.take().map(JoinHandle::join) {
            error!("rotation-db thread panicked: {err:?}");
        }
    }
}

/// SQLite store owned by a dedicated worker thread.
///
/// Every query is shipped to the worker as a closure, so async callers (the
/// flush task in particular) never block a runtime thread on disk I/O.
#[derive(Clone)]
pub struct Database {
    worker: Arc<Worker>,
    path: Arc<PathBuf>,
}

fn open_connection(path: &Path) -> Result<Connection> {
    let mut conn = Connection::open(path)
        .with_context(|| format!("failed to open SQLite database {}", path.display()))?;
    if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
        warn!("WAL journal unavailable, using default: {err}");
    }
    run_migrations(&mut conn).context("failed to run database migrations")?;
    Ok(conn)
}

impl Database {
    pub fn new(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create database directory {}", parent.display())
            })?;
        }

        let (jobs_tx, jobs_rx) = mpsc::channel::<Job>();
        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<()>>(1);
        let thread_path = path.clone();

        let thread = thread::Builder::new()
            .name("rotation-db".into())
            .spawn(move || {
                let mut conn = match open_connection(&thread_path) {
                    Ok(conn) => {
                        let _ = ready_tx.send(Ok(()));
                        conn
                    }
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };
                for job in jobs_rx {
                    job(&mut conn);
                }
                info!("rotation-db thread stopped");
            })
            .context("failed to spawn rotation-db thread")?;

        let worker = Worker {
            jobs: Some(jobs_tx),
            thread: Some(thread),
        };
        ready_rx
            .recv()
            .map_err(|_| anyhow!("rotation-db thread exited during startup"))??;

        info!("Rotation store ready at {}", path.display());
        Ok(Self {
            worker: Arc::new(worker),
            path: Arc::new(path),
        })
    }

    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// Runs `task` on the worker thread and returns its result.
    pub async fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let job: Job = Box::new(move |conn| {
            // Caller gone means nobody wants the result.
            let _ = reply_tx.send(task(conn));
        });

        self.worker
            .jobs
            .as_ref()
            .ok_or_else(|| anyhow!("rotation store is closed"))?
            .send(job)
            .map_err(|_| anyhow!("rotation-db thread is gone"))?;

        reply_rx
            .await
            .map_err(|_| anyhow!("rotation-db thread dropped the query"))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn executes_queries_on_worker_thread() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("nested").join("rotation.sqlite3")).unwrap();
        assert!(db.path().exists());

        let answer: i64 = db
            .execute(|conn| Ok(conn.query_row("SELECT 40 + 2", [], |row| row.get(0))?))
            .await
            .unwrap();
        assert_eq!(answer, 42);
    }

    #[test]
    fn corrupt_file_fails_at_startup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rotation.sqlite3");
        std::fs::write(&path, vec![0x5a; 4096]).unwrap();
        assert!(Database::new(path).is_err());
    }

    #[tokio::test]
    async fn dropping_last_handle_stops_worker() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("rotation.sqlite3")).unwrap();
        let clone = db.clone();
        drop(db);
        assert_eq!(clone.execute(|_| Ok(7)).await.unwrap(), 7);
        drop(clone);
    }

    #[tokio::test]
    async fn task_errors_reach_the_caller() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("rotation.sqlite3")).unwrap();

        let result: Result<()> = db
            .execute(|conn| {
                conn.execute("INSERT INTO no_such_table VALUES (1)", [])?;
                Ok(())
            })
            .await;
        assert!(result.is_err());
    }
}
