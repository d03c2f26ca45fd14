use std::{
    path::{Path, PathBuf},
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
};

use anyhow::{anyhow, Context, Result};
use log::{error, info, warn};
use rusqlite::Connection;
use tokio::sync::oneshot;

use super::migrations::run_migrations;

const BUSY_TIMEOUT_MS: i64 = 5_000;

type Job = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum Message {
    Run(Job),
    Close,
}

/// Owns the worker thread; closing it is tied to the last `Database` clone.
struct Worker {
    jobs: mpsc::Sender<Message>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Worker {
    fn drop(&mut self) {
        let handle = self
            .thread
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();

        let Some(handle) = handle else {
            return;
        };
        if self.jobs.send(Message::Close).is_err() {
            warn!("glimpse-db thread already gone at close");
        }
        if let Err(err) = handle.join() {
            error!("glimpse-db thread panicked: {err:?}");
        }
    }
}

/// Handle to a SQLite file owned by one dedicated worker thread.
///
/// Every statement runs on that thread in submission order, so writers never
/// contend for the connection and two upserts for the same key are applied one
/// after the other. Clones share the same worker.
#[derive(Clone)]
pub struct Database {
    worker: Arc<Worker>,
    path: Arc<PathBuf>,
}

impl Database {
    /// Open (or create) the database and bring its schema up to date before
    /// returning.
    pub fn new(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let (jobs_tx, jobs_rx) = mpsc::channel::<Message>();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<()>>();
        let thread_path = path.clone();

        let thread = thread::Builder::new()
            .name("glimpse-db".into())
            .spawn(move || {
                let mut conn = match open_connection(&thread_path) {
                    Ok(conn) => conn,
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };
                if ready_tx.send(Ok(())).is_err() {
                    return;
                }
                serve(&mut conn, jobs_rx);
            })
            .context("failed to spawn glimpse-db thread")?;

        ready_rx
            .recv()
            .context("glimpse-db thread exited during startup")??;

        info!("Database ready at {}", path.display());

        Ok(Self {
            worker: Arc::new(Worker {
                jobs: jobs_tx,
                thread: Mutex::new(Some(thread)),
            }),
            path: Arc::new(path),
        })
    }

    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// Run `task` on the worker thread and await its result.
    pub async fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();

        let job: Job = Box::new(move |conn| {
            // The caller may have been cancelled; its result is simply dropped.
            let _ = reply_tx.send(task(conn));
        });

        self.worker
            .jobs
            .send(Message::Run(job))
            .map_err(|_| anyhow!("glimpse-db thread is not accepting work"))?;

        reply_rx
            .await
            .map_err(|_| anyhow!("glimpse-db thread stopped before replying"))?
    }
}

/// Open the file with WAL journaling and a busy timeout, then migrate.
fn open_connection(path: &Path) -> Result<Connection> {
    let mut conn = Connection::open(path)
        .with_context(|| format!("failed to open SQLite database {}", path.display()))?;

    if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
        warn!("WAL journaling unavailable, using the default journal: {err}");
    }
    conn.pragma_update(None, "busy_timeout", BUSY_TIMEOUT_MS)
        .context("failed to set busy timeout")?;

    run_migrations(&mut conn).context("failed to run database migrations")?;
    Ok(conn)
}

fn serve(conn: &mut Connection, jobs: mpsc::Receiver<Message>) {
    for message in jobs {
        match message {
            Message::Run(job) => job(conn),
            Message::Close => break,
        }
    }
    info!("glimpse-db thread stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn clones_share_one_worker_in_submission_order() {
        let dir = TempDir::new().unwrap();
        let db = Database::new(dir.path().join("nested").join("glimpse.db")).unwrap();
        let other = db.clone();

        db.execute(|conn| {
            conn.execute_batch("CREATE TABLE log (n INTEGER NOT NULL)")?;
            Ok(())
        })
        .await
        .unwrap();

        let writes: Vec<_> = (0..5)
            .map(|n| {
                let db = if n % 2 == 0 { db.clone() } else { other.clone() };
                async move {
                    db.execute(move |conn| {
                        conn.execute("INSERT INTO log (n) VALUES (?1)", [n])?;
                        Ok(())
                    })
                    .await
                }
            })
            .collect();
        for write in writes {
            write.await.unwrap();
        }

        let rows: Vec<i64> = other
            .execute(|conn| {
                let mut stmt = conn.prepare("SELECT n FROM log ORDER BY rowid")?;
                let rows = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<Result<Vec<i64>, _>>()?;
                Ok(rows)
            })
            .await
            .unwrap();
        assert_eq!(rows, vec![0, 1, 2, 3, 4]);
        assert!(db.path().ends_with("glimpse.db"));
    }
}
