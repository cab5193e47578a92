/*!
 * SQLite connection shared by the repository.
 *
 * One `rusqlite::Connection` per process, guarded by a mutex and driven
 * from async code through `spawn_blocking`. The same file may be opened by
 * the CLI, the worker loop and a request handler at once; every state
 * transition is therefore a conditional update, and write transactions
 * take the database lock up front so a waiting writer goes through the
 * busy handler instead of failing on lock upgrade.
 */

use anyhow::{Context, Result};
use log::{debug, info};
use parking_lot::Mutex;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use super::schema;

const DEFAULT_DB_FILENAME: &str = "storyguard.db";
const DEFAULT_DB_DIRNAME: &str = "storyguard";
const IN_MEMORY: &str = ":memory:";

/// How long a writer waits for another process holding the database lock
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle to the pipeline database; cheap to clone
#[derive(Clone)]
pub struct DatabaseConnection {
    db_path: PathBuf,
    connection: Arc<Mutex<Connection>>,
}

impl DatabaseConnection {
    /// Open the database in the user's local data directory
    pub fn new_default() -> Result<Self> {
        Self::new(Self::default_database_path()?)
    }

    /// Open (creating if needed) a database file and bring its schema up to date
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create database directory: {}", parent.display()))?;
        }

        info!("Opening database at {}", db_path.display());
        let conn = Connection::open(&db_path)
            .with_context(|| format!("Failed to open database: {}", db_path.display()))?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        Self::wrap(db_path, conn)
    }

    /// Private in-memory database
    pub fn new_in_memory() -> Result<Self> {
        debug!("Creating in-memory database");
        let conn = Connection::open_in_memory().context("Failed to create in-memory database")?;
        Self::wrap(PathBuf::from(IN_MEMORY), conn)
    }

    fn wrap(db_path: PathBuf, conn: Connection) -> Result<Self> {
        schema::initialize_schema(&conn)
            .with_context(|| format!("Failed to initialize schema in {}", db_path.display()))?;
        Ok(Self {
            db_path,
            connection: Arc::new(Mutex::new(conn)),
        })
    }

    /// `<local data dir>/storyguard/storyguard.db`
    pub fn default_database_path() -> Result<PathBuf> {
        let base_dir = dirs::data_local_dir()
            .or_else(dirs::data_dir)
            .or_else(|| dirs::home_dir().map(|h| h.join(".local").join("share")))
            .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;

        Ok(base_dir.join(DEFAULT_DB_DIRNAME).join(DEFAULT_DB_FILENAME))
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    pub fn is_in_memory(&self) -> bool {
        self.db_path.as_os_str() == IN_MEMORY
    }

    /// Run `f` on the calling thread; only for setup code and tests
    pub fn execute<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        f(&*self.connection.lock())
    }

    /// Run `f` on the blocking pool
    pub async fn execute_async<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.connection.clone();
        tokio::task::spawn_blocking(move || f(&*conn.lock()))
            .await
            .context("Database task panicked")?
    }

    /// Run `f` inside an immediate transaction; an `Err` rolls back
    pub fn transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction) -> Result<T>,
    {
        Self::run_transaction(&mut *self.connection.lock(), f)
    }

    /// Async form of [`DatabaseConnection::transaction`]
    pub async fn transaction_async<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.connection.clone();
        tokio::task::spawn_blocking(move || Self::run_transaction(&mut *conn.lock(), f))
            .await
            .context("Database transaction task panicked")?
    }

    fn run_transaction<F, T>(conn: &mut Connection, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction) -> Result<T>,
    {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let result = f(&tx)?;
        tx.commit()?;
        Ok(result)
    }

    /// Row counts for the operator dashboard
    pub async fn stats(&self) -> Result<DatabaseStats> {
        let file_path = (!self.is_in_memory()).then(|| self.db_path.clone());

        self.execute_async(move |conn| {
            let count = |table: &str, filter: &str| -> Result<i64> {
                let sql = format!("SELECT COUNT(*) FROM {} {}", table, filter);
                conn.query_row(&sql, [], |row| row.get(0))
                    .with_context(|| format!("Failed to count {}", table))
            };

            Ok(DatabaseStats {
                rule_count: count("validation_rules", "")?,
                queued_entries: count("moderation_queue", "WHERE status = 'queued'")?,
                pending_jobs: count("assessment_jobs", "WHERE status = 'pending'")?,
                failed_jobs: count("assessment_jobs", "WHERE status = 'failed'")?,
                validation_results: count("validation_results", "")?,
                variant_count: count("fan_variants", "")?,
                file_size_bytes: file_path
                    .and_then(|path| std::fs::metadata(path).ok())
                    .map_or(0, |m| m.len()),
            })
        })
        .await
    }
}

#[derive(Debug, Clone, Default)]
pub struct DatabaseStats {
    /// Active and inactive rules
    pub rule_count: i64,
    pub queued_entries: i64,
    pub pending_jobs: i64,
    /// Includes jobs still eligible for retry
    pub failed_jobs: i64,
    pub validation_results: i64,
    /// Fan translations and audiobooks
    pub variant_count: i64,
    pub file_size_bytes: u64,
}

impl std::fmt::Display for DatabaseStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} rules, {} queued, {} pending jobs, {} failed jobs, {} verdicts, {} variants, {} KB",
            self.rule_count,
            self.queued_entries,
            self.pending_jobs,
            self.failed_jobs,
            self.validation_results,
            self.variant_count,
            self.file_size_bytes / 1024
        )
    }
}
