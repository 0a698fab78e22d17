use super::{Patchable, Record, StorageError};
use crate::model::{CourseBlock, NewCourseBlock};
use deadpool_diesel::Runtime;
use deadpool_diesel::sqlite::{Manager, Pool};
use diesel::SqliteConnection;
use diesel::connection::SimpleConnection;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

mod tables;

const SCHEMA: &str = include_str!("../../migrations/schema.sql");

/// Applied to every pooled connection before it runs a query.
fn connection_pragmas(busy_timeout: Duration) -> String {
    format!(
        "PRAGMA busy_timeout = {}; PRAGMA foreign_keys = ON;",
        busy_timeout.as_millis()
    )
}

/// Record types the local store knows how to read, insert and delete.
pub trait LocalTable: Record {
    fn load(conn: &mut SqliteConnection, filter: Self::Filter) -> Result<Vec<Self>, StorageError>;

    fn insert(conn: &mut SqliteConnection, new: Self::New) -> Result<Self, StorageError>;

    /// Returns the number of removed primary records.
    fn remove(conn: &mut SqliteConnection, id: Self::Id) -> Result<usize, StorageError>;
}

/// Record types the local store can update in place.
pub trait LocalPatch: Patchable + LocalTable {
    fn apply(
        conn: &mut SqliteConnection,
        id: Self::Id,
        patch: Self::Patch,
    ) -> Result<Self, StorageError>;
}

#[derive(Clone)]
pub struct LocalStore {
    pool: Pool,
    timeout: Duration,
    pragmas: Arc<str>,
}

impl LocalStore {
    /// `timeout` bounds both the wait for a pooled connection and the wait for a
    /// database lock held by another writer.
    pub fn connect(
        database_url: &str,
        max_size: u32,
        timeout: Duration,
    ) -> Result<Self, StorageError> {
        let manager = Manager::new(database_url, Runtime::Tokio1);
        let pool = Pool::builder(manager)
            .max_size(max_size as usize)
            .wait_timeout(Some(timeout))
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|e| StorageError::unavailable(format!("Failed to build pool: {}", e)))?;
        Ok(Self {
            pool,
            timeout,
            pragmas: connection_pragmas(timeout).into(),
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Creates missing tables. Safe to run on every start.
    pub async fn migrate(&self) -> Result<(), StorageError> {
        info!("Applying local store schema...");
        self.run_query(|conn| {
            conn.batch_execute("PRAGMA journal_mode = WAL;")?;
            conn.batch_execute(SCHEMA)?;
            Ok(())
        })
        .await
    }

    pub async fn fetch<R: LocalTable>(&self, filter: R::Filter) -> Result<Vec<R>, StorageError> {
        self.run_query(move |conn| R::load(conn, filter)).await
    }

    pub async fn create<R: LocalTable>(&self, new: R::New) -> Result<R, StorageError> {
        self.run_query(move |conn| R::insert(conn, new)).await
    }

    pub async fn update<R: LocalPatch>(
        &self,
        id: R::Id,
        patch: R::Patch,
    ) -> Result<R, StorageError> {
        self.run_query(move |conn| R::apply(conn, id, patch)).await
    }

    pub async fn delete<R: LocalTable>(&self, id: R::Id) -> Result<(), StorageError> {
        let missing = id.to_string();
        let removed = self.run_query(move |conn| R::remove(conn, id)).await?;
        if removed == 0 {
            return Err(StorageError::not_found(format!(
                "No record {} in {}",
                missing,
                R::COLLECTION
            )));
        }
        Ok(())
    }

    pub async fn replace_blocks(
        &self,
        course_id: i64,
        blocks: Vec<NewCourseBlock>,
    ) -> Result<Vec<CourseBlock>, StorageError> {
        self.run_query(move |conn| {
            tables::replace_course_blocks(conn, course_id, blocks)
        })
        .await
    }

    async fn run_query<T, F>(&self, query: F) -> Result<T, StorageError>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T, StorageError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.pool.get().await.map_err(|pool_err| {
            error!(
                "Failed to get DB connection object from pool: {:?}",
                pool_err
            );
            StorageError::unavailable(format!("Database pool error: {}", pool_err))
        })?;
        debug!("DB connection object obtained from pool for interaction");

        let pragmas = Arc::clone(&self.pragmas);
        let res = conn
            .interact(move |conn_sync| {
                conn_sync.batch_execute(&pragmas)?;
                query(conn_sync)
            })
            .await;

        match res {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(storage_err)) => {
                debug!("Local store query failed within interaction: {}", storage_err);
                Err(storage_err)
            }
            Err(interact_err) => {
                error!("Deadpool interact error: {:?}", interact_err);
                Err(StorageError::unavailable(format!(
                    "Database interaction error: {}",
                    interact_err
                )))
            }
        }
    }
}
