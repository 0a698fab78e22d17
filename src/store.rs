//! Storage facade over the local SQLite store and the remote store gateway.
//!
//! The backend is chosen once at start-up and never re-evaluated. Every call is
//! bounded by the configured storage timeout. Remote calls are dropped when it
//! elapses, which cancels the in-flight HTTP request. Local calls are never abandoned
//! mid-write: the SQLite store bounds its own pool checkout and lock waits with the
//! same timeout and reports either as unavailable.

use crate::model::{CourseBlock, NewCourseBlock};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

mod error;
pub mod local;
pub mod remote;

pub use error::{StorageError, StorageErrorKind};
pub use local::{LocalPatch, LocalStore, LocalTable};
pub use remote::RemoteStore;

/// Named logical record sets addressed uniformly by both backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    Users,
    Courses,
    Enrollments,
    CourseBlocks,
    QuizResults,
}

impl Collection {
    /// Path segment used by the remote gateway.
    pub fn path(&self) -> &'static str {
        match self {
            Collection::Users => "users",
            Collection::Courses => "courses",
            Collection::Enrollments => "enrollments",
            Collection::CourseBlocks => "courseblocks",
            Collection::QuizResults => "quiz-results",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

pub trait Record: Serialize + DeserializeOwned + Send + Sync + 'static {
    const COLLECTION: Collection;

    type Id: fmt::Display + Clone + Serialize + DeserializeOwned + Send + Sync + 'static;
    type New: Serialize + DeserializeOwned + Send + 'static;
    /// Equality filter; unset fields match everything.
    type Filter: Serialize + DeserializeOwned + Default + Send + 'static;

    fn id(&self) -> &Self::Id;
}

pub trait Patchable: Record {
    type Patch: Serialize + DeserializeOwned + Send + 'static;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Local,
    Remote,
}

#[derive(Clone)]
enum Backend {
    Local(LocalStore),
    Remote(RemoteStore),
}

#[derive(Clone)]
pub struct Storage {
    backend: Backend,
    timeout: Duration,
}

impl Storage {
    pub fn local(store: LocalStore) -> Self {
        Self {
            timeout: store.timeout(),
            backend: Backend::Local(store),
        }
    }

    pub fn remote(store: RemoteStore, timeout: Duration) -> Self {
        Self {
            backend: Backend::Remote(store),
            timeout,
        }
    }

    pub fn kind(&self) -> BackendKind {
        match self.backend {
            Backend::Local(_) => BackendKind::Local,
            Backend::Remote(_) => BackendKind::Remote,
        }
    }

    async fn bounded<T, F>(
        &self,
        op: &str,
        collection: Collection,
        call: F,
    ) -> Result<T, StorageError>
    where
        F: Future<Output = Result<T, StorageError>>,
    {
        debug!("{} {} via {:?} backend", op, collection, self.kind());
        // A local write already handed to a blocking thread cannot be cancelled.
        if let Backend::Local(_) = self.backend {
            return call.await;
        }
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    "{} {} exceeded the storage timeout of {:?}",
                    op, collection, self.timeout
                );
                Err(StorageError::unavailable(format!(
                    "{} on {} timed out after {:?}",
                    op, collection, self.timeout
                )))
            }
        }
    }

    pub async fn fetch<R: LocalTable>(&self, filter: R::Filter) -> Result<Vec<R>, StorageError> {
        self.bounded("fetch", R::COLLECTION, async {
            match &self.backend {
                Backend::Local(store) => store.fetch::<R>(filter).await,
                Backend::Remote(store) => store.fetch::<R>(&filter).await,
            }
        })
        .await
    }

    /// First record matching `filter`, if any.
    pub async fn find<R: LocalTable>(&self, filter: R::Filter) -> Result<Option<R>, StorageError> {
        Ok(self.fetch::<R>(filter).await?.into_iter().next())
    }

    pub async fn create<R: LocalTable>(&self, new: R::New) -> Result<R, StorageError> {
        self.bounded("create", R::COLLECTION, async {
            match &self.backend {
                Backend::Local(store) => store.create::<R>(new).await,
                Backend::Remote(store) => store.create::<R>(&new).await,
            }
        })
        .await
    }

    pub async fn update<R: LocalPatch>(
        &self,
        id: R::Id,
        patch: R::Patch,
    ) -> Result<R, StorageError> {
        self.bounded("update", R::COLLECTION, async {
            match &self.backend {
                Backend::Local(store) => store.update::<R>(id, patch).await,
                Backend::Remote(store) => store.update::<R>(&id, &patch).await,
            }
        })
        .await
    }

    /// Deletes one record. Deleting a course cascades to its blocks, enrollments and
    /// quiz results.
    pub async fn delete<R: LocalTable>(&self, id: R::Id) -> Result<(), StorageError> {
        self.bounded("delete", R::COLLECTION, async {
            match &self.backend {
                Backend::Local(store) => store.delete::<R>(id).await,
                Backend::Remote(store) => store.delete::<R>(&id).await,
            }
        })
        .await
    }

    /// Destructively replaces every block of `course_id` with `blocks`, returned in
    /// position order.
    pub async fn replace_blocks(
        &self,
        course_id: i64,
        blocks: Vec<NewCourseBlock>,
    ) -> Result<Vec<CourseBlock>, StorageError> {
        self.bounded("replace", Collection::CourseBlocks, async {
            match &self.backend {
                Backend::Local(store) => store.replace_blocks(course_id, blocks).await,
                Backend::Remote(store) => store.replace_blocks(course_id, &blocks).await,
            }
        })
        .await
    }
}
