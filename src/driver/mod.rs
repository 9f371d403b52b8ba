//! The document-database surface the builder executes against.
//!
//! A `Driver` owns connections, sessions and change-stream delivery. The crate
//! ships [`memory::MemoryDriver`]; a networked driver implements the same traits.

pub mod memory;

use bson::{Bson, Document};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::errors::DbError;
use crate::query::{DeleteReport, FindOptions, InsertReport, UpdateReport};

pub type SessionId = Uuid;

pub trait Driver: Send + Sync {
    fn ping(&self) -> Result<(), DbError>;

    fn count(
        &self,
        collection: &str,
        filter: &Document,
        session: Option<SessionId>,
    ) -> Result<u64, DbError>;

    fn find(
        &self,
        collection: &str,
        filter: &Document,
        opts: &FindOptions,
        session: Option<SessionId>,
    ) -> Result<Cursor, DbError>;

    fn insert_many(
        &self,
        collection: &str,
        docs: Vec<Document>,
        session: Option<SessionId>,
    ) -> Result<InsertReport, DbError>;

    fn update_many(
        &self,
        collection: &str,
        filter: &Document,
        update: &Document,
        session: Option<SessionId>,
    ) -> Result<UpdateReport, DbError>;

    fn delete_many(
        &self,
        collection: &str,
        filter: &Document,
        session: Option<SessionId>,
    ) -> Result<DeleteReport, DbError>;

    fn aggregate(
        &self,
        collection: &str,
        pipeline: &[Document],
        session: Option<SessionId>,
    ) -> Result<Cursor, DbError>;

    fn distinct(
        &self,
        collection: &str,
        field: &str,
        filter: &Document,
        session: Option<SessionId>,
    ) -> Result<Vec<Bson>, DbError>;

    fn start_session(&self) -> Result<Box<dyn Session>, DbError>;

    fn watch(
        &self,
        collection: &str,
        pipeline: &[Document],
        opts: &WatchOptions,
    ) -> Result<Box<dyn ChangeStream>, DbError>;

    fn close(&self) -> Result<(), DbError>;
}

pub trait Session: Send {
    fn id(&self) -> SessionId;
    fn start_transaction(&mut self) -> Result<(), DbError>;
    fn commit_transaction(&mut self) -> Result<(), DbError>;
    fn abort_transaction(&mut self) -> Result<(), DbError>;
    fn end_session(&mut self);
}

/// Result iterator returned by `find` and `aggregate`.
pub struct Cursor {
    inner: Box<dyn Iterator<Item = Result<Document, DbError>> + Send>,
}

impl Cursor {
    pub fn new(inner: impl Iterator<Item = Result<Document, DbError>> + Send + 'static) -> Self {
        Self { inner: Box::new(inner) }
    }

    #[must_use]
    pub fn from_docs(docs: Vec<Document>) -> Self {
        Self::new(docs.into_iter().map(Ok))
    }

    /// Decodes every remaining document. Stops at the first iteration or decode error.
    ///
    /// # Errors
    /// Returns the cursor's error or the first decode failure.
    pub fn decode_all<T: DeserializeOwned>(self) -> Result<Vec<T>, DbError> {
        let mut out = Vec::new();
        for item in self {
            out.push(decode(item?)?);
        }
        Ok(out)
    }

    /// Decodes only the first document; `None` when the cursor is exhausted.
    ///
    /// # Errors
    /// Returns the cursor's error if fetching the first item failed.
    pub fn decode_one<T: DeserializeOwned>(mut self) -> Result<Option<T>, DbError> {
        match self.next() {
            None => Ok(None),
            Some(item) => Ok(Some(decode(item?)?)),
        }
    }
}

impl Iterator for Cursor {
    type Item = Result<Document, DbError>;
    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}

impl std::fmt::Debug for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor").finish_non_exhaustive()
    }
}

pub(crate) fn decode<T: DeserializeOwned>(doc: Document) -> Result<T, DbError> {
    bson::deserialize_from_document(doc).map_err(|e| DbError::Decode(e.to_string()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationType {
    Insert,
    Update,
    Delete,
}

impl OperationType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

/// One committed write observed by a change stream.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub operation_type: OperationType,
    pub collection: String,
    pub document_key: Bson,
    pub full_document: Option<Document>,
    pub cluster_time: chrono::DateTime<chrono::Utc>,
}

impl ChangeEvent {
    /// Event in wire form, the shape watch pipelines match against.
    #[must_use]
    pub fn to_document(&self) -> Document {
        let mut d = Document::new();
        d.insert("operationType", self.operation_type.as_str());
        d.insert("ns", bson::doc! {"coll": self.collection.clone()});
        d.insert("documentKey", bson::doc! {"_id": self.document_key.clone()});
        if let Some(full) = &self.full_document {
            d.insert("fullDocument", full.clone());
        }
        d.insert("clusterTime", bson::DateTime::from_millis(self.cluster_time.timestamp_millis()));
        d
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchOptions {
    /// How long one `next_event` call blocks before returning `None`.
    pub poll_interval_ms: Option<u64>,
    /// Include the post-image of updated documents.
    pub full_document: bool,
}

pub trait ChangeStream: Send {
    /// Waits up to `timeout` for the next event.
    fn next_event(&mut self, timeout: Duration) -> Result<Option<ChangeEvent>, DbError>;
    fn close(&mut self);
}

/// Cancellation and deadline carrier for blocking loops.
#[derive(Debug, Clone, Default)]
pub struct Context {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl Context {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { cancelled: Arc::new(AtomicBool::new(false)), deadline: Some(Instant::now() + timeout) }
    }

    /// Cancels this context and every clone of it.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_done(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst) || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Time left before the deadline, capped at `max`.
    #[must_use]
    pub fn remaining(&self, max: Duration) -> Duration {
        match self.deadline {
            Some(d) => d.saturating_duration_since(Instant::now()).min(max),
            None => max,
        }
    }
}
