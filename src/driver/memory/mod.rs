//! In-process [`Driver`] backed by plain document vectors.
//!
//! Collections live behind one `RwLock`. A session that starts a transaction
//! takes a private copy of the data; its writes go to that copy and become
//! visible (and reach change streams) only on commit. Commit replays the
//! transaction's inserts, updates and deletes onto the live data by `_id`; a
//! document the transaction changed that was also changed outside it since the
//! transaction began is a write conflict and fails the commit.

mod aggregate;
mod eval;
mod update;

use bson::oid::ObjectId;
use bson::{Bson, Document};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, mpsc};
use std::time::{Duration, Instant};
use uuid::Uuid;

use super::{
    ChangeEvent, ChangeStream, Cursor, Driver, OperationType, Session, SessionId, WatchOptions,
};
use crate::errors::DbError;
use crate::query::{DeleteReport, FindOptions, InsertReport, UpdateReport};
use crate::utils::num;

type Collections = HashMap<String, Vec<Document>>;

struct TxState {
    data: Collections,
    /// Contents of each written collection just before the transaction's first write to it.
    base: Collections,
    pending: Vec<ChangeEvent>,
}

fn doc_key(d: &Document) -> String {
    d.get("_id").map(ToString::to_string).unwrap_or_default()
}

fn write_conflict(collection: &str, key: &str) -> DbError {
    DbError::Driver(format!("write conflict on {collection} for _id {key}"))
}

/// Applies the difference between `before` and `after` (the transaction's view)
/// to `live`, preserving live order and appending inserts.
fn replay(
    collection: &str,
    before: &[Document],
    after: &[Document],
    live: &[Document],
) -> Result<Vec<Document>, DbError> {
    let before: HashMap<String, &Document> = before.iter().map(|d| (doc_key(d), d)).collect();
    let after_by_key: HashMap<String, &Document> = after.iter().map(|d| (doc_key(d), d)).collect();
    let changed = |key: &str, base: &Document| after_by_key.get(key).is_none_or(|a| *a != base);

    let mut out = Vec::with_capacity(live.len() + after.len());
    let mut live_keys = HashSet::with_capacity(live.len());
    for d in live {
        let key = doc_key(d);
        match before.get(&key) {
            Some(base) if changed(key.as_str(), *base) => {
                if *base != d {
                    return Err(write_conflict(collection, &key));
                }
                if let Some(next) = after_by_key.get(&key) {
                    out.push((*next).clone());
                }
            }
            Some(_) => out.push(d.clone()),
            None if after_by_key.contains_key(&key) => return Err(write_conflict(collection, &key)),
            None => out.push(d.clone()),
        }
        live_keys.insert(key);
    }
    for (key, base) in &before {
        if !live_keys.contains(key) && changed(key.as_str(), *base) {
            return Err(write_conflict(collection, key));
        }
    }
    out.extend(after.iter().filter(|d| !before.contains_key(&doc_key(d))).cloned());
    Ok(out)
}

struct Watcher {
    collection: String,
    filters: Vec<Document>,
    full_document: bool,
    tx: mpsc::Sender<ChangeEvent>,
}

impl Watcher {
    fn wants(&self, ev: &ChangeEvent) -> Option<ChangeEvent> {
        if ev.collection != self.collection {
            return None;
        }
        let mut ev = ev.clone();
        if !self.full_document && ev.operation_type == OperationType::Update {
            ev.full_document = None;
        }
        let wire = ev.to_document();
        for f in &self.filters {
            match eval::matches(&wire, f) {
                Ok(true) => {}
                Ok(false) => return None,
                Err(e) => {
                    log::warn!("change stream filter failed on {}: {e}", self.collection);
                    return None;
                }
            }
        }
        Some(ev)
    }
}

#[derive(Default)]
struct Shared {
    data: RwLock<Collections>,
    transactions: Mutex<HashMap<SessionId, TxState>>,
    watchers: Mutex<Vec<Watcher>>,
    closed: AtomicBool,
}

impl Shared {
    fn ensure_open(&self) -> Result<(), DbError> {
        if self.closed.load(Ordering::SeqCst) { Err(DbError::Closed) } else { Ok(()) }
    }

    fn publish(&self, events: Vec<ChangeEvent>) {
        if events.is_empty() {
            return;
        }
        let mut watchers = self.watchers.lock();
        watchers.retain(|w| {
            for ev in &events {
                if let Some(ev) = w.wants(ev)
                    && w.tx.send(ev).is_err()
                {
                    return false;
                }
            }
            true
        });
    }

    fn read<R>(
        &self,
        collection: &str,
        session: Option<SessionId>,
        f: impl FnOnce(&[Document], &dyn Fn(&str) -> Vec<Document>) -> Result<R, DbError>,
    ) -> Result<R, DbError> {
        self.ensure_open()?;
        match session {
            Some(id) => {
                let txs = self.transactions.lock();
                let tx = txs.get(&id).ok_or_else(|| inactive(id))?;
                let lookup = |name: &str| tx.data.get(name).cloned().unwrap_or_default();
                f(tx.data.get(collection).map_or(&[][..], Vec::as_slice), &lookup)
            }
            None => {
                let data = self.data.read();
                let lookup = |name: &str| data.get(name).cloned().unwrap_or_default();
                f(data.get(collection).map_or(&[][..], Vec::as_slice), &lookup)
            }
        }
    }

    fn write<R>(
        &self,
        collection: &str,
        session: Option<SessionId>,
        f: impl FnOnce(&mut Vec<Document>) -> Result<(R, Vec<ChangeEvent>), DbError>,
    ) -> Result<R, DbError> {
        self.ensure_open()?;
        match session {
            Some(id) => {
                let mut txs = self.transactions.lock();
                let tx = txs.get_mut(&id).ok_or_else(|| inactive(id))?;
                if !tx.base.contains_key(collection) {
                    let before = tx.data.get(collection).cloned().unwrap_or_default();
                    tx.base.insert(collection.to_string(), before);
                }
                let docs = tx.data.entry(collection.to_string()).or_default();
                let (out, events) = f(docs)?;
                tx.pending.extend(events);
                Ok(out)
            }
            None => {
                let (out, events) = {
                    let mut data = self.data.write();
                    f(data.entry(collection.to_string()).or_default())?
                };
                self.publish(events);
                Ok(out)
            }
        }
    }
}

fn inactive(id: SessionId) -> DbError {
    DbError::Session(format!("no transaction in progress for session {id}"))
}

fn event(op: OperationType, collection: &str, doc: &Document) -> ChangeEvent {
    ChangeEvent {
        operation_type: op,
        collection: collection.to_string(),
        document_key: doc.get("_id").cloned().unwrap_or(Bson::Null),
        full_document: (op != OperationType::Delete).then(|| doc.clone()),
        cluster_time: chrono::Utc::now(),
    }
}

fn filtered<'a>(docs: &'a [Document], filter: &Document) -> Result<Vec<&'a Document>, DbError> {
    let mut out = Vec::new();
    for d in docs {
        if eval::matches(d, filter)? {
            out.push(d);
        }
    }
    Ok(out)
}

/// In-memory document store implementing [`Driver`].
#[derive(Clone, Default)]
pub struct MemoryDriver {
    shared: Arc<Shared>,
}

impl MemoryDriver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed documents of `collection`, in insertion order.
    #[must_use]
    pub fn snapshot(&self, collection: &str) -> Vec<Document> {
        self.shared.data.read().get(collection).cloned().unwrap_or_default()
    }

    #[must_use]
    pub fn collection_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.shared.data.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl Driver for MemoryDriver {
    fn ping(&self) -> Result<(), DbError> {
        self.shared.ensure_open()
    }

    fn count(&self, collection: &str, filter: &Document, session: Option<SessionId>) -> Result<u64, DbError> {
        self.shared.read(collection, session, |docs, _| {
            Ok(num::usize_to_u64(filtered(docs, filter)?.len()))
        })
    }

    fn find(
        &self,
        collection: &str,
        filter: &Document,
        opts: &FindOptions,
        session: Option<SessionId>,
    ) -> Result<Cursor, DbError> {
        let deadline = opts.timeout_ms.map(|ms| Instant::now() + Duration::from_millis(ms));
        let docs = self.shared.read(collection, session, |docs, _| {
            let mut out = Vec::new();
            for d in docs {
                if let Some(dl) = deadline
                    && Instant::now() > dl
                {
                    return Err(DbError::Timeout);
                }
                if eval::matches(d, filter)? {
                    out.push(d.clone());
                }
            }
            Ok(out)
        })?;

        let mut docs = docs;
        if !opts.sort.is_empty() {
            docs.sort_by(|a, b| eval::compare_docs(a, b, &opts.sort));
        }
        let skip = num::u64_to_usize_saturating(opts.skip.unwrap_or(0));
        let limit = opts.limit.map_or(usize::MAX, num::u64_to_usize_saturating);
        let docs: Vec<Document> = docs
            .into_iter()
            .skip(skip)
            .take(limit)
            .map(|d| if opts.projection.is_empty() { d } else { eval::project_fields(&d, &opts.projection) })
            .collect();
        log::trace!("memory find {collection}: {} docs", docs.len());
        Ok(Cursor::from_docs(docs))
    }

    fn insert_many(
        &self,
        collection: &str,
        docs: Vec<Document>,
        session: Option<SessionId>,
    ) -> Result<InsertReport, DbError> {
        self.shared.write(collection, session, |stored| {
            let mut seen: HashSet<String> =
                stored.iter().filter_map(|d| d.get("_id").map(ToString::to_string)).collect();
            let mut prepared = Vec::with_capacity(docs.len());
            for mut d in docs {
                if !d.contains_key("_id") {
                    d.insert("_id", ObjectId::new());
                }
                let key = d.get("_id").map(ToString::to_string).unwrap_or_default();
                if !seen.insert(key.clone()) {
                    return Err(DbError::Driver(format!("duplicate key: _id {key}")));
                }
                prepared.push(d);
            }
            let inserted_ids = prepared.iter().filter_map(|d| d.get("_id").cloned()).collect();
            let events = prepared.iter().map(|d| event(OperationType::Insert, collection, d)).collect();
            stored.extend(prepared);
            Ok((InsertReport { inserted_ids }, events))
        })
    }

    fn update_many(
        &self,
        collection: &str,
        filter: &Document,
        update: &Document,
        session: Option<SessionId>,
    ) -> Result<UpdateReport, DbError> {
        self.shared.write(collection, session, |stored| {
            // Applied to copies first so a failing update leaves the collection untouched.
            let mut staged = Vec::new();
            for (i, d) in stored.iter().enumerate() {
                if eval::matches(d, filter)? {
                    let mut next = d.clone();
                    let changed = update::apply_update(&mut next, update)?;
                    staged.push((i, next, changed));
                }
            }
            let mut report = UpdateReport { matched: num::usize_to_u64(staged.len()), modified: 0 };
            let mut events = Vec::new();
            for (i, next, changed) in staged {
                if changed {
                    report.modified += 1;
                    events.push(event(OperationType::Update, collection, &next));
                    stored[i] = next;
                }
            }
            Ok((report, events))
        })
    }

    fn delete_many(
        &self,
        collection: &str,
        filter: &Document,
        session: Option<SessionId>,
    ) -> Result<DeleteReport, DbError> {
        self.shared.write(collection, session, |stored| {
            // Evaluated up front so a bad filter leaves the collection untouched.
            let mut hits = Vec::with_capacity(stored.len());
            for d in stored.iter() {
                hits.push(eval::matches(d, filter)?);
            }
            let mut hits = hits.into_iter();
            let mut events = Vec::new();
            stored.retain(|d| {
                let hit = hits.next().unwrap_or(false);
                if hit {
                    events.push(event(OperationType::Delete, collection, d));
                }
                !hit
            });
            Ok((DeleteReport { deleted: num::usize_to_u64(events.len()) }, events))
        })
    }

    fn aggregate(
        &self,
        collection: &str,
        pipeline: &[Document],
        session: Option<SessionId>,
    ) -> Result<Cursor, DbError> {
        let out = self.shared.read(collection, session, |docs, lookup| {
            aggregate::run_pipeline(docs.to_vec(), pipeline, lookup)
        })?;
        Ok(Cursor::from_docs(out))
    }

    fn distinct(
        &self,
        collection: &str,
        field: &str,
        filter: &Document,
        session: Option<SessionId>,
    ) -> Result<Vec<Bson>, DbError> {
        self.shared.read(collection, session, |docs, _| {
            let mut out: Vec<Bson> = Vec::new();
            let mut push = |v: &Bson| {
                if !out.iter().any(|x| eval::bson_eq(x, v)) {
                    out.push(v.clone());
                }
            };
            for d in filtered(docs, filter)? {
                match eval::get_path(d, field) {
                    Some(Bson::Array(items)) => items.iter().for_each(&mut push),
                    Some(v) => push(v),
                    None => {}
                }
            }
            Ok(out)
        })
    }

    fn start_session(&self) -> Result<Box<dyn Session>, DbError> {
        self.shared.ensure_open()?;
        Ok(Box::new(MemorySession { id: Uuid::new_v4(), shared: Arc::clone(&self.shared) }))
    }

    fn watch(
        &self,
        collection: &str,
        pipeline: &[Document],
        opts: &WatchOptions,
    ) -> Result<Box<dyn ChangeStream>, DbError> {
        self.shared.ensure_open()?;
        let mut filters = Vec::with_capacity(pipeline.len());
        for stage in pipeline {
            match stage.get("$match") {
                Some(Bson::Document(f)) if stage.len() == 1 => filters.push(f.clone()),
                _ => {
                    let name = stage.keys().next().cloned().unwrap_or_default();
                    return Err(DbError::UnsupportedStage(name));
                }
            }
        }
        let (tx, rx) = mpsc::channel();
        self.shared.watchers.lock().push(Watcher {
            collection: collection.to_string(),
            filters,
            full_document: opts.full_document,
            tx,
        });
        log::debug!("change stream opened on {collection}");
        Ok(Box::new(MemoryChangeStream { rx: Some(rx) }))
    }

    fn close(&self) -> Result<(), DbError> {
        self.shared.closed.store(true, Ordering::SeqCst);
        // Dropping the senders ends every open stream.
        self.shared.watchers.lock().clear();
        self.shared.transactions.lock().clear();
        Ok(())
    }
}

struct MemorySession {
    id: SessionId,
    shared: Arc<Shared>,
}

impl Session for MemorySession {
    fn id(&self) -> SessionId {
        self.id
    }

    fn start_transaction(&mut self) -> Result<(), DbError> {
        self.shared.ensure_open()?;
        let mut txs = self.shared.transactions.lock();
        if txs.contains_key(&self.id) {
            return Err(DbError::Session("transaction already in progress".into()));
        }
        let data = self.shared.data.read().clone();
        txs.insert(self.id, TxState { data, base: Collections::new(), pending: Vec::new() });
        Ok(())
    }

    fn commit_transaction(&mut self) -> Result<(), DbError> {
        self.shared.ensure_open()?;
        let mut txs = self.shared.transactions.lock();
        let tx = txs.get(&self.id).ok_or_else(|| inactive(self.id))?;
        {
            let mut data = self.shared.data.write();
            // Every collection is replayed before any is written, so a conflict changes nothing.
            let mut merged = Vec::with_capacity(tx.base.len());
            for (name, before) in &tx.base {
                let after = tx.data.get(name).map_or(&[][..], Vec::as_slice);
                let live = data.get(name).map_or(&[][..], Vec::as_slice);
                merged.push((name.clone(), replay(name, before, after, live)?));
            }
            data.extend(merged);
        }
        let pending = txs.remove(&self.id).map(|tx| tx.pending).unwrap_or_default();
        drop(txs);
        self.shared.publish(pending);
        Ok(())
    }

    fn abort_transaction(&mut self) -> Result<(), DbError> {
        self.shared.transactions.lock().remove(&self.id).map(|_| ()).ok_or_else(|| inactive(self.id))
    }

    fn end_session(&mut self) {
        if self.shared.transactions.lock().remove(&self.id).is_some() {
            log::debug!("session {} ended with an open transaction; aborted", self.id);
        }
    }
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        self.end_session();
    }
}

struct MemoryChangeStream {
    rx: Option<mpsc::Receiver<ChangeEvent>>,
}

impl ChangeStream for MemoryChangeStream {
    fn next_event(&mut self, timeout: Duration) -> Result<Option<ChangeEvent>, DbError> {
        let Some(rx) = &self.rx else {
            return Err(DbError::Driver("change stream closed".into()));
        };
        match rx.recv_timeout(timeout) {
            Ok(ev) => Ok(Some(ev)),
            Err(mpsc::RecvTimeoutError::Timeout) => Ok(None),
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                Err(DbError::Driver("change stream closed".into()))
            }
        }
    }

    fn close(&mut self) {
        self.rx = None;
    }
}
