use bson::{Bson, Document};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Instant;

use super::Scoop;
use crate::driver::Cursor;
use crate::errors::DbError;
use crate::fault::FaultOp;
use crate::query::{DeleteReport, InsertReport, UpdateReport};
use crate::utils::logger::QUERY_TARGET;
use crate::utils::{devlog, num};

fn finish(op: &str, collection: &str, filter: &Document, start: Instant, result_count: u64) {
    let dur_ms = num::u128_to_u64_saturating(start.elapsed().as_millis());
    log::debug!(target: QUERY_TARGET, "{op} {collection} filter={filter} took {dur_ms}ms ({result_count})");
    devlog::bench(op, collection, dur_ms, result_count);
}

fn to_document<T: Serialize>(value: &T) -> Result<Document, DbError> {
    Ok(bson::serialize_to_document(value)?)
}

impl Scoop {
    /// Number of matching documents.
    ///
    /// # Errors
    /// Injected `Count` failure, `NoCollection`, a closed transaction, or the driver error.
    pub fn count(&self) -> Result<u64, DbError> {
        let start = Instant::now();
        self.client.guard(FaultOp::Count)?;
        let (coll, session) = self.target()?;
        let filter = self.cond.to_document_or_empty();
        let n = self.client.driver().count(coll, &filter, session)?;
        finish("count", coll, &filter, start, n);
        Ok(n)
    }

    /// Whether at least one document matches. Guarded as `Count`.
    ///
    /// # Errors
    /// As [`count`](Self::count).
    pub fn exists_any(&self) -> Result<bool, DbError> {
        Ok(self.count()? > 0)
    }

    fn find_cursor(&self, op: &str, limit: Option<u64>) -> Result<Cursor, DbError> {
        let start = Instant::now();
        self.client.guard(FaultOp::Find)?;
        let (coll, session) = self.target()?;
        let filter = self.cond.to_document_or_empty();
        let mut opts = self.find_options();
        if limit.is_some() {
            opts.limit = limit;
        }
        let docs: Vec<Document> =
            self.client.driver().find(coll, &filter, &opts, session)?.collect::<Result<_, _>>()?;
        finish(op, coll, &filter, start, num::usize_to_u64(docs.len()));
        Ok(Cursor::from_docs(docs))
    }

    /// All matching documents decoded as `T`.
    ///
    /// # Errors
    /// Injected `Find` failure, driver error, or the first decode failure.
    pub fn find<T: DeserializeOwned>(&self) -> Result<Vec<T>, DbError> {
        self.find_cursor("find", None)?.decode_all()
    }

    /// All matching documents, undecoded.
    ///
    /// # Errors
    /// As [`find`](Self::find).
    pub fn find_documents(&self) -> Result<Vec<Document>, DbError> {
        self.find_cursor("find", None)?.collect()
    }

    /// First matching document in sort order; `None` when nothing matches.
    ///
    /// # Errors
    /// As [`find`](Self::find).
    pub fn first<T: DeserializeOwned>(&self) -> Result<Option<T>, DbError> {
        self.find_cursor("first", Some(1))?.decode_one()
    }

    /// Applies `update` to every matching document. A document without `$`
    /// operators is treated as `$set`.
    ///
    /// # Errors
    /// `NoCollection`, a closed transaction, or the driver error.
    pub fn update(&self, update: Document) -> Result<UpdateReport, DbError> {
        let start = Instant::now();
        let (coll, session) = self.target()?;
        let filter = self.cond.to_document_or_empty();
        let report = self.client.driver().update_many(coll, &filter, &update, session)?;
        finish("update", coll, &filter, start, report.modified);
        Ok(report)
    }

    /// Deletes every matching document. An unconstrained builder deletes the
    /// whole collection.
    ///
    /// # Errors
    /// Injected `Delete` failure, `NoCollection`, a closed transaction, or the driver error.
    pub fn delete(&self) -> Result<DeleteReport, DbError> {
        let start = Instant::now();
        self.client.guard(FaultOp::Delete)?;
        let (coll, session) = self.target()?;
        let filter = self.cond.to_document_or_empty();
        if filter.is_empty() {
            log::warn!(target: QUERY_TARGET, "delete without filter on {coll}");
        }
        let report = self.client.driver().delete_many(coll, &filter, session)?;
        finish("delete", coll, &filter, start, report.deleted);
        Ok(report)
    }

    /// Inserts one value and returns its `_id`.
    ///
    /// # Errors
    /// Serialization failure, `NoCollection`, a closed transaction, or the driver error.
    pub fn create<T: Serialize>(&self, value: &T) -> Result<Bson, DbError> {
        let report = self.insert(vec![to_document(value)?])?;
        report
            .inserted_ids
            .into_iter()
            .next()
            .ok_or_else(|| DbError::Driver("insert returned no id".into()))
    }

    /// Inserts every value in order.
    ///
    /// # Errors
    /// As [`create`](Self::create).
    pub fn create_many<T: Serialize>(&self, values: &[T]) -> Result<InsertReport, DbError> {
        let docs = values.iter().map(to_document).collect::<Result<Vec<_>, _>>()?;
        self.insert(docs)
    }

    fn insert(&self, docs: Vec<Document>) -> Result<InsertReport, DbError> {
        let start = Instant::now();
        let (coll, session) = self.target()?;
        let report = self.client.driver().insert_many(coll, docs, session)?;
        finish("create", coll, &Document::new(), start, num::usize_to_u64(report.inserted_ids.len()));
        Ok(report)
    }

    /// Distinct values of `field` over matching documents; array values are
    /// flattened.
    ///
    /// # Errors
    /// Injected `Find` failure, `NoCollection`, a closed transaction, or the driver error.
    pub fn distinct(&self, field: &str) -> Result<Vec<Bson>, DbError> {
        let start = Instant::now();
        self.client.guard(FaultOp::Find)?;
        let (coll, session) = self.target()?;
        let filter = self.cond.to_document_or_empty();
        let values = self.client.driver().distinct(coll, field, &filter, session)?;
        finish("distinct", coll, &filter, start, num::usize_to_u64(values.len()));
        Ok(values)
    }

    pub(crate) fn run_pipeline(&self, stages: &[Document]) -> Result<Cursor, DbError> {
        let start = Instant::now();
        self.client.guard(FaultOp::Find)?;
        let (coll, session) = self.target()?;
        let docs: Vec<Document> =
            self.client.driver().aggregate(coll, stages, session)?.collect::<Result<_, _>>()?;
        let mut summary = Document::new();
        summary.insert("stages", num::u64_to_i64_saturating(num::usize_to_u64(stages.len())));
        finish("aggregate", coll, &summary, start, num::usize_to_u64(docs.len()));
        Ok(Cursor::from_docs(docs))
    }
}

#[cfg(test)]
mod tests {
    use crate::client::Client;
    use crate::errors::DbError;
    use crate::fault::MockInjector;
    use crate::utils::devlog;
    use crate::test_support::{Person, seeded_people as seeded};
    use bson::doc;
    use std::sync::Arc;

    #[test]
    fn count_find_first() {
        let c = seeded();
        let mut s = c.collection("people");
        s.gt("age", 25);
        assert_eq!(s.count().unwrap(), 2);
        assert!(s.exists_any().unwrap());
        s.order_by("-age");
        let all: Vec<Person> = s.find().unwrap();
        assert_eq!(all.iter().map(|p| p.age).collect::<Vec<_>>(), vec![35, 30]);
        let first: Option<Person> = s.first().unwrap();
        assert_eq!(first.map(|p| p.name), Some("Cid".to_string()));
        s.gt("age", 100);
        assert_eq!(s.first::<Person>().unwrap(), None);
    }

    #[test]
    fn update_and_delete() {
        let c = seeded();
        let mut s = c.collection("people");
        s.equal("name", "Bob");
        let r = s.update(doc! {"$set": {"age": 31}}).unwrap();
        assert_eq!((r.matched, r.modified), (1, 1));
        let bob: Option<Person> = s.first().unwrap();
        assert_eq!(bob.map(|p| p.age), Some(31));
        assert_eq!(s.delete().unwrap().deleted, 1);
        assert_eq!(c.collection("people").count().unwrap(), 2);
    }

    #[test]
    fn create_returns_id() {
        let c = Client::memory();
        let id = c.model::<Person>().create(&Person::new("x", 1)).unwrap();
        assert!(matches!(id, bson::Bson::ObjectId(_)));
    }

    #[test]
    fn distinct_values() {
        let c = seeded();
        let mut s = c.collection("people");
        s.lt("age", 35);
        assert_eq!(s.distinct("name").unwrap(), vec![bson::Bson::from("Ann"), bson::Bson::from("Bob")]);
    }

    #[test]
    fn no_collection_is_an_error() {
        assert_eq!(Client::memory().scoop().count(), Err(DbError::NoCollection));
    }

    #[test]
    fn injected_failures_skip_the_driver() {
        let c = seeded();
        let mock = Arc::new(MockInjector::new());
        let c = c.with_injector(mock.clone());
        mock.fail_count(DbError::Timeout).fail_delete(DbError::Driver("nope".into()));
        let s = c.collection("people");
        assert_eq!(s.count(), Err(DbError::Timeout));
        assert_eq!(s.delete(), Err(DbError::Driver("nope".into())));
        assert_eq!(s.find_documents().unwrap().len(), 3);
        mock.reset();
        assert_eq!(s.count().unwrap(), 3);
    }

    #[test]
    fn terminal_ops_emit_bench_lines() {
        let _g = devlog::enable_thread_sink();
        let c = seeded();
        devlog::drain();
        c.collection("people").count().unwrap();
        let lines = devlog::drain_json();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0]["bench"], "scoop");
        assert_eq!(lines[0]["op"], "count");
        assert_eq!(lines[0]["collection"], "people");
        assert_eq!(lines[0]["result_count"], 3);
    }

    #[test]
    fn terminal_calls_do_not_reset_state() {
        let c = seeded();
        let mut s = c.collection("people");
        s.gte("age", 30).limit(1);
        let before = s.filter_document();
        let _ = s.count().unwrap();
        let _ = s.find_documents().unwrap();
        assert_eq!(s.filter_document(), before);
        assert_eq!(s.find_options().limit, Some(1));
    }
}
