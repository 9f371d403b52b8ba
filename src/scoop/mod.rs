//! The query builder.
//!
//! A [`Scoop`] accumulates a filter, sort, projection and paging through chained
//! `&mut self` calls, then runs a terminal operation against the client's driver.
//! Terminal operations neither consume nor reset the builder, so one builder can
//! run `count` and `find` with the same filter. `clone()` gives an independent
//! copy of the filter state that still shares the client, collection binding and
//! transaction.

mod aggregate;
mod exec;
mod tx;
mod watch;

pub use aggregate::Aggregation;
pub use tx::{Transaction, TxState};

use bson::{Bson, Document};
use std::fmt;
use std::sync::Arc;

use crate::client::{Client, Model};
use crate::errors::DbError;
use crate::fault::FaultOp;
use crate::query::{Cond, Criterion, FindOptions, Order, SortSpec};

#[derive(Clone)]
pub struct Scoop {
    client: Client,
    cond: Cond,
    sort: Vec<SortSpec>,
    projection: Vec<String>,
    limit: Option<u64>,
    offset: Option<u64>,
    timeout_ms: Option<u64>,
    collection: Option<String>,
    tx: Option<Arc<Transaction>>,
}

impl fmt::Debug for Scoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scoop")
            .field("collection", &self.collection)
            .field("filter", &self.cond.to_filter_document())
            .field("sort", &self.sort)
            .field("projection", &self.projection)
            .field("limit", &self.limit)
            .field("offset", &self.offset)
            .field("tx", &self.tx_state())
            .finish_non_exhaustive()
    }
}

impl Scoop {
    pub(crate) fn new(client: Client) -> Self {
        Self {
            client,
            cond: Cond::new(),
            sort: Vec::new(),
            projection: Vec::new(),
            limit: None,
            offset: None,
            timeout_ms: None,
            collection: None,
            tx: None,
        }
    }

    // --- filters ---

    /// Adds a criterion; `filter(("age>", 20))` and `gt("age", 20)` compile the same.
    pub fn filter(&mut self, c: impl Into<Criterion>) -> &mut Self {
        self.cond.filter(c);
        self
    }

    pub fn equal(&mut self, field: &str, value: impl Into<Bson>) -> &mut Self {
        self.cond.equal(field, value);
        self
    }

    pub fn ne(&mut self, field: &str, value: impl Into<Bson>) -> &mut Self {
        Cond::ne(&mut self.cond, field, value);
        self
    }

    pub fn gt(&mut self, field: &str, value: impl Into<Bson>) -> &mut Self {
        self.cond.gt(field, value);
        self
    }

    pub fn gte(&mut self, field: &str, value: impl Into<Bson>) -> &mut Self {
        self.cond.gte(field, value);
        self
    }

    pub fn lt(&mut self, field: &str, value: impl Into<Bson>) -> &mut Self {
        self.cond.lt(field, value);
        self
    }

    pub fn lte(&mut self, field: &str, value: impl Into<Bson>) -> &mut Self {
        self.cond.lte(field, value);
        self
    }

    pub fn is_in<I, V>(&mut self, field: &str, values: I) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Bson>,
    {
        self.cond.is_in(field, values);
        self
    }

    pub fn not_in<I, V>(&mut self, field: &str, values: I) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Bson>,
    {
        self.cond.not_in(field, values);
        self
    }

    /// Inclusive range.
    pub fn between(&mut self, field: &str, lo: impl Into<Bson>, hi: impl Into<Bson>) -> &mut Self {
        self.cond.between(field, lo, hi);
        self
    }

    pub fn not_between(&mut self, field: &str, lo: impl Into<Bson>, hi: impl Into<Bson>) -> &mut Self {
        self.cond.not_between(field, lo, hi);
        self
    }

    pub fn exists(&mut self, field: &str, exists: bool) -> &mut Self {
        self.cond.exists(field, exists);
        self
    }

    pub fn like(&mut self, field: &str, pattern: &str) -> &mut Self {
        self.cond.like(field, pattern);
        self
    }

    pub fn left_like(&mut self, field: &str, pattern: &str) -> &mut Self {
        self.cond.left_like(field, pattern);
        self
    }

    pub fn right_like(&mut self, field: &str, pattern: &str) -> &mut Self {
        self.cond.right_like(field, pattern);
        self
    }

    pub fn not_like(&mut self, field: &str, pattern: &str) -> &mut Self {
        self.cond.not_like(field, pattern);
        self
    }

    pub fn not_left_like(&mut self, field: &str, pattern: &str) -> &mut Self {
        self.cond.not_left_like(field, pattern);
        self
    }

    pub fn not_right_like(&mut self, field: &str, pattern: &str) -> &mut Self {
        self.cond.not_right_like(field, pattern);
        self
    }

    /// Adds an alternative to the filter built so far.
    pub fn or(&mut self, c: impl Into<Criterion>) -> &mut Self {
        self.cond.or(c);
        self
    }

    // --- shape ---

    /// Sorts by `field`; sorting by the same field again replaces its order.
    pub fn sort(&mut self, field: &str, order: Order) -> &mut Self {
        match self.sort.iter_mut().find(|s| s.field == field) {
            Some(s) => s.order = order,
            None => self.sort.push(SortSpec { field: field.to_string(), order }),
        }
        self
    }

    /// Comma-separated fields, `-` prefix for descending: `"name,-age"`.
    pub fn order_by(&mut self, spec: &str) -> &mut Self {
        for part in spec.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            match part.strip_prefix('-') {
                Some(field) => self.sort(field.trim(), Order::Desc),
                None => self.sort(part.trim_start_matches('+').trim(), Order::Asc),
            };
        }
        self
    }

    /// Restricts returned fields; repeated names are kept once.
    pub fn select(&mut self, fields: &[&str]) -> &mut Self {
        for f in fields {
            if !f.is_empty() && !self.projection.iter().any(|p| p == f) {
                self.projection.push((*f).to_string());
            }
        }
        self
    }

    pub fn limit(&mut self, n: u64) -> &mut Self {
        self.limit = Some(n);
        self
    }

    pub fn offset(&mut self, n: u64) -> &mut Self {
        self.offset = Some(n);
        self
    }

    /// One-based page of `per_page` documents; page 0 is treated as page 1.
    pub fn page(&mut self, page: u64, per_page: u64) -> &mut Self {
        let page = page.max(1);
        self.limit = Some(per_page);
        self.offset = Some((page - 1).saturating_mul(per_page));
        self
    }

    pub fn timeout_ms(&mut self, ms: u64) -> &mut Self {
        self.timeout_ms = Some(ms);
        self
    }

    pub fn collection(&mut self, name: &str) -> &mut Self {
        self.collection = Some(name.to_string());
        self
    }

    pub fn model<M: Model>(&mut self) -> &mut Self {
        self.collection(M::collection_name())
    }

    /// Resets filter, sort, projection, paging and timeout in place. The
    /// collection binding and transaction are kept.
    pub fn clear(&mut self) -> &mut Self {
        self.cond.reset();
        self.sort.clear();
        self.projection.clear();
        self.limit = None;
        self.offset = None;
        self.timeout_ms = None;
        self
    }

    // --- inspection ---

    #[must_use]
    pub fn cond(&self) -> &Cond {
        &self.cond
    }

    /// Compiled filter; `None` when unconstrained.
    #[must_use]
    pub fn filter_document(&self) -> Option<Document> {
        self.cond.to_filter_document()
    }

    #[must_use]
    pub fn find_options(&self) -> FindOptions {
        FindOptions {
            sort: self.sort.clone(),
            projection: self.projection.clone(),
            limit: self.limit,
            skip: self.offset,
            timeout_ms: self.timeout_ms.or(self.client.options().operation_timeout_ms),
        }
    }

    #[must_use]
    pub fn collection_name(&self) -> Option<&str> {
        self.collection.as_deref()
    }

    #[must_use]
    pub fn client(&self) -> &Client {
        &self.client
    }

    // --- transactions ---

    #[must_use]
    pub fn tx_state(&self) -> TxState {
        self.tx.as_ref().map_or(TxState::NoTransaction, |t| t.state())
    }

    #[must_use]
    pub fn transaction_handle(&self) -> Option<&Arc<Transaction>> {
        self.tx.as_ref()
    }

    /// Starts a transaction and returns a builder bound to it. The receiver is
    /// left untouched.
    ///
    /// # Errors
    /// The injected `Transaction` failure, or the session/transaction start error.
    pub fn begin(&self) -> Result<Self, DbError> {
        self.client.guard(FaultOp::Transaction)?;
        if self.tx_state() == TxState::Active {
            return Err(DbError::Session("transaction already in progress".into()));
        }
        let session = self.client.driver().start_session()?;
        let tx = Transaction::start(session)?;
        let mut derived = self.clone();
        derived.tx = Some(Arc::new(tx));
        Ok(derived)
    }

    /// # Errors
    /// `NoActiveTransaction` without a transaction, `TransactionClosed` after
    /// commit or rollback, or the injected/driver failure (state stays Active).
    pub fn commit(&self) -> Result<(), DbError> {
        let tx = self.tx.as_ref().ok_or(DbError::NoActiveTransaction)?;
        self.client.guard(FaultOp::Transaction)?;
        tx.commit()
    }

    /// # Errors
    /// As [`commit`](Self::commit).
    pub fn rollback(&self) -> Result<(), DbError> {
        let tx = self.tx.as_ref().ok_or(DbError::NoActiveTransaction)?;
        self.client.guard(FaultOp::Transaction)?;
        tx.rollback()
    }

    /// Runs `f` in a new transaction: commits when it returns `Ok`, rolls back
    /// when it returns `Err`.
    ///
    /// # Errors
    /// The error from `begin`, from `f`, or from `commit`.
    pub fn transaction<R>(&self, f: impl FnOnce(&mut Self) -> Result<R, DbError>) -> Result<R, DbError> {
        let mut tx = self.begin()?;
        match f(&mut tx) {
            Ok(v) => {
                tx.commit()?;
                Ok(v)
            }
            Err(e) => {
                if let Err(re) = tx.rollback() {
                    log::warn!("rollback after failed transaction body: {re}");
                }
                Err(e)
            }
        }
    }

    /// Collection name and session id for an operation.
    fn target(&self) -> Result<(&str, Option<crate::driver::SessionId>), DbError> {
        let coll = self.collection.as_deref().ok_or(DbError::NoCollection)?;
        let session = match &self.tx {
            Some(tx) => Some(tx.operation_session()?),
            None => None,
        };
        Ok((coll, session))
    }
}
