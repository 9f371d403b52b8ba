//! Failure-injection seam.
//!
//! A [`FaultInjector`] is consulted before every guarded driver call. When it
//! reports a failure for an operation, the caller returns the configured error
//! (with its zero-value result) and never reaches the driver.
//!
//! `Client` takes its injector as an explicit dependency and defaults to
//! [`NoopInjector`]. For tests there is also an ambient process-wide slot
//! ([`set_injector`] / [`current`]) that a client opts into with
//! `Client::with_ambient_injector`.

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, LazyLock};

use crate::errors::DbError;

/// Operations guarded by the seam.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultOp {
    Ping,
    Find,
    Count,
    Delete,
    Transaction,
    Watch,
    Close,
}

impl FaultOp {
    pub const ALL: [Self; 7] = [
        Self::Ping,
        Self::Find,
        Self::Count,
        Self::Delete,
        Self::Transaction,
        Self::Watch,
        Self::Close,
    ];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Ping => "ping",
            Self::Find => "find",
            Self::Count => "count",
            Self::Delete => "delete",
            Self::Transaction => "transaction",
            Self::Watch => "watch",
            Self::Close => "close",
        }
    }
}

impl fmt::Display for FaultOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub trait FaultInjector: Send + Sync {
    fn should_fail(&self, op: FaultOp) -> bool;

    /// Error to return when `should_fail(op)` is true.
    fn error(&self, op: FaultOp) -> Option<DbError>;

    /// Called once per guarded call, before `should_fail`.
    fn record_call(&self, _op: FaultOp) {}

    /// Records the call and decides its outcome. Injectors whose state can
    /// change between the three calls above override this to decide atomically.
    fn check(&self, op: FaultOp) -> Option<DbError> {
        self.record_call(op);
        self.should_fail(op).then(|| self.error(op).unwrap_or_else(|| DbError::Injected(op.name().to_string())))
    }
}

/// Never fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopInjector;

impl FaultInjector for NoopInjector {
    fn should_fail(&self, _op: FaultOp) -> bool {
        false
    }

    fn error(&self, _op: FaultOp) -> Option<DbError> {
        None
    }
}

/// Consults `injector` for `op`. `Err` carries the configured error, or a
/// generic `Injected` error when the injector reports a failure without one.
///
/// # Errors
/// Returns the injected error when the injector says `op` should fail.
pub fn check(injector: &dyn FaultInjector, op: FaultOp) -> Result<(), DbError> {
    match injector.check(op) {
        Some(err) => {
            log::debug!("injected failure for {op}: {err}");
            Err(err)
        }
        None => Ok(()),
    }
}

#[derive(Default)]
struct MockState {
    failing: HashMap<FaultOp, DbError>,
    calls: HashMap<FaultOp, u64>,
}

/// Configurable injector for tests: per-operation failures and call counters,
/// all behind one mutex.
#[derive(Default)]
pub struct MockInjector {
    state: Mutex<MockState>,
}

impl MockInjector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every call of `op` fail with `err` until [`reset`](Self::reset) or [`clear`](Self::clear).
    pub fn fail(&self, op: FaultOp, err: DbError) -> &Self {
        self.state.lock().failing.insert(op, err);
        self
    }

    /// Stops failing `op`; counters are kept.
    pub fn clear(&self, op: FaultOp) -> &Self {
        self.state.lock().failing.remove(&op);
        self
    }

    pub fn fail_ping(&self, err: DbError) -> &Self {
        self.fail(FaultOp::Ping, err)
    }

    pub fn fail_find(&self, err: DbError) -> &Self {
        self.fail(FaultOp::Find, err)
    }

    pub fn fail_count(&self, err: DbError) -> &Self {
        self.fail(FaultOp::Count, err)
    }

    pub fn fail_delete(&self, err: DbError) -> &Self {
        self.fail(FaultOp::Delete, err)
    }

    pub fn fail_transaction(&self, err: DbError) -> &Self {
        self.fail(FaultOp::Transaction, err)
    }

    pub fn fail_watch(&self, err: DbError) -> &Self {
        self.fail(FaultOp::Watch, err)
    }

    pub fn fail_close(&self, err: DbError) -> &Self {
        self.fail(FaultOp::Close, err)
    }

    #[must_use]
    pub fn call_count(&self, op: FaultOp) -> u64 {
        self.state.lock().calls.get(&op).copied().unwrap_or(0)
    }

    /// Clears every failure and every counter in one step.
    pub fn reset(&self) {
        let mut st = self.state.lock();
        st.failing.clear();
        st.calls.clear();
    }
}

impl FaultInjector for MockInjector {
    fn should_fail(&self, op: FaultOp) -> bool {
        self.state.lock().failing.contains_key(&op)
    }

    fn error(&self, op: FaultOp) -> Option<DbError> {
        self.state.lock().failing.get(&op).cloned()
    }

    fn record_call(&self, op: FaultOp) {
        *self.state.lock().calls.entry(op).or_insert(0) += 1;
    }

    fn check(&self, op: FaultOp) -> Option<DbError> {
        let mut st = self.state.lock();
        *st.calls.entry(op).or_insert(0) += 1;
        st.failing.get(&op).cloned()
    }
}

static AMBIENT: LazyLock<RwLock<Arc<dyn FaultInjector>>> =
    LazyLock::new(|| RwLock::new(Arc::new(NoopInjector)));

/// Installs the ambient injector. `None` installs [`NoopInjector`].
pub fn set_injector(injector: Option<Arc<dyn FaultInjector>>) {
    let next = injector.unwrap_or_else(|| Arc::new(NoopInjector));
    *AMBIENT.write() = next;
}

/// The ambient injector; never absent.
#[must_use]
pub fn current() -> Arc<dyn FaultInjector> {
    AMBIENT.read().clone()
}
