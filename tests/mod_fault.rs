use bson::doc;
use parking_lot::Mutex;
use scoop::fault::{self, FaultInjector, FaultOp, MockInjector};
use scoop::{Client, Context, DbError, WatchOptions};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

// The ambient slot is process-wide; tests that install into it take this lock.
static AMBIENT_LOCK: Mutex<()> = Mutex::new(());

fn seeded() -> Client {
    let client = Client::memory();
    client.collection("items").create_many(&[doc! {"n": 1}, doc! {"n": 2}]).unwrap();
    client
}

/// Fails the first `budget` guarded calls of one operation, then passes.
struct FailFirst {
    op: FaultOp,
    budget: AtomicU64,
}

impl FaultInjector for FailFirst {
    fn should_fail(&self, op: FaultOp) -> bool {
        op == self.op && self.budget.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)).is_ok()
    }

    fn error(&self, _op: FaultOp) -> Option<DbError> {
        None
    }
}

#[test]
fn ambient_injector_applies_until_cleared() {
    let _g = AMBIENT_LOCK.lock();
    let client = seeded().with_ambient_injector();
    let mock = Arc::new(MockInjector::new());
    mock.fail_count(DbError::Timeout);
    fault::set_injector(Some(mock.clone()));

    assert_eq!(client.collection("items").count(), Err(DbError::Timeout));
    assert_eq!(client.collection("items").find_documents().unwrap().len(), 2);
    assert_eq!(mock.call_count(FaultOp::Count), 1);
    assert_eq!(mock.call_count(FaultOp::Find), 1);

    fault::set_injector(None);
    assert_eq!(client.collection("items").count().unwrap(), 2);
    assert_eq!(mock.call_count(FaultOp::Count), 1);
}

#[test]
fn explicit_injector_ignores_the_ambient_slot() {
    let _g = AMBIENT_LOCK.lock();
    let ambient = Arc::new(MockInjector::new());
    ambient.fail_ping(DbError::Driver("ambient".into()));
    fault::set_injector(Some(ambient));

    let client = seeded();
    assert!(client.ping().is_ok());
    assert_eq!(client.clone().with_ambient_injector().ping(), Err(DbError::Driver("ambient".into())));
    fault::set_injector(None);
}

#[test]
fn custom_injector_without_error_yields_injected() {
    let injector = Arc::new(FailFirst { op: FaultOp::Find, budget: AtomicU64::new(2) });
    let client = seeded().with_injector(injector);
    let q = client.collection("items");
    assert_eq!(q.find_documents(), Err(DbError::Injected("find".into())));
    assert_eq!(q.distinct("n"), Err(DbError::Injected("find".into())));
    assert_eq!(q.find_documents().unwrap().len(), 2);
}

#[test]
fn every_guarded_operation_short_circuits() {
    let mock = Arc::new(MockInjector::new());
    let client = seeded().with_injector(mock.clone());
    let err = DbError::Driver("down".into());
    for op in FaultOp::ALL {
        mock.fail(op, err.clone());
    }

    let q = client.collection("items");
    assert_eq!(client.ping(), Err(err.clone()));
    assert!(matches!(client.health(), Err(DbError::Health { .. })));
    assert_eq!(q.find_documents(), Err(err.clone()));
    assert_eq!(q.count(), Err(err.clone()));
    assert_eq!(q.exists_any(), Err(err.clone()));
    assert_eq!(q.delete().unwrap_err(), err);
    assert_eq!(q.begin().unwrap_err(), err);
    let ctx = Context::with_timeout(Duration::from_millis(10));
    assert_eq!(q.watch(&ctx, WatchOptions::default(), |_| Ok(())), Err(err.clone()));
    assert_eq!(client.close(), Err(err));

    // Nothing reached the driver.
    mock.reset();
    assert_eq!(client.collection("items").count().unwrap(), 2);
    client.close().unwrap();
    assert_eq!(client.ping(), Err(DbError::Closed));
}

#[test]
fn update_and_create_are_not_guarded() {
    let mock = Arc::new(MockInjector::new());
    let client = seeded().with_injector(mock.clone());
    for op in FaultOp::ALL {
        mock.fail(op, DbError::Timeout);
    }
    let q = client.collection("items");
    q.create(&doc! {"n": 3}).unwrap();
    assert_eq!(q.update(doc! {"$set": {"seen": true}}).unwrap().matched, 3);
}
