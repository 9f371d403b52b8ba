use bson::doc;
use scoop::{Client, ClientOptions, Context, DbError, OperationType, WatchOptions};
use std::thread;
use std::time::{Duration, Instant};

const SETTLE: Duration = Duration::from_millis(150);

fn opts() -> WatchOptions {
    WatchOptions { poll_interval_ms: Some(20), full_document: false }
}

/// Runs `writes` on another thread once the watcher has had time to subscribe.
fn write_later(client: &Client, writes: impl FnOnce(&Client) + Send + 'static) -> thread::JoinHandle<()> {
    let client = client.clone();
    thread::spawn(move || {
        thread::sleep(SETTLE);
        writes(&client);
    })
}

#[test]
fn delivers_insert_update_delete_in_order() {
    let client = Client::memory();
    let writer = write_later(&client, |c| {
        let q = c.collection("events");
        q.create(&doc! {"n": 1}).unwrap();
        let mut one = c.collection("events");
        one.equal("n", 1);
        one.update(doc! {"$set": {"n": 2}}).unwrap();
        c.collection("events").delete().unwrap();
    });

    let ctx = Context::with_timeout(Duration::from_secs(5));
    let mut seen = Vec::new();
    client
        .collection("events")
        .watch(&ctx, opts(), |ev| {
            seen.push(ev);
            if seen.len() == 3 {
                ctx.cancel();
            }
            Ok(())
        })
        .unwrap();
    writer.join().unwrap();

    let kinds: Vec<_> = seen.iter().map(|e| e.operation_type).collect();
    assert_eq!(kinds, vec![OperationType::Insert, OperationType::Update, OperationType::Delete]);
    assert!(seen.iter().all(|e| e.collection == "events"));
    assert_eq!(seen[0].full_document.as_ref().and_then(|d| d.get_i32("n").ok()), Some(1));
    assert_eq!(seen[1].full_document, None);
    assert_eq!(seen[2].full_document, None);
    assert_eq!(seen[0].document_key, seen[2].document_key);
}

#[test]
fn builder_filter_selects_matching_documents() {
    let client = Client::memory();
    let writer = write_later(&client, |c| {
        let q = c.collection("events");
        q.create_many(&[doc! {"n": 1}, doc! {"n": 7}, doc! {"n": 9}]).unwrap();
        c.collection("other").create(&doc! {"n": 100}).unwrap();
    });

    let ctx = Context::with_timeout(Duration::from_secs(5));
    let mut q = client.collection("events");
    q.gt("n", 5);
    let mut ns = Vec::new();
    q.watch(&ctx, opts(), |ev| {
        let n = ev.full_document.as_ref().and_then(|d| d.get_i32("n").ok());
        ns.push(n);
        if ns.len() == 2 {
            ctx.cancel();
        }
        Ok(())
    })
    .unwrap();
    writer.join().unwrap();
    assert_eq!(ns, vec![Some(7), Some(9)]);
}

#[test]
fn handler_error_stops_delivery() {
    let client = Client::memory();
    let writer = write_later(&client, |c| {
        c.collection("events").create_many(&[doc! {"n": 1}, doc! {"n": 2}]).unwrap();
    });

    let ctx = Context::with_timeout(Duration::from_secs(5));
    let mut calls = 0;
    let err = client
        .collection("events")
        .watch(&ctx, opts(), |_| {
            calls += 1;
            Err(DbError::QueryError("stop".into()))
        })
        .unwrap_err();
    writer.join().unwrap();
    assert_eq!(err, DbError::QueryError("stop".into()));
    assert_eq!(calls, 1);
}

#[test]
fn expired_context_returns_ok() {
    let client = Client::memory();
    let ctx = Context::with_timeout(Duration::from_millis(60));
    let start = Instant::now();
    client.collection("events").watch(&ctx, opts(), |_| Ok(())).unwrap();
    assert!(start.elapsed() >= Duration::from_millis(60));
    assert!(start.elapsed() < Duration::from_secs(2));
}

#[test]
fn poll_interval_falls_back_to_client_options() {
    let options = ClientOptions { poll_interval_ms: Some(10), ..ClientOptions::default() };
    let client = Client::memory().with_options(options);
    let ctx = Context::with_timeout(Duration::from_millis(40));
    client.collection("events").watch(&ctx, WatchOptions::default(), |_| Ok(())).unwrap();
}

#[test]
fn closing_the_client_ends_the_stream_with_an_error() {
    let client = Client::memory();
    let writer = write_later(&client, |c| c.close().unwrap());
    let ctx = Context::with_timeout(Duration::from_secs(5));
    let res = client.collection("events").watch(&ctx, opts(), |_| Ok(()));
    writer.join().unwrap();
    assert!(matches!(res, Err(DbError::Driver(_))));
}

#[test]
fn unbound_builder_cannot_watch() {
    let ctx = Context::with_timeout(Duration::from_millis(10));
    assert_eq!(Client::memory().scoop().watch(&ctx, opts(), |_| Ok(())), Err(DbError::NoCollection));
}
