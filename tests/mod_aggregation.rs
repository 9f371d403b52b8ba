use bson::{Document, doc};
use scoop::query::{self, Order, Pipeline};
use scoop::{Client, DbError};
use serde::Deserialize;

#[derive(Debug, Deserialize, PartialEq)]
struct Revenue {
    #[serde(rename = "_id")]
    customer: String,
    total: i64,
    orders: i64,
}

fn shop() -> Client {
    let client = Client::memory();
    client
        .collection("customers")
        .create_many(&[
            doc! {"code": "c1", "name": "Ann", "tier": "gold"},
            doc! {"code": "c2", "name": "Bob", "tier": "basic"},
        ])
        .unwrap();
    client
        .collection("orders")
        .create_many(&[
            doc! {"customer": "c1", "amount": 30, "items": ["pen", "ink"], "status": "paid"},
            doc! {"customer": "c1", "amount": 20, "items": ["pad"], "status": "paid"},
            doc! {"customer": "c2", "amount": 5, "items": [], "status": "paid"},
            doc! {"customer": "c2", "amount": 99, "items": ["desk"], "status": "void"},
        ])
        .unwrap();
    client
}

#[test]
fn builder_filter_runs_before_the_pipeline() {
    let client = shop();
    let mut q = client.collection("orders");
    q.equal("status", "paid");
    let mut p = Pipeline::new();
    p.group("$customer", doc! {"total": {"$sum": "$amount"}, "orders": {"$sum": 1}})
        .sort(&[("total", Order::Desc)]);

    let agg = q.aggregation(&p);
    assert_eq!(agg.stages()[0], doc! {"$match": {"status": "paid"}});
    assert_eq!(agg.stages().len(), 3);

    let out: Vec<Revenue> = agg.execute().unwrap();
    assert_eq!(
        out,
        vec![
            Revenue { customer: "c1".into(), total: 50, orders: 2 },
            Revenue { customer: "c2".into(), total: 5, orders: 1 },
        ]
    );
}

#[test]
fn unconstrained_builder_adds_no_match() {
    let client = shop();
    let mut p = Pipeline::new();
    p.count("n");
    let orders = client.collection("orders");
    let agg = orders.aggregation(&p);
    assert_eq!(agg.stages(), &[doc! {"$count": "n"}]);
    assert_eq!(agg.execute_one::<Document>().unwrap(), Some(doc! {"n": 4_i64}));
}

#[test]
fn lookup_then_unwind_joins_customers() {
    let client = shop();
    let mut p = Pipeline::new();
    p.match_(query::gt("amount", 25))
        .lookup("customers", "customer", "code", "buyer")
        .unwind("buyer", None)
        .project(doc! {"_id": 0, "amount": 1, "name": "$buyer.name"})
        .sort(&[("amount", Order::Asc)]);
    let out = client.collection("orders").aggregate::<Document>(&p).unwrap();
    assert_eq!(out, vec![doc! {"amount": 30, "name": "Ann"}, doc! {"amount": 99, "name": "Bob"}]);
}

#[test]
fn unwind_preserve_keeps_empty_arrays() {
    let client = shop();
    let mut dropped = Pipeline::new();
    dropped.unwind("$items", None);
    assert_eq!(client.collection("orders").aggregate::<Document>(&dropped).unwrap().len(), 4);

    let mut kept = Pipeline::new();
    kept.unwind("items", Some(true));
    assert_eq!(client.collection("orders").aggregate::<Document>(&kept).unwrap().len(), 5);
}

#[test]
fn facet_runs_each_branch_over_the_same_input() {
    let client = shop();
    let mut by_status = Pipeline::new();
    by_status.group("$status", doc! {"n": {"$sum": 1}}).sort(&[("_id", Order::Asc)]);
    let mut biggest = Pipeline::new();
    biggest.sort(&[("amount", Order::Desc)]).limit(1).project(doc! {"_id": 0, "amount": 1});

    let mut p = Pipeline::new();
    p.facet(&[("by_status", &by_status), ("biggest", &biggest)]);
    let out = client.collection("orders").aggregation(&p).execute_one::<Document>().unwrap().unwrap();
    assert_eq!(
        out,
        doc! {
            "by_status": [{"_id": "paid", "n": 3}, {"_id": "void", "n": 1}],
            "biggest": [{"amount": 99}]
        }
    );
}

#[test]
fn empty_result_and_bad_stage() {
    let client = shop();
    let mut q = client.collection("orders");
    q.equal("status", "refunded");
    let p = Pipeline::new();
    assert_eq!(q.aggregate::<Document>(&p).unwrap(), Vec::<Document>::new());
    assert_eq!(q.aggregation(&p).execute_one::<Document>().unwrap(), None);

    let mut bad = Pipeline::new();
    bad.add_stage(doc! {"$merge": {"into": "x"}});
    assert_eq!(
        client.collection("orders").aggregate::<Document>(&bad),
        Err(DbError::UnsupportedStage("$merge".into()))
    );
}
