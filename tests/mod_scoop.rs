use bson::doc;
use scoop::query::{self, Cond, Criterion};
use scoop::{Client, Model, Order};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct User {
    name: String,
    email: String,
    age: i32,
}

impl Model for User {
    fn collection_name() -> &'static str {
        "users"
    }
}

fn user(name: &str, email: &str, age: i32) -> User {
    User { name: name.into(), email: email.into(), age }
}

fn fixture() -> Client {
    let client = Client::memory();
    client
        .model::<User>()
        .create_many(&[
            user("John Smith", "john@example.com", 25),
            user("Jane Doe", "jane@test.org", 30),
            user("Johnny Cash", "cash@example.com", 35),
        ])
        .unwrap();
    client
}

#[test]
fn end_to_end_count_delete_count() {
    let client = fixture();
    let mut q = client.model::<User>();
    q.filter(query::gt("age", 25));
    assert_eq!(q.count().unwrap(), 2);
    assert_eq!(q.delete().unwrap().deleted, 2);
    // Same builder, no cached result.
    assert_eq!(q.count().unwrap(), 0);
    assert_eq!(client.model::<User>().count().unwrap(), 1);
}

#[test]
fn or_matches_two_of_three() {
    let client = fixture();
    let mut q = client.model::<User>();
    q.filter(query::or([query::eq("age", 25), query::eq("age", 30)]));
    assert_eq!(q.count().unwrap(), 2);

    let mut chained = client.model::<User>();
    chained.equal("age", 25).or(("age", 30));
    assert_eq!(chained.filter_document(), q.filter_document());
    assert_eq!(chained.count().unwrap(), 2);
}

#[test]
fn range_on_one_field_is_one_clause() {
    let client = fixture();
    let mut q = client.model::<User>();
    q.gt("age", 25).lte("age", 30);
    assert_eq!(q.filter_document(), Some(doc! {"age": {"$gt": 25, "$lte": 30}}));
    assert_eq!(q.count().unwrap(), 1);
}

#[test]
fn between_equals_gte_then_lte() {
    let client = fixture();
    let mut a = client.model::<User>();
    a.between("age", 25, 30);
    let mut b = client.model::<User>();
    b.gte("age", 25).lte("age", 30);
    assert_eq!(a.filter_document(), b.filter_document());
    assert_eq!(a.count().unwrap(), 2);

    let mut outside = client.model::<User>();
    outside.not_between("age", 26, 34);
    assert_eq!(outside.count().unwrap(), 2);
}

#[test]
fn pair_form_equals_equal() {
    let client = fixture();
    let mut a = client.model::<User>();
    a.filter(("name", "Jane Doe"));
    let mut b = client.model::<User>();
    b.equal("name", "Jane Doe");
    assert_eq!(a.filter_document(), b.filter_document());
    assert_eq!(a.count().unwrap(), 1);
}

#[test]
fn clone_is_independent_of_original() {
    let client = fixture();
    let mut original = client.model::<User>();
    original.gte("age", 30);
    let before = original.count().unwrap();

    let mut copy = original.clone();
    copy.equal("name", "Jane Doe").limit(1);
    assert_eq!(copy.count().unwrap(), 1);
    assert_eq!(original.count().unwrap(), before);
    assert_eq!(original.find_options().limit, None);
}

#[test]
fn clear_matches_everything() {
    let client = fixture();
    let mut q = client.model::<User>();
    q.equal("name", "John Smith").order_by("-age").select(&["name"]).limit(1);
    assert_eq!(q.count().unwrap(), 1);
    q.clear();
    assert_eq!(q.filter_document(), None);
    assert_eq!(q.count().unwrap(), 3);
}

#[test]
fn like_family_against_data() {
    let client = fixture();
    let count = |f: &dyn Fn(&mut scoop::Scoop)| {
        let mut q = client.model::<User>();
        f(&mut q);
        q.count().unwrap()
    };
    assert_eq!(count(&|q: &mut scoop::Scoop| { q.like("name", "john"); }), 2);
    assert_eq!(count(&|q: &mut scoop::Scoop| { q.left_like("name", "John"); }), 2);
    assert_eq!(count(&|q: &mut scoop::Scoop| { q.right_like("email", "example.com"); }), 2);
    assert_eq!(count(&|q: &mut scoop::Scoop| { q.not_like("name", "JOHN"); }), 1);
    assert_eq!(count(&|q: &mut scoop::Scoop| { q.not_right_like("email", "example.com"); }), 1);
    assert_eq!(count(&|q: &mut scoop::Scoop| { q.like("name", ""); }), 3);
}

#[test]
fn like_patterns_compile_with_options() {
    let mut c = Cond::new();
    c.left_like("name", "John").right_like("email", "example.com");
    assert_eq!(
        c.to_filter_document(),
        Some(doc! {
            "name": {"$regex": "John.*", "$options": "i"},
            "email": {"$regex": ".*example.com", "$options": "i"}
        })
    );
    let mut n = Cond::new();
    n.not_like("name", "x");
    assert_eq!(n.to_filter_document(), Some(doc! {"name": {"$not": {"$regex": "x", "$options": "i"}}}));
}

#[test]
fn empty_patterns_add_nothing() {
    let mut c = Cond::new();
    c.equal("a", 1);
    c.like("f", "").left_like("f", "").right_like("f", "");
    c.not_like("f", "").not_left_like("f", "").not_right_like("f", "");
    assert_eq!(c.len(), 1);
}

#[test]
fn flags_and_loose_inputs() {
    let mut c = Cond::new();
    c.equal("a", 1).filter(true);
    assert_eq!(c.to_filter_document(), Some(doc! {"a": 1}));
    c.filter(false);
    assert_eq!(c.to_filter_document(), None);

    let loose = Criterion::from_bson(bson::bson!(["age>=", 18, "name", "Ann", "dangling"]));
    let c = Cond::from_criterion(loose);
    assert_eq!(c.to_filter_document(), Some(doc! {"age": {"$gte": 18}, "name": "Ann"}));
}

#[test]
fn find_decodes_sorted_paged_projection() {
    let client = fixture();
    let mut q = client.model::<User>();
    q.order_by("-age").page(2, 1);
    let page: Vec<User> = q.find().unwrap();
    assert_eq!(page, vec![user("Jane Doe", "jane@test.org", 30)]);

    q.clear();
    q.sort("age", Order::Asc).select(&["name"]);
    let docs = q.find_documents().unwrap();
    assert_eq!(docs.len(), 3);
    assert!(docs.iter().all(|d| d.get("email").is_none() && d.contains_key("_id")));
    assert_eq!(docs[0].get_str("name").unwrap(), "John Smith");
}

#[test]
fn update_through_builder() {
    let client = fixture();
    let mut q = client.model::<User>();
    q.is_in("age", [25, 35]);
    let r = q.update(doc! {"$inc": {"age": 1}}).unwrap();
    assert_eq!((r.matched, r.modified), (2, 2));
    let mut check = client.model::<User>();
    check.is_in("age", [26, 36]);
    assert_eq!(check.count().unwrap(), 2);
    check.clear();
    check.not_in("age", [26, 36]);
    assert_eq!(check.first::<User>().unwrap().map(|u| u.age), Some(30));
}

#[test]
fn in_set_past_a_thousand_values_matches() {
    let client = Client::memory();
    client.collection("nums").create(&doc! {"n": 1500}).unwrap();
    let mut q = client.collection("nums");
    q.is_in("n", 0..2000);
    assert_eq!(q.count().unwrap(), 1);
    q.clear();
    q.not_in("n", 0..2000);
    assert_eq!(q.count().unwrap(), 0);
}

#[test]
fn ne_through_builder_and_helper() {
    let client = fixture();
    let mut a = client.model::<User>();
    a.ne("name", "Jane Doe");
    let mut b = client.model::<User>();
    b.filter(query::ne("name", "Jane Doe"));
    assert_eq!(a.filter_document(), Some(doc! {"name": {"$ne": "Jane Doe"}}));
    assert_eq!(a.filter_document(), b.filter_document());
    assert_eq!(a.count().unwrap(), 2);
}

#[test]
fn exists_and_distinct() {
    let client = fixture();
    client.collection("users").create(&doc! {"name": "Nobody", "age": 99}).unwrap();
    let mut q = client.model::<User>();
    q.exists("email", false);
    assert_eq!(q.count().unwrap(), 1);
    let ages = client.model::<User>().distinct("age").unwrap();
    assert_eq!(ages.len(), 4);
}
