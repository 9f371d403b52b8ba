use bson::{Document, doc};
use proptest::prelude::*;
use scoop::query::{self, CmpOp, Cond, parse_operator};
use scoop::{Client, Order};

const SUFFIXES: [(&str, CmpOp); 9] = [
    ("", CmpOp::Eq),
    (">", CmpOp::Gt),
    ("<", CmpOp::Lt),
    (">=", CmpOp::Gte),
    ("<=", CmpOp::Lte),
    ("<>", CmpOp::Ne),
    ("!=", CmpOp::Ne),
    ("%", CmpOp::Like),
    ("~", CmpOp::Like),
];

proptest! {
    #[test]
    fn prop_suffix_splits_field_and_operator(field in "[a-z][a-z0-9_.]{0,12}", idx in 0usize..SUFFIXES.len(), pad in " {0,2}") {
        let (suffix, op) = SUFFIXES[idx];
        let token = format!("{field}{pad}{suffix}");
        prop_assert_eq!(parse_operator(&token), (field.as_str(), op));
    }

    #[test]
    fn prop_between_is_gte_then_lte(lo in any::<i32>(), hi in any::<i32>()) {
        let mut a = Cond::new();
        a.between("n", lo, hi);
        let mut b = Cond::new();
        b.gte("n", lo).lte("n", hi);
        prop_assert_eq!(a.to_filter_document(), b.to_filter_document());
        prop_assert_eq!(query::between("n", lo, hi).to_filter_document(), b.to_filter_document());
    }

    #[test]
    fn prop_count_matches_manual_filter(v in proptest::collection::vec(-50i32..50, 0..40), lo in -60i32..60, hi in -60i32..60) {
        let client = Client::memory();
        let docs: Vec<Document> = v.iter().map(|n| doc! {"n": *n}).collect();
        if !docs.is_empty() {
            client.collection("nums").create_many(&docs).unwrap();
        }
        let mut q = client.collection("nums");
        q.between("n", lo, hi);
        let expected = v.iter().filter(|n| (lo..=hi).contains(*n)).count() as u64;
        prop_assert_eq!(q.count().unwrap(), expected);
    }

    #[test]
    fn prop_multi_key_sort_non_decreasing(v in proptest::collection::vec((0i64..5, any::<i64>()), 0..40)) {
        let client = Client::memory();
        let docs: Vec<Document> = v.iter().map(|(a, b)| doc! {"a": *a, "b": *b}).collect();
        if !docs.is_empty() {
            client.collection("srt").create_many(&docs).unwrap();
        }
        let mut q = client.collection("srt");
        q.sort("a", Order::Asc).sort("b", Order::Desc);
        let out = q.find_documents().unwrap();
        prop_assert_eq!(out.len(), v.len());
        for w in out.windows(2) {
            let (a0, b0) = (w[0].get_i64("a").unwrap(), w[0].get_i64("b").unwrap());
            let (a1, b1) = (w[1].get_i64("a").unwrap(), w[1].get_i64("b").unwrap());
            prop_assert!(a0 < a1 || (a0 == a1 && b0 >= b1));
        }
    }
}
