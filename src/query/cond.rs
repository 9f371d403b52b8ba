//! Condition node: accumulates clauses from chained calls and compiles them into a
//! filter document.
//!
//! A compiled node is either `None` (no constraint, matches everything) or a
//! non-empty document. Clauses on the same field fold into one operator document,
//! so `gt("age", 20)` followed by `lt("age", 30)` compiles to
//! `{"age": {"$gt": 20, "$lt": 30}}`.

use bson::{Bson, Document};

use super::criterion::Criterion;
use super::operator::{CmpOp, parse_operator};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Logic {
    And,
    Or,
    Nor,
}

impl Logic {
    #[must_use]
    pub fn wire(self) -> &'static str {
        match self {
            Self::And => "$and",
            Self::Or => "$or",
            Self::Nor => "$nor",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Clause {
    Cmp { field: String, op: CmpOp, value: Bson },
    Pattern { field: String, pattern: String, negated: bool },
    Exists { field: String, exists: bool },
    Merge(Document),
    Logical { op: Logic, branches: Vec<Cond> },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Cond {
    clauses: Vec<Clause>,
    skip: bool,
}

impl Cond {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a node from a single criterion.
    #[must_use]
    pub fn from_criterion(c: impl Into<Criterion>) -> Self {
        let mut cond = Self::new();
        cond.filter(c);
        cond
    }

    /// Number of clauses held (an OR group counts once).
    #[must_use]
    pub fn len(&self) -> usize {
        self.clauses.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    #[must_use]
    pub fn is_skipped(&self) -> bool {
        self.skip
    }

    /// Empties the node; equivalent to `Cond::new()`.
    pub fn reset(&mut self) -> &mut Self {
        self.clauses.clear();
        self.skip = false;
        self
    }

    pub fn filter(&mut self, c: impl Into<Criterion>) -> &mut Self {
        self.apply(c.into());
        self
    }

    fn apply(&mut self, c: Criterion) {
        match c {
            Criterion::Empty | Criterion::Flag(true) => {}
            Criterion::Flag(false) => self.skip = true,
            Criterion::Pair { field, value } => {
                let (f, op) = parse_operator(&field);
                self.push_cmp(f, op, value);
            }
            Criterion::OpPair { field, op, value } => match CmpOp::from_token(&op) {
                Some(op) => self.push_cmp(field.trim(), op, value),
                None => log::warn!("ignoring clause on '{field}': unknown operator '{op}'"),
            },
            Criterion::Map(doc) => {
                if !doc.is_empty() {
                    self.clauses.push(Clause::Merge(doc));
                }
            }
            Criterion::List(items) => {
                for item in items {
                    self.apply(item);
                }
            }
            Criterion::Sub(cond) => {
                if let Some(doc) = cond.to_filter_document() {
                    self.clauses.push(Clause::Merge(doc));
                }
            }
            Criterion::Bare(field) => log::debug!("ignoring bare field '{field}' without a value"),
            Criterion::Unrecognized(v) => log::warn!("ignoring unrecognized filter input: {v}"),
        }
    }

    fn push_cmp(&mut self, field: &str, op: CmpOp, value: Bson) {
        match op {
            CmpOp::Like => {
                let pattern = match value {
                    Bson::String(s) => s,
                    other => other.to_string(),
                };
                self.push_pattern(field, pattern, false);
            }
            CmpOp::In | CmpOp::Nin => {
                let values = match value {
                    Bson::Array(vs) => vs,
                    other => vec![other],
                };
                self.clauses.push(Clause::Cmp { field: field.to_string(), op, value: Bson::Array(values) });
            }
            _ => self.clauses.push(Clause::Cmp { field: field.to_string(), op, value }),
        }
    }

    fn push_pattern(&mut self, field: &str, pattern: String, negated: bool) {
        if pattern.is_empty() {
            return;
        }
        self.clauses.push(Clause::Pattern { field: field.to_string(), pattern, negated });
    }

    pub fn equal(&mut self, field: &str, value: impl Into<Bson>) -> &mut Self {
        self.push_cmp(field, CmpOp::Eq, value.into());
        self
    }

    pub fn ne(&mut self, field: &str, value: impl Into<Bson>) -> &mut Self {
        self.push_cmp(field, CmpOp::Ne, value.into());
        self
    }

    pub fn gt(&mut self, field: &str, value: impl Into<Bson>) -> &mut Self {
        self.push_cmp(field, CmpOp::Gt, value.into());
        self
    }

    pub fn gte(&mut self, field: &str, value: impl Into<Bson>) -> &mut Self {
        self.push_cmp(field, CmpOp::Gte, value.into());
        self
    }

    pub fn lt(&mut self, field: &str, value: impl Into<Bson>) -> &mut Self {
        self.push_cmp(field, CmpOp::Lt, value.into());
        self
    }

    pub fn lte(&mut self, field: &str, value: impl Into<Bson>) -> &mut Self {
        self.push_cmp(field, CmpOp::Lte, value.into());
        self
    }

    pub fn is_in<I, V>(&mut self, field: &str, values: I) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Bson>,
    {
        let vs: Vec<Bson> = values.into_iter().map(Into::into).collect();
        self.push_cmp(field, CmpOp::In, Bson::Array(vs));
        self
    }

    pub fn not_in<I, V>(&mut self, field: &str, values: I) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Bson>,
    {
        let vs: Vec<Bson> = values.into_iter().map(Into::into).collect();
        self.push_cmp(field, CmpOp::Nin, Bson::Array(vs));
        self
    }

    /// Inclusive range: `gte(lo)` and `lte(hi)` on the same field.
    pub fn between(&mut self, field: &str, lo: impl Into<Bson>, hi: impl Into<Bson>) -> &mut Self {
        self.gte(field, lo).lte(field, hi)
    }

    /// Outside the inclusive range: `field < lo OR field > hi`.
    pub fn not_between(
        &mut self,
        field: &str,
        lo: impl Into<Bson>,
        hi: impl Into<Bson>,
    ) -> &mut Self {
        let mut below = Self::new();
        below.lt(field, lo);
        let mut above = Self::new();
        above.gt(field, hi);
        self.clauses.push(Clause::Logical { op: Logic::Or, branches: vec![below, above] });
        self
    }

    pub fn exists(&mut self, field: &str, exists: bool) -> &mut Self {
        self.clauses.push(Clause::Exists { field: field.to_string(), exists });
        self
    }

    /// Case-insensitive contains-style match. An empty pattern adds nothing.
    pub fn like(&mut self, field: &str, pattern: &str) -> &mut Self {
        self.push_pattern(field, pattern.to_string(), false);
        self
    }

    /// Strings starting with `pattern` (`pattern.*`). An empty pattern adds nothing.
    pub fn left_like(&mut self, field: &str, pattern: &str) -> &mut Self {
        if !pattern.is_empty() {
            self.push_pattern(field, format!("{pattern}.*"), false);
        }
        self
    }

    /// Strings ending with `pattern` (`.*pattern`). An empty pattern adds nothing.
    pub fn right_like(&mut self, field: &str, pattern: &str) -> &mut Self {
        if !pattern.is_empty() {
            self.push_pattern(field, format!(".*{pattern}"), false);
        }
        self
    }

    pub fn not_like(&mut self, field: &str, pattern: &str) -> &mut Self {
        self.push_pattern(field, pattern.to_string(), true);
        self
    }

    pub fn not_left_like(&mut self, field: &str, pattern: &str) -> &mut Self {
        if !pattern.is_empty() {
            self.push_pattern(field, format!("{pattern}.*"), true);
        }
        self
    }

    pub fn not_right_like(&mut self, field: &str, pattern: &str) -> &mut Self {
        if !pattern.is_empty() {
            self.push_pattern(field, format!(".*{pattern}"), true);
        }
        self
    }

    /// Adds `c` as an alternative to what the node already holds and returns the
    /// same node, so `a.or(b).or(c)` compiles to `{"$or": [a, b, c]}`.
    pub fn or(&mut self, c: impl Into<Criterion>) -> &mut Self {
        let branch = Self::from_criterion(c);
        if let [Clause::Logical { op: Logic::Or, branches }] = self.clauses.as_mut_slice() {
            branches.push(branch);
        } else if self.clauses.is_empty() {
            self.clauses.push(Clause::Logical { op: Logic::Or, branches: vec![branch] });
        } else {
            let current = Self { clauses: std::mem::take(&mut self.clauses), skip: false };
            self.clauses.push(Clause::Logical { op: Logic::Or, branches: vec![current, branch] });
        }
        self
    }

    /// Explicit AND; identical to `filter`.
    pub fn and(&mut self, c: impl Into<Criterion>) -> &mut Self {
        self.filter(c)
    }

    pub(crate) fn push_logical(&mut self, op: Logic, branches: Vec<Self>) {
        if !branches.is_empty() {
            self.clauses.push(Clause::Logical { op, branches });
        }
    }

    /// Compiles the node. `None` means no constraint.
    #[must_use]
    pub fn to_filter_document(&self) -> Option<Document> {
        if self.skip {
            return None;
        }
        let mut out = Document::new();
        for clause in &self.clauses {
            fold_clause(&mut out, clause);
        }
        if out.is_empty() { None } else { Some(out) }
    }

    /// Compiled document, or an empty one when unconstrained (wire form for "match all").
    #[must_use]
    pub fn to_document_or_empty(&self) -> Document {
        self.to_filter_document().unwrap_or_default()
    }
}

fn fold_clause(out: &mut Document, clause: &Clause) {
    match clause {
        Clause::Cmp { field, op: CmpOp::Eq, value } => put_value(out, field, value.clone()),
        Clause::Cmp { field, op, value } => put_op(out, field, op.wire(), value.clone()),
        Clause::Pattern { field, pattern, negated: false } => {
            put_op(out, field, "$regex", Bson::String(pattern.clone()));
            put_op(out, field, "$options", Bson::String("i".into()));
        }
        Clause::Pattern { field, pattern, negated: true } => {
            let mut re = Document::new();
            re.insert("$regex", pattern.clone());
            re.insert("$options", "i");
            put_op(out, field, "$not", Bson::Document(re));
        }
        Clause::Exists { field, exists } => put_op(out, field, "$exists", Bson::Boolean(*exists)),
        Clause::Merge(doc) => {
            for (k, v) in doc {
                merge_entry(out, k, v.clone());
            }
        }
        Clause::Logical { op: Logic::Or, branches } => {
            let mut docs = Vec::with_capacity(branches.len());
            for b in branches {
                match b.to_filter_document() {
                    Some(d) => docs.push(Bson::Document(d)),
                    // An unconstrained alternative makes the whole OR match everything.
                    None => return,
                }
            }
            merge_entry(out, Logic::Or.wire(), Bson::Array(docs));
        }
        // Unconstrained AND/NOR branches are skipped.
        Clause::Logical { op: op @ (Logic::And | Logic::Nor), branches } => {
            let docs: Vec<Bson> =
                branches.iter().filter_map(Cond::to_filter_document).map(Bson::Document).collect();
            if !docs.is_empty() {
                merge_entry(out, op.wire(), Bson::Array(docs));
            }
        }
    }
}

fn is_operator_doc(d: &Document) -> bool {
    !d.is_empty() && d.keys().all(|k| k.starts_with('$'))
}

fn put_value(out: &mut Document, field: &str, value: Bson) {
    match out.get_mut(field) {
        Some(Bson::Document(ops)) if is_operator_doc(ops) => {
            ops.insert("$eq", value);
        }
        Some(slot) => *slot = value,
        None => {
            out.insert(field, value);
        }
    }
}

fn put_op(out: &mut Document, field: &str, op: &str, value: Bson) {
    match out.get_mut(field) {
        Some(Bson::Document(ops)) if is_operator_doc(ops) => {
            ops.insert(op, value);
        }
        Some(slot) => {
            let previous = std::mem::replace(slot, Bson::Null);
            let mut ops = Document::new();
            ops.insert("$eq", previous);
            ops.insert(op, value);
            *slot = Bson::Document(ops);
        }
        None => {
            let mut ops = Document::new();
            ops.insert(op, value);
            out.insert(field, ops);
        }
    }
}

fn merge_entry(out: &mut Document, key: &str, value: Bson) {
    if key.starts_with('$') {
        if !out.contains_key(key) {
            out.insert(key, value);
            return;
        }
        match key {
            "$and" => {
                if let Some(Bson::Array(existing)) = out.get_mut("$and") {
                    match value {
                        Bson::Array(more) => existing.extend(more),
                        other => existing.push(other),
                    }
                } else {
                    out.insert(key, value);
                }
            }
            "$or" | "$nor" => {
                let mut wrapped = Document::new();
                wrapped.insert(key, value);
                merge_entry(out, "$and", Bson::Array(vec![Bson::Document(wrapped)]));
            }
            _ => {
                out.insert(key, value);
            }
        }
        return;
    }
    match value {
        Bson::Document(ops) if is_operator_doc(&ops) => {
            for (op, v) in ops {
                put_op(out, key, &op, v);
            }
        }
        plain => put_value(out, key, plain),
    }
}
