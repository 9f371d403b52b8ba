use bson::{Bson, Document};
use std::cmp::Ordering;

use super::eval::{bson_eq, compare_bson, compare_docs, get_path, matches};
use super::update::{add_numbers, as_f64, set_path};
use crate::errors::DbError;
use crate::query::{Order, SortSpec};
use crate::utils::num;

/// Loads the documents of another collection for `$lookup`.
pub(crate) type Lookup<'a> = dyn Fn(&str) -> Vec<Document> + 'a;

/// Runs `stages` over `docs` in order.
///
/// # Errors
/// `UnsupportedStage` for stages this engine does not know, `QueryError` for
/// malformed stage bodies.
pub(crate) fn run_pipeline(
    mut docs: Vec<Document>,
    stages: &[Document],
    lookup: &Lookup<'_>,
) -> Result<Vec<Document>, DbError> {
    for stage in stages {
        let mut it = stage.iter();
        let (Some((name, body)), None) = (it.next(), it.next()) else {
            return Err(DbError::QueryError(format!("stage must have exactly one key: {stage}")));
        };
        docs = match name.as_str() {
            "$match" => {
                let filter = body_doc(name, body)?;
                let mut out = Vec::with_capacity(docs.len());
                for d in docs {
                    if matches(&d, filter)? {
                        out.push(d);
                    }
                }
                out
            }
            "$project" => {
                let spec = body_doc(name, body)?;
                docs.iter().map(|d| project(d, spec)).collect::<Result<_, _>>()?
            }
            "$addFields" | "$set" => {
                let spec = body_doc(name, body)?;
                for d in &mut docs {
                    for (k, expr) in spec {
                        let v = eval_expr(d, expr);
                        set_path(d, k, v)?;
                    }
                }
                docs
            }
            "$group" => group(&docs, body_doc(name, body)?)?,
            "$sort" => {
                let sort = sort_specs(body_doc(name, body)?)?;
                docs.sort_by(|a, b| compare_docs(a, b, &sort));
                docs
            }
            "$skip" => {
                let n = num::u64_to_usize_saturating(count_arg(name, body)?);
                docs.into_iter().skip(n).collect()
            }
            "$limit" => {
                let n = num::u64_to_usize_saturating(count_arg(name, body)?);
                docs.truncate(n);
                docs
            }
            "$count" => {
                let Bson::String(field) = body else {
                    return Err(DbError::QueryError("$count expects a field name".into()));
                };
                if docs.is_empty() {
                    Vec::new()
                } else {
                    let n = num::u64_to_i64_saturating(num::usize_to_u64(docs.len()));
                    let mut d = Document::new();
                    d.insert(field.clone(), n);
                    vec![d]
                }
            }
            "$unwind" => unwind(docs, body)?,
            "$lookup" => join(docs, body_doc(name, body)?, lookup)?,
            "$facet" => {
                let spec = body_doc(name, body)?;
                let mut out = Document::new();
                for (facet, sub) in spec {
                    let Bson::Array(sub) = sub else {
                        return Err(DbError::QueryError(format!("$facet.{facet} expects an array of stages")));
                    };
                    let sub: Vec<Document> = sub
                        .iter()
                        .map(|s| match s {
                            Bson::Document(d) => Ok(d.clone()),
                            other => Err(DbError::QueryError(format!("invalid stage {other}"))),
                        })
                        .collect::<Result<_, _>>()?;
                    let res = run_pipeline(docs.clone(), &sub, lookup)?;
                    out.insert(facet.clone(), res.into_iter().map(Bson::Document).collect::<Vec<_>>());
                }
                vec![out]
            }
            other => return Err(DbError::UnsupportedStage(other.to_string())),
        };
    }
    Ok(docs)
}

fn body_doc<'a>(stage: &str, body: &'a Bson) -> Result<&'a Document, DbError> {
    match body {
        Bson::Document(d) => Ok(d),
        other => Err(DbError::QueryError(format!("{stage} expects a document, got {other}"))),
    }
}

fn count_arg(stage: &str, body: &Bson) -> Result<u64, DbError> {
    let n = match body {
        Bson::Int32(i) => i64::from(*i),
        Bson::Int64(i) => *i,
        #[allow(clippy::cast_possible_truncation)]
        Bson::Double(f) if f.fract() == 0.0 => *f as i64,
        other => return Err(DbError::QueryError(format!("{stage} expects an integer, got {other}"))),
    };
    if n < 0 {
        return Err(DbError::QueryError(format!("{stage} must be non-negative")));
    }
    Ok(num::i64_to_u64_saturating_nonnegative(n))
}

fn sort_specs(spec: &Document) -> Result<Vec<SortSpec>, DbError> {
    spec.iter()
        .map(|(field, dir)| {
            let order = match as_f64(dir) {
                Some(v) if v > 0.0 => Order::Asc,
                Some(v) if v < 0.0 => Order::Desc,
                _ => return Err(DbError::QueryError(format!("invalid sort direction for {field}"))),
            };
            Ok(SortSpec { field: field.clone(), order })
        })
        .collect()
}

/// Evaluates an aggregation expression: `"$path"` references a field, documents
/// are evaluated per key, `{"$literal": v}` yields `v` unchanged.
fn eval_expr(doc: &Document, expr: &Bson) -> Bson {
    match expr {
        Bson::String(s) if s.starts_with('$') => get_path(doc, &s[1..]).cloned().unwrap_or(Bson::Null),
        Bson::Document(d) => {
            if let Some(lit) = d.get("$literal") {
                return lit.clone();
            }
            let mut out = Document::new();
            for (k, v) in d {
                out.insert(k.clone(), eval_expr(doc, v));
            }
            Bson::Document(out)
        }
        Bson::Array(items) => Bson::Array(items.iter().map(|v| eval_expr(doc, v)).collect()),
        other => other.clone(),
    }
}

fn is_flag(v: &Bson) -> Option<bool> {
    match v {
        Bson::Boolean(b) => Some(*b),
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) => as_f64(v).map(|f| f != 0.0),
        _ => None,
    }
}

fn project(doc: &Document, spec: &Document) -> Result<Document, DbError> {
    let excluding = spec.iter().filter(|(k, _)| k.as_str() != "_id").all(|(_, v)| is_flag(v) == Some(false))
        && spec.iter().any(|(k, _)| k.as_str() != "_id");
    let drop_id = spec.get("_id").and_then(is_flag) == Some(false);

    if excluding {
        let mut out = doc.clone();
        for k in spec.keys() {
            out.remove(k);
        }
        return Ok(out);
    }

    let mut out = Document::new();
    if !drop_id && let Some(id) = doc.get("_id") {
        out.insert("_id", id.clone());
    }
    for (k, v) in spec {
        if k == "_id" && is_flag(v).is_some() {
            continue;
        }
        match is_flag(v) {
            Some(true) => {
                if let Some(val) = get_path(doc, k) {
                    set_path(&mut out, k, val.clone())?;
                }
            }
            Some(false) => {
                return Err(DbError::QueryError(format!("cannot mix inclusion and exclusion of {k}")));
            }
            None => {
                set_path(&mut out, k, eval_expr(doc, v))?;
            }
        }
    }
    Ok(out)
}

enum Acc {
    Sum(Bson),
    Avg { total: f64, n: u64 },
    Min(Option<Bson>),
    Max(Option<Bson>),
    First(Option<Bson>),
    Last(Bson),
    Push(Vec<Bson>),
    AddToSet(Vec<Bson>),
}

impl Acc {
    fn new(op: &str) -> Result<Self, DbError> {
        Ok(match op {
            "$sum" => Self::Sum(Bson::Int32(0)),
            "$avg" => Self::Avg { total: 0.0, n: 0 },
            "$min" => Self::Min(None),
            "$max" => Self::Max(None),
            "$first" => Self::First(None),
            "$last" => Self::Last(Bson::Null),
            "$push" => Self::Push(Vec::new()),
            "$addToSet" => Self::AddToSet(Vec::new()),
            other => return Err(DbError::QueryError(format!("unsupported accumulator {other}"))),
        })
    }

    fn feed(&mut self, v: Bson) {
        let present = !matches!(v, Bson::Null);
        match self {
            Self::Sum(total) => {
                if as_f64(&v).is_some()
                    && let Some(next) = add_numbers(total, &v)
                {
                    *total = next;
                }
            }
            Self::Avg { total, n } => {
                if let Some(f) = as_f64(&v) {
                    *total += f;
                    *n += 1;
                }
            }
            Self::Min(cur) => {
                if present && cur.as_ref().is_none_or(|c| compare_bson(&v, c) == Ordering::Less) {
                    *cur = Some(v);
                }
            }
            Self::Max(cur) => {
                if present && cur.as_ref().is_none_or(|c| compare_bson(&v, c) == Ordering::Greater) {
                    *cur = Some(v);
                }
            }
            Self::First(cur) => {
                if cur.is_none() {
                    *cur = Some(v);
                }
            }
            Self::Last(cur) => *cur = v,
            Self::Push(items) => items.push(v),
            Self::AddToSet(items) => {
                if !items.iter().any(|x| bson_eq(x, &v)) {
                    items.push(v);
                }
            }
        }
    }

    fn finish(self) -> Bson {
        match self {
            Self::Sum(total) => total,
            #[allow(clippy::cast_precision_loss)]
            Self::Avg { total, n } => {
                if n == 0 {
                    Bson::Null
                } else {
                    Bson::Double(total / n as f64)
                }
            }
            Self::Min(v) | Self::Max(v) | Self::First(v) => v.unwrap_or(Bson::Null),
            Self::Last(v) => v,
            Self::Push(items) | Self::AddToSet(items) => Bson::Array(items),
        }
    }
}

fn group(docs: &[Document], spec: &Document) -> Result<Vec<Document>, DbError> {
    let id_expr = spec
        .get("_id")
        .ok_or_else(|| DbError::QueryError("$group requires an _id".into()))?;
    let mut accs: Vec<(&str, &str, &Bson)> = Vec::new();
    for (field, body) in spec {
        if field == "_id" {
            continue;
        }
        let Bson::Document(op_doc) = body else {
            return Err(DbError::QueryError(format!("$group.{field} must be an accumulator document")));
        };
        let Some((op, arg)) = op_doc.iter().next() else {
            return Err(DbError::QueryError(format!("$group.{field} is empty")));
        };
        Acc::new(op)?;
        accs.push((field.as_str(), op.as_str(), arg));
    }

    // Groups keep first-seen order.
    let mut groups: Vec<(Bson, Vec<Acc>)> = Vec::new();
    for d in docs {
        let key = eval_expr(d, id_expr);
        let idx = match groups.iter().position(|(k, _)| bson_eq(k, &key)) {
            Some(i) => i,
            None => {
                let fresh = accs.iter().map(|(_, op, _)| Acc::new(op)).collect::<Result<Vec<_>, _>>()?;
                groups.push((key, fresh));
                groups.len() - 1
            }
        };
        for (acc, (_, _, arg)) in groups[idx].1.iter_mut().zip(&accs) {
            acc.feed(eval_expr(d, arg));
        }
    }

    Ok(groups
        .into_iter()
        .map(|(key, state)| {
            let mut out = Document::new();
            out.insert("_id", key);
            for (acc, (field, _, _)) in state.into_iter().zip(&accs) {
                out.insert(*field, acc.finish());
            }
            out
        })
        .collect())
}

fn unwind(docs: Vec<Document>, body: &Bson) -> Result<Vec<Document>, DbError> {
    let (path, preserve) = match body {
        Bson::String(p) => (p.as_str(), false),
        Bson::Document(d) => {
            let p = d
                .get_str("path")
                .map_err(|_| DbError::QueryError("$unwind requires a path".into()))?;
            (p, d.get_bool("preserveNullAndEmptyArrays").unwrap_or(false))
        }
        other => return Err(DbError::QueryError(format!("$unwind expects a path, got {other}"))),
    };
    let Some(field) = path.strip_prefix('$') else {
        return Err(DbError::QueryError(format!("$unwind path must start with $: {path}")));
    };

    let mut out = Vec::new();
    for d in docs {
        match get_path(&d, field).cloned() {
            Some(Bson::Array(items)) if !items.is_empty() => {
                for item in items {
                    let mut copy = d.clone();
                    set_path(&mut copy, field, item)?;
                    out.push(copy);
                }
            }
            Some(Bson::Array(_) | Bson::Null) | None => {
                if preserve {
                    out.push(d);
                }
            }
            Some(_) => out.push(d),
        }
    }
    Ok(out)
}

fn join(docs: Vec<Document>, spec: &Document, lookup: &Lookup<'_>) -> Result<Vec<Document>, DbError> {
    let field = |k: &str| {
        spec.get_str(k).map_err(|_| DbError::QueryError(format!("$lookup requires {k}")))
    };
    let from = field("from")?;
    let local = field("localField")?;
    let foreign = field("foreignField")?;
    let as_field = field("as")?;

    let foreign_docs = lookup(from);
    let mut out = Vec::with_capacity(docs.len());
    for mut d in docs {
        let key = get_path(&d, local).cloned().unwrap_or(Bson::Null);
        let joined: Vec<Bson> = foreign_docs
            .iter()
            .filter(|f| {
                let fv = get_path(f, foreign).cloned().unwrap_or(Bson::Null);
                match &key {
                    Bson::Array(keys) => keys.iter().any(|k| bson_eq(k, &fv)),
                    k => bson_eq(k, &fv),
                }
            })
            .cloned()
            .map(Bson::Document)
            .collect();
        set_path(&mut d, as_field, Bson::Array(joined))?;
        out.push(d);
    }
    Ok(out)
}
