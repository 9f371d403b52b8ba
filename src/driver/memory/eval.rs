use bson::{Bson, Document};
use std::cmp::Ordering;

use crate::errors::DbError;
use crate::query::SortSpec;

/// Evaluates a wire-format filter document against `doc`.
///
/// # Errors
/// Returns `QueryError` for unsupported operators, malformed operands or an
/// invalid `$regex` pattern.
pub fn matches(doc: &Document, filter: &Document) -> Result<bool, DbError> {
    for (key, cond) in filter {
        let ok = match key.as_str() {
            "$and" => {
                let mut all = true;
                for f in sub_filters(key, cond)? {
                    if !matches(doc, f)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            "$or" => {
                let mut any = false;
                for f in sub_filters(key, cond)? {
                    if matches(doc, f)? {
                        any = true;
                        break;
                    }
                }
                any
            }
            "$nor" => {
                let mut none = true;
                for f in sub_filters(key, cond)? {
                    if matches(doc, f)? {
                        none = false;
                        break;
                    }
                }
                none
            }
            k if k.starts_with('$') => {
                return Err(DbError::QueryError(format!("unsupported top-level operator {k}")));
            }
            path => match_field(get_path(doc, path), cond)?,
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn sub_filters<'a>(key: &str, cond: &'a Bson) -> Result<Vec<&'a Document>, DbError> {
    let Bson::Array(items) = cond else {
        return Err(DbError::QueryError(format!("{key} expects an array")));
    };
    items
        .iter()
        .map(|b| match b {
            Bson::Document(d) => Ok(d),
            other => Err(DbError::QueryError(format!("{key} entries must be documents, got {other}"))),
        })
        .collect()
}

pub(crate) fn is_operator_doc(d: &Document) -> bool {
    !d.is_empty() && d.keys().all(|k| k.starts_with('$'))
}

fn match_field(value: Option<&Bson>, cond: &Bson) -> Result<bool, DbError> {
    match cond {
        Bson::Document(ops) if is_operator_doc(ops) => match_ops(value, ops),
        expected => Ok(value_eq(value, expected)),
    }
}

fn match_ops(value: Option<&Bson>, ops: &Document) -> Result<bool, DbError> {
    for (op, arg) in ops {
        let ok = match op.as_str() {
            "$eq" => value_eq(value, arg),
            "$ne" => !value_eq(value, arg),
            "$gt" => cmp_matches(value, arg, |o| o == Ordering::Greater),
            "$gte" => cmp_matches(value, arg, |o| o != Ordering::Less),
            "$lt" => cmp_matches(value, arg, |o| o == Ordering::Less),
            "$lte" => cmp_matches(value, arg, |o| o != Ordering::Greater),
            "$in" => in_set(value, op, arg)?,
            "$nin" => !in_set(value, op, arg)?,
            "$exists" => value.is_some() == truthy(arg),
            "$regex" => {
                let options = ops.get_str("$options").unwrap_or("");
                regex_matches(value, arg, options)?
            }
            "$options" => true,
            "$not" => match arg {
                Bson::Document(inner) if is_operator_doc(inner) => !match_ops(value, inner)?,
                other => {
                    return Err(DbError::QueryError(format!("$not expects an operator document, got {other}")));
                }
            },
            other => return Err(DbError::QueryError(format!("unsupported operator {other}"))),
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn truthy(v: &Bson) -> bool {
    match v {
        Bson::Boolean(b) => *b,
        Bson::Null | Bson::Undefined => false,
        Bson::Int32(i) => *i != 0,
        Bson::Int64(i) => *i != 0,
        Bson::Double(f) => *f != 0.0,
        _ => true,
    }
}

/// Equality with numeric cross-type comparison; array fields match when any
/// element is equal. A missing field equals `null`.
fn value_eq(value: Option<&Bson>, expected: &Bson) -> bool {
    match value {
        None => matches!(expected, Bson::Null),
        Some(Bson::Array(items)) if !matches!(expected, Bson::Array(_)) => {
            items.iter().any(|v| bson_eq(v, expected))
        }
        Some(v) => bson_eq(v, expected),
    }
}

pub(crate) fn bson_eq(a: &Bson, b: &Bson) -> bool {
    match (as_num(a), as_num(b)) {
        (Some(Num::Float(x)), Some(Num::Float(y))) => x == y,
        (Some(x), Some(y)) => compare_nums(x, y) == Ordering::Equal,
        _ => a == b,
    }
}

fn in_set(value: Option<&Bson>, op: &str, arg: &Bson) -> Result<bool, DbError> {
    let Bson::Array(set) = arg else {
        return Err(DbError::QueryError(format!("{op} expects an array")));
    };
    Ok(set.iter().any(|x| value_eq(value, x)))
}

fn cmp_matches(value: Option<&Bson>, arg: &Bson, pred: impl Fn(Ordering) -> bool) -> bool {
    let Some(v) = value else { return false };
    let check = |x: &Bson| comparable(x, arg) && pred(compare_bson(x, arg));
    match v {
        Bson::Array(items) if !matches!(arg, Bson::Array(_)) => items.iter().any(check),
        other => check(other),
    }
}

/// Range operators only compare values of the same kind (numbers with numbers,
/// strings with strings, ...).
fn comparable(a: &Bson, b: &Bson) -> bool {
    if as_num(a).is_some() && as_num(b).is_some() {
        return true;
    }
    std::mem::discriminant(a) == std::mem::discriminant(b)
}

fn regex_matches(value: Option<&Bson>, pattern: &Bson, options: &str) -> Result<bool, DbError> {
    let Bson::String(p) = pattern else {
        return Err(DbError::QueryError("$regex expects a string pattern".into()));
    };
    let re = regex::RegexBuilder::new(p)
        .case_insensitive(options.contains('i'))
        .multi_line(options.contains('m'))
        .dot_matches_new_line(options.contains('s'))
        .build()
        .map_err(|e| DbError::QueryError(format!("invalid $regex: {e}")))?;
    Ok(match value {
        Some(Bson::String(s)) => re.is_match(s),
        Some(Bson::Array(items)) => {
            items.iter().any(|v| matches!(v, Bson::String(s) if re.is_match(s)))
        }
        _ => false,
    })
}

pub(crate) fn get_path<'a>(doc: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut parts = path.split('.');
    let first = parts.next()?;
    let mut cur = doc.get(first)?;
    for part in parts {
        match cur {
            Bson::Document(d) => cur = d.get(part)?,
            _ => return None,
        }
    }
    Some(cur)
}

pub(crate) fn compare_docs(a: &Document, b: &Document, sort: &[SortSpec]) -> Ordering {
    for s in sort {
        let ord = match (get_path(a, &s.field), get_path(b, &s.field)) {
            (Some(x), Some(y)) => compare_bson(x, y),
            (Some(_), None) => Ordering::Greater,
            (None, Some(_)) => Ordering::Less,
            (None, None) => Ordering::Equal,
        };
        if ord != Ordering::Equal {
            return if matches!(s.order, crate::query::Order::Asc) { ord } else { ord.reverse() };
        }
    }
    Ordering::Equal
}

#[derive(Debug, Clone, Copy)]
enum Num {
    Int(i64),
    Float(f64),
}

fn as_num(x: &Bson) -> Option<Num> {
    match x {
        Bson::Int32(i) => Some(Num::Int(i64::from(*i))),
        Bson::Int64(i) => Some(Num::Int(*i)),
        Bson::Double(f) => Some(Num::Float(*f)),
        _ => None,
    }
}

/// 2^63, the first double past `i64::MAX`.
const TWO_POW_63: f64 = 9_223_372_036_854_775_808.0;

/// Exact ordering of an integer against a double; NaN sorts after every number.
#[allow(clippy::cast_possible_truncation)]
fn compare_int_float(i: i64, f: f64) -> Ordering {
    if f.is_nan() || f >= TWO_POW_63 {
        return Ordering::Less;
    }
    if f < -TWO_POW_63 {
        return Ordering::Greater;
    }
    let whole = f.trunc();
    match i.cmp(&(whole as i64)) {
        Ordering::Equal => 0.0_f64.total_cmp(&(f - whole)),
        ord => ord,
    }
}

fn compare_nums(a: Num, b: Num) -> Ordering {
    match (a, b) {
        (Num::Int(x), Num::Int(y)) => x.cmp(&y),
        (Num::Float(x), Num::Float(y)) => x.total_cmp(&y),
        (Num::Int(x), Num::Float(y)) => compare_int_float(x, y),
        (Num::Float(x), Num::Int(y)) => compare_int_float(y, x).reverse(),
    }
}

pub(crate) fn compare_bson(a: &Bson, b: &Bson) -> Ordering {
    if let (Some(x), Some(y)) = (as_num(a), as_num(b)) {
        return compare_nums(x, y);
    }
    match (a, b) {
        (Bson::String(x), Bson::String(y)) => x.cmp(y),
        (Bson::Boolean(x), Bson::Boolean(y)) => x.cmp(y),
        (Bson::DateTime(x), Bson::DateTime(y)) => x.cmp(y),
        (Bson::ObjectId(x), Bson::ObjectId(y)) => x.bytes().cmp(&y.bytes()),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

fn type_rank(v: &Bson) -> u8 {
    match v {
        Bson::MinKey => 0,
        Bson::Null | Bson::Undefined => 1,
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_) => 2,
        Bson::String(_) | Bson::Symbol(_) => 3,
        Bson::Document(_) => 4,
        Bson::Array(_) => 5,
        Bson::Binary(_) => 6,
        Bson::ObjectId(_) => 7,
        Bson::Boolean(_) => 8,
        Bson::DateTime(_) => 9,
        Bson::Timestamp(_) => 10,
        Bson::RegularExpression(_) => 11,
        Bson::MaxKey => 255,
        _ => 12,
    }
}

/// Keeps only `fields` (plus `_id`), top-level names only.
pub(crate) fn project_fields(doc: &Document, fields: &[String]) -> Document {
    let mut out = Document::new();
    if let Some(id) = doc.get("_id") {
        out.insert("_id", id.clone());
    }
    for f in fields {
        if let Some(v) = doc.get(f) {
            out.insert(f.clone(), v.clone());
        }
    }
    out
}
