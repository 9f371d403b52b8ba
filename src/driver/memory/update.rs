use bson::{Bson, Document};

use super::eval::get_path;
use crate::errors::DbError;

/// Applies `$set`, `$inc` and `$unset` to `doc`. A document with no `$` keys
/// is treated as a `$set` of all its fields. Returns whether anything changed.
///
/// # Errors
/// Returns `QueryError` for other update operators, non-document operands or a
/// `$inc` on a non-numeric field.
pub fn apply_update(doc: &mut Document, update: &Document) -> Result<bool, DbError> {
    if !update.keys().any(|k| k.starts_with('$')) {
        let mut changed = false;
        for (k, v) in update {
            if k != "_id" {
                changed |= set_path(doc, k, v.clone())?;
            }
        }
        return Ok(changed);
    }

    let mut changed = false;
    for (op, arg) in update {
        let Bson::Document(fields) = arg else {
            return Err(DbError::QueryError(format!("{op} expects a document")));
        };
        match op.as_str() {
            "$set" => {
                for (k, v) in fields {
                    changed |= set_path(doc, k, v.clone())?;
                }
            }
            "$inc" => {
                for (k, by) in fields {
                    changed |= inc_path(doc, k, by)?;
                }
            }
            "$unset" => {
                for k in fields.keys() {
                    changed |= unset_path(doc, k);
                }
            }
            other => return Err(DbError::QueryError(format!("unsupported update operator {other}"))),
        }
    }
    Ok(changed)
}

fn parent_mut<'a>(root: &'a mut Document, path: &'a str, create: bool) -> Option<(&'a mut Document, &'a str)> {
    let (head, last) = match path.rsplit_once('.') {
        Some((h, l)) => (Some(h), l),
        None => (None, path),
    };
    let mut cur = root;
    if let Some(head) = head {
        for seg in head.split('.') {
            if create && !matches!(cur.get(seg), Some(Bson::Document(_))) {
                cur.insert(seg, Document::new());
            }
            cur = match cur.get_mut(seg) {
                Some(Bson::Document(d)) => d,
                _ => return None,
            };
        }
    }
    Some((cur, last))
}

pub(crate) fn set_path(root: &mut Document, path: &str, value: Bson) -> Result<bool, DbError> {
    let (parent, last) = parent_mut(root, path, true)
        .ok_or_else(|| DbError::QueryError(format!("cannot set path {path}")))?;
    let old = parent.insert(last, value.clone());
    Ok(old.as_ref() != Some(&value))
}

fn unset_path(root: &mut Document, path: &str) -> bool {
    match parent_mut(root, path, false) {
        Some((parent, last)) => parent.remove(last).is_some(),
        None => false,
    }
}

fn inc_path(root: &mut Document, path: &str, by: &Bson) -> Result<bool, DbError> {
    let cur = get_path(root, path).cloned().unwrap_or(Bson::Int32(0));
    let next = add_numbers(&cur, by)
        .ok_or_else(|| DbError::QueryError(format!("cannot $inc {path}: {cur} + {by}")))?;
    set_path(root, path, next)
}

/// Integer widths are preserved when both sides are integers; an overflowing
/// `Int32` sum widens to `Int64`.
pub(crate) fn add_numbers(a: &Bson, b: &Bson) -> Option<Bson> {
    Some(match (a, b) {
        (Bson::Int32(x), Bson::Int32(y)) => {
            x.checked_add(*y).map_or_else(|| Bson::Int64(i64::from(*x) + i64::from(*y)), Bson::Int32)
        }
        (Bson::Int32(x), Bson::Int64(y)) | (Bson::Int64(y), Bson::Int32(x)) => {
            Bson::Int64(y.checked_add(i64::from(*x))?)
        }
        (Bson::Int64(x), Bson::Int64(y)) => Bson::Int64(x.checked_add(*y)?),
        _ => Bson::Double(as_f64(a)? + as_f64(b)?),
    })
}

#[allow(clippy::cast_precision_loss)]
pub(crate) fn as_f64(v: &Bson) -> Option<f64> {
    match v {
        Bson::Double(f) => Some(*f),
        Bson::Int32(i) => Some(f64::from(*i)),
        Bson::Int64(i) => Some(*i as f64),
        _ => None,
    }
}
