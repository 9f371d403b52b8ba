//! Free-standing constructors returning owned `Cond` values, for composing
//! sub-expressions: `or([eq("age", 25), eq("age", 30)])`.

use bson::Bson;

use super::cond::{Cond, Logic};
use super::criterion::Criterion;

pub fn eq(field: &str, value: impl Into<Bson>) -> Cond {
    let mut c = Cond::new();
    c.equal(field, value);
    c
}

pub fn ne(field: &str, value: impl Into<Bson>) -> Cond {
    let mut c = Cond::new();
    Cond::ne(&mut c, field, value);
    c
}

pub fn gt(field: &str, value: impl Into<Bson>) -> Cond {
    let mut c = Cond::new();
    c.gt(field, value);
    c
}

pub fn gte(field: &str, value: impl Into<Bson>) -> Cond {
    let mut c = Cond::new();
    c.gte(field, value);
    c
}

pub fn lt(field: &str, value: impl Into<Bson>) -> Cond {
    let mut c = Cond::new();
    c.lt(field, value);
    c
}

pub fn lte(field: &str, value: impl Into<Bson>) -> Cond {
    let mut c = Cond::new();
    c.lte(field, value);
    c
}

pub fn is_in<I, V>(field: &str, values: I) -> Cond
where
    I: IntoIterator<Item = V>,
    V: Into<Bson>,
{
    let mut c = Cond::new();
    c.is_in(field, values);
    c
}

pub fn not_in<I, V>(field: &str, values: I) -> Cond
where
    I: IntoIterator<Item = V>,
    V: Into<Bson>,
{
    let mut c = Cond::new();
    c.not_in(field, values);
    c
}

pub fn between(field: &str, lo: impl Into<Bson>, hi: impl Into<Bson>) -> Cond {
    let mut c = Cond::new();
    c.between(field, lo, hi);
    c
}

pub fn like(field: &str, pattern: &str) -> Cond {
    let mut c = Cond::new();
    c.like(field, pattern);
    c
}

/// One `$or` clause over the given alternatives.
pub fn or<I, C>(branches: I) -> Cond
where
    I: IntoIterator<Item = C>,
    C: Into<Criterion>,
{
    logical(Logic::Or, branches)
}

/// One `$and` clause over the given branches.
pub fn and<I, C>(branches: I) -> Cond
where
    I: IntoIterator<Item = C>,
    C: Into<Criterion>,
{
    logical(Logic::And, branches)
}

/// One `$nor` clause: matches documents that satisfy none of the branches.
pub fn nor<I, C>(branches: I) -> Cond
where
    I: IntoIterator<Item = C>,
    C: Into<Criterion>,
{
    logical(Logic::Nor, branches)
}

fn logical<I, C>(op: Logic, branches: I) -> Cond
where
    I: IntoIterator<Item = C>,
    C: Into<Criterion>,
{
    let mut c = Cond::new();
    c.push_logical(op, branches.into_iter().map(Cond::from_criterion).collect());
    c
}
