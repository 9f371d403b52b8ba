use bson::{Bson, Document};

use super::cond::Cond;

/// Every input shape `Cond::filter` accepts.
///
/// Callers rarely name the variants; the `From` impls let `filter` take
/// `true`, `("age>", 18)`, `("age", ">", 18)`, a `bson::Document`, a `Cond`
/// or a `Vec` of any of those.
#[derive(Debug, Clone, PartialEq)]
pub enum Criterion {
    /// No constraint.
    Empty,
    /// `true` is a no-op, `false` makes the whole node compile to `None`.
    Flag(bool),
    /// Field token with an optional operator suffix (`"age>="`).
    Pair { field: String, value: Bson },
    /// Field with an explicit operator token that overrides suffix inference.
    OpPair { field: String, op: String, value: Bson },
    /// Each entry is an equality clause; operator sub-documents and `$`-keys merge as is.
    Map(Document),
    /// Processed in order, each element on its own.
    List(Vec<Criterion>),
    /// A whole condition node, merged as an AND.
    Sub(Box<Cond>),
    /// A field name with no value. Ignored: it carries no constraint.
    Bare(String),
    /// A scalar that is not a recognizable shape. Ignored with a warning.
    Unrecognized(Bson),
}

impl Criterion {
    /// Normalizes loosely-typed input. Inside arrays a string takes the element
    /// that follows it as its value, so `["age>", 18, "name", "bo"]` yields two
    /// pairs; a trailing string with nothing after it is a `Bare` field.
    #[must_use]
    pub fn from_bson(value: Bson) -> Self {
        match value {
            Bson::Null | Bson::Undefined => Self::Empty,
            Bson::Boolean(b) => Self::Flag(b),
            Bson::Document(d) => Self::Map(d),
            Bson::String(s) => Self::Bare(s),
            Bson::Array(items) => Self::List(Self::pairwise(items)),
            other => Self::Unrecognized(other),
        }
    }

    fn pairwise(items: Vec<Bson>) -> Vec<Self> {
        let mut out = Vec::with_capacity(items.len());
        let mut iter = items.into_iter();
        while let Some(item) = iter.next() {
            match item {
                Bson::String(field) => match iter.next() {
                    Some(value) => out.push(Self::Pair { field, value }),
                    None => out.push(Self::Bare(field)),
                },
                other => out.push(Self::from_bson(other)),
            }
        }
        out
    }
}

impl From<bool> for Criterion {
    fn from(b: bool) -> Self {
        Self::Flag(b)
    }
}

impl From<()> for Criterion {
    fn from((): ()) -> Self {
        Self::Empty
    }
}

impl From<Document> for Criterion {
    fn from(d: Document) -> Self {
        Self::Map(d)
    }
}

impl From<Cond> for Criterion {
    fn from(c: Cond) -> Self {
        Self::Sub(Box::new(c))
    }
}

impl From<&Cond> for Criterion {
    fn from(c: &Cond) -> Self {
        Self::Sub(Box::new(c.clone()))
    }
}

impl<V: Into<Bson>> From<(&str, V)> for Criterion {
    fn from((field, value): (&str, V)) -> Self {
        Self::Pair { field: field.to_string(), value: value.into() }
    }
}

impl<V: Into<Bson>> From<(String, V)> for Criterion {
    fn from((field, value): (String, V)) -> Self {
        Self::Pair { field, value: value.into() }
    }
}

impl<V: Into<Bson>> From<(&str, &str, V)> for Criterion {
    fn from((field, op, value): (&str, &str, V)) -> Self {
        Self::OpPair { field: field.to_string(), op: op.to_string(), value: value.into() }
    }
}

impl<T: Into<Criterion>> From<Vec<T>> for Criterion {
    fn from(items: Vec<T>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }
}
