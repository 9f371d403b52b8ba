use bson::{Bson, Document};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Order {
    Asc,
    Desc,
}

impl Order {
    #[must_use]
    pub fn as_i32(self) -> i32 {
        match self {
            Self::Asc => 1,
            Self::Desc => -1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: String,
    pub order: Order,
}

/// Compiled options handed to `Driver::find`.
///
/// Semantics:
/// - `sort` is applied before `skip`/`limit`, projection last.
/// - An empty `projection` returns whole documents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FindOptions {
    pub sort: Vec<SortSpec>,
    pub projection: Vec<String>,
    pub limit: Option<u64>,
    pub skip: Option<u64>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl FindOptions {
    /// Sort spec in wire form: `{field: 1 | -1, ...}`, or `None` when unsorted.
    #[must_use]
    pub fn sort_document(&self) -> Option<Document> {
        if self.sort.is_empty() {
            return None;
        }
        let mut d = Document::new();
        for s in &self.sort {
            d.insert(s.field.clone(), Bson::Int32(s.order.as_i32()));
        }
        Some(d)
    }

    /// Projection in wire form: `{field: 1, ...}`, or `None` for all fields.
    #[must_use]
    pub fn projection_document(&self) -> Option<Document> {
        if self.projection.is_empty() {
            return None;
        }
        let mut d = Document::new();
        for f in &self.projection {
            d.insert(f.clone(), Bson::Int32(1));
        }
        Some(d)
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UpdateReport {
    pub matched: u64,
    pub modified: u64,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DeleteReport {
    pub deleted: u64,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct InsertReport {
    pub inserted_ids: Vec<Bson>,
}
