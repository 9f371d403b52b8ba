use bson::{Bson, Document, doc};

use super::cond::Cond;
use super::criterion::Criterion;
use super::types::Order;

/// Ordered, append-only list of aggregation stages.
///
/// Every stage method appends one stage document and returns the same builder.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pipeline {
    stages: Vec<Document>,
}

impl Pipeline {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// `$match` over a compiled condition. An unconstrained condition adds
    /// `{"$match": {}}` so the stage count stays predictable.
    pub fn match_(&mut self, c: impl Into<Criterion>) -> &mut Self {
        let filter = Cond::from_criterion(c).to_document_or_empty();
        self.add_stage(doc! {"$match": filter})
    }

    pub fn project(&mut self, spec: Document) -> &mut Self {
        self.add_stage(doc! {"$project": spec})
    }

    /// `$group` with the given `_id` expression and accumulator fields.
    pub fn group(&mut self, id: impl Into<Bson>, accumulators: Document) -> &mut Self {
        let mut spec = Document::new();
        spec.insert("_id", id.into());
        for (k, v) in accumulators {
            spec.insert(k, v);
        }
        self.add_stage(doc! {"$group": spec})
    }

    pub fn sort(&mut self, fields: &[(&str, Order)]) -> &mut Self {
        let mut spec = Document::new();
        for (field, order) in fields {
            spec.insert(*field, order.as_i32());
        }
        self.add_stage(doc! {"$sort": spec})
    }

    pub fn skip(&mut self, n: u64) -> &mut Self {
        self.add_stage(doc! {"$skip": crate::utils::num::u64_to_i64_saturating(n)})
    }

    pub fn limit(&mut self, n: u64) -> &mut Self {
        self.add_stage(doc! {"$limit": crate::utils::num::u64_to_i64_saturating(n)})
    }

    pub fn lookup(
        &mut self,
        from: &str,
        local_field: &str,
        foreign_field: &str,
        as_field: &str,
    ) -> &mut Self {
        self.add_stage(doc! {
            "$lookup": {
                "from": from,
                "localField": local_field,
                "foreignField": foreign_field,
                "as": as_field
            }
        })
    }

    /// `$unwind` on `path` (with or without the leading `$`). The
    /// `preserveNullAndEmptyArrays` flag is only written when `preserve_empty` is
    /// `Some`, leaving the server default in place otherwise.
    pub fn unwind(&mut self, path: &str, preserve_empty: Option<bool>) -> &mut Self {
        let path = if path.starts_with('$') { path.to_string() } else { format!("${path}") };
        let stage = match preserve_empty {
            Some(p) => doc! {"$unwind": {"path": path, "preserveNullAndEmptyArrays": p}},
            None => doc! {"$unwind": {"path": path}},
        };
        self.add_stage(stage)
    }

    pub fn add_fields(&mut self, fields: Document) -> &mut Self {
        self.add_stage(doc! {"$addFields": fields})
    }

    /// `$count` writing the number of incoming documents to `field`.
    pub fn count(&mut self, field: &str) -> &mut Self {
        self.add_stage(doc! {"$count": field})
    }

    pub fn facet(&mut self, facets: &[(&str, &Pipeline)]) -> &mut Self {
        let mut spec = Document::new();
        for (name, sub) in facets {
            spec.insert(*name, sub.to_bson_array());
        }
        self.add_stage(doc! {"$facet": spec})
    }

    /// Appends an arbitrary stage document as is.
    pub fn add_stage(&mut self, stage: Document) -> &mut Self {
        self.stages.push(stage);
        self
    }

    pub fn clear(&mut self) -> &mut Self {
        self.stages.clear();
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    #[must_use]
    pub fn stages(&self) -> &[Document] {
        &self.stages
    }

    #[must_use]
    pub fn to_documents(&self) -> Vec<Document> {
        self.stages.clone()
    }

    fn to_bson_array(&self) -> Bson {
        Bson::Array(self.stages.iter().cloned().map(Bson::Document).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::helpers::gt;

    #[test]
    fn stages_append_in_order() {
        let mut p = Pipeline::new();
        p.match_(gt("age", 20))
            .group("$city", doc! {"total": {"$sum": 1}})
            .sort(&[("total", Order::Desc)])
            .skip(1)
            .limit(5);
        let stages = p.to_documents();
        assert_eq!(stages.len(), 5);
        assert_eq!(stages[0], doc! {"$match": {"age": {"$gt": 20}}});
        assert_eq!(stages[1], doc! {"$group": {"_id": "$city", "total": {"$sum": 1}}});
        assert_eq!(stages[2], doc! {"$sort": {"total": -1}});
        assert_eq!(stages[3], doc! {"$skip": 1_i64});
        assert_eq!(stages[4], doc! {"$limit": 5_i64});
    }

    #[test]
    fn unwind_flag_only_when_given() {
        let mut p = Pipeline::new();
        p.unwind("tags", None).unwind("$items", Some(true));
        assert_eq!(p.stages()[0], doc! {"$unwind": {"path": "$tags"}});
        assert_eq!(
            p.stages()[1],
            doc! {"$unwind": {"path": "$items", "preserveNullAndEmptyArrays": true}}
        );
    }

    #[test]
    fn facet_embeds_sub_pipelines() {
        let mut young = Pipeline::new();
        young.match_(("age<", 30)).count("n");
        let mut p = Pipeline::new();
        p.facet(&[("young", &young)]);
        assert_eq!(
            p.stages()[0],
            doc! {"$facet": {"young": [{"$match": {"age": {"$lt": 30}}}, {"$count": "n"}]}}
        );
    }

    #[test]
    fn clear_empties_in_place() {
        let mut p = Pipeline::new();
        p.count("n").add_stage(doc! {"$sample": {"size": 3}});
        assert_eq!(p.len(), 2);
        p.clear();
        assert!(p.is_empty());
    }

    #[test]
    fn unconstrained_match_is_empty_document() {
        let mut p = Pipeline::new();
        p.match_(true);
        assert_eq!(p.stages()[0], doc! {"$match": {}});
    }
}
