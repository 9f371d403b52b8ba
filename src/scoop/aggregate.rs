use bson::Document;
use serde::de::DeserializeOwned;

use super::Scoop;
use crate::errors::DbError;
use crate::query::Pipeline;

/// A pipeline bound to a builder, ready to run.
///
/// When the builder carries a filter it runs first, as a leading `$match`.
#[derive(Debug)]
pub struct Aggregation<'a> {
    scoop: &'a Scoop,
    stages: Vec<Document>,
}

impl Aggregation<'_> {
    /// Stages exactly as sent to the driver.
    #[must_use]
    pub fn stages(&self) -> &[Document] {
        &self.stages
    }

    /// Every result decoded as `T`; an empty result is `Ok(vec![])`.
    ///
    /// # Errors
    /// Injected `Find` failure, driver or stage error, or the first decode failure.
    pub fn execute<T: DeserializeOwned>(&self) -> Result<Vec<T>, DbError> {
        self.scoop.run_pipeline(&self.stages)?.decode_all()
    }

    /// The first result; `Ok(None)` when the pipeline yields nothing.
    ///
    /// # Errors
    /// As [`execute`](Self::execute).
    pub fn execute_one<T: DeserializeOwned>(&self) -> Result<Option<T>, DbError> {
        self.scoop.run_pipeline(&self.stages)?.decode_one()
    }
}

impl Scoop {
    #[must_use]
    pub fn aggregation(&self, pipeline: &Pipeline) -> Aggregation<'_> {
        let mut stages = Vec::with_capacity(pipeline.len() + 1);
        if let Some(filter) = self.cond.to_filter_document() {
            stages.push(bson::doc! {"$match": filter});
        }
        stages.extend(pipeline.to_documents());
        Aggregation { scoop: self, stages }
    }

    /// Shorthand for `aggregation(pipeline).execute()`.
    ///
    /// # Errors
    /// As [`Aggregation::execute`].
    pub fn aggregate<T: DeserializeOwned>(&self, pipeline: &Pipeline) -> Result<Vec<T>, DbError> {
        self.aggregation(pipeline).execute()
    }
}

#[cfg(test)]
mod tests {
    use crate::client::Client;
    use crate::errors::DbError;
    use crate::query::{Order, Pipeline};
    use bson::{Document, doc};
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct CityCount {
        #[serde(rename = "_id")]
        city: String,
        n: i32,
    }

    fn seeded() -> Client {
        let c = Client::memory();
        c.collection("people")
            .create_many(&[
                doc! {"name": "Ann", "city": "Oslo", "age": 30},
                doc! {"name": "Bob", "city": "Rome", "age": 25},
                doc! {"name": "Cid", "city": "Oslo", "age": 35},
            ])
            .unwrap();
        c
    }

    #[test]
    fn builder_filter_becomes_leading_match() {
        let c = seeded();
        let mut s = c.collection("people");
        s.gte("age", 30);
        let mut p = Pipeline::new();
        p.group("$city", doc! {"n": {"$sum": 1}});
        let agg = s.aggregation(&p);
        assert_eq!(agg.stages()[0], doc! {"$match": {"age": {"$gte": 30}}});
        let rows: Vec<CityCount> = agg.execute().unwrap();
        assert_eq!(rows, vec![CityCount { city: "Oslo".into(), n: 2 }]);
    }

    #[test]
    fn empty_result_is_ok() {
        let c = seeded();
        let mut p = Pipeline::new();
        p.match_(("age>", 100)).sort(&[("age", Order::Asc)]);
        let s = c.collection("people");
        assert_eq!(s.aggregate::<Document>(&p).unwrap(), Vec::<Document>::new());
        assert_eq!(s.aggregation(&p).execute_one::<Document>().unwrap(), None);
    }

    #[test]
    fn unknown_stage_is_reported() {
        let c = seeded();
        let mut p = Pipeline::new();
        p.add_stage(doc! {"$graphLookup": {}});
        let err = c.collection("people").aggregate::<Document>(&p).unwrap_err();
        assert_eq!(err, DbError::UnsupportedStage("$graphLookup".into()));
    }
}
