use bson::{Bson, Document};
use std::time::Duration;

use super::Scoop;
use crate::driver::{ChangeEvent, Context, WatchOptions};
use crate::errors::DbError;
use crate::fault::FaultOp;

const FULL_DOCUMENT: &str = "fullDocument";

/// Rewrites a filter so its field paths address the event's `fullDocument`.
fn prefix_paths(filter: &Document) -> Document {
    let mut out = Document::new();
    for (k, v) in filter {
        match (k.as_str(), v) {
            ("$and" | "$or" | "$nor", Bson::Array(items)) => {
                let items = items
                    .iter()
                    .map(|b| match b {
                        Bson::Document(d) => Bson::Document(prefix_paths(d)),
                        other => other.clone(),
                    })
                    .collect::<Vec<_>>();
                out.insert(k.clone(), items);
            }
            _ => {
                out.insert(format!("{FULL_DOCUMENT}.{k}"), v.clone());
            }
        }
    }
    out
}

impl Scoop {
    /// Change-stream pipeline for this builder: its filter as a `$match` over
    /// `fullDocument`, or nothing when unconstrained.
    #[must_use]
    pub fn watch_pipeline(&self) -> Vec<Document> {
        self.cond
            .to_filter_document()
            .map(|f| vec![bson::doc! {"$match": prefix_paths(&f)}])
            .unwrap_or_default()
    }

    /// Delivers change events on the bound collection to `handler` until `ctx`
    /// is cancelled or expires (`Ok`), the handler fails (its error), or the
    /// stream fails (the stream error). The stream is always closed.
    ///
    /// A builder filter implies `full_document`, and so never matches deletes.
    ///
    /// # Errors
    /// Injected `Watch` failure, `NoCollection`, the stream-open error, the
    /// handler's error or a stream error.
    pub fn watch<F>(&self, ctx: &Context, opts: WatchOptions, mut handler: F) -> Result<(), DbError>
    where
        F: FnMut(ChangeEvent) -> Result<(), DbError>,
    {
        self.client.guard(FaultOp::Watch)?;
        let coll = self.collection.as_deref().ok_or(DbError::NoCollection)?;
        let pipeline = self.watch_pipeline();
        let mut opts = opts;
        if !pipeline.is_empty() {
            opts.full_document = true;
        }
        let poll = opts.poll_interval_ms.map_or_else(|| self.client.options().poll_interval(), Duration::from_millis);

        let mut stream = self.client.driver().watch(coll, &pipeline, &opts)?;
        log::debug!("watching {coll} (poll {}ms)", poll.as_millis());
        let mut delivered = 0u64;
        let result = loop {
            if ctx.is_done() {
                break Ok(());
            }
            match stream.next_event(ctx.remaining(poll)) {
                Ok(Some(ev)) => {
                    delivered += 1;
                    if let Err(e) = handler(ev) {
                        log::warn!("watch handler on {coll} failed: {e}");
                        break Err(e);
                    }
                }
                Ok(None) => {}
                Err(e) => break Err(e),
            }
        };
        stream.close();
        log::debug!("stopped watching {coll} after {delivered} events");
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn prefixes_fields_and_logical_branches() {
        let f = doc! {"age": {"$gt": 1}, "$or": [{"a": 1}, {"b": 2}]};
        assert_eq!(
            prefix_paths(&f),
            doc! {"fullDocument.age": {"$gt": 1}, "$or": [{"fullDocument.a": 1}, {"fullDocument.b": 2}]}
        );
    }

    #[test]
    fn unconstrained_builder_has_empty_pipeline() {
        let s = crate::client::Client::memory().collection("c");
        assert!(s.watch_pipeline().is_empty());
    }
}
