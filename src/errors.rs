use thiserror::Error;

use crate::scoop::TxState;

/// Every failure surfaced by the builder, the client and the bundled drivers.
///
/// The type is `Clone` so a failure-injection seam can hand the same configured
/// error to any number of callers.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DbError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("BSON: {0}")]
    Bson(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("no collection bound to query builder")]
    NoCollection,

    #[error("no active transaction")]
    NoActiveTransaction,

    #[error("transaction already closed ({0})")]
    TransactionClosed(TxState),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Driver error: {0}")]
    Driver(String),

    #[error("unsupported pipeline stage: {0}")]
    UnsupportedStage(String),

    #[error("Query error: {0}")]
    QueryError(String),

    #[error("timeout")]
    Timeout,

    #[error("client closed")]
    Closed,

    #[error("health check failed: {source}")]
    Health {
        #[source]
        source: Box<DbError>,
    },

    #[error("injected failure: {0}")]
    Injected(String),
}

impl From<std::io::Error> for DbError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl From<bson::error::Error> for DbError {
    fn from(e: bson::error::Error) -> Self {
        Self::Bson(e.to_string())
    }
}

impl From<toml::de::Error> for DbError {
    fn from(e: toml::de::Error) -> Self {
        Self::Config(e.to_string())
    }
}
