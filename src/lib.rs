//! Fluent query building over a document database.
//!
//! ```
//! use scoop::{Client, DbError};
//!
//! # fn main() -> Result<(), DbError> {
//! let client = Client::memory();
//! let people = client.collection("people");
//! people.create_many(&[
//!     bson::doc! {"name": "Ann", "age": 25},
//!     bson::doc! {"name": "Bob", "age": 30},
//! ])?;
//!
//! let mut q = client.collection("people");
//! q.filter(("age>", 25));
//! assert_eq!(q.count()?, 1);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod driver;
pub mod errors;
pub mod fault;
pub mod query;
pub mod scoop;
pub mod utils;

#[cfg(test)]
mod test_support;

pub use client::{Client, Model};
pub use config::ClientOptions;
pub use driver::memory::MemoryDriver;
pub use driver::{ChangeEvent, Context, Cursor, Driver, OperationType, WatchOptions};
pub use errors::DbError;
pub use query::{Cond, Criterion, Order, Pipeline};
pub use scoop::{Aggregation, Scoop, Transaction, TxState};

/// Sets up logging from the `SCOOP_LOG_*` environment variables.
///
/// Call once at startup; later calls keep the logger already installed.
pub fn init() {
    utils::logger::configure_from_env();
}
