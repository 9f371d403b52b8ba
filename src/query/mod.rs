// Submodules for separation of concerns
mod cond;
mod criterion;
pub mod helpers;
mod operator;
mod pipeline;
mod types;

// Public API re-exports
pub use cond::{Cond, Logic};
pub use criterion::Criterion;
pub use helpers::{and, between, eq, gt, gte, is_in, like, lt, lte, ne, nor, not_in, or};
pub use operator::{CmpOp, parse_operator};
pub use pipeline::Pipeline;
pub use types::{
    DeleteReport, FindOptions, InsertReport, Order, SortSpec, UpdateReport,
};
