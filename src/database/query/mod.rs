//! Query building and convenience helpers
//!
//! - `builder`: the `SqlBuilder` seam and the default `StandardBuilder`
//! - `helpers`: select/insert/update/delete/aggregate operations on `Connection`

mod builder;
mod helpers;

pub use builder::{Aggregate, Order, Query, Record, SqlBuilder, StandardBuilder, Statement};
pub use helpers::{Fetched, RowStream};
