//! Host-side query building.
//!
//! - [`lookups`] - `Q` objects and field lookups
//! - [`compiler`] - compilation of `Q` trees into Mongo-style filter documents

pub mod compiler;
pub mod lookups;

pub use compiler::{compile_filter, FilterCompiler};
pub use lookups::{Lookup, Q};
