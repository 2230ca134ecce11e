//! Domain models for the rx-resolve system.

mod prescription;
mod product;
mod resolution;

pub use prescription::*;
pub use product::*;
pub use resolution::*;

pub(crate) use resolution::attr_eq;
