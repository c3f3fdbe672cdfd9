pub mod backend;
pub mod context;
pub mod error;
pub mod geometry;
pub mod layer;
pub mod predicate;

pub use backend::*;
pub use context::*;
pub use error::{FilterError, Result};
pub use geometry::*;
pub use layer::*;
pub use predicate::SpatialPredicate;
