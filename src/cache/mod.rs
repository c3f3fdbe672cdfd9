pub mod geometry_cache;
pub mod key;

pub use geometry_cache::GeometryCache;
pub use key::GeometryCacheKey;
