pub mod advisor;
pub mod analyzer;

pub use advisor::{
    FilterSettingsSnapshot, OptimizationAdvisor, OptimizationKind, OptimizationRecommendation,
};
pub use analyzer::{classify_source, GeometryComplexity, LayerAnalyzer, LayerProfile, LocationType};
