pub mod orchestrator;
pub mod subset;
pub mod task;

pub use orchestrator::{
    BackendSelection, ExpressionBuilder, FilterOrchestrator, FilterOutcome, PredicateSource,
};
pub use subset::{classify, is_corrupted, subset_strategy, SubsetKind, SubsetStrategy};
pub use task::{FilterTask, LayerJob};
