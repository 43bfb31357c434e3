pub mod error;
pub mod model;
pub mod summary;

// Re-exports for convenience
pub use error::ModelError;
pub use model::{stage_plan, validate_plan, BlockKind, SthcsNet, Stage, StageSpec};
pub use summary::{render, summarize, LayerSummary};
