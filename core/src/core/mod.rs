pub mod context_data;
pub mod control;
pub mod stage;

// Re-export key types for easier access from other conveyor modules (and lib.rs)
pub use context_data::ContextData;
pub use control::{Outcome, PipelineState, StageStatus};
pub use stage::{StageAction, StageDef};
