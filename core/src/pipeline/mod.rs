// Declares the submodules for the pipeline functionality

pub mod definition;
pub mod execution;
pub mod report;

pub use definition::Pipeline;
pub use report::{NotificationStatus, RunReport, StageRecord};
