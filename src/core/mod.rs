//! Run orchestration: scheduling, retry policy, batching, and the
//! top-level pipeline driver.

pub mod packager;
pub mod pipeline;
pub mod retry;
pub mod scheduler;

pub use pipeline::{run_pipeline, run_pipeline_with, RunCoordinator, RunReport, RunStatus};
pub use retry::RetryPolicy;
pub use scheduler::{run_units, CancelReason, CancelSignal, UnitContext};
