//! Pipeline orchestration and run status

mod controller;
mod status;

pub use controller::{Pipeline, RunOptions, ThreadOutcome, Variant};
pub use status::{PipelineError, PipelineReport, RunStatus, Stage, StageReport};
