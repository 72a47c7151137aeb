//! Run status reporting

use crate::fanout::DispatchError;
use crate::keys::RunId;
use crate::library::LibraryError;
use crate::reassemble::ReassembleError;
use crate::storage::StorageError;
use crate::thread::PostError;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Library(#[from] LibraryError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error(transparent)]
    Reassemble(#[from] ReassembleError),
    #[error("posting failed: {0}")]
    Post(#[from] PostError),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("no posting client configured")]
    NoPostingClient,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Scrape,
    Dedup,
    Dispatch,
    Reassemble,
    Post,
    Archive,
    Notify,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    /// Everything scraped was already in the library
    NoNewArticles,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    pub stage: Stage,
    pub ok: bool,
    pub detail: Value,
    pub error: Option<String>,
}

impl StageReport {
    pub fn ok(stage: Stage, detail: Value) -> Self {
        Self {
            stage,
            ok: true,
            detail,
            error: None,
        }
    }

    pub fn failed(stage: Stage, error: &dyn std::error::Error) -> Self {
        Self {
            stage,
            ok: false,
            detail: Value::Null,
            error: Some(error.to_string()),
        }
    }
}

/// JSON status payload of one pipeline run
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub status: RunStatus,
    pub run_id: Option<RunId>,
    pub stages: Vec<StageReport>,
    pub error: Option<String>,
}

impl Default for PipelineReport {
    fn default() -> Self {
        Self {
            status: RunStatus::Completed,
            run_id: None,
            stages: Vec::new(),
            error: None,
        }
    }
}

impl PipelineReport {
    pub fn stage(&self, stage: Stage) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.stage == stage)
    }

    pub fn is_success(&self) -> bool {
        self.status != RunStatus::Failed
    }

    pub(crate) fn fail(&mut self, error: &PipelineError) {
        self.status = RunStatus::Failed;
        self.error = Some(error.to_string());
    }
}
