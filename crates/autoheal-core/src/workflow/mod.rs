//! CI workflow-run adapter: provider API surface, transport error
//! classification and the run lifecycle state machine.

pub mod adapter;
pub mod api;
pub mod error;

pub use adapter::{CompletionReport, FailedJob, JobLog, StatusSummary, WorkflowRunAdapter};
pub use api::{Conclusion, RunRef, RunStatus, WorkflowApi, WorkflowJob, WorkflowRun};
pub use error::{AdapterError, AdapterResult, ApiError, ApiErrorKind, ApiResult};
