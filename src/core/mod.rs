pub mod inserter;
pub mod pipeline;
pub mod transform;

pub use crate::domain::model::{
    FetchWindow, InsertPlan, PipelineKind, PipelineRunStatus, Record, RunState,
};
pub use crate::domain::ports::{Pipeline, RecordSource, ReportSink, RowWriter, Storage};
pub use crate::utils::error::Result;
