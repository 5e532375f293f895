use crate::domain::model::{FetchWindow, InsertPlan, PipelineKind, PipelineRunStatus, Record};
use crate::utils::error::{FetchError, InsertError, PipelineError, Result};
use async_trait::async_trait;
use chrono::NaiveDate;

pub trait Storage: Send + Sync {
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

/// A remote source that yields a complete result set for an optional window.
#[async_trait]
pub trait RecordSource: Send + Sync {
    async fn fetch(
        &self,
        window: Option<&FetchWindow>,
    ) -> std::result::Result<Vec<Record>, FetchError>;

    fn endpoint(&self) -> &str;
}

/// Executes a prepared bulk insert; returns the number of rows the store reports.
#[async_trait]
pub trait RowWriter: Send + Sync {
    async fn write(
        &self,
        plan: &InsertPlan,
        records: &[Record],
    ) -> std::result::Result<u64, InsertError>;
}

#[async_trait]
pub trait ReportSink: Send + Sync {
    /// `date` is the day the report covers, not the delivery time.
    async fn deliver(&self, subject: &str, date: NaiveDate, html: &str) -> Result<()>;
}

/// One end-to-end run: extract, transform, load.
#[async_trait]
pub trait Pipeline: Send + Sync {
    fn kind(&self) -> PipelineKind;

    async fn run(&self, window: Option<&FetchWindow>) -> std::result::Result<u64, PipelineError>;

    /// Runs once, returning the recorded status alongside the run's own outcome.
    async fn run_recorded(
        &self,
        window: Option<&FetchWindow>,
    ) -> (PipelineRunStatus, std::result::Result<u64, PipelineError>) {
        let mut status = PipelineRunStatus::new(self.kind().name());
        status.start();
        let outcome = self.run(window).await;
        match &outcome {
            Ok(rows) => status.finish_success(*rows),
            Err(e) => status.finish_failure(e.to_string()),
        }
        (status, outcome)
    }

    /// Runs once and records timing and outcome instead of returning the error.
    async fn run_tracked(&self, window: Option<&FetchWindow>) -> PipelineRunStatus {
        self.run_recorded(window).await.0
    }
}
