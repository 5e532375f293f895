use crate::utils::error::{EtlError, Result};
use chrono::{DateTime, Duration, Local, NaiveDate};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// One row as returned by a source, fields kept in API order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    pub data: IndexMap<String, serde_json::Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_object(obj: serde_json::Map<String, serde_json::Value>) -> Self {
        Self {
            data: obj.into_iter().collect(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.data.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.data.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl From<IndexMap<String, serde_json::Value>> for Record {
    fn from(data: IndexMap<String, serde_json::Value>) -> Self {
        Self { data }
    }
}

/// A rendered bulk-insert statement and the columns it binds, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertPlan {
    pub table: String,
    pub columns: Vec<String>,
    pub statement: String,
}

/// Inclusive calendar-date range sent to a source as `from`/`to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchWindow {
    start: NaiveDate,
    end: NaiveDate,
}

impl FetchWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(EtlError::ProcessingError {
                message: format!("fetch window start {} is after end {}", start, end),
            });
        }
        Ok(Self { start, end })
    }

    /// The `days` calendar days ending on and including `today`.
    pub fn trailing_days(today: NaiveDate, days: u32) -> Self {
        let back = i64::from(days.max(1)) - 1;
        Self {
            start: today - Duration::days(back),
            end: today,
        }
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn query_params(&self) -> [(&'static str, String); 2] {
        [
            ("from", self.start.format("%Y-%m-%d").to_string()),
            ("to", self.end.format("%Y-%m-%d").to_string()),
        ]
    }
}

impl std::fmt::Display for FetchWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} → {}", self.start, self.end)
    }
}

/// The two hard-wired pipelines and everything bound to them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineKind {
    Source1,
    Source2,
}

impl PipelineKind {
    pub const ALL: [PipelineKind; 2] = [PipelineKind::Source1, PipelineKind::Source2];

    pub fn name(&self) -> &'static str {
        match self {
            PipelineKind::Source1 => "Pipeline 1",
            PipelineKind::Source2 => "Pipeline 2",
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            PipelineKind::Source1 => "ETL1",
            PipelineKind::Source2 => "ETL2",
        }
    }

    pub fn target_table(&self) -> &'static str {
        match self {
            PipelineKind::Source1 => "etl.source_1_records",
            PipelineKind::Source2 => "etl.source_2_records",
        }
    }

    pub fn required_fields(&self) -> &'static [&'static str] {
        match self {
            PipelineKind::Source1 => &[
                "id", "lineid", "isemrino", "tarih", "musteri", "urunkodu", "urunadi", "partino",
            ],
            PipelineKind::Source2 => &["id", "name", "created_at"],
        }
    }

    /// Maps a command-line job token to a pipeline, `None` when unrecognized.
    pub fn from_token(token: &str) -> Option<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "pipeline1" | "pipeline_1" | "p1" | "1" => Some(PipelineKind::Source1),
            "pipeline2" | "pipeline_2" | "p2" | "2" => Some(PipelineKind::Source2),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
    NotStarted,
    Running,
    Succeeded(u64),
    Failed(String),
}

/// Timing and outcome of a single pipeline invocation.
#[derive(Debug, Clone)]
pub struct PipelineRunStatus {
    pub name: String,
    pub started_at: Option<DateTime<Local>>,
    pub finished_at: Option<DateTime<Local>>,
    pub state: RunState,
}

impl PipelineRunStatus {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            started_at: None,
            finished_at: None,
            state: RunState::NotStarted,
        }
    }

    pub fn start(&mut self) {
        let now = Local::now();
        self.started_at = Some(now);
        self.state = RunState::Running;
        tracing::info!("🔸 [{}] Started at {}", self.name, now.format("%Y-%m-%d %H:%M:%S"));
    }

    pub fn finish_success(&mut self, rows: u64) {
        self.finished_at = Some(Local::now());
        self.state = RunState::Succeeded(rows);
        tracing::info!("🟢 [{}] Completed successfully → {} rows processed", self.name, rows);
    }

    pub fn finish_failure(&mut self, error: impl Into<String>) {
        let error = error.into();
        self.finished_at = Some(Local::now());
        tracing::error!("🔴 [{}] Failed → {}", self.name, error);
        self.state = RunState::Failed(error);
    }

    pub fn success(&self) -> bool {
        matches!(self.state, RunState::Succeeded(_))
    }

    pub fn rows(&self) -> Option<u64> {
        match self.state {
            RunState::Succeeded(rows) => Some(rows),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.state {
            RunState::Failed(error) => Some(error),
            _ => None,
        }
    }

    pub fn duration(&self) -> Option<Duration> {
        Some(self.finished_at? - self.started_at?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_trailing_seven_days() {
        let window = FetchWindow::trailing_days(date(2025, 12, 7), 7);
        assert_eq!(window.start(), date(2025, 12, 1));
        assert_eq!(window.end(), date(2025, 12, 7));
        assert_eq!(
            window.query_params(),
            [("from", "2025-12-01".to_string()), ("to", "2025-12-07".to_string())]
        );
    }

    #[test]
    fn test_trailing_window_crosses_year() {
        let window = FetchWindow::trailing_days(date(2026, 1, 3), 7);
        assert_eq!(window.start(), date(2025, 12, 28));
    }

    #[test]
    fn test_window_rejects_inverted_range() {
        assert!(FetchWindow::new(date(2025, 12, 7), date(2025, 12, 1)).is_err());
        assert!(FetchWindow::new(date(2025, 12, 7), date(2025, 12, 7)).is_ok());
    }

    #[test]
    fn test_pipeline_tokens() {
        assert_eq!(PipelineKind::from_token("pipeline1"), Some(PipelineKind::Source1));
        assert_eq!(PipelineKind::from_token("P2"), Some(PipelineKind::Source2));
        assert_eq!(PipelineKind::from_token("2"), Some(PipelineKind::Source2));
        assert_eq!(PipelineKind::from_token("nightly"), None);
    }

    #[test]
    fn test_record_keeps_api_order() {
        let obj = serde_json::json!({"zeta": 1, "alpha": 2, "mid": 3});
        let record = Record::from_object(obj.as_object().unwrap().clone());
        assert_eq!(record.keys().collect::<Vec<_>>(), vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_run_status_lifecycle() {
        let mut status = PipelineRunStatus::new("Pipeline 1");
        assert_eq!(status.state, RunState::NotStarted);
        assert!(status.duration().is_none());

        status.start();
        assert_eq!(status.state, RunState::Running);

        status.finish_success(42);
        assert!(status.success());
        assert_eq!(status.rows(), Some(42));
        assert!(status.error().is_none());
        assert!(status.duration().is_some());

        let mut failed = PipelineRunStatus::new("Pipeline 2");
        failed.start();
        failed.finish_failure("boom");
        assert!(!failed.success());
        assert_eq!(failed.rows(), None);
        assert_eq!(failed.error(), Some("boom"));
    }
}
