//! Daily HTML status report and the sinks it can be handed to.

use crate::core::{PipelineRunStatus, ReportSink, Storage};
use crate::utils::error::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use html_escape::encode_text;

pub const REPORT_SUBJECT: &str = "Daily ETL Status Report";

fn row_html(status: &PipelineRunStatus) -> String {
    let badge = if status.success() {
        "<span style='color:green;'>SUCCESS</span>"
    } else {
        "<span style='color:red;'>FAILED</span>"
    };

    let rows = status
        .rows()
        .map(|rows| rows.to_string())
        .unwrap_or_else(|| "-".to_string());

    let duration = status
        .duration()
        .map(|d| format!("{} sec", d.num_seconds()))
        .unwrap_or_else(|| "N/A".to_string());

    let error = match status.error() {
        Some(error) if !status.success() => encode_text(error).into_owned(),
        _ => "-".to_string(),
    };

    format!(
        "    <tr>\n        <td><b>{}</b></td>\n        <td>{}</td>\n        <td>{}</td>\n        <td>{}</td>\n        <td>{}</td>\n    </tr>\n",
        encode_text(&status.name),
        badge,
        rows,
        duration,
        error
    )
}

pub fn build_report(date: NaiveDate, statuses: &[PipelineRunStatus]) -> String {
    let rows: String = statuses.iter().map(row_html).collect();

    format!(
        r#"<h2>Daily ETL Execution Report</h2>
<p>Date: <b>{date}</b></p>

<table border="1" cellpadding="6" cellspacing="0" style="border-collapse: collapse;">
    <tr>
        <th>Pipeline</th>
        <th>Status</th>
        <th>Rows Processed</th>
        <th>Duration</th>
        <th>Error</th>
    </tr>
{rows}</table>

<p style="margin-top:20px;">Daily ETL Automation System</p>
"#,
        date = date.format("%Y-%m-%d"),
        rows = rows
    )
}

pub fn report_file_name(date: NaiveDate) -> String {
    format!("etl-report-{}.html", date.format("%Y-%m-%d"))
}

/// Writes each report as `etl-report-YYYY-MM-DD.html` through a [`Storage`].
pub struct FileReportSink<S: Storage> {
    storage: S,
}

impl<S: Storage> FileReportSink<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl<S: Storage> ReportSink for FileReportSink<S> {
    async fn deliver(&self, subject: &str, date: NaiveDate, html: &str) -> Result<()> {
        let file_name = report_file_name(date);
        self.storage.write_file(&file_name, html.as_bytes()).await?;
        tracing::info!("📧 {} written to {}", subject, file_name);
        Ok(())
    }
}

pub struct LogReportSink;

#[async_trait]
impl ReportSink for LogReportSink {
    async fn deliver(&self, subject: &str, date: NaiveDate, html: &str) -> Result<()> {
        tracing::info!("📧 {} for {}\n{}", subject, date, html);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::storage::LocalStorage;
    use tempfile::TempDir;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 12, 7).unwrap()
    }

    #[test]
    fn test_report_rows() {
        let mut ok = PipelineRunStatus::new("Pipeline 1");
        ok.start();
        ok.finish_success(128);

        let mut failed = PipelineRunStatus::new("Pipeline 2");
        failed.start();
        failed.finish_failure("ETL Pipeline 2 failed: <timeout> & more");

        let html = build_report(date(), &[ok, failed]);

        assert!(html.contains("<h2>Daily ETL Execution Report</h2>"));
        assert!(html.contains("Date: <b>2025-12-07</b>"));
        assert!(html.contains("<td><b>Pipeline 1</b></td>"));
        assert!(html.contains("SUCCESS"));
        assert!(html.contains("<td>128</td>"));
        assert!(html.contains("FAILED"));
        assert!(html.contains("&lt;timeout&gt; &amp; more"));
        assert!(!html.contains("<timeout>"));
        assert!(html.contains(" sec</td>"));
    }

    #[test]
    fn test_unstarted_status_has_no_duration() {
        let html = build_report(date(), &[PipelineRunStatus::new("Pipeline 1")]);
        assert!(html.contains("<td>N/A</td>"));
        assert!(html.contains("FAILED"));
    }

    #[tokio::test]
    async fn test_file_sink_names_file_after_report_date() {
        let temp_dir = TempDir::new().unwrap();
        let sink = FileReportSink::new(LocalStorage::new(temp_dir.path()));

        sink.deliver(REPORT_SUBJECT, date(), "<p>report</p>").await.unwrap();

        let expected = temp_dir.path().join("etl-report-2025-12-07.html");
        assert_eq!(std::fs::read_to_string(expected).unwrap(), "<p>report</p>");
    }
}
