use crate::app::report::{build_report, REPORT_SUBJECT};
use crate::core::{FetchWindow, Pipeline, PipelineRunStatus, ReportSink};
use crate::utils::error::Result;
use chrono::{Duration, Local, NaiveDate, NaiveDateTime, NaiveTime};
use std::sync::Arc;

pub fn trailing_seven_day_window(today: NaiveDate) -> FetchWindow {
    FetchWindow::trailing_days(today, 7)
}

/// First occurrence of `at` strictly after `now`.
pub fn next_fire_after(now: NaiveDateTime, at: NaiveTime) -> NaiveDateTime {
    let today = now.date().and_time(at);
    if today > now {
        today
    } else {
        today + Duration::days(1)
    }
}

/// Runs both pipelines once a day and hands the combined report to a sink.
pub struct DailyScheduler {
    first: Arc<dyn Pipeline>,
    second: Arc<dyn Pipeline>,
    sink: Arc<dyn ReportSink>,
    run_at: NaiveTime,
}

impl DailyScheduler {
    pub fn new(
        first: Arc<dyn Pipeline>,
        second: Arc<dyn Pipeline>,
        sink: Arc<dyn ReportSink>,
        run_at: NaiveTime,
    ) -> Self {
        Self {
            first,
            second,
            sink,
            run_at,
        }
    }

    async fn run_job(pipeline: &dyn Pipeline, today: NaiveDate) -> PipelineRunStatus {
        let window = trailing_seven_day_window(today);
        tracing::info!("⏰ [{}] Triggered for {}", pipeline.kind().tag(), window);
        pipeline.run_tracked(Some(&window)).await
    }

    /// One daily cycle: both jobs concurrently, then the report. Sink errors are logged only.
    pub async fn run_cycle(&self, today: NaiveDate) -> Vec<PipelineRunStatus> {
        let (first, second) = tokio::join!(
            Self::run_job(self.first.as_ref(), today),
            Self::run_job(self.second.as_ref(), today)
        );
        let statuses = vec![first, second];

        let html = build_report(today, &statuses);
        if let Err(e) = self.sink.deliver(REPORT_SUBJECT, today, &html).await {
            tracing::error!("❌ Report delivery failed: {}", e);
        }

        statuses
    }

    /// Blocks until Ctrl-C. The next trigger is computed after each cycle finishes,
    /// so a cycle that overruns its next slot skips it.
    pub async fn run(&self) -> Result<()> {
        tracing::info!("🚀 Scheduler started, daily run at {}", self.run_at.format("%H:%M"));

        loop {
            let now = Local::now().naive_local();
            let next = next_fire_after(now, self.run_at);
            let wait = (next - now).to_std().unwrap_or_default();
            tracing::info!("🕒 Next run at {}", next.format("%Y-%m-%d %H:%M:%S"));

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                signal = tokio::signal::ctrl_c() => {
                    signal?;
                    tracing::info!("🛑 Scheduler stopped");
                    return Ok(());
                }
            }

            let statuses = self.run_cycle(Local::now().date_naive()).await;
            let failed = statuses.iter().filter(|s| !s.success()).count();
            tracing::info!("✅ Daily cycle finished ({} of {} failed)", failed, statuses.len());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::PipelineKind;
    use crate::utils::error::{EtlError, FetchError, PipelineError};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FixedPipeline {
        kind: PipelineKind,
        rows: Option<u64>,
        windows: Mutex<Vec<FetchWindow>>,
    }

    impl FixedPipeline {
        fn new(kind: PipelineKind, rows: Option<u64>) -> Arc<Self> {
            Arc::new(Self {
                kind,
                rows,
                windows: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Pipeline for FixedPipeline {
        fn kind(&self) -> PipelineKind {
            self.kind
        }

        async fn run(
            &self,
            window: Option<&FetchWindow>,
        ) -> std::result::Result<u64, PipelineError> {
            if let Some(window) = window {
                self.windows.lock().unwrap().push(*window);
            }
            self.rows.ok_or_else(|| {
                PipelineError::new(
                    self.kind.name(),
                    EtlError::Fetch(FetchError::RetriesExhausted {
                        url: "http://api.test/items".to_string(),
                        attempts: 3,
                        last_error: "503".to_string(),
                    }),
                )
            })
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        reports: Mutex<Vec<(String, NaiveDate, String)>>,
        fail: bool,
    }

    #[async_trait]
    impl ReportSink for RecordingSink {
        async fn deliver(&self, subject: &str, date: NaiveDate, html: &str) -> Result<()> {
            if self.fail {
                return Err(EtlError::ProcessingError {
                    message: "smtp down".to_string(),
                });
            }
            self.reports
                .lock()
                .unwrap()
                .push((subject.to_string(), date, html.to_string()));
            Ok(())
        }
    }

    fn at(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_window_covers_seven_days() {
        let window = trailing_seven_day_window(date(2025, 12, 7));
        assert_eq!(window.start(), date(2025, 12, 1));
        assert_eq!(window.end(), date(2025, 12, 7));
    }

    #[test]
    fn test_next_fire_later_today() {
        let now = date(2025, 12, 7).and_time(at(9, 30));
        assert_eq!(next_fire_after(now, at(22, 0)), date(2025, 12, 7).and_time(at(22, 0)));
    }

    #[test]
    fn test_next_fire_rolls_to_tomorrow() {
        let now = date(2025, 12, 31).and_time(at(23, 15));
        assert_eq!(next_fire_after(now, at(22, 0)), date(2026, 1, 1).and_time(at(22, 0)));
    }

    #[test]
    fn test_next_fire_is_strictly_after_now() {
        let now = date(2025, 12, 7).and_time(at(22, 0));
        assert_eq!(next_fire_after(now, at(22, 0)), date(2025, 12, 8).and_time(at(22, 0)));
    }

    #[tokio::test]
    async fn test_failed_job_does_not_block_the_other() {
        let first = FixedPipeline::new(PipelineKind::Source1, None);
        let second = FixedPipeline::new(PipelineKind::Source2, Some(12));
        let sink = Arc::new(RecordingSink::default());

        let scheduler = DailyScheduler::new(first.clone(), second.clone(), sink.clone(), at(22, 0));
        let statuses = scheduler.run_cycle(date(2025, 12, 7)).await;

        assert_eq!(statuses.len(), 2);
        assert!(!statuses[0].success());
        assert!(statuses[0].error().unwrap().starts_with("ETL Pipeline 1 failed"));
        assert_eq!(statuses[1].rows(), Some(12));

        let expected = trailing_seven_day_window(date(2025, 12, 7));
        assert_eq!(first.windows.lock().unwrap().as_slice(), &[expected]);
        assert_eq!(second.windows.lock().unwrap().as_slice(), &[expected]);

        let reports = sink.reports.lock().unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].0, REPORT_SUBJECT);
        assert_eq!(reports[0].1, date(2025, 12, 7));
        assert!(reports[0].2.contains("Pipeline 1"));
        assert!(reports[0].2.contains("Pipeline 2"));
    }

    #[tokio::test]
    async fn test_sink_failure_is_swallowed() {
        let sink = Arc::new(RecordingSink {
            fail: true,
            ..Default::default()
        });
        let scheduler = DailyScheduler::new(
            FixedPipeline::new(PipelineKind::Source1, Some(1)),
            FixedPipeline::new(PipelineKind::Source2, Some(2)),
            sink,
            at(22, 0),
        );

        let statuses = scheduler.run_cycle(date(2025, 12, 7)).await;
        assert!(statuses.iter().all(|s| s.success()));
    }
}
