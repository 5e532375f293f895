use chrono::Local;
use clap::Parser;
use daily_etl::app::report::{build_report, REPORT_SUBJECT};
use daily_etl::app::scheduler::trailing_seven_day_window;
use daily_etl::core::{Pipeline, PipelineKind, ReportSink};
use daily_etl::utils::error::EtlError;
use daily_etl::utils::{logger, validation::Validate};
use daily_etl::{
    ApiClient, AppConfig, CliArgs, DailyScheduler, EtlPipeline, FileReportSink, LocalStorage,
    PgRowWriter, RunMode,
};
use std::sync::Arc;

/// Before logging is up; stderr only.
fn startup_failure(error: &EtlError) -> i32 {
    eprintln!("❌ {}", error.user_friendly_message());
    eprintln!("💡 {}", error.recovery_suggestion());
    error.exit_code()
}

fn failure(error: &EtlError) -> i32 {
    eprintln!("❌ {}", error.user_friendly_message());
    eprintln!("💡 {}", error.recovery_suggestion());
    logger::log_failure(error)
}

fn build_pipeline(
    kind: PipelineKind,
    config: &AppConfig,
    writer: &PgRowWriter,
) -> Result<Arc<dyn Pipeline>, EtlError> {
    let source_config = match kind {
        PipelineKind::Source1 => &config.source_1,
        PipelineKind::Source2 => &config.source_2,
    };
    let client = ApiClient::new(kind.name(), source_config.clone(), config.retry.policy())?;
    Ok(Arc::new(EtlPipeline::new(kind, client, writer.clone())))
}

async fn run_once(
    kind: PipelineKind,
    config: &AppConfig,
    writer: &PgRowWriter,
    sink: &dyn ReportSink,
) -> Result<(), EtlError> {
    let pipeline = build_pipeline(kind, config, writer)?;
    let today = Local::now().date_naive();
    let window = trailing_seven_day_window(today);

    let (status, outcome) = pipeline.run_recorded(Some(&window)).await;

    let html = build_report(today, std::slice::from_ref(&status));
    if let Err(e) = sink.deliver(REPORT_SUBJECT, today, &html).await {
        tracing::error!("❌ Report delivery failed: {}", e);
    }

    let rows = outcome.map_err(|e| e.source)?;
    println!("✅ {} processed {} rows", kind.name(), rows);
    Ok(())
}

async fn run_scheduler(
    config: &AppConfig,
    writer: &PgRowWriter,
    sink: Arc<dyn ReportSink>,
) -> Result<(), EtlError> {
    let first = build_pipeline(PipelineKind::Source1, config, writer)?;
    let second = build_pipeline(PipelineKind::Source2, config, writer)?;
    let run_at = config.schedule.run_at_time()?;

    DailyScheduler::new(first, second, sink, run_at).run().await
}

/// Returns the exit code. The logger guard lives only inside this function, so the
/// file log is flushed before the caller exits.
async fn run(args: CliArgs) -> i32 {
    let config = match AppConfig::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => return startup_failure(&e),
    };
    if let Err(e) = config.validate() {
        return startup_failure(&e);
    }

    let _guard = match logger::init_logger(args.verbose, &config.logging.dir) {
        Ok(guard) => guard,
        Err(e) => return startup_failure(&e),
    };
    tracing::info!("Starting daily-etl v{}", env!("CARGO_PKG_VERSION"));
    tracing::debug!("Config: {:?}", config);

    let writer = PgRowWriter::connect_lazy(&config.database);
    let sink = FileReportSink::new(LocalStorage::new(&config.report.output_dir));

    if let Some(job) = args.unrecognized_job() {
        tracing::warn!("⚠️ Unknown job '{}', starting the scheduler instead", job);
    }

    let result = match args.mode() {
        RunMode::Once(kind) => run_once(kind, &config, &writer, &sink).await,
        RunMode::Scheduler => run_scheduler(&config, &writer, Arc::new(sink)).await,
    };

    match result {
        Ok(()) => 0,
        Err(e) => failure(&e),
    }
}

#[tokio::main]
async fn main() {
    let code = run(CliArgs::parse()).await;
    std::process::exit(code);
}
