pub mod adapters;
pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

pub use adapters::{db::PgRowWriter, http::ApiClient, http::RetryPolicy, storage::LocalStorage};
pub use app::{DailyScheduler, FileReportSink, LogReportSink};
pub use config::{AppConfig, CliArgs, RunMode};
pub use core::{inserter::DynamicInserter, pipeline::EtlPipeline};
pub use utils::error::{EtlError, PipelineError, Result};
