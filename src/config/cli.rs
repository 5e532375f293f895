use crate::core::PipelineKind;
use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "daily-etl")]
#[command(about = "Pulls two API sources into the database once a day")]
pub struct CliArgs {
    /// Run one pipeline once (pipeline1 / pipeline2) instead of starting the scheduler
    pub job: Option<String>,

    /// Optional TOML settings file; the environment is used when omitted
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[arg(short, long, help = "Enable verbose output")]
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Scheduler,
    Once(PipelineKind),
}

impl CliArgs {
    /// Unknown job tokens fall back to scheduler mode.
    pub fn mode(&self) -> RunMode {
        self.job
            .as_deref()
            .and_then(PipelineKind::from_token)
            .map(RunMode::Once)
            .unwrap_or(RunMode::Scheduler)
    }

    pub fn unrecognized_job(&self) -> Option<&str> {
        self.job
            .as_deref()
            .filter(|job| PipelineKind::from_token(job).is_none())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_job_starts_scheduler() {
        let args = CliArgs::parse_from(["daily-etl"]);
        assert_eq!(args.mode(), RunMode::Scheduler);
        assert!(args.unrecognized_job().is_none());
    }

    #[test]
    fn test_known_job_runs_once() {
        let args = CliArgs::parse_from(["daily-etl", "pipeline2", "--verbose"]);
        assert_eq!(args.mode(), RunMode::Once(PipelineKind::Source2));
        assert!(args.verbose);
    }

    #[test]
    fn test_unknown_job_falls_back_to_scheduler() {
        let args = CliArgs::parse_from(["daily-etl", "nightly", "-c", "etl.toml"]);
        assert_eq!(args.mode(), RunMode::Scheduler);
        assert_eq!(args.unrecognized_job(), Some("nightly"));
        assert_eq!(args.config.as_deref(), Some(std::path::Path::new("etl.toml")));
    }
}
