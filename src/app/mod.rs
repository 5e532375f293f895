pub mod report;
pub mod scheduler;

pub use report::{build_report, FileReportSink, LogReportSink, REPORT_SUBJECT};
pub use scheduler::{next_fire_after, trailing_seven_day_window, DailyScheduler};
