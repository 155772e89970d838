/**
 * Aggregates fixed-layout access logs into per-path, per-day visit counts.
 **/
mod calendar;
mod config;
mod dict;
mod format;
mod matrix;
mod parser;
mod plan;
mod report;
mod scan;

pub mod task;

pub use calendar::{days_in_month, is_leap_year, Calendar, CalendarSpan};
pub use config::ParserConfig;
pub use dict::{read_path_list, PathDictionary, PathRecord};
pub use format::{LineFormat, Record};
pub use matrix::CountMatrix;
pub use parser::{Aggregate, LogParser, RunPlan};
pub use plan::{next_line_start, plan_chunks, ranges};
pub use report::Report;
pub use scan::{ScanContext, ScanStats};
pub use task::Execution;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
