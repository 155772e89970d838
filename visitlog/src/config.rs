use serde_derive::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, Error, ErrorKind, Result};
use std::path::Path;

use crate::format::LineFormat;
use crate::task::Execution;

/// Tunables of a parse run
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// Upper bound of parallel workers, the host counts as one of them
    pub workers: usize,
    /// Files smaller than this are scanned by a single worker
    pub parallel_threshold: u64,
    pub read_block_size: usize,
    pub write_buffer_size: usize,
    /// How many leading bytes of the log are scanned for path discovery
    pub discovery_window: usize,
    pub start_year: u32,
    pub end_year: u32,
    pub format: LineFormat,
    /// Prepended to every slug in the report
    pub route_prefix: String,
    pub execution: Execution,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            workers: 8,
            parallel_threshold: 10 * 1024 * 1024,
            read_block_size: 2 * 1024 * 1024,
            write_buffer_size: 1024 * 1024,
            discovery_window: 8 * 1024 * 1024,
            start_year: 2020,
            end_year: 2026,
            format: LineFormat::default(),
            route_prefix: "/blog/".to_string(),
            execution: Execution::Threads,
        }
    }
}

impl ParserConfig {
    /// Load a JSON config file, missing fields take their default value
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let fp = BufReader::new(File::open(path.as_ref())?);
        let config: Self = serde_json::from_reader(fp)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.format.validate()?;
        if self.workers == 0 {
            return Err(Error::new(ErrorKind::InvalidInput, "At least one worker is required"));
        }
        if self.read_block_size == 0 || self.write_buffer_size == 0 {
            return Err(Error::new(ErrorKind::InvalidInput, "Buffer sizes must be positive"));
        }
        if self.start_year > self.end_year {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                format!("Invalid year span {}-{}", self.start_year, self.end_year),
            ));
        }
        if self.format.date_width == 8 && self.end_year - self.start_year >= 100 {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "Two digit years can't cover more than a century",
            ));
        }
        Ok(())
    }

    /// The number of workers a file of this size is split into
    pub fn effective_workers(&self, file_size: u64) -> usize {
        if file_size < self.parallel_threshold {
            1
        } else {
            self.workers.max(1)
        }
    }
}
