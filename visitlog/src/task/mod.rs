/*! The parallel chunk scan and the merge of the worker results */

mod process;

#[cfg(not(feature = "seq-task"))]
use rayon::prelude::*;
use serde_derive::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::io::{Error, ErrorKind, Result};
use std::path::Path;
use std::process::ExitStatus;
use std::str::FromStr;

use log::info;

pub use process::{run_worker, ProcessLauncher, RunManifest};

use crate::matrix::CountMatrix;
use crate::plan::ranges;
use crate::scan::{ScanContext, ScanStats};

/// How the chunks other than the host's one are executed
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Execution {
    /// One chunk after another on the calling thread
    Sequential,
    /// Worker threads of the rayon pool
    Threads,
    /// `worker` subprocesses exchanging results through transport files
    Processes,
}

impl FromStr for Execution {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sequential" | "seq" => Ok(Self::Sequential),
            "threads" | "thread" => Ok(Self::Threads),
            "processes" | "process" | "fork" => Ok(Self::Processes),
            _ => Err(Error::new(
                ErrorKind::InvalidInput,
                format!("Unknown execution mode {}", s),
            )),
        }
    }
}

/// A worker that didn't deliver its result
#[derive(Debug)]
pub enum WorkerError {
    Spawn(usize, Error),
    Exited(usize, ExitStatus),
    MissingTransport(usize),
    BadTransport(usize, Error),
}

impl Display for WorkerError {
    fn fmt(&self, formatter: &mut Formatter) -> std::fmt::Result {
        match self {
            WorkerError::Spawn(id, e) => write!(formatter, "Worker #{} failed to start: {}", id, e),
            WorkerError::Exited(id, status) => write!(formatter, "Worker #{} failed: {}", id, status),
            WorkerError::MissingTransport(id) => {
                write!(formatter, "Worker #{} exited without writing its result", id)
            }
            WorkerError::BadTransport(id, e) => {
                write!(formatter, "Worker #{} delivered an unreadable result: {}", id, e)
            }
        }
    }
}

impl std::error::Error for WorkerError {}

impl From<WorkerError> for Error {
    fn from(e: WorkerError) -> Error {
        Error::new(ErrorKind::Other, e)
    }
}

/// Runs the chunk scanner over a list of chunk bounds.
///
/// The host always scans the first chunk itself while the others are handed
/// to workers; the results are summed in dispatch order.
pub struct Executor<'a> {
    ctx: ScanContext<'a>,
    input: &'a Path,
    execution: Execution,
    launcher: Option<ProcessLauncher>,
}

impl<'a> Executor<'a> {
    pub fn new(ctx: ScanContext<'a>, input: &'a Path, execution: Execution) -> Self {
        Self {
            ctx,
            input,
            execution,
            launcher: None,
        }
    }

    /// Set the program started for process workers, defaults to the current executable
    pub fn with_launcher(mut self, launcher: ProcessLauncher) -> Self {
        self.launcher = Some(launcher);
        self
    }

    pub fn run(&self, bounds: &[u64]) -> Result<(CountMatrix, ScanStats)> {
        let chunks: Vec<_> = ranges(bounds).collect();
        let (host, workers) = match chunks.split_first() {
            Some((&host, workers)) => (host, workers),
            None => return Ok((self.ctx.new_matrix(), ScanStats::default())),
        };
        if workers.is_empty() {
            return self.ctx.scan_file(self.input, host.0, host.1);
        }
        match self.execution {
            Execution::Sequential => self.run_sequential(&chunks),
            Execution::Threads => self.run_threads(host, workers),
            Execution::Processes => {
                let launcher = match &self.launcher {
                    Some(launcher) => launcher.clone(),
                    None => ProcessLauncher::current_exe()?,
                };
                process::run_processes(&launcher, &self.ctx, self.input, host, workers)
            }
        }
    }

    fn run_sequential(&self, chunks: &[(u64, u64)]) -> Result<(CountMatrix, ScanStats)> {
        let mut matrix = self.ctx.new_matrix();
        let mut file = std::fs::File::open(self.input)?;
        let mut stats = ScanStats::default();
        for &(begin, end) in chunks {
            stats += self.ctx.scan_range(&mut file, begin, end, &mut matrix)?;
        }
        Ok((matrix, stats))
    }

    fn run_threads(&self, host: (u64, u64), workers: &[(u64, u64)]) -> Result<(CountMatrix, ScanStats)> {
        let ctx = self.ctx;
        let input = self.input;
        info!("Scanning {} chunks on worker threads", workers.len());

        let (host_result, worker_results) = rayon::join(
            || ctx.scan_file(input, host.0, host.1),
            || {
                #[cfg(not(feature = "seq-task"))]
                let chunk_iter = workers.par_iter();
                #[cfg(feature = "seq-task")]
                let chunk_iter = workers.iter();
                chunk_iter
                    .map(|&(begin, end)| ctx.scan_file(input, begin, end))
                    .collect::<Vec<_>>()
            },
        );

        let (mut matrix, mut stats) = host_result?;
        for result in worker_results {
            let (part, part_stats) = result?;
            matrix.merge(&part)?;
            stats += part_stats;
        }
        Ok((matrix, stats))
    }
}
