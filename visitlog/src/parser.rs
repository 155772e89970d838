use log::{info, warn};
use std::fs::File;
use std::io::{Read, Result};
use std::path::Path;

use crate::{
    calendar::Calendar,
    config::ParserConfig,
    dict::{PathDictionary, PathRecord},
    matrix::CountMatrix,
    plan::{plan_chunks, ranges},
    report::Report,
    scan::{ScanContext, ScanStats},
    task::{Execution, Executor, ProcessLauncher},
};

/// The merged result of a run, before it's written out
pub struct Aggregate {
    pub paths: PathDictionary,
    pub calendar: Calendar,
    pub matrix: CountMatrix,
    pub stats: ScanStats,
    /// The chunk bounds the input was split at
    pub bounds: Vec<u64>,
}

impl Aggregate {
    pub fn report<'a>(&'a self, route_prefix: &'a str) -> Report<'a> {
        Report {
            matrix: &self.matrix,
            paths: &self.paths,
            calendar: &self.calendar,
            route_prefix,
        }
    }
}

/// The dictionaries and chunk bounds of a run
pub struct RunPlan {
    pub paths: PathDictionary,
    pub calendar: Calendar,
    pub bounds: Vec<u64>,
    /// Set when the chunks go to worker processes
    pub launcher: Option<ProcessLauncher>,
}

impl RunPlan {
    pub fn chunks(&self) -> impl Iterator<Item = (u64, u64)> + '_ {
        ranges(&self.bounds)
    }
}

/// The access log to visit report pipeline
pub struct LogParser {
    config: ParserConfig,
    launcher: Option<ProcessLauncher>,
}

impl LogParser {
    pub fn new(config: ParserConfig) -> Self {
        Self {
            config,
            launcher: None,
        }
    }

    /// Use this program for process workers instead of the current executable
    pub fn with_launcher(mut self, launcher: ProcessLauncher) -> Self {
        self.launcher = Some(launcher);
        self
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    /// Parse `input` and write the JSON report to `output`
    pub fn parse<P: AsRef<Path>, Q: AsRef<Path>>(&self, input: P, output: Q) -> Result<Aggregate> {
        self.parse_with_known_paths(input, output, Vec::<String>::new())
    }

    /// Same as `parse`, paths of `known_paths` missing from the head of the
    /// log are still counted wherever they appear.
    pub fn parse_with_known_paths<P, Q, I, R>(&self, input: P, output: Q, known_paths: I) -> Result<Aggregate>
    where
        P: AsRef<Path>,
        Q: AsRef<Path>,
        I: IntoIterator<Item = R>,
        R: PathRecord,
    {
        let aggregate = self.aggregate(input, known_paths)?;
        let fp = File::create(output.as_ref())?;
        aggregate
            .report(&self.config.route_prefix)
            .write_to(fp, self.config.write_buffer_size)?;
        Ok(aggregate)
    }

    /// Build the dictionaries and split the input, without scanning it
    pub fn plan<P, I, R>(&self, input: P, known_paths: I) -> Result<RunPlan>
    where
        P: AsRef<Path>,
        I: IntoIterator<Item = R>,
        R: PathRecord,
    {
        self.config.validate()?;
        let mut fp = File::open(input.as_ref())?;
        let file_size = fp.metadata()?.len();

        let mut window = Vec::with_capacity((self.config.discovery_window as u64).min(file_size) as usize);
        (&mut fp)
            .take(self.config.discovery_window as u64)
            .read_to_end(&mut window)?;
        let format = &self.config.format;
        format.validate_first_record(&window)?;

        let mut paths = PathDictionary::discover(&window, format);
        drop(window);
        let supplied = paths.extend_from_source(known_paths, &self.config.route_prefix);
        let calendar = Calendar::with_key_width(self.config.start_year, self.config.end_year, format.date_width);
        info!(
            "{} paths ({} only known from the path source), {} days",
            paths.len(),
            supplied,
            calendar.len()
        );

        let (workers, launcher) = self.resolve_workers(file_size);
        let bounds = plan_chunks(&mut fp, file_size, workers)?;
        Ok(RunPlan {
            paths,
            calendar,
            bounds,
            launcher,
        })
    }

    /// Build the dictionaries, scan the whole file and merge the counts
    pub fn aggregate<P, I, R>(&self, input: P, known_paths: I) -> Result<Aggregate>
    where
        P: AsRef<Path>,
        I: IntoIterator<Item = R>,
        R: PathRecord,
    {
        let input = input.as_ref();
        let RunPlan {
            paths,
            calendar,
            bounds,
            launcher,
        } = self.plan(input, known_paths)?;

        let ctx = ScanContext {
            format: &self.config.format,
            paths: &paths,
            calendar: &calendar,
            read_block_size: self.config.read_block_size,
        };
        let mut executor = Executor::new(ctx, input, self.config.execution);
        if let Some(launcher) = launcher {
            executor = executor.with_launcher(launcher);
        }
        let (matrix, stats) = executor.run(&bounds)?;

        info!("Counted {} records in {} chunks", stats.records, bounds.len() - 1);
        if stats.unresolved > 0 || stats.malformed > 0 {
            warn!(
                "Skipped {} records with an unknown path or date and {} malformed lines",
                stats.unresolved, stats.malformed
            );
        }
        if stats.truncated > 0 {
            warn!("Ignored {} bytes of an unterminated final line", stats.truncated);
        }

        Ok(Aggregate {
            paths,
            calendar,
            matrix,
            stats,
            bounds,
        })
    }

    /// Worker count for a file, a process run without a runnable worker
    /// program falls back to a single in-process scan.
    fn resolve_workers(&self, file_size: u64) -> (usize, Option<ProcessLauncher>) {
        let workers = self.config.effective_workers(file_size);
        if workers == 1 || self.config.execution != Execution::Processes {
            return (workers, None);
        }
        match &self.launcher {
            Some(launcher) => (workers, Some(launcher.clone())),
            None => match ProcessLauncher::current_exe() {
                Ok(launcher) => (workers, Some(launcher)),
                Err(e) => {
                    warn!("Can't start worker processes ({}), scanning in a single process", e);
                    (1, None)
                }
            },
        }
    }
}
