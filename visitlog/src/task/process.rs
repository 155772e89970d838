use log::{debug, info};
use serde_derive::{Deserialize, Serialize};
use std::borrow::Cow;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind, Result, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

use super::WorkerError;
use crate::{
    calendar::Calendar,
    dict::PathDictionary,
    format::LineFormat,
    matrix::CountMatrix,
    scan::{ScanContext, ScanStats},
};

/// The frozen inputs of a run, written once by the host and loaded by every
/// worker process.
#[derive(Serialize, Deserialize)]
pub struct RunManifest<'a> {
    pub input: Cow<'a, Path>,
    pub format: Cow<'a, LineFormat>,
    pub calendar: Cow<'a, Calendar>,
    pub read_block_size: usize,
    pub paths: Cow<'a, PathDictionary>,
}

impl<'a> RunManifest<'a> {
    pub fn new(input: &'a Path, ctx: &ScanContext<'a>) -> Self {
        Self {
            input: Cow::Borrowed(input),
            format: Cow::Borrowed(ctx.format),
            calendar: Cow::Borrowed(ctx.calendar),
            read_block_size: ctx.read_block_size,
            paths: Cow::Borrowed(ctx.paths),
        }
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut fp = BufWriter::new(File::create(path.as_ref())?);
        serde_json::to_writer(&mut fp, self)?;
        fp.flush()
    }

    pub fn context(&self) -> ScanContext<'_> {
        ScanContext {
            format: &self.format,
            paths: &self.paths,
            calendar: &self.calendar,
            read_block_size: self.read_block_size,
        }
    }
}

impl RunManifest<'static> {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let fp = BufReader::new(File::open(path.as_ref())?);
        let mut manifest: Self = serde_json::from_reader(fp)?;
        manifest.paths.to_mut().ensure_s2i_map();
        Ok(manifest)
    }
}

fn stats_path(transport: &Path) -> PathBuf {
    transport.with_extension("stats.json")
}

/// The body of a worker process: scan one range and leave the matrix in
/// `output` as little-endian `u32` cells, with the scan counters next to it.
pub fn run_worker<P: AsRef<Path>, Q: AsRef<Path>>(manifest: P, start: u64, end: u64, output: Q) -> Result<ScanStats> {
    let manifest = RunManifest::load(manifest)?;
    let output = output.as_ref();
    let (matrix, stats) = manifest.context().scan_file(&*manifest.input, start, end)?;

    let partial = output.with_extension("partial");
    let mut fp = BufWriter::new(File::create(&partial)?);
    matrix.write_to(&mut fp)?;
    fp.into_inner().map_err(|e| e.into_error())?.sync_all()?;
    serde_json::to_writer(File::create(stats_path(output))?, &stats)?;
    fs::rename(&partial, output)?;
    Ok(stats)
}

/// Starts `<program> [args..] worker --manifest M --start S --end E --output O`
#[derive(Clone, Debug)]
pub struct ProcessLauncher {
    program: PathBuf,
    args: Vec<OsString>,
}

impl ProcessLauncher {
    pub fn new<P: Into<PathBuf>>(program: P) -> Self {
        Self {
            program: program.into(),
            args: vec![],
        }
    }

    /// Re-run the executable of this process as the worker
    pub fn current_exe() -> Result<Self> {
        Ok(Self::new(std::env::current_exe()?))
    }

    /// Add an argument placed before the `worker` subcommand
    pub fn arg<S: Into<OsString>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    fn spawn(&self, manifest: &Path, range: (u64, u64), output: &Path) -> Result<Child> {
        Command::new(&self.program)
            .args(&self.args)
            .arg("worker")
            .arg("--manifest")
            .arg(manifest)
            .arg("--start")
            .arg(range.0.to_string())
            .arg("--end")
            .arg(range.1.to_string())
            .arg("--output")
            .arg(output)
            .stdin(Stdio::null())
            .spawn()
    }
}

/// A dispatched worker process. Dropping it before it's collected kills it.
struct WorkerProcess {
    id: usize,
    child: Option<Child>,
    transport: PathBuf,
}

impl WorkerProcess {
    /// Wait for the worker and add its transport into the accumulator
    fn collect_into(mut self, matrix: &mut CountMatrix, stats: &mut ScanStats) -> Result<()> {
        let status = match self.child.take() {
            Some(mut child) => child.wait()?,
            None => return Err(WorkerError::MissingTransport(self.id).into()),
        };
        if !status.success() {
            return Err(WorkerError::Exited(self.id, status).into());
        }
        let fp = match File::open(&self.transport) {
            Ok(fp) => fp,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(WorkerError::MissingTransport(self.id).into())
            }
            Err(e) => return Err(e),
        };
        matrix
            .accumulate_from(BufReader::new(fp))
            .map_err(|e| WorkerError::BadTransport(self.id, e))?;
        fs::remove_file(&self.transport)?;

        let stats_file = stats_path(&self.transport);
        let part: ScanStats = serde_json::from_reader(BufReader::new(File::open(&stats_file)?))?;
        fs::remove_file(&stats_file)?;
        *stats += part;
        debug!("Merged worker #{}: {} records", self.id, part.records);
        Ok(())
    }
}

impl Drop for WorkerProcess {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

/// Scan `host` in this process and every range of `workers` in a subprocess.
/// All the files of the run live in a private temporary directory that is
/// removed when this returns, whether it succeeded or not.
pub(crate) fn run_processes(
    launcher: &ProcessLauncher,
    ctx: &ScanContext,
    input: &Path,
    host: (u64, u64),
    workers: &[(u64, u64)],
) -> Result<(CountMatrix, ScanStats)> {
    let run_dir = tempfile::Builder::new().prefix("visitlog-").tempdir()?;
    let manifest_path = run_dir.path().join("manifest.json");
    RunManifest::new(input, ctx).save(&manifest_path)?;

    let mut dispatched = Vec::with_capacity(workers.len());
    for (idx, &range) in workers.iter().enumerate() {
        let id = idx + 1;
        let transport = run_dir.path().join(format!("worker-{}.bin", id));
        let child = launcher
            .spawn(&manifest_path, range, &transport)
            .map_err(|e| WorkerError::Spawn(id, e))?;
        dispatched.push(WorkerProcess {
            id,
            child: Some(child),
            transport,
        });
    }
    info!("Dispatched {} worker processes", dispatched.len());

    let (mut matrix, mut stats) = ctx.scan_file(input, host.0, host.1)?;
    for worker in dispatched {
        worker.collect_into(&mut matrix, &mut stats)?;
    }
    Ok((matrix, stats))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_writes_transport_and_stats() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("access.log");
        fs::write(
            &input,
            "https://stitcher.io/blog/a,2024-06-01T01:16:58+00:00\n\
             https://stitcher.io/blog/x,2024-06-01T01:16:58+00:00\n\
             https://stitcher.io/blog/a,2024-06-02T01:16:58+00:00\n",
        )
        .unwrap();

        let format = LineFormat::default();
        let calendar = Calendar::new(2024, 2024);
        let mut paths = PathDictionary::new();
        paths.insert("a");
        let ctx = ScanContext {
            format: &format,
            paths: &paths,
            calendar: &calendar,
            read_block_size: 64,
        };
        let manifest = dir.path().join("manifest.json");
        RunManifest::new(&input, &ctx).save(&manifest).unwrap();

        let output = dir.path().join("worker-1.bin");
        let size = fs::metadata(&input).unwrap().len();
        let stats = run_worker(&manifest, 0, size, &output).unwrap();
        assert_eq!(stats.records, 2);
        assert_eq!(stats.unresolved, 1);
        assert!(!output.with_extension("partial").exists());

        let worker = WorkerProcess {
            id: 1,
            child: None,
            transport: output.clone(),
        };
        let mut matrix = ctx.new_matrix();
        let mut total = ScanStats::default();
        // a worker without a process handle has nothing to deliver
        assert!(worker.collect_into(&mut matrix, &mut total).is_err());

        let mut matrix = ctx.new_matrix();
        matrix.accumulate_from(File::open(&output).unwrap()).unwrap();
        assert_eq!(matrix.total(), 2);
        let june_2 = calendar.lookup(b"2024-06-02").unwrap();
        assert_eq!(matrix.get(0, june_2), 1);
    }

    #[test]
    fn manifest_round_trip_keeps_lookups() {
        let dir = tempfile::tempdir().unwrap();
        let format = LineFormat::default();
        let calendar = Calendar::with_key_width(2020, 2026, 8);
        let mut paths = PathDictionary::new();
        paths.insert("first");
        paths.insert("second/part");
        let ctx = ScanContext {
            format: &format,
            paths: &paths,
            calendar: &calendar,
            read_block_size: 1 << 20,
        };
        let path = dir.path().join("manifest.json");
        let input = dir.path().join("input.log");
        RunManifest::new(&input, &ctx).save(&path).unwrap();

        let loaded = RunManifest::load(&path).unwrap();
        let ctx = loaded.context();
        assert_eq!(&*loaded.input, input.as_path());
        assert_eq!(ctx.paths.lookup(b"second/part"), Some(1));
        assert_eq!(ctx.calendar.len(), calendar.len());
        assert_eq!(ctx.calendar.lookup(b"24-06-01"), calendar.lookup(b"24-06-01"));
        assert_eq!(ctx.format, &format);
    }
}
