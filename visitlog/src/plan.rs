use log::debug;
use memchr::memchr;
use std::io::{ErrorKind, Read, Result, Seek, SeekFrom};

const PROBE_SIZE: usize = 4096;

/// Find the offset of the first line that starts strictly after `offset`,
/// or `file_size` if there's none.
pub fn next_line_start<R: Read + Seek>(reader: &mut R, offset: u64, file_size: u64) -> Result<u64> {
    if offset >= file_size {
        return Ok(file_size);
    }
    reader.seek(SeekFrom::Start(offset))?;
    let mut buf = [0u8; PROBE_SIZE];
    let mut pos = offset;
    while pos < file_size {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        if let Some(nl) = memchr(b'\n', &buf[..n]) {
            return Ok((pos + nl as u64 + 1).min(file_size));
        }
        pos += n as u64;
    }
    Ok(file_size)
}

/// Split `[0, file_size)` into `workers` record-aligned ranges.
///
/// Returns `workers + 1` non-decreasing offsets, the first one is 0 and the
/// last one is `file_size`. Every interior bound is found by seeking to the
/// `i / workers` fraction of the file and moving past the next newline, so each
/// bound is the first byte of a line. Sizes are only roughly equal, and a range
/// may be empty when a single line spans a whole fraction.
pub fn plan_chunks<R: Read + Seek>(reader: &mut R, file_size: u64, workers: usize) -> Result<Vec<u64>> {
    let workers = workers.max(1);
    let mut bounds = Vec::with_capacity(workers + 1);
    bounds.push(0);
    for i in 1..workers {
        let target = file_size * i as u64 / workers as u64;
        let prev = *bounds.last().unwrap_or(&0);
        let bound = if target < prev {
            prev
        } else {
            next_line_start(reader, target, file_size)?
        };
        bounds.push(bound.max(prev));
    }
    bounds.push(file_size);
    debug!("Chunk bounds: {:?}", bounds);
    Ok(bounds)
}

/// The `[begin, end)` pairs of a bound list
pub fn ranges(bounds: &[u64]) -> impl Iterator<Item = (u64, u64)> + '_ {
    bounds.windows(2).map(|w| (w[0], w[1]))
}
