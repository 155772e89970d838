use log::debug;
use memchr::memrchr;
use serde_derive::{Deserialize, Serialize};
use std::fs::File;
use std::io::{ErrorKind, Read, Result, Seek, SeekFrom};
use std::ops::AddAssign;
use std::path::Path;

use crate::{calendar::Calendar, dict::PathDictionary, format::LineFormat, matrix::CountMatrix};

/// Everything a chunk scan reads, frozen before any scan starts
#[derive(Clone, Copy)]
pub struct ScanContext<'a> {
    pub format: &'a LineFormat,
    pub paths: &'a PathDictionary,
    pub calendar: &'a Calendar,
    pub read_block_size: usize,
}

/// Counters of a chunk scan
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanStats {
    /// Records that were counted
    pub records: u64,
    /// Well-formed records whose slug or date isn't in the dictionaries
    pub unresolved: u64,
    /// Lines that don't follow the line format
    pub malformed: u64,
    /// Bytes of an unterminated final line
    pub truncated: u64,
}

impl AddAssign for ScanStats {
    fn add_assign(&mut self, other: Self) {
        self.records += other.records;
        self.unresolved += other.unresolved;
        self.malformed += other.malformed;
        self.truncated += other.truncated;
    }
}

impl<'a> ScanContext<'a> {
    pub fn new_matrix(&self) -> CountMatrix {
        CountMatrix::new(self.paths.len(), self.calendar.len())
    }

    /// Scan the `[start, end)` byte range of a file
    pub fn scan_file<P: AsRef<Path>>(&self, path: P, start: u64, end: u64) -> Result<(CountMatrix, ScanStats)> {
        let mut file = File::open(path.as_ref())?;
        let mut matrix = self.new_matrix();
        let stats = self.scan_range(&mut file, start, end, &mut matrix)?;
        debug!(
            "Scanned [{}, {}): {} records, {} unresolved, {} malformed",
            start, end, stats.records, stats.unresolved, stats.malformed
        );
        Ok((matrix, stats))
    }

    /// Scan `[start, end)` of the reader into `matrix`.
    ///
    /// `start` must be the first byte of a line. The range is read block by
    /// block; only complete lines of a block are parsed, the partial line at
    /// the end of a block is re-read as the head of the next one. A line that
    /// is still unterminated when the range is exhausted is not counted.
    pub fn scan_range<R: Read + Seek>(
        &self,
        reader: &mut R,
        start: u64,
        end: u64,
        matrix: &mut CountMatrix,
    ) -> Result<ScanStats> {
        let mut stats = ScanStats::default();
        if end <= start {
            return Ok(stats);
        }
        reader.seek(SeekFrom::Start(start))?;

        let mut buf = vec![0u8; self.read_block_size.max(1)];
        let mut carried = 0;
        let mut remaining = end - start;

        while remaining > 0 {
            if carried == buf.len() {
                // a single line is longer than a block
                buf.resize(buf.len() * 2, 0);
            }
            let want = ((buf.len() - carried) as u64).min(remaining) as usize;
            let n = match reader.read(&mut buf[carried..carried + want]) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            remaining -= n as u64;
            let filled = carried + n;

            let last_nl = match memrchr(b'\n', &buf[carried..filled]) {
                Some(offset) => carried + offset,
                None => {
                    carried = filled;
                    continue;
                }
            };

            self.scan_block(&buf[..=last_nl], matrix, &mut stats);

            let excess = filled - last_nl - 1;
            if excess > 0 && remaining > 0 {
                reader.seek(SeekFrom::Current(-(excess as i64)))?;
                remaining += excess as u64;
            } else {
                stats.truncated += excess as u64;
            }
            carried = 0;
        }
        stats.truncated += carried as u64;
        Ok(stats)
    }

    /// Count every line of a block that ends with a newline
    #[inline(always)]
    fn scan_block(&self, block: &[u8], matrix: &mut CountMatrix, stats: &mut ScanStats) {
        let mut pos = 0;
        while pos < block.len() {
            let (record, next) = self.format.next_record(block, pos);
            pos = next;
            let record = match record {
                Some(record) => record,
                None => {
                    stats.malformed += 1;
                    continue;
                }
            };
            match (self.paths.lookup(record.slug), self.calendar.lookup(record.date)) {
                (Some(path_id), Some(date_id)) => {
                    matrix.increment(path_id, date_id);
                    stats.records += 1;
                }
                _ => stats.unresolved += 1,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn line(slug: &str, date: &str) -> String {
        format!("https://stitcher.io/blog/{},{}T01:16:58+00:00\n", slug, date)
    }

    struct Fixture {
        format: LineFormat,
        paths: PathDictionary,
        calendar: Calendar,
    }

    impl Fixture {
        fn new(slugs: &[&str]) -> Self {
            let mut paths = PathDictionary::new();
            for slug in slugs {
                paths.insert(slug);
            }
            Self {
                format: LineFormat::default(),
                paths,
                calendar: Calendar::new(2024, 2024),
            }
        }

        fn context(&self, read_block_size: usize) -> ScanContext<'_> {
            ScanContext {
                format: &self.format,
                paths: &self.paths,
                calendar: &self.calendar,
                read_block_size,
            }
        }
    }

    fn scan(ctx: &ScanContext, data: &[u8], start: u64, end: u64) -> (CountMatrix, ScanStats) {
        let mut matrix = ctx.new_matrix();
        let stats = ctx
            .scan_range(&mut Cursor::new(data), start, end, &mut matrix)
            .unwrap();
        (matrix, stats)
    }

    #[test]
    fn block_size_does_not_change_counts() {
        let fixture = Fixture::new(&["a", "bb", "a-much-longer-slug-than-the-others"]);
        let mut data = String::new();
        for i in 0..200 {
            let slug = ["a", "bb", "a-much-longer-slug-than-the-others"][i % 3];
            data.push_str(&line(slug, &format!("2024-06-{:02}", i % 30 + 1)));
        }
        let data = data.into_bytes();
        let (expected, expected_stats) = scan(&fixture.context(1 << 20), &data, 0, data.len() as u64);
        assert_eq!(expected_stats.records, 200);
        for block in [1, 7, 63, 64, 65, 100, 4096].iter() {
            let (matrix, stats) = scan(&fixture.context(*block), &data, 0, data.len() as u64);
            assert_eq!(matrix, expected, "block size {}", block);
            assert_eq!(stats, expected_stats);
        }
    }

    #[test]
    fn misses_are_skipped() {
        let fixture = Fixture::new(&["a"]);
        let mut data = line("a", "2024-06-01");
        data.push_str(&line("unknown", "2024-06-01"));
        data.push_str(&line("a", "2019-06-01"));
        data.push_str("garbage\n");
        data.push_str(&line("a", "2024-06-01"));
        let data = data.into_bytes();
        let (matrix, stats) = scan(&fixture.context(64), &data, 0, data.len() as u64);
        let june_1 = fixture.calendar.lookup(b"2024-06-01").unwrap();
        assert_eq!(matrix.get(0, june_1), 2);
        assert_eq!(matrix.total(), 2);
        assert_eq!(
            stats,
            ScanStats {
                records: 2,
                unresolved: 2,
                malformed: 1,
                truncated: 0,
            }
        );
    }

    #[test]
    fn unterminated_final_line_is_not_counted() {
        let fixture = Fixture::new(&["a"]);
        let mut data = line("a", "2024-06-01");
        data.push_str(line("a", "2024-06-02").trim_end());
        let data = data.into_bytes();
        for block in [16, 1 << 20].iter() {
            let (matrix, stats) = scan(&fixture.context(*block), &data, 0, data.len() as u64);
            assert_eq!(matrix.total(), 1);
            assert_eq!(stats.records, 1);
            assert_eq!(stats.truncated, line("a", "2024-06-02").len() as u64 - 1);
        }

        let partial = line("a", "2024-06-01").trim_end().to_owned().into_bytes();
        let (matrix, _) = scan(&fixture.context(8), &partial, 0, partial.len() as u64);
        assert_eq!(matrix.total(), 0);
    }

    #[test]
    fn adjacent_ranges_count_the_split_record_once() {
        let fixture = Fixture::new(&["a", "b"]);
        let mut data = String::new();
        for i in 0..10 {
            data.push_str(&line(if i % 2 == 0 { "a" } else { "b" }, "2024-06-01"));
        }
        let data = data.into_bytes();
        let line_len = data.len() / 10;
        let ctx = fixture.context(32);
        for split_line in 0..=10 {
            let split = (split_line * line_len) as u64;
            let (mut left, _) = scan(&ctx, &data, 0, split);
            let (right, _) = scan(&ctx, &data, split, data.len() as u64);
            left.merge(&right).unwrap();
            assert_eq!(left.total(), 10);
        }
    }

    #[test]
    fn empty_range() {
        let fixture = Fixture::new(&["a"]);
        let data = line("a", "2024-06-01").into_bytes();
        let (matrix, stats) = scan(&fixture.context(64), &data, 5, 5);
        assert_eq!(matrix.total(), 0);
        assert_eq!(stats, ScanStats::default());
    }
}
