use std::io::{Error, ErrorKind, Read, Result, Write};

/// Number of cells moved per read/write call on a transport
const TRANSPORT_BATCH: usize = 16 * 1024;

/// The dense path x date hit counter.
///
/// Cells are stored row-major, one row per path id, addressed as
/// `path_id * date_count + date_id`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CountMatrix {
    cells: Vec<u32>,
    path_count: usize,
    date_count: usize,
}

impl CountMatrix {
    pub fn new(path_count: usize, date_count: usize) -> Self {
        Self {
            cells: vec![0; path_count * date_count],
            path_count,
            date_count,
        }
    }

    pub fn path_count(&self) -> usize {
        self.path_count
    }

    pub fn date_count(&self) -> usize {
        self.date_count
    }

    #[inline(always)]
    pub fn increment(&mut self, path_id: u32, date_id: u32) {
        debug_assert!((path_id as usize) < self.path_count);
        debug_assert!((date_id as usize) < self.date_count);
        self.cells[path_id as usize * self.date_count + date_id as usize] += 1;
    }

    pub fn get(&self, path_id: u32, date_id: u32) -> u32 {
        self.cells[path_id as usize * self.date_count + date_id as usize]
    }

    /// The counters of one path, indexed by date id
    pub fn row(&self, path_id: u32) -> &[u32] {
        let begin = path_id as usize * self.date_count;
        &self.cells[begin..begin + self.date_count]
    }

    pub fn total(&self) -> u64 {
        self.cells.iter().map(|&c| c as u64).sum()
    }

    fn check_shape(&self, path_count: usize, date_count: usize) -> Result<()> {
        if self.path_count != path_count || self.date_count != date_count {
            return Err(Error::new(
                ErrorKind::InvalidData,
                format!(
                    "Count matrix shape mismatch: {}x{} vs {}x{}",
                    self.path_count, self.date_count, path_count, date_count
                ),
            ));
        }
        Ok(())
    }

    /// Add another matrix of the same shape into this one
    pub fn merge(&mut self, other: &CountMatrix) -> Result<()> {
        self.check_shape(other.path_count, other.date_count)?;
        for (acc, &value) in self.cells.iter_mut().zip(other.cells.iter()) {
            *acc += value;
        }
        Ok(())
    }

    /// Serialize the cells as little-endian `u32`s
    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<()> {
        let mut buf = Vec::with_capacity(TRANSPORT_BATCH * 4);
        for batch in self.cells.chunks(TRANSPORT_BATCH) {
            buf.clear();
            for value in batch {
                buf.extend_from_slice(&value.to_le_bytes());
            }
            writer.write_all(&buf)?;
        }
        writer.flush()
    }

    /// Read a serialized matrix of this shape and add it into this one.
    ///
    /// The payload must contain exactly one `u32` per cell, a short or an
    /// oversized payload is an error.
    pub fn accumulate_from<R: Read>(&mut self, mut reader: R) -> Result<()> {
        let mut buf = vec![0u8; TRANSPORT_BATCH * 4];
        for batch in self.cells.chunks_mut(TRANSPORT_BATCH) {
            let bytes = &mut buf[..batch.len() * 4];
            reader.read_exact(bytes).map_err(|e| {
                if e.kind() == ErrorKind::UnexpectedEof {
                    Error::new(ErrorKind::UnexpectedEof, "Truncated count matrix payload")
                } else {
                    e
                }
            })?;
            for (acc, raw) in batch.iter_mut().zip(bytes.chunks_exact(4)) {
                *acc += u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
            }
        }
        let mut probe = [0u8; 1];
        if reader.read(&mut probe)? != 0 {
            return Err(Error::new(
                ErrorKind::InvalidData,
                "Count matrix payload is larger than expected",
            ));
        }
        Ok(())
    }
}
