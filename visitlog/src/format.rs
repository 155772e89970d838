use memchr::{memchr, memchr2};
use serde_derive::{Deserialize, Serialize};
use std::io::{Error, ErrorKind, Result};

/// The fixed-offset layout of a single access log line.
///
/// A line is `<leading field><slug><separator><trailing region>\n`, where the
/// leading field and the trailing region have a fixed width and the date is a
/// fixed-width field inside the trailing region.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LineFormat {
    /// Width of the ignored leading field, the slug starts right after it
    pub leading_width: usize,
    /// The byte between the slug and the trailing region
    pub separator: char,
    /// Width of everything between the separator and the newline
    pub trailing_width: usize,
    /// Width of the date field, either 10 (`YYYY-MM-DD`) or 8 (`YY-MM-DD`)
    pub date_width: usize,
    /// Where the date field starts inside the trailing region
    pub date_offset: usize,
}

impl Default for LineFormat {
    fn default() -> Self {
        // https://stitcher.io/blog/<slug>,2024-01-24T01:16:58+00:00
        Self {
            leading_width: 25,
            separator: ',',
            trailing_width: 25,
            date_width: 10,
            date_offset: 0,
        }
    }
}

/// The two fields of a record, borrowed from the read buffer
#[derive(Debug, PartialEq, Eq)]
pub struct Record<'a> {
    pub slug: &'a [u8],
    pub date: &'a [u8],
}

impl LineFormat {
    /// Check the layout constants are consistent with each other
    pub fn validate(&self) -> Result<()> {
        if !self.separator.is_ascii() || self.separator == '\n' {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                format!("Invalid field separator {:?}", self.separator),
            ));
        }
        if self.date_width != 8 && self.date_width != 10 {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                format!(
                    "Unsupported date width {}, expecting 8 or 10",
                    self.date_width
                ),
            ));
        }
        if self.date_offset + self.date_width > self.trailing_width {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "The date field doesn't fit in the trailing region",
            ));
        }
        Ok(())
    }

    #[inline(always)]
    pub fn separator_byte(&self) -> u8 {
        self.separator as u8
    }

    /// The shortest line (newline excluded) this format can parse
    pub fn min_line_len(&self) -> usize {
        self.leading_width + 2 + self.trailing_width
    }

    /// Parse the record starting at `pos`.
    ///
    /// `block` must end with a newline. Returns the record, or `None` when the
    /// line doesn't follow the layout, together with the offset of the next line.
    #[inline(always)]
    pub fn next_record<'a>(&self, block: &'a [u8], pos: usize) -> (Option<Record<'a>>, usize) {
        let slug_start = pos + self.leading_width;
        if slug_start >= block.len() {
            return (None, skip_line(block, pos));
        }
        if let Some(nl) = memchr(b'\n', &block[pos..slug_start]) {
            return (None, pos + nl + 1);
        }
        let sep = match memchr2(self.separator_byte(), b'\n', &block[slug_start..]) {
            Some(offset) => slug_start + offset,
            None => return (None, block.len()),
        };
        if block[sep] == b'\n' {
            return (None, sep + 1);
        }
        let eol = match memchr(b'\n', &block[sep + 1..]) {
            Some(offset) => sep + 1 + offset,
            None => return (None, block.len()),
        };
        if sep == slug_start || eol - sep - 1 != self.trailing_width {
            return (None, eol + 1);
        }
        let date_start = sep + 1 + self.date_offset;
        (
            Some(Record {
                slug: &block[slug_start..sep],
                date: &block[date_start..date_start + self.date_width],
            }),
            eol + 1,
        )
    }

    /// Iterate all records of a buffer up to its last complete line. A trailing
    /// partial line is ignored, malformed lines are yielded as `None`.
    pub fn records<'a>(&'a self, buf: &'a [u8]) -> Records<'a> {
        let block = match memchr::memrchr(b'\n', buf) {
            Some(last_nl) => &buf[..=last_nl],
            None => &buf[..0],
        };
        Records {
            format: self,
            block,
            pos: 0,
        }
    }

    /// Make sure the first line of the input actually has this layout, so a
    /// wrong set of constants fails loudly instead of producing an empty report.
    pub fn validate_first_record(&self, head: &[u8]) -> Result<()> {
        let first_line = match memchr(b'\n', head) {
            Some(nl) => &head[..=nl],
            None => return Ok(()),
        };
        match self.next_record(first_line, 0) {
            (Some(_), _) => Ok(()),
            (None, _) => Err(Error::new(
                ErrorKind::InvalidData,
                format!(
                    "The first record ({} bytes) doesn't match the line format: expecting at least {} bytes, \
                     a {:?} after byte {} and {} bytes after it",
                    first_line.len() - 1,
                    self.min_line_len(),
                    self.separator,
                    self.leading_width,
                    self.trailing_width,
                ),
            )),
        }
    }
}

#[inline(always)]
fn skip_line(block: &[u8], pos: usize) -> usize {
    memchr(b'\n', &block[pos..]).map_or(block.len(), |nl| pos + nl + 1)
}

/// Iterator over the complete lines of a buffer
pub struct Records<'a> {
    format: &'a LineFormat,
    block: &'a [u8],
    pos: usize,
}

impl<'a> Iterator for Records<'a> {
    type Item = Option<Record<'a>>;
    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.block.len() {
            return None;
        }
        let (record, next) = self.format.next_record(self.block, self.pos);
        self.pos = next;
        Some(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINE: &[u8] = b"https://stitcher.io/blog/php-81-enums,2024-01-24T01:16:58+00:00\n";

    #[test]
    fn extracts_slug_and_date() {
        let format = LineFormat::default();
        let (record, next) = format.next_record(LINE, 0);
        let record = record.unwrap();
        assert_eq!(record.slug, b"php-81-enums");
        assert_eq!(record.date, b"2024-01-24");
        assert_eq!(next, LINE.len());
    }

    #[test]
    fn short_date_offset() {
        let format = LineFormat {
            date_width: 8,
            date_offset: 2,
            ..Default::default()
        };
        format.validate().unwrap();
        let (record, _) = format.next_record(LINE, 0);
        assert_eq!(record.unwrap().date, b"24-01-24");
    }

    #[test]
    fn malformed_lines_are_skipped_to_the_next_line() {
        let format = LineFormat::default();
        let mut buf = b"short\n".to_vec();
        buf.extend_from_slice(b"https://stitcher.io/blog/no-separator-here-at-all-really\n");
        buf.extend_from_slice(b"https://stitcher.io/blog/bad-trailer,2024-01-24\n");
        buf.extend_from_slice(LINE);
        let parsed: Vec<_> = format.records(&buf).collect();
        assert_eq!(parsed.len(), 4);
        assert!(parsed[..3].iter().all(Option::is_none));
        assert_eq!(parsed[3].as_ref().unwrap().slug, b"php-81-enums");
    }

    #[test]
    fn partial_tail_is_ignored() {
        let format = LineFormat::default();
        let mut buf = LINE.to_vec();
        buf.extend_from_slice(&LINE[..30]);
        assert_eq!(format.records(&buf).count(), 1);
        assert_eq!(format.records(&LINE[..30]).count(), 0);
    }

    #[test]
    fn validation() {
        assert!(LineFormat::default().validate().is_ok());
        let bad_width = LineFormat {
            date_width: 9,
            ..Default::default()
        };
        assert!(bad_width.validate().is_err());
        let bad_offset = LineFormat {
            date_offset: 20,
            ..Default::default()
        };
        assert!(bad_offset.validate().is_err());

        let format = LineFormat::default();
        assert!(format.validate_first_record(LINE).is_ok());
        assert!(format.validate_first_record(b"").is_ok());
        let err = format
            .validate_first_record(b"2024-01-24,/blog/foo\n")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidData);
    }
}
