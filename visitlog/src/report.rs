use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::ser::{Formatter, PrettyFormatter};
use std::io::{BufWriter, Result, Write};

use crate::{calendar::Calendar, dict::PathDictionary, matrix::CountMatrix};

/// Pretty printer with 4 space indentation that also escapes `/` as `\/`
struct ReportFormatter<'a> {
    inner: PrettyFormatter<'a>,
}

impl<'a> ReportFormatter<'a> {
    fn new() -> Self {
        Self {
            inner: PrettyFormatter::with_indent(b"    "),
        }
    }
}

impl<'a> Formatter for ReportFormatter<'a> {
    fn begin_object<W: ?Sized + Write>(&mut self, writer: &mut W) -> Result<()> {
        self.inner.begin_object(writer)
    }

    fn end_object<W: ?Sized + Write>(&mut self, writer: &mut W) -> Result<()> {
        self.inner.end_object(writer)
    }

    fn begin_object_key<W: ?Sized + Write>(&mut self, writer: &mut W, first: bool) -> Result<()> {
        self.inner.begin_object_key(writer, first)
    }

    fn begin_object_value<W: ?Sized + Write>(&mut self, writer: &mut W) -> Result<()> {
        self.inner.begin_object_value(writer)
    }

    fn end_object_value<W: ?Sized + Write>(&mut self, writer: &mut W) -> Result<()> {
        self.inner.end_object_value(writer)
    }

    fn write_string_fragment<W: ?Sized + Write>(&mut self, writer: &mut W, fragment: &str) -> Result<()> {
        let bytes = fragment.as_bytes();
        let mut start = 0;
        for (idx, &b) in bytes.iter().enumerate() {
            if b == b'/' {
                writer.write_all(&bytes[start..idx])?;
                writer.write_all(b"\\/")?;
                start = idx + 1;
            }
        }
        writer.write_all(&bytes[start..])
    }
}

/// The non-zero cells of one path, in date id order
struct DateCounts<'a> {
    row: &'a [u32],
    calendar: &'a Calendar,
}

impl Serialize for DateCounts<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        for (date_id, &count) in self.row.iter().enumerate() {
            if count == 0 {
                continue;
            }
            if let Some(label) = self.calendar.label(date_id as u32) {
                map.serialize_entry(label, &count)?;
            }
        }
        map.end()
    }
}

/// The whole report, generated lazily while it's being serialized
pub struct Report<'a> {
    pub matrix: &'a CountMatrix,
    pub paths: &'a PathDictionary,
    pub calendar: &'a Calendar,
    pub route_prefix: &'a str,
}

impl Serialize for Report<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        let mut key = String::new();
        for (path_id, slug) in self.paths.iter().enumerate() {
            let row = self.matrix.row(path_id as u32);
            if row.iter().all(|&count| count == 0) {
                continue;
            }
            key.clear();
            key.push_str(self.route_prefix);
            key.push_str(slug);
            map.serialize_entry(
                &key,
                &DateCounts {
                    row,
                    calendar: self.calendar,
                },
            )?;
        }
        map.end()
    }
}

impl Report<'_> {
    /// Stream the report into `sink` through a `buffer_size` byte buffer.
    ///
    /// Paths are emitted in dictionary order and dates in chronological order,
    /// paths without any hit are left out.
    pub fn write_to<W: Write>(&self, sink: W, buffer_size: usize) -> Result<()> {
        let mut writer = BufWriter::with_capacity(buffer_size, sink);
        let mut serializer = serde_json::Serializer::with_formatter(&mut writer, ReportFormatter::new());
        self.serialize(&mut serializer)?;
        writer.flush()
    }
}
