use log::debug;
use rustc_hash::FxHashMap;
use serde_derive::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Read, Result};

use crate::format::LineFormat;

/// A record of the supplementary path source, anything that can name a path
pub trait PathRecord {
    /// The path identifier, e.g. `/blog/some-slug`
    fn path_id(&self) -> &str;
}

impl PathRecord for String {
    fn path_id(&self) -> &str {
        self.as_str()
    }
}

impl PathRecord for &'_ str {
    fn path_id(&self) -> &str {
        self
    }
}

/// Read a list of known paths, one per line. Blank lines and lines starting
/// with `#` are skipped.
pub fn read_path_list<R: Read>(file: R) -> Result<Vec<String>> {
    let fp = BufReader::new(file);
    let mut paths = vec![];
    for line in fp.lines() {
        let line = line?;
        let path = line.trim();
        if path.is_empty() || path.starts_with('#') {
            continue;
        }
        paths.push(path.to_owned());
    }
    Ok(paths)
}

/// The path slug dictionary, ids are assigned in first-seen order.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct PathDictionary {
    #[serde(skip)]
    s2i_map: FxHashMap<Box<[u8]>, u32>,
    i2s_map: Vec<String>,
}

impl PathDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect the slugs of every complete record in the discovery window.
    /// Lines that don't follow the format, or whose slug isn't UTF-8, are ignored.
    pub fn discover(window: &[u8], format: &LineFormat) -> Self {
        let mut ret = Self::new();
        let mut skipped = 0usize;
        for record in format.records(window) {
            match record.map(|r| std::str::from_utf8(r.slug)) {
                Some(Ok(slug)) => {
                    ret.insert(slug);
                }
                _ => skipped += 1,
            }
        }
        debug!(
            "Discovered {} paths in a {} byte window ({} lines skipped)",
            ret.len(),
            window.len(),
            skipped
        );
        ret
    }

    /// Add the paths of the supplementary source that the log prefix didn't
    /// mention. The route prefix is stripped from identifiers that carry it.
    pub fn extend_from_source<I, R>(&mut self, source: I, route_prefix: &str) -> usize
    where
        I: IntoIterator<Item = R>,
        R: PathRecord,
    {
        let before = self.len();
        for record in source {
            let id = record.path_id();
            let slug = id.strip_prefix(route_prefix).unwrap_or(id);
            if !slug.is_empty() {
                self.insert(slug);
            }
        }
        self.len() - before
    }

    /// Get the id of the slug, assigning the next one if it's new
    pub fn insert(&mut self, slug: &str) -> u32 {
        self.ensure_s2i_map();
        if let Some(&id) = self.s2i_map.get(slug.as_bytes()) {
            return id;
        }
        let id = self.i2s_map.len() as u32;
        self.s2i_map.insert(slug.as_bytes().into(), id);
        self.i2s_map.push(slug.to_owned());
        id
    }

    #[inline(always)]
    pub fn lookup(&self, slug: &[u8]) -> Option<u32> {
        self.s2i_map.get(slug).copied()
    }

    pub fn slug(&self, id: u32) -> Option<&str> {
        self.i2s_map.get(id as usize).map(AsRef::as_ref)
    }

    pub fn len(&self) -> usize {
        self.i2s_map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.i2s_map.is_empty()
    }

    /// All slugs in id order
    pub fn iter(&self) -> impl Iterator<Item = &str> + '_ {
        self.i2s_map.iter().map(AsRef::as_ref)
    }

    /// Rebuild the reverse map, which is not part of the serialized form
    #[inline(always)]
    pub(crate) fn ensure_s2i_map(&mut self) {
        if self.s2i_map.len() == self.i2s_map.len() {
            return;
        }
        self.s2i_map.clear();
        for (idx, slug) in self.i2s_map.iter().enumerate() {
            self.s2i_map.insert(slug.as_bytes().into(), idx as u32);
        }
    }

    /// Pretty print the dictionary in JSON format
    pub fn pretty_print(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
