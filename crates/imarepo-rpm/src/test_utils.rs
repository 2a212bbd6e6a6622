//! Builders for synthetic RPM packages, used by tests across the workspace.
//!
//! [`RpmFixture`] produces a byte-exact minimal package: a valid lead, an
//! empty signature header, and a main header carrying the identity and file
//! tags. No payload is attached; callers that care about payload handling
//! append their own trailing bytes.

use std::{fs, io, path::Path};

use crate::header::{HEADER_MAGIC, LEAD_MAGIC};

const RPMTAG_NAME: u32 = 1000;
const RPMTAG_VERSION: u32 = 1001;
const RPMTAG_RELEASE: u32 = 1002;
const RPMTAG_EPOCH: u32 = 1003;
const RPMTAG_ARCH: u32 = 1022;
const RPMTAG_FILEDIGESTS: u32 = 1035;
const RPMTAG_SOURCEPACKAGE: u32 = 1106;
const RPMTAG_DIRINDEXES: u32 = 1116;
const RPMTAG_BASENAMES: u32 = 1117;
const RPMTAG_DIRNAMES: u32 = 1118;

const RPM_INT32_TYPE: u32 = 4;
const RPM_STRING_TYPE: u32 = 6;
const RPM_STRING_ARRAY_TYPE: u32 = 8;

/// Builder for a minimal, well-formed RPM package file.
#[derive(Debug, Clone)]
pub struct RpmFixture {
    name: String,
    version: String,
    release: String,
    arch: String,
    epoch: Option<u32>,
    source: bool,
    files: Vec<(String, String)>,
}

impl RpmFixture {
    pub fn new(name: &str, version: &str, release: &str, arch: &str) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            release: release.to_string(),
            arch: arch.to_string(),
            epoch: None,
            source: false,
            files: Vec::new(),
        }
    }

    pub fn epoch(mut self, epoch: u32) -> Self {
        self.epoch = Some(epoch);
        self
    }

    pub fn source(mut self) -> Self {
        self.source = true;
        self
    }

    /// Adds a file entry. `path` must be absolute; `digest` may be empty to
    /// mimic a file without a recorded measurement.
    pub fn file(mut self, path: &str, digest: &str) -> Self {
        self.files.push((path.to_string(), digest.to_string()));
        self
    }

    /// Serializes the package to bytes.
    pub fn build(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&self.lead());
        out.extend_from_slice(&header_section(&[]));
        out.extend_from_slice(&header_section(&self.main_entries()));
        out
    }

    /// Serializes the package and writes it to `path`.
    pub fn write_to<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        fs::write(path, self.build())
    }

    fn lead(&self) -> [u8; 96] {
        let mut lead = [0u8; 96];
        lead[..4].copy_from_slice(&LEAD_MAGIC);
        lead[4] = 3; // format version 3.0
        let pkg_type: u16 = if self.source { 1 } else { 0 };
        lead[6..8].copy_from_slice(&pkg_type.to_be_bytes());
        let label = format!("{}-{}-{}", self.name, self.version, self.release);
        let label = label.as_bytes();
        let len = label.len().min(65);
        lead[10..10 + len].copy_from_slice(&label[..len]);
        lead[76..78].copy_from_slice(&1u16.to_be_bytes()); // osnum: linux
        lead[78..80].copy_from_slice(&5u16.to_be_bytes()); // header-style signature
        lead
    }

    fn main_entries(&self) -> Vec<TagData> {
        let mut entries = vec![
            string_tag(RPMTAG_NAME, &self.name),
            string_tag(RPMTAG_VERSION, &self.version),
            string_tag(RPMTAG_RELEASE, &self.release),
            string_tag(RPMTAG_ARCH, &self.arch),
        ];
        if let Some(epoch) = self.epoch {
            entries.push(int32_tag(RPMTAG_EPOCH, &[epoch]));
        }
        if self.source {
            entries.push(int32_tag(RPMTAG_SOURCEPACKAGE, &[1]));
        }

        if !self.files.is_empty() {
            let mut dirnames: Vec<String> = Vec::new();
            let mut dirindexes = Vec::new();
            let mut basenames = Vec::new();
            let mut digests = Vec::new();
            for (path, digest) in &self.files {
                let split = path.rfind('/').map_or(0, |pos| pos + 1);
                let (dir, base) = path.split_at(split);
                let index = match dirnames.iter().position(|d| d == dir) {
                    Some(index) => index,
                    None => {
                        dirnames.push(dir.to_string());
                        dirnames.len() - 1
                    }
                };
                dirindexes.push(index as u32);
                basenames.push(base.to_string());
                digests.push(digest.clone());
            }
            entries.push(string_array_tag(RPMTAG_FILEDIGESTS, &digests));
            entries.push(int32_tag(RPMTAG_DIRINDEXES, &dirindexes));
            entries.push(string_array_tag(RPMTAG_BASENAMES, &basenames));
            entries.push(string_array_tag(RPMTAG_DIRNAMES, &dirnames));
        }

        entries.sort_by_key(|entry| entry.tag);
        entries
    }
}

struct TagData {
    tag: u32,
    kind: u32,
    count: u32,
    data: Vec<u8>,
}

fn string_tag(tag: u32, value: &str) -> TagData {
    let mut data = value.as_bytes().to_vec();
    data.push(0);
    TagData {
        tag,
        kind: RPM_STRING_TYPE,
        count: 1,
        data,
    }
}

fn string_array_tag(tag: u32, values: &[String]) -> TagData {
    let mut data = Vec::new();
    for value in values {
        data.extend_from_slice(value.as_bytes());
        data.push(0);
    }
    TagData {
        tag,
        kind: RPM_STRING_ARRAY_TYPE,
        count: values.len() as u32,
        data,
    }
}

fn int32_tag(tag: u32, values: &[u32]) -> TagData {
    let mut data = Vec::new();
    for value in values {
        data.extend_from_slice(&value.to_be_bytes());
    }
    TagData {
        tag,
        kind: RPM_INT32_TYPE,
        count: values.len() as u32,
        data,
    }
}

fn header_section(entries: &[TagData]) -> Vec<u8> {
    let mut index = Vec::new();
    let mut store = Vec::new();
    for entry in entries {
        // INT32 data must be 4-byte aligned within the store.
        if entry.kind == RPM_INT32_TYPE {
            while store.len() % 4 != 0 {
                store.push(0);
            }
        }
        index.extend_from_slice(&entry.tag.to_be_bytes());
        index.extend_from_slice(&entry.kind.to_be_bytes());
        index.extend_from_slice(&(store.len() as u32).to_be_bytes());
        index.extend_from_slice(&entry.count.to_be_bytes());
        store.extend_from_slice(&entry.data);
    }

    let mut out = Vec::with_capacity(16 + index.len() + store.len());
    out.extend_from_slice(&HEADER_MAGIC);
    out.push(0x01);
    out.extend_from_slice(&[0u8; 4]);
    out.extend_from_slice(&(entries.len() as u32).to_be_bytes());
    out.extend_from_slice(&(store.len() as u32).to_be_bytes());
    out.extend_from_slice(&index);
    out.extend_from_slice(&store);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_layout() {
        let bytes = RpmFixture::new("a", "1.0", "1", "noarch").build();
        assert_eq!(&bytes[..4], &LEAD_MAGIC);
        // Empty signature header directly after the lead.
        assert_eq!(&bytes[96..99], &HEADER_MAGIC);
        // Main header follows the empty signature header (16 bytes, no pad).
        assert_eq!(&bytes[112..115], &HEADER_MAGIC);
    }
}
