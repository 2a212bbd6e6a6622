//! RPM lead and header section parsing.
//!
//! An RPM package starts with a 96-byte lead, followed by two "header
//! structures" (signature header and main header), followed by the
//! compressed payload. Each header structure is a 16-byte preamble, an
//! index of 16-byte entries, and a data store the entries point into.
//! Everything here reads forward-only, so the payload is never consumed.

use std::{
    fs::File,
    io::{BufReader, ErrorKind, Read},
    path::Path,
};

use crate::error::{ErrorContext, Result, RpmError};

/// Magic bytes opening the 96-byte lead section.
pub const LEAD_MAGIC: [u8; 4] = [0xed, 0xab, 0xee, 0xdb];

/// Magic bytes opening a header structure (signature or main header).
pub const HEADER_MAGIC: [u8; 3] = [0x8e, 0xad, 0xe8];

/// File extension of RPM packages.
pub const RPM_EXTENSION: &str = "rpm";

const LEAD_SIZE: usize = 96;
const PREAMBLE_SIZE: usize = 16;
const INDEX_ENTRY_SIZE: usize = 16;

// Limits from the rpm header format; anything beyond these is corrupt.
const MAX_INDEX_ENTRIES: u32 = 0x0000_ffff;
const MAX_STORE_SIZE: u32 = 0x1000_0000;

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
const RPM_I18NSTRING_TYPE: u32 = 9;

/// One file entry from a package header.
///
/// The digest is carried verbatim; an empty or all-zero digest means the
/// file has no measurement and is filtered out downstream, not here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpmFileDigest {
    /// Absolute install path of the file.
    pub path: String,
    /// Hex-encoded content digest recorded at build time.
    pub digest: String,
}

/// Identity fields and file digest table of one RPM package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpmPackage {
    pub name: String,
    pub arch: String,
    pub epoch: Option<u32>,
    pub version: String,
    pub release: String,
    pub is_source: bool,
    pub files: Vec<RpmFileDigest>,
}

#[derive(Debug)]
struct IndexEntry {
    tag: u32,
    kind: u32,
    offset: usize,
    count: usize,
}

#[derive(Debug)]
struct Header {
    entries: Vec<IndexEntry>,
    store: Vec<u8>,
}

fn read_section<R: Read>(reader: &mut R, buf: &mut [u8], section: &'static str) -> Result<()> {
    reader.read_exact(buf).map_err(|err| {
        match err.kind() {
            ErrorKind::UnexpectedEof => RpmError::Truncated { section },
            _ => {
                RpmError::IoError {
                    action: format!("reading {section}"),
                    source: err,
                }
            }
        }
    })
}

fn be_u32(buf: &[u8]) -> u32 {
    u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]])
}

fn read_header<R: Read>(reader: &mut R, path: &Path, section: &'static str) -> Result<Header> {
    let mut preamble = [0u8; PREAMBLE_SIZE];
    read_section(reader, &mut preamble, section)?;

    if preamble[..3] != HEADER_MAGIC || preamble[3] != 0x01 {
        return Err(RpmError::BadMagic {
            path: path.to_path_buf(),
            section,
        });
    }

    let nindex = be_u32(&preamble[8..12]);
    let store_size = be_u32(&preamble[12..16]);
    if nindex > MAX_INDEX_ENTRIES || store_size > MAX_STORE_SIZE {
        return Err(RpmError::MalformedHeader(format!(
            "{section} claims {nindex} index entries and a {store_size} byte store"
        )));
    }

    let mut index = vec![0u8; nindex as usize * INDEX_ENTRY_SIZE];
    read_section(reader, &mut index, section)?;
    let mut store = vec![0u8; store_size as usize];
    read_section(reader, &mut store, section)?;

    let entries = index
        .chunks_exact(INDEX_ENTRY_SIZE)
        .map(|chunk| {
            let entry = IndexEntry {
                tag: be_u32(&chunk[0..4]),
                kind: be_u32(&chunk[4..8]),
                offset: be_u32(&chunk[8..12]) as usize,
                count: be_u32(&chunk[12..16]) as usize,
            };
            if entry.offset > store.len() {
                return Err(RpmError::MalformedHeader(format!(
                    "tag {} points past the end of the {section} store",
                    entry.tag
                )));
            }
            Ok(entry)
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Header { entries, store })
}

fn read_cstr(store: &[u8], offset: usize, tag: u32) -> Result<(String, usize)> {
    let slice = &store[offset..];
    let end = slice.iter().position(|&b| b == 0).ok_or_else(|| {
        RpmError::MalformedHeader(format!("unterminated string for tag {tag}"))
    })?;
    let value = std::str::from_utf8(&slice[..end])
        .map_err(|_| RpmError::MalformedHeader(format!("invalid UTF-8 for tag {tag}")))?;
    Ok((value.to_string(), offset + end + 1))
}

impl Header {
    fn find(&self, tag: u32) -> Option<&IndexEntry> {
        self.entries.iter().find(|entry| entry.tag == tag)
    }

    fn has_tag(&self, tag: u32) -> bool {
        self.find(tag).is_some()
    }

    /// Looks up a STRING tag. I18NSTRING tables resolve to their first
    /// (canonical locale) entry, which is what librpm returns by default.
    fn string(&self, tag: u32) -> Result<Option<String>> {
        let Some(entry) = self.find(tag) else {
            return Ok(None);
        };
        if entry.kind != RPM_STRING_TYPE && entry.kind != RPM_I18NSTRING_TYPE {
            return Err(RpmError::MalformedHeader(format!(
                "tag {tag} is not a string (type {})",
                entry.kind
            )));
        }
        let (value, _) = read_cstr(&self.store, entry.offset, tag)?;
        Ok(Some(value))
    }

    fn string_array(&self, tag: u32) -> Result<Option<Vec<String>>> {
        let Some(entry) = self.find(tag) else {
            return Ok(None);
        };
        if entry.kind != RPM_STRING_ARRAY_TYPE {
            return Err(RpmError::MalformedHeader(format!(
                "tag {tag} is not a string array (type {})",
                entry.kind
            )));
        }
        let mut values = Vec::with_capacity(entry.count);
        let mut offset = entry.offset;
        for _ in 0..entry.count {
            let (value, next) = read_cstr(&self.store, offset, tag)?;
            values.push(value);
            offset = next;
        }
        Ok(Some(values))
    }

    fn u32_array(&self, tag: u32) -> Result<Option<Vec<u32>>> {
        let Some(entry) = self.find(tag) else {
            return Ok(None);
        };
        if entry.kind != RPM_INT32_TYPE {
            return Err(RpmError::MalformedHeader(format!(
                "tag {tag} is not an int32 array (type {})",
                entry.kind
            )));
        }
        let end = entry
            .offset
            .checked_add(entry.count * 4)
            .filter(|&end| end <= self.store.len())
            .ok_or_else(|| {
                RpmError::MalformedHeader(format!("tag {tag} overruns the store"))
            })?;
        let values = self.store[entry.offset..end]
            .chunks_exact(4)
            .map(be_u32)
            .collect();
        Ok(Some(values))
    }

    fn u32_value(&self, tag: u32) -> Result<Option<u32>> {
        Ok(self.u32_array(tag)?.and_then(|values| values.first().copied()))
    }

    fn required_string(&self, tag: u32, label: &'static str) -> Result<String> {
        self.string(tag)?.ok_or(RpmError::MissingTag(label))
    }
}

fn package_files(header: &Header) -> Result<Vec<RpmFileDigest>> {
    let Some(basenames) = header.string_array(RPMTAG_BASENAMES)? else {
        return Ok(Vec::new());
    };
    let dirnames = header
        .string_array(RPMTAG_DIRNAMES)?
        .ok_or_else(|| RpmError::MalformedHeader("BASENAMES without DIRNAMES".into()))?;
    let dirindexes = header
        .u32_array(RPMTAG_DIRINDEXES)?
        .ok_or_else(|| RpmError::MalformedHeader("BASENAMES without DIRINDEXES".into()))?;
    // Old packages built without file digests simply lack the tag.
    let digests = header.string_array(RPMTAG_FILEDIGESTS)?.unwrap_or_default();

    if dirindexes.len() != basenames.len() {
        return Err(RpmError::MalformedHeader(format!(
            "{} basenames but {} dirindexes",
            basenames.len(),
            dirindexes.len()
        )));
    }
    if !digests.is_empty() && digests.len() != basenames.len() {
        return Err(RpmError::MalformedHeader(format!(
            "{} basenames but {} file digests",
            basenames.len(),
            digests.len()
        )));
    }

    basenames
        .into_iter()
        .zip(dirindexes)
        .enumerate()
        .map(|(i, (basename, dirindex))| {
            let dirname = dirnames.get(dirindex as usize).ok_or_else(|| {
                RpmError::MalformedHeader(format!("dirindex {dirindex} out of range"))
            })?;
            Ok(RpmFileDigest {
                path: format!("{dirname}{basename}"),
                digest: digests.get(i).cloned().unwrap_or_default(),
            })
        })
        .collect()
}

/// Reads the identity fields and file digest table of one RPM package.
///
/// The file is opened read-only and only the lead and header sections are
/// consumed; the payload is left untouched. The handle is released on every
/// exit path before this function returns, so a parallel fan-out over many
/// packages never accumulates descriptors.
///
/// # Errors
///
/// * [`RpmError::IoError`] if the file cannot be opened or read.
/// * [`RpmError::BadMagic`] if the lead or a header magic does not match.
/// * [`RpmError::Truncated`] if the file ends inside a section.
/// * [`RpmError::MalformedHeader`] if the header index is inconsistent.
/// * [`RpmError::MissingTag`] if an identity tag is absent.
pub fn read_package<P: AsRef<Path>>(path: P) -> Result<RpmPackage> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("opening `{}`", path.display()))?;
    let mut reader = BufReader::new(file);

    let mut lead = [0u8; LEAD_SIZE];
    read_section(&mut reader, &mut lead, "lead")?;
    if lead[..4] != LEAD_MAGIC {
        return Err(RpmError::BadMagic {
            path: path.to_path_buf(),
            section: "lead",
        });
    }

    // The signature header store is padded to an 8-byte boundary; the main
    // header follows immediately after the padding.
    let signature = read_header(&mut reader, path, "signature header")?;
    let padding = (8 - signature.store.len() % 8) % 8;
    if padding > 0 {
        let mut pad = [0u8; 8];
        read_section(&mut reader, &mut pad[..padding], "signature padding")?;
    }

    let header = read_header(&mut reader, path, "header")?;
    drop(reader);

    let files = package_files(&header)?;

    Ok(RpmPackage {
        name: header.required_string(RPMTAG_NAME, "NAME")?,
        arch: header.required_string(RPMTAG_ARCH, "ARCH")?,
        epoch: header.u32_value(RPMTAG_EPOCH)?,
        version: header.required_string(RPMTAG_VERSION, "VERSION")?,
        release: header.required_string(RPMTAG_RELEASE, "RELEASE")?,
        is_source: header.has_tag(RPMTAG_SOURCEPACKAGE),
        files,
    })
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::*;
    use crate::test_utils::RpmFixture;

    #[test]
    fn test_read_package_identity() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hello-2.12-3.x86_64.rpm");
        RpmFixture::new("hello", "2.12", "3", "x86_64")
            .write_to(&path)
            .unwrap();

        let pkg = read_package(&path).unwrap();
        assert_eq!(pkg.name, "hello");
        assert_eq!(pkg.version, "2.12");
        assert_eq!(pkg.release, "3");
        assert_eq!(pkg.arch, "x86_64");
        assert_eq!(pkg.epoch, None);
        assert!(!pkg.is_source);
        assert!(pkg.files.is_empty());
    }

    #[test]
    fn test_read_package_epoch_and_source() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hello-2.12-3.src.rpm");
        RpmFixture::new("hello", "2.12", "3", "x86_64")
            .epoch(2)
            .source()
            .write_to(&path)
            .unwrap();

        let pkg = read_package(&path).unwrap();
        assert_eq!(pkg.epoch, Some(2));
        assert!(pkg.is_source);
    }

    #[test]
    fn test_read_package_files() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hello-2.12-3.x86_64.rpm");
        RpmFixture::new("hello", "2.12", "3", "x86_64")
            .file("/usr/bin/hello", &"ab".repeat(32))
            .file("/usr/share/doc/hello/README", &"cd".repeat(32))
            .file("/usr/bin/hello-world", "")
            .write_to(&path)
            .unwrap();

        let pkg = read_package(&path).unwrap();
        assert_eq!(
            pkg.files,
            vec![
                RpmFileDigest {
                    path: "/usr/bin/hello".to_string(),
                    digest: "ab".repeat(32),
                },
                RpmFileDigest {
                    path: "/usr/share/doc/hello/README".to_string(),
                    digest: "cd".repeat(32),
                },
                RpmFileDigest {
                    path: "/usr/bin/hello-world".to_string(),
                    digest: String::new(),
                },
            ]
        );
    }

    #[test]
    fn test_read_package_stops_before_payload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hello-2.12-3.x86_64.rpm");
        let mut bytes = RpmFixture::new("hello", "2.12", "3", "x86_64")
            .file("/usr/bin/hello", &"ab".repeat(32))
            .build();
        // Whatever follows the header must never be parsed.
        bytes.extend_from_slice(&[0xff; 512]);
        fs::write(&path, bytes).unwrap();

        assert!(read_package(&path).is_ok());
    }

    #[test]
    fn test_read_package_bad_lead_magic() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("not-an.rpm");
        fs::write(&path, vec![0u8; 256]).unwrap();

        let err = read_package(&path).unwrap_err();
        assert!(matches!(err, RpmError::BadMagic { section: "lead", .. }));
    }

    #[test]
    fn test_read_package_truncated() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("short.rpm");
        let bytes = RpmFixture::new("hello", "2.12", "3", "x86_64").build();
        fs::write(&path, &bytes[..bytes.len() - 20]).unwrap();

        let err = read_package(&path).unwrap_err();
        assert!(matches!(err, RpmError::Truncated { .. }));
    }

    #[test]
    fn test_read_package_missing_file() {
        let dir = tempdir().unwrap();
        let result = read_package(dir.path().join("missing.rpm"));
        assert!(matches!(result, Err(RpmError::IoError { .. })));
    }
}
