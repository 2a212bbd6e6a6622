//! Package records and the imadata document builder.

use std::{fmt::Write as _, fs, path::{Path, PathBuf}};

use imarepo_rpm::RpmPackage;
use imarepo_utils::fs::ensure_dir_exists;
use tracing::debug;

use crate::{
    error::ErrorContext,
    xml::{escape_attr, escape_text},
    ImaResult,
};

/// Name of the repository metadata directory.
pub const REPODATA_DIR: &str = "repodata";

/// File name of the auxiliary metadata document.
pub const IMADATA_FILENAME: &str = "imadata.xml";

/// Digest value recorded for files without a measurement.
const ZERO_DIGEST: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

/// One measured file of a package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDigest {
    pub path: String,
    pub digest: String,
}

/// The identity and measured files of one package, as projected into the
/// imadata document. Built once per package by the extractor and immutable
/// afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageRecord {
    pub name: String,
    pub arch: String,
    pub is_source: bool,
    pub epoch: Option<u32>,
    pub version: String,
    pub release: String,
    pub files: Vec<FileDigest>,
}

impl PackageRecord {
    /// Builds a record from a parsed package header.
    ///
    /// Files whose digest is the all-zero placeholder (or empty, for
    /// packages built without file digests) carry no measurement and are
    /// excluded here, never emitted into the document.
    pub fn from_rpm(pkg: RpmPackage) -> Self {
        let files = pkg
            .files
            .into_iter()
            .filter(|file| !file.digest.is_empty() && file.digest != ZERO_DIGEST)
            .map(|file| {
                FileDigest {
                    path: file.path,
                    digest: file.digest,
                }
            })
            .collect();

        Self {
            name: pkg.name,
            arch: pkg.arch,
            is_source: pkg.is_source,
            epoch: pkg.epoch,
            version: pkg.version,
            release: pkg.release,
            files,
        }
    }
}

/// Renders the imadata document for a set of records.
///
/// Records are sorted by package name (stable, so equal names keep their
/// input order); each record's files keep their original order. The output
/// is a pure function of the record set, byte-identical across reruns.
pub fn render_imadata(records: &[PackageRecord]) -> String {
    let mut sorted: Vec<&PackageRecord> = records.iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));

    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    let _ = writeln!(out, "<imadata packages=\"{}\">", sorted.len());
    for record in sorted {
        let arch = if record.is_source {
            "src"
        } else {
            record.arch.as_str()
        };
        let _ = writeln!(
            out,
            "<package name=\"{}\" arch=\"{}\">",
            escape_attr(&record.name),
            escape_attr(arch)
        );
        let _ = writeln!(
            out,
            "  <version epoch=\"{}\" ver=\"{}\" rel=\"{}\"/>",
            record.epoch.unwrap_or(0),
            escape_attr(&record.version),
            escape_attr(&record.release)
        );
        for file in &record.files {
            let _ = writeln!(
                out,
                "  <file hash=\"{}\">{}</file>",
                escape_attr(&file.digest),
                escape_text(&file.path)
            );
        }
        out.push_str("</package>\n");
    }
    out.push_str("</imadata>");
    out
}

/// Writes the imadata document into the repository's metadata directory.
///
/// The target path is always `repodata/imadata.xml` under `repo_root`; an
/// existing file there is overwritten. Returns the path of the written
/// document.
pub fn write_imadata(repo_root: &Path, records: &[PackageRecord]) -> ImaResult<PathBuf> {
    let repodata = repo_root.join(REPODATA_DIR);
    ensure_dir_exists(&repodata)?;

    let path = repodata.join(IMADATA_FILENAME);
    debug!(packages = records.len(), "writing {}", path.display());
    fs::write(&path, render_imadata(records))
        .with_context(|| format!("writing `{}`", path.display()))?;

    Ok(path)
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    fn record(name: &str, arch: &str) -> PackageRecord {
        PackageRecord {
            name: name.to_string(),
            arch: arch.to_string(),
            is_source: false,
            epoch: None,
            version: "1.0".to_string(),
            release: "1".to_string(),
            files: Vec::new(),
        }
    }

    #[test]
    fn test_from_rpm_excludes_unmeasured_files() {
        let pkg = RpmPackage {
            name: "a".to_string(),
            arch: "noarch".to_string(),
            epoch: None,
            version: "1.0".to_string(),
            release: "1".to_string(),
            is_source: false,
            files: vec![
                imarepo_rpm::RpmFileDigest {
                    path: "/usr/bin/a".to_string(),
                    digest: "ab".repeat(32),
                },
                imarepo_rpm::RpmFileDigest {
                    path: "/usr/share/a/ghost".to_string(),
                    digest: "0".repeat(64),
                },
                imarepo_rpm::RpmFileDigest {
                    path: "/usr/share/a/old".to_string(),
                    digest: String::new(),
                },
            ],
        };

        let record = PackageRecord::from_rpm(pkg);
        assert_eq!(record.files.len(), 1);
        assert_eq!(record.files[0].path, "/usr/bin/a");
    }

    #[test]
    fn test_render_sorts_by_name() {
        let records = vec![record("zsh", "x86_64"), record("bash", "x86_64")];
        let out = render_imadata(&records);
        let zsh = out.find("name=\"zsh\"").unwrap();
        let bash = out.find("name=\"bash\"").unwrap();
        assert!(bash < zsh);
    }

    #[test]
    fn test_render_source_arch_and_epoch_default() {
        let mut rec = record("a", "x86_64");
        rec.is_source = true;
        rec.files.push(FileDigest {
            path: "/usr/bin/a".to_string(),
            digest: "ef".repeat(32),
        });
        let out = render_imadata(&[rec]);

        assert_eq!(
            out,
            format!(
                "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
                 <imadata packages=\"1\">\n\
                 <package name=\"a\" arch=\"src\">\n\
                 \x20 <version epoch=\"0\" ver=\"1.0\" rel=\"1\"/>\n\
                 \x20 <file hash=\"{}\">/usr/bin/a</file>\n\
                 </package>\n\
                 </imadata>",
                "ef".repeat(32)
            )
        );
    }

    #[test]
    fn test_render_sort_is_stable_for_equal_names() {
        let records = vec![record("a", "x86_64"), record("a", "i686")];
        let out = render_imadata(&records);
        let x86 = out.find("arch=\"x86_64\"").unwrap();
        let i686 = out.find("arch=\"i686\"").unwrap();
        assert!(x86 < i686);
    }

    #[test]
    fn test_render_explicit_epoch() {
        let mut rec = record("a", "x86_64");
        rec.epoch = Some(3);
        let out = render_imadata(&[rec]);
        assert!(out.contains("epoch=\"3\""));
    }

    #[test]
    fn test_render_empty_set() {
        let out = render_imadata(&[]);
        assert_eq!(
            out,
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<imadata packages=\"0\">\n</imadata>"
        );
    }

    #[test]
    fn test_render_is_deterministic() {
        let records = vec![record("b", "noarch"), record("a", "noarch")];
        assert_eq!(render_imadata(&records), render_imadata(&records));
    }

    #[test]
    fn test_write_imadata_creates_and_overwrites() {
        let dir = tempdir().unwrap();
        let path = write_imadata(dir.path(), &[record("a", "noarch")]).unwrap();
        assert_eq!(path, dir.path().join("repodata").join("imadata.xml"));
        assert!(path.is_file());

        // A second run owns the path and silently replaces it.
        let path = write_imadata(dir.path(), &[]).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("packages=\"0\""));
    }
}
