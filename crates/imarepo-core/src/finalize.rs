//! Compression and content-addressed naming of the metadata document.

use std::{
    fs::{self, File},
    io,
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

use flate2::{Compression, GzBuilder};
use imarepo_utils::{fs::file_size, hash::file_sha256};
use tracing::debug;

use crate::{error::ErrorContext, ImaResult};

/// File name of the compressed document before content-addressed renaming.
pub const IMADATA_GZ_FILENAME: &str = "imadata.xml.gz";

/// A finalized metadata artifact, carrying everything the master index
/// entry needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Path of the compressed, checksum-prefixed file on disk.
    pub path: PathBuf,
    /// SHA-256 of the compressed artifact.
    pub checksum: String,
    /// SHA-256 of the uncompressed document.
    pub open_checksum: String,
    /// Byte size of the compressed artifact.
    pub size: u64,
    /// Byte size of the uncompressed document.
    pub open_size: u64,
    /// Creation time of the artifact, seconds since the epoch.
    pub timestamp: u64,
}

/// Compresses the metadata document and names it after its own checksum.
///
/// The uncompressed document is hashed and measured, gzipped into
/// `imadata.xml.gz` next to it, and deleted. The gzip header's MTIME field
/// is set to the current time, so two runs over byte-identical content
/// produce different compressed bytes (and thus different checksums) once
/// the clock ticks; the semantic content is still deterministic. Finally
/// the compressed file is renamed to `<checksum>-imadata.xml.gz`, letting
/// artifacts from successive runs coexist.
pub fn finalize_document(doc_path: &Path) -> ImaResult<Artifact> {
    let open_checksum = file_sha256(doc_path)?;
    let open_size = file_size(doc_path)?;

    let gz_path = doc_path.with_file_name(IMADATA_GZ_FILENAME);
    let mtime = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs() as u32;

    let mut input = File::open(doc_path)
        .with_context(|| format!("opening `{}`", doc_path.display()))?;
    let output = File::create(&gz_path)
        .with_context(|| format!("creating `{}`", gz_path.display()))?;
    let mut encoder = GzBuilder::new()
        .mtime(mtime)
        .write(output, Compression::default());
    io::copy(&mut input, &mut encoder)
        .with_context(|| format!("compressing `{}`", doc_path.display()))?;
    encoder
        .finish()
        .with_context(|| format!("compressing `{}`", doc_path.display()))?;

    fs::remove_file(doc_path).with_context(|| format!("removing `{}`", doc_path.display()))?;

    let checksum = file_sha256(&gz_path)?;
    let size = file_size(&gz_path)?;
    let timestamp = fs::metadata(&gz_path)
        .with_context(|| format!("reading metadata of `{}`", gz_path.display()))?
        .modified()
        .with_context(|| format!("reading mtime of `{}`", gz_path.display()))?
        .duration_since(UNIX_EPOCH)?
        .as_secs();

    let path = gz_path.with_file_name(format!("{checksum}-{IMADATA_GZ_FILENAME}"));
    fs::rename(&gz_path, &path)
        .with_context(|| format!("renaming `{}`", gz_path.display()))?;
    debug!("finalized {}", path.display());

    Ok(Artifact {
        path,
        checksum,
        open_checksum,
        size,
        open_size,
        timestamp,
    })
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use flate2::read::GzDecoder;
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_finalize_document() {
        let dir = tempdir().unwrap();
        let doc_path = dir.path().join("imadata.xml");
        let content = "<imadata packages=\"0\">\n</imadata>";
        fs::write(&doc_path, content).unwrap();

        let artifact = finalize_document(&doc_path).unwrap();

        // The uncompressed original is gone; only the renamed artifact remains.
        assert!(!doc_path.exists());
        assert!(artifact.path.is_file());
        assert_eq!(
            artifact.path.file_name().unwrap().to_str().unwrap(),
            format!("{}-imadata.xml.gz", artifact.checksum)
        );

        assert_eq!(artifact.open_size, content.len() as u64);
        assert_eq!(artifact.size, file_size(&artifact.path).unwrap());
        assert_eq!(artifact.checksum, file_sha256(&artifact.path).unwrap());
        assert!(artifact.timestamp > 0);

        // Decompressing yields the original document bytes.
        let mut decoder = GzDecoder::new(File::open(&artifact.path).unwrap());
        let mut decompressed = String::new();
        decoder.read_to_string(&mut decompressed).unwrap();
        assert_eq!(decompressed, content);
    }

    #[test]
    fn test_finalize_missing_document() {
        let dir = tempdir().unwrap();
        assert!(finalize_document(&dir.path().join("imadata.xml")).is_err());
    }
}
