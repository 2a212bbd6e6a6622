//! Repository scanning and parallel package extraction.

use std::path::{Path, PathBuf};

use imarepo_rpm::{read_package, RPM_EXTENSION};
use rayon::{
    iter::{IntoParallelRefIterator, ParallelIterator},
    ThreadPoolBuilder,
};
use tracing::{debug, trace};
use walkdir::WalkDir;

use crate::{error::ImaError, metadata::PackageRecord, ImaResult};

/// Discovers all package files under a repository root.
///
/// The walk is recursive and matches on the `.rpm` extension. The returned
/// order follows the directory walk and is not guaranteed stable across
/// filesystems; callers must not depend on it.
pub fn discover_packages(root: &Path) -> ImaResult<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry.map_err(|err| {
            ImaError::IoError {
                action: format!("walking `{}`", root.display()),
                source: err.into(),
            }
        })?;
        if entry.file_type().is_file()
            && entry
                .path()
                .extension()
                .is_some_and(|ext| ext == RPM_EXTENSION)
        {
            paths.push(entry.into_path());
        }
    }
    Ok(paths)
}

/// Extracts the record of one package file.
pub fn extract_package(path: &Path) -> ImaResult<PackageRecord> {
    trace!("extracting {}", path.display());
    let pkg = read_package(path)?;
    Ok(PackageRecord::from_rpm(pkg))
}

/// Scans a repository and extracts all package records with up to `jobs`
/// parallel workers.
///
/// Blocks until every extraction has completed. A single failing extraction
/// fails the whole scan; no partial result set is ever returned, since an
/// incomplete index is worse than no index. An empty repository is not an
/// error and yields an empty record set.
pub fn scan_repository(root: &Path, jobs: usize) -> ImaResult<Vec<PackageRecord>> {
    let paths = discover_packages(root)?;
    debug!(packages = paths.len(), jobs, "scanning repository");

    let pool = ThreadPoolBuilder::new()
        .num_threads(jobs.max(1))
        .build()
        .map_err(|err| ImaError::WorkerPool(err.to_string()))?;

    pool.install(|| {
        paths
            .par_iter()
            .map(|path| extract_package(path))
            .collect::<ImaResult<Vec<_>>>()
    })
}
