//! Core pipeline for imarepo.
//!
//! The pipeline runs in stages: the scanner discovers package files under a
//! repository root and extracts their per-file digest records in parallel,
//! the metadata builder writes the records out as `repodata/imadata.xml`,
//! and on registration runs the finalizer compresses the document and the
//! repomd patcher appends the matching `<data type="imadata">` entry to the
//! repository's master index.

use error::ImaError;

pub mod error;
pub mod finalize;
pub mod metadata;
pub mod repomd;
pub mod scanner;
pub mod xml;

pub type ImaResult<T> = std::result::Result<T, ImaError>;
