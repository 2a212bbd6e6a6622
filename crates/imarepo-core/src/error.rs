//! Error types for imarepo-core.

use std::path::PathBuf;

use imarepo_rpm::RpmError;
use imarepo_utils::error::{FileSystemError, HashError};
use miette::Diagnostic;
use thiserror::Error;

use crate::xml::XmlError;

/// Core error type for the metadata pipeline.
#[derive(Error, Diagnostic, Debug)]
pub enum ImaError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Rpm(#[from] RpmError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Xml(#[from] XmlError),

    #[error(transparent)]
    #[diagnostic(code(imarepo::fs), help("Check file permissions and disk space"))]
    FileSystem(#[from] FileSystemError),

    #[error(transparent)]
    #[diagnostic(code(imarepo::hash))]
    Hash(#[from] HashError),

    #[error("Error while {action}")]
    #[diagnostic(code(imarepo::io), help("Check file permissions and disk space"))]
    IoError {
        action: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Master index `{}` already contains a data entry of type `imadata`", path.display())]
    #[diagnostic(
        code(imarepo::duplicate_entry),
        help("Remove the stale imadata entry and artifact before re-registering")
    )]
    DuplicateEntry { path: PathBuf },

    #[error("Failed to start worker pool: {0}")]
    #[diagnostic(code(imarepo::worker_pool))]
    WorkerPool(String),

    #[error(transparent)]
    #[diagnostic(code(imarepo::time))]
    SystemTime(#[from] std::time::SystemTimeError),
}

/// Trait for adding context to IO errors.
pub trait ErrorContext<T> {
    fn with_context<C>(self, context: C) -> std::result::Result<T, ImaError>
    where
        C: FnOnce() -> String;
}

impl<T> ErrorContext<T> for std::io::Result<T> {
    fn with_context<C>(self, context: C) -> std::result::Result<T, ImaError>
    where
        C: FnOnce() -> String,
    {
        self.map_err(|err| {
            ImaError::IoError {
                action: context(),
                source: err,
            }
        })
    }
}
