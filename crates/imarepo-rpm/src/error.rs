//! Error types for the rpm crate.

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

/// Errors that can occur while reading an RPM package header.
#[derive(Error, Diagnostic, Debug)]
pub enum RpmError {
    #[error("Error while {action}: {source}")]
    #[diagnostic(code(imarepo_rpm::io))]
    IoError {
        action: String,
        source: std::io::Error,
    },

    #[error("`{}` is not an RPM package (bad {section} magic)", path.display())]
    #[diagnostic(code(imarepo_rpm::magic_bytes))]
    BadMagic { path: PathBuf, section: &'static str },

    #[error("Unexpected end of file while reading {section}")]
    #[diagnostic(code(imarepo_rpm::truncated))]
    Truncated { section: &'static str },

    #[error("Malformed header: {0}")]
    #[diagnostic(code(imarepo_rpm::header))]
    MalformedHeader(String),

    #[error("Header is missing required tag {0}")]
    #[diagnostic(code(imarepo_rpm::missing_tag))]
    MissingTag(&'static str),
}

/// A specialized Result type for package header operations.
pub type Result<T> = std::result::Result<T, RpmError>;

/// Extension trait for adding context to I/O errors.
pub trait ErrorContext<T> {
    /// Adds context to an error, describing what action was being performed.
    fn with_context<C>(self, context: C) -> Result<T>
    where
        C: FnOnce() -> String;
}

impl<T> ErrorContext<T> for std::io::Result<T> {
    fn with_context<C>(self, context: C) -> Result<T>
    where
        C: FnOnce() -> String,
    {
        self.map_err(|err| {
            RpmError::IoError {
                action: context(),
                source: err,
            }
        })
    }
}
