//! RPM package header reading for imarepo.
//!
//! This crate reads the identity fields and per-file digest table out of an
//! RPM package file. Only the lead and the two header sections are parsed;
//! the compressed payload is never touched, so reading a package costs a few
//! kilobytes of I/O regardless of its size.
//!
//! # Example
//!
//! ```no_run
//! use imarepo_rpm::{read_package, RpmError};
//!
//! fn print_digests(path: &str) -> Result<(), RpmError> {
//!     let pkg = read_package(path)?;
//!     for file in &pkg.files {
//!         println!("{} {}", file.digest, file.path);
//!     }
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod header;
pub mod test_utils;

pub use error::{ErrorContext, Result, RpmError};
pub use header::{read_package, RpmFileDigest, RpmPackage, LEAD_MAGIC, RPM_EXTENSION};
