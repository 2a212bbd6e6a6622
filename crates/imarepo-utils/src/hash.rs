use std::{fs::File, io, path::Path};

use sha2::{Digest, Sha256};

use crate::error::{HashError, HashResult};

/// Calculates the SHA-256 checksum of a file.
///
/// The file is streamed through the hasher, so large metadata documents do
/// not need to fit in memory. The digest is returned as a lowercase
/// hex-encoded string, the form repomd checksum entries expect.
///
/// # Arguments
///
/// * `file_path` - The path to the file to calculate the checksum for.
///
/// # Errors
///
/// * [`HashError::ReadFailed`] if the file cannot be opened or read.
///
/// # Example
///
/// ```no_run
/// use imarepo_utils::error::HashResult;
/// use imarepo_utils::hash::file_sha256;
///
/// fn main() -> HashResult<()> {
///     let checksum = file_sha256("/path/to/file")?;
///     println!("Checksum is {}", checksum);
///     Ok(())
/// }
/// ```
pub fn file_sha256<P: AsRef<Path>>(file_path: P) -> HashResult<String> {
    let file_path = file_path.as_ref();
    let read_failed = |err| {
        HashError::ReadFailed {
            path: file_path.to_path_buf(),
            source: err,
        }
    };

    let mut file = File::open(file_path).map_err(read_failed)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher).map_err(read_failed)?;
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::file_sha256;

    #[test]
    fn test_file_sha256() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"hello world\n").unwrap();
        let path = file.path();

        let checksum = file_sha256(path).unwrap();
        assert_eq!(
            checksum,
            "a948904f2f0f479b8f8197694b30184b0d2ed1c1cd2a1ec0fb85d299a192a447"
        );
    }

    #[test]
    fn test_file_sha256_empty_file() {
        let file = NamedTempFile::new().unwrap();

        let checksum = file_sha256(file.path()).unwrap();
        assert_eq!(
            checksum,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_file_sha256_file_not_found() {
        let result = file_sha256("/path/to/nonexistent/file");
        assert!(result.is_err());
    }

    #[test]
    fn test_file_sha256_on_directory() {
        let dir = tempfile::tempdir().unwrap();
        let result = file_sha256(dir.path());
        assert!(result.is_err());
    }
}
