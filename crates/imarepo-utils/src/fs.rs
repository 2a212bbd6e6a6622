use std::{fs, path::Path};

use crate::error::{FileSystemError, FileSystemResult};

/// Creates a directory structure if it doesn't exist.
///
/// If the directory already exists, this function does nothing. If the path
/// exists but is not a directory, an error is returned.
///
/// # Arguments
///
/// * `path` - The path to create.
///
/// # Errors
///
/// * [`FileSystemError::Directory`] if the directory could not be created.
/// * [`FileSystemError::NotADirectory`] if the path exists but is not a directory.
pub fn ensure_dir_exists<P: AsRef<Path>>(path: P) -> FileSystemResult<()> {
    let path = path.as_ref();
    if !path.exists() {
        fs::create_dir_all(path).map_err(|err| {
            FileSystemError::Directory {
                path: path.to_path_buf(),
                action: "create",
                source: err,
            }
        })?;
    } else if !path.is_dir() {
        return Err(FileSystemError::NotADirectory {
            path: path.to_path_buf(),
        });
    }

    Ok(())
}

/// Returns the size of a file in bytes.
///
/// # Errors
///
/// * [`FileSystemError::File`] if the file metadata cannot be read.
pub fn file_size<P: AsRef<Path>>(path: P) -> FileSystemResult<u64> {
    let path = path.as_ref();
    let metadata = fs::metadata(path).map_err(|err| {
        FileSystemError::File {
            path: path.to_path_buf(),
            action: "stat",
            source: err,
        }
    })?;

    Ok(metadata.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_ensure_dir_exists() {
        let dir = tempdir().unwrap();
        let new_dir = dir.path().join("repodata");
        ensure_dir_exists(&new_dir).unwrap();
        assert!(new_dir.is_dir());
    }

    #[test]
    fn test_ensure_dir_exists_already_exists() {
        let dir = tempdir().unwrap();
        ensure_dir_exists(dir.path()).unwrap();
        assert!(dir.path().is_dir());
    }

    #[test]
    fn test_ensure_dir_exists_file_collision() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("file.txt");
        fs::write(&file_path, "hello").unwrap();
        assert!(ensure_dir_exists(&file_path).is_err());
    }

    #[test]
    fn test_file_size() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("file.txt");
        fs::write(&file_path, "hello").unwrap();
        assert_eq!(file_size(&file_path).unwrap(), 5);
    }

    #[test]
    fn test_file_size_missing() {
        let dir = tempdir().unwrap();
        assert!(file_size(dir.path().join("missing")).is_err());
    }
}
