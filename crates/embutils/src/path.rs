//! Path validation helpers.
//!
//! Every check reports failures as [`Error::PathValidation`] so callers can
//! tell path problems apart from I/O failures.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// True if `path` or its parent directory exists.
#[must_use]
pub fn path_reachable(path: &Path) -> bool {
    if path.exists() {
        return true;
    }
    match path.parent() {
        Some(parent) if parent.as_os_str().is_empty() => true,
        Some(parent) => parent.exists(),
        None => false,
    }
}

/// Check that `path` is reachable when `reachable` is set.
///
/// # Errors
///
/// Returns an error if neither the path nor its parent exist.
pub fn validate_path(path: &Path, reachable: bool) -> Result<()> {
    if reachable && !path_reachable(path) {
        return Err(Error::path(path, "path is not reachable"));
    }
    Ok(())
}

/// Validate a file path.
///
/// `suffixes` lists accepted extensions including the dot (`.json`),
/// compared case-insensitively; an empty list accepts any.
///
/// # Errors
///
/// Returns an error if the path is a directory, is missing while
/// `must_exist` is set, is unreachable or has a rejected suffix.
pub fn validate_file(path: &Path, must_exist: bool, suffixes: &[&str]) -> Result<()> {
    if path.is_dir() {
        return Err(Error::path(path, "expected a file, found a directory"));
    }
    if must_exist && !path.exists() {
        return Err(Error::path(path, "file does not exist"));
    }
    validate_path(path, true)?;

    if !suffixes.is_empty() {
        let suffix = path
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
            .unwrap_or_default();
        if !suffixes.iter().any(|s| s.eq_ignore_ascii_case(&suffix)) {
            return Err(Error::path(
                path,
                format!("suffix '{suffix}' is not one of {suffixes:?}"),
            ));
        }
    }
    Ok(())
}

/// Validate a directory path, creating it when `create` is set.
///
/// # Errors
///
/// Returns an error if the path is a file, is missing while `must_exist` is
/// set, is unreachable, or can't be created.
pub fn validate_dir(path: &Path, must_exist: bool, create: bool) -> Result<()> {
    if path.exists() && !path.is_dir() {
        return Err(Error::path(path, "expected a directory, found a file"));
    }
    if create && !path.exists() {
        fs::create_dir_all(path)
            .map_err(|e| Error::path(path, format!("can't create directory: {e}")))?;
    }
    if must_exist && !path.is_dir() {
        return Err(Error::path(path, "directory does not exist"));
    }
    validate_path(path, true)
}

/// `path` itself, or `path/default_name` when `path` is a directory.
#[must_use]
pub fn file_in_dir(path: &Path, default_name: &str) -> PathBuf {
    if path.is_dir() {
        path.join(default_name)
    } else {
        path.to_path_buf()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_reachable() {
        let dir = tempfile::tempdir().unwrap();
        assert!(path_reachable(dir.path()));
        assert!(path_reachable(&dir.path().join("new.txt")));
        assert!(!path_reachable(&dir.path().join("a").join("b.txt")));
        assert!(path_reachable(Path::new("relative.txt")));
    }

    #[test]
    fn test_validate_path() {
        let dir = tempfile::tempdir().unwrap();
        let far = dir.path().join("reach_issue").join("x");
        assert!(validate_path(&far, false).is_ok());
        assert!(validate_path(&far, true).unwrap_err().is_path_error());
    }

    #[test]
    fn test_validate_dir() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("tmp");

        assert!(validate_dir(&sub, true, false).is_err());
        assert!(validate_dir(&sub, false, false).is_ok());
        assert!(validate_dir(&sub, true, true).is_ok());
        assert!(sub.is_dir());

        let file = sub.join("test.txt");
        fs::write(&file, "x").unwrap();
        assert!(validate_dir(&file, false, false).is_err());
    }

    #[test]
    fn test_validate_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("test.txt");

        assert!(validate_file(&file, true, &[]).is_err());
        assert!(validate_file(&file, false, &[]).is_ok());
        assert!(validate_file(dir.path(), false, &[]).is_err());

        fs::write(&file, "x").unwrap();
        assert!(validate_file(&file, true, &[]).is_ok());
        assert!(validate_file(&file, true, &[".TXT"]).is_ok());
        let err = validate_file(&file, true, &[".yaml", ".json"]).unwrap_err();
        assert!(err.to_string().contains(".txt"));
    }

    #[test]
    fn test_file_in_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            file_in_dir(dir.path(), "version.txt"),
            dir.path().join("version.txt")
        );
        let file = dir.path().join("custom.txt");
        assert_eq!(file_in_dir(&file, "version.txt"), file);
    }
}
