//! Cache directory resolution and the build-complete marker.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Written into the cache directory once `build` has finished successfully.
pub const BUILD_MARKER: &str = ".appkit-build-complete";

#[derive(Debug, Error)]
pub enum CacheConfigError {
    #[error("cache_dir must be set (config `cache_dir` or env APPKIT__CACHE_DIR). Set it to a shared directory for caching model weights.")]
    NotSet,
    #[error("cache_dir directory does not exist: {}", .0.display())]
    Missing(PathBuf),
    #[error("cache_dir is not a directory: {}", .0.display())]
    NotADirectory(PathBuf),
}

/// Validate the configured cache directory: it must be set, exist and be a directory.
pub fn resolve_cache_dir(configured: Option<&str>) -> Result<PathBuf, CacheConfigError> {
    let raw = configured
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(CacheConfigError::NotSet)?;
    let dir = PathBuf::from(raw);
    if !dir.exists() {
        return Err(CacheConfigError::Missing(dir));
    }
    if !dir.is_dir() {
        return Err(CacheConfigError::NotADirectory(dir));
    }
    Ok(dir)
}

pub fn build_marker_path(cache_dir: &Path) -> PathBuf {
    cache_dir.join(BUILD_MARKER)
}

pub fn has_build_marker(cache_dir: &Path) -> bool {
    build_marker_path(cache_dir).is_file()
}

/// Create (or touch) the build marker.
pub fn write_build_marker(cache_dir: &Path) -> io::Result<PathBuf> {
    let path = build_marker_path(cache_dir);
    fs::write(&path, chrono::Utc::now().to_rfc3339())?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn unset_or_blank_is_rejected() {
        assert!(matches!(resolve_cache_dir(None), Err(CacheConfigError::NotSet)));
        assert!(matches!(
            resolve_cache_dir(Some("   ")),
            Err(CacheConfigError::NotSet)
        ));
    }

    #[test]
    fn missing_directory_is_rejected() {
        let tmp = tempdir().unwrap();
        let missing = tmp.path().join("nope");
        let err = resolve_cache_dir(missing.to_str()).unwrap_err();
        assert!(err.to_string().contains("does not exist"), "{err}");
    }

    #[test]
    fn file_is_not_a_directory() {
        let tmp = tempdir().unwrap();
        let file = tmp.path().join("file");
        fs::write(&file, "x").unwrap();
        let err = resolve_cache_dir(file.to_str()).unwrap_err();
        assert!(matches!(err, CacheConfigError::NotADirectory(_)));
    }

    #[test]
    fn marker_lifecycle() {
        let tmp = tempdir().unwrap();
        let dir = resolve_cache_dir(tmp.path().to_str()).unwrap();
        assert!(!has_build_marker(&dir));
        let path = write_build_marker(&dir).unwrap();
        assert!(path.ends_with(BUILD_MARKER));
        assert!(has_build_marker(&dir));
        // touching again is fine
        write_build_marker(&dir).unwrap();
    }
}
