//! Filesystem access for collectors.
//!
//! Every collector reads `/proc` and `/sys` through [`FileSystem`], so the
//! same code runs against the live kernel ([`RealFs`]) or an in-memory tree
//! in tests ([`MockFs`](crate::collector::MockFs)).

use std::io;
use std::path::{Path, PathBuf};

/// Read-only view of the kernel pseudo-filesystems.
pub trait FileSystem: Send + Sync {
    /// Reads the entire contents of a file as a string.
    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    /// Checks if a path exists.
    fn exists(&self, path: &Path) -> bool;

    /// Lists entries in a directory.
    ///
    /// Order is unspecified; callers that need a stable order sort the result.
    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>>;
}

/// Real filesystem implementation that delegates to `std::fs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealFs;

impl RealFs {
    pub fn new() -> Self {
        Self
    }
}

impl FileSystem for RealFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let entries = std::fs::read_dir(path)?;
        let mut paths = Vec::new();
        for entry in entries {
            paths.push(entry?.path());
        }
        Ok(paths)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proc_tree() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("loadavg"), "0.15 0.10 0.05 1/150 1234\n").unwrap();
        std::fs::create_dir(dir.path().join("pressure")).unwrap();
        std::fs::write(dir.path().join("pressure/cpu"), "some avg10=0.00\n").unwrap();
        dir
    }

    #[test]
    fn test_real_fs_read_to_string() {
        let dir = proc_tree();
        let fs = RealFs::new();

        let content = fs.read_to_string(&dir.path().join("loadavg")).unwrap();
        assert!(content.starts_with("0.15"));
    }

    #[test]
    fn test_real_fs_exists() {
        let dir = proc_tree();
        let fs = RealFs::new();

        assert!(fs.exists(&dir.path().join("loadavg")));
        assert!(fs.exists(&dir.path().join("pressure")));
        assert!(!fs.exists(Path::new("/nonexistent/path/12345")));
    }

    #[test]
    fn test_real_fs_read_dir() {
        let dir = proc_tree();
        let fs = RealFs::new();

        let mut entries = fs.read_dir(dir.path()).unwrap();
        entries.sort();
        assert_eq!(
            entries,
            vec![dir.path().join("loadavg"), dir.path().join("pressure")]
        );
    }

    #[test]
    fn test_real_fs_missing_file_is_not_found() {
        let dir = proc_tree();
        let fs = RealFs::new();

        let err = fs.read_to_string(&dir.path().join("stat")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
