//! Typed access to `/proc`.
//!
//! [`ProcFs`] reads one pseudo-file per call and hands it to the matching
//! pure parser in [`parser`]. A missing or unreadable file becomes
//! [`CollectError::DataSourceUnavailable`], a parse failure becomes
//! [`CollectError::MalformedData`].

pub mod parser;

use std::path::{Path, PathBuf};

use crate::collector::error::CollectError;
use crate::collector::traits::FileSystem;
use parser::{
    BuddyInfo, CpuInfo, GlobalStat, LoadAvg, MemInfoField, parse_buddyinfo, parse_cpuinfo,
    parse_global_stat, parse_loadavg, parse_meminfo,
};

/// Reader for `/proc` files rooted at a configurable mount point.
#[derive(Debug, Clone)]
pub struct ProcFs<F: FileSystem> {
    fs: F,
    proc_path: PathBuf,
}

impl<F: FileSystem> ProcFs<F> {
    /// Opens a procfs root, failing if the mount point does not exist.
    pub fn open(fs: F, proc_path: impl AsRef<Path>) -> Result<Self, CollectError> {
        let proc_path = proc_path.as_ref().to_path_buf();
        if !fs.exists(&proc_path) {
            return Err(CollectError::unavailable(
                &proc_path,
                std::io::Error::new(std::io::ErrorKind::NotFound, "procfs root not found"),
            ));
        }
        Ok(Self { fs, proc_path })
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.proc_path.join(name)
    }

    fn read(&self, name: &str) -> Result<String, CollectError> {
        let path = self.path(name);
        self.fs
            .read_to_string(&path)
            .map_err(|e| CollectError::unavailable(&path, e))
    }

    /// Reads `/proc/stat`.
    pub fn stat(&self) -> Result<GlobalStat, CollectError> {
        Ok(parse_global_stat(&self.read("stat")?)?)
    }

    /// Reads `/proc/cpuinfo`.
    pub fn cpuinfo(&self) -> Result<Vec<CpuInfo>, CollectError> {
        Ok(parse_cpuinfo(&self.read("cpuinfo")?)?)
    }

    /// Reads `/proc/buddyinfo`.
    pub fn buddyinfo(&self) -> Result<Vec<BuddyInfo>, CollectError> {
        Ok(parse_buddyinfo(&self.read("buddyinfo")?)?)
    }

    /// Reads `/proc/meminfo`.
    pub fn meminfo(&self) -> Result<Vec<MemInfoField>, CollectError> {
        Ok(parse_meminfo(&self.read("meminfo")?)?)
    }

    /// Reads `/proc/loadavg`.
    pub fn loadavg(&self) -> Result<LoadAvg, CollectError> {
        Ok(parse_loadavg(&self.read("loadavg")?)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::MockFs;

    #[test]
    fn test_open_missing_root() {
        let fs = MockFs::new();
        let err = ProcFs::open(fs, "/proc").unwrap_err();
        assert!(matches!(err, CollectError::DataSourceUnavailable { .. }));
    }

    #[test]
    fn test_stat_from_typical_system() {
        let procfs = ProcFs::open(MockFs::typical_system(), "/proc").unwrap();

        let stat = procfs.stat().unwrap();
        assert_eq!(stat.cpus.len(), 4);
        assert_eq!(stat.btime, 1700000000);
    }

    #[test]
    fn test_missing_file_is_unavailable() {
        let fs = MockFs::new();
        fs.add_dir("/proc");
        let procfs = ProcFs::open(fs, "/proc").unwrap();

        match procfs.loadavg() {
            Err(CollectError::DataSourceUnavailable { path, .. }) => {
                assert_eq!(path, PathBuf::from("/proc/loadavg"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_garbage_file_is_malformed() {
        let fs = MockFs::new();
        fs.add_file("/proc/loadavg", "not a loadavg\n");
        let procfs = ProcFs::open(fs, "/proc").unwrap();

        assert!(matches!(
            procfs.loadavg(),
            Err(CollectError::MalformedData(_))
        ));
    }
}
