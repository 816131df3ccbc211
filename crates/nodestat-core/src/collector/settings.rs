//! Options shared by collector factories.

use std::path::PathBuf;

use regex::Regex;

use crate::collector::error::CollectError;
use crate::collector::procfs::ProcFs;
use crate::collector::sysfs::SysFs;
use crate::collector::traits::FileSystem;

/// CPU collector options.
#[derive(Debug, Clone)]
pub struct CpuSettings {
    /// Emit `node_cpu_guest_seconds_total`.
    pub guest: bool,
    /// Emit `node_cpu_info` and, with a filter set, flag/bug info.
    pub info: bool,
    pub flags_include: Option<Regex>,
    pub bugs_include: Option<Regex>,
}

impl Default for CpuSettings {
    fn default() -> Self {
        Self {
            guest: true,
            info: false,
            flags_include: None,
            bugs_include: None,
        }
    }
}

/// bcache collector options.
#[derive(Debug, Clone, Default)]
pub struct BcacheSettings {
    /// Read `priority_stats`, which walks every bucket in the kernel.
    pub priority_stats: bool,
}

/// Everything a collector factory needs to build its collector.
#[derive(Debug, Clone)]
pub struct CollectorSettings<F: FileSystem> {
    pub fs: F,
    pub proc_path: PathBuf,
    pub sys_path: PathBuf,
    pub cpu: CpuSettings,
    pub bcache: BcacheSettings,
}

impl<F: FileSystem + Clone> CollectorSettings<F> {
    /// Settings rooted at `/proc` and `/sys` with default collector options.
    pub fn new(fs: F) -> Self {
        Self {
            fs,
            proc_path: PathBuf::from("/proc"),
            sys_path: PathBuf::from("/sys"),
            cpu: CpuSettings::default(),
            bcache: BcacheSettings::default(),
        }
    }

    pub fn with_proc_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.proc_path = path.into();
        self
    }

    pub fn with_sys_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.sys_path = path.into();
        self
    }

    /// Opens the configured procfs root.
    pub fn procfs(&self) -> Result<ProcFs<F>, CollectError> {
        ProcFs::open(self.fs.clone(), &self.proc_path)
    }

    /// Opens the configured sysfs root.
    pub fn sysfs(&self) -> Result<SysFs<F>, CollectError> {
        SysFs::open(self.fs.clone(), &self.sys_path)
    }
}
