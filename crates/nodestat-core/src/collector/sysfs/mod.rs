//! Typed access to `/sys`.
//!
//! Covers the cpufreq and thermal-throttle attributes under
//! `devices/system/cpu` and the bcache hierarchy under `fs/bcache`.

pub mod parser;

use std::path::{Path, PathBuf};

use crate::collector::error::CollectError;
use crate::collector::traits::FileSystem;
use parser::{PriorityStats, parse_human_size, parse_priority_stats, parse_u64};

/// Frequency attributes of one CPU, in kHz as the kernel reports them.
///
/// Each attribute is optional: drivers expose different subsets and
/// `cpuinfo_cur_freq` is usually root-only.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CpuFreqStats {
    pub cpu: u32,
    pub cpuinfo_cur: Option<u64>,
    pub cpuinfo_min: Option<u64>,
    pub cpuinfo_max: Option<u64>,
    pub scaling_cur: Option<u64>,
    pub scaling_min: Option<u64>,
    pub scaling_max: Option<u64>,
}

/// Thermal throttle counters and topology of one CPU.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThermalThrottle {
    pub cpu: u32,
    pub package: String,
    pub core: String,
    pub core_throttle_count: Option<u64>,
    pub package_throttle_count: Option<u64>,
}

/// Cumulative request statistics of a bcache backing device (`stats_total`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PeriodStats {
    pub bypassed: f64,
    pub cache_hits: f64,
    pub cache_misses: f64,
    pub cache_bypass_hits: f64,
    pub cache_bypass_misses: f64,
    pub cache_miss_collisions: f64,
    /// Removed in Linux 4.14; absent on newer kernels.
    pub cache_readaheads: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BcacheBackingDevice {
    pub name: String,
    pub dirty_data: f64,
    pub total: PeriodStats,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BcacheCacheDevice {
    pub name: String,
    pub io_errors: f64,
    pub metadata_written: f64,
    pub written: f64,
    pub priority: Option<PriorityStats>,
}

/// Statistics of one bcache cache set (`/sys/fs/bcache/<uuid>`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BcacheStats {
    pub uuid: String,
    pub average_key_size: f64,
    pub btree_cache_size: f64,
    pub cache_available_percent: f64,
    pub congested: f64,
    pub root_usage_percent: f64,
    pub tree_depth: f64,
    pub active_journal_entries: f64,
    pub btree_nodes: f64,
    pub btree_read_average_duration_us: f64,
    pub cache_read_races: f64,
    pub backing_devices: Vec<BcacheBackingDevice>,
    pub cache_devices: Vec<BcacheCacheDevice>,
}

/// Reader for `/sys` files rooted at a configurable mount point.
#[derive(Debug, Clone)]
pub struct SysFs<F: FileSystem> {
    fs: F,
    sys_path: PathBuf,
}

impl<F: FileSystem> SysFs<F> {
    /// Opens a sysfs root, failing if the mount point does not exist.
    pub fn open(fs: F, sys_path: impl AsRef<Path>) -> Result<Self, CollectError> {
        let sys_path = sys_path.as_ref().to_path_buf();
        if !fs.exists(&sys_path) {
            return Err(CollectError::unavailable(
                &sys_path,
                std::io::Error::new(std::io::ErrorKind::NotFound, "sysfs root not found"),
            ));
        }
        Ok(Self { fs, sys_path })
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.sys_path.join(name)
    }

    /// Whether `name` exists below the sysfs root.
    pub fn exists(&self, name: &str) -> bool {
        self.fs.exists(&self.path(name))
    }

    fn read(&self, path: &Path) -> Result<String, CollectError> {
        self.fs
            .read_to_string(path)
            .map_err(|e| CollectError::unavailable(path, e))
    }

    fn read_u64(&self, path: &Path) -> Result<u64, CollectError> {
        parse_u64(&self.read(path)?)
            .map_err(|e| CollectError::malformed(format!("{}: {}", path.display(), e.message)))
    }

    fn read_size(&self, path: &Path) -> Result<f64, CollectError> {
        parse_human_size(&self.read(path)?)
            .map_err(|e| CollectError::malformed(format!("{}: {}", path.display(), e.message)))
    }

    /// Attribute that may legitimately be missing or unreadable.
    fn read_optional_u64(&self, path: &Path) -> Option<u64> {
        self.read_u64(path).ok()
    }

    /// Lists `devices/system/cpu/cpuN` directories sorted by N.
    fn cpu_dirs(&self) -> Result<Vec<(u32, PathBuf)>, CollectError> {
        let root = self.path("devices/system/cpu");
        let entries = self
            .fs
            .read_dir(&root)
            .map_err(|e| CollectError::unavailable(&root, e))?;

        let mut cpus: Vec<(u32, PathBuf)> = entries
            .into_iter()
            .filter_map(|path| {
                let id = path
                    .file_name()?
                    .to_str()?
                    .strip_prefix("cpu")?
                    .parse()
                    .ok()?;
                Some((id, path))
            })
            .collect();
        cpus.sort_by_key(|(id, _)| *id);
        Ok(cpus)
    }

    /// Reads cpufreq attributes for every CPU that has a `cpufreq` directory.
    pub fn cpufreq(&self) -> Result<Vec<CpuFreqStats>, CollectError> {
        let mut stats = Vec::new();
        for (cpu, dir) in self.cpu_dirs()? {
            let freq = dir.join("cpufreq");
            if !self.fs.exists(&freq) {
                continue;
            }
            stats.push(CpuFreqStats {
                cpu,
                cpuinfo_cur: self.read_optional_u64(&freq.join("cpuinfo_cur_freq")),
                cpuinfo_min: self.read_optional_u64(&freq.join("cpuinfo_min_freq")),
                cpuinfo_max: self.read_optional_u64(&freq.join("cpuinfo_max_freq")),
                scaling_cur: self.read_optional_u64(&freq.join("scaling_cur_freq")),
                scaling_min: self.read_optional_u64(&freq.join("scaling_min_freq")),
                scaling_max: self.read_optional_u64(&freq.join("scaling_max_freq")),
            });
        }
        Ok(stats)
    }

    /// Reads thermal throttle counters for every CPU that exposes them.
    pub fn thermal_throttle(&self) -> Result<Vec<ThermalThrottle>, CollectError> {
        let mut result = Vec::new();
        for (cpu, dir) in self.cpu_dirs()? {
            let throttle = dir.join("thermal_throttle");
            if !self.fs.exists(&throttle) {
                continue;
            }
            let topology = dir.join("topology");
            let package = self.read(&topology.join("physical_package_id"))?;
            let core = self.read(&topology.join("core_id"))?;
            result.push(ThermalThrottle {
                cpu,
                package: package.trim().to_string(),
                core: core.trim().to_string(),
                core_throttle_count: self
                    .read_optional_u64(&throttle.join("core_throttle_count")),
                package_throttle_count: self
                    .read_optional_u64(&throttle.join("package_throttle_count")),
            });
        }
        Ok(result)
    }

    /// Reads every bcache cache set under `fs/bcache`.
    ///
    /// `priority_stats` is expensive for the kernel to produce, so it is only
    /// read when `with_priority` is set.
    pub fn bcache(&self, with_priority: bool) -> Result<Vec<BcacheStats>, CollectError> {
        let root = self.path("fs/bcache");
        let mut sets: Vec<PathBuf> = self
            .fs
            .read_dir(&root)
            .map_err(|e| CollectError::unavailable(&root, e))?
            .into_iter()
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.contains('-'))
            })
            .collect();
        sets.sort();

        sets.iter()
            .map(|dir| self.bcache_set(dir, with_priority))
            .collect()
    }

    fn bcache_set(&self, dir: &Path, with_priority: bool) -> Result<BcacheStats, CollectError> {
        let internal = dir.join("internal");
        let mut stats = BcacheStats {
            uuid: file_name(dir),
            average_key_size: self.read_size(&dir.join("average_key_size"))?,
            btree_cache_size: self.read_size(&dir.join("btree_cache_size"))?,
            cache_available_percent: self.read_size(&dir.join("cache_available_percent"))?,
            congested: self.read_size(&dir.join("congested"))?,
            root_usage_percent: self.read_size(&dir.join("root_usage_percent"))?,
            tree_depth: self.read_size(&dir.join("tree_depth"))?,
            active_journal_entries: self.read_size(&internal.join("active_journal_entries"))?,
            btree_nodes: self.read_size(&internal.join("btree_nodes"))?,
            btree_read_average_duration_us: self
                .read_size(&internal.join("btree_read_average_duration_us"))?,
            cache_read_races: self.read_size(&internal.join("cache_read_races"))?,
            ..Default::default()
        };

        let mut children = self
            .fs
            .read_dir(dir)
            .map_err(|e| CollectError::unavailable(dir, e))?;
        children.sort();

        for child in children {
            let name = file_name(&child);
            if name.starts_with("bdev") {
                stats.backing_devices.push(self.bcache_bdev(&child, name)?);
            } else if name.starts_with("cache") && name[5..].parse::<u32>().is_ok() {
                stats
                    .cache_devices
                    .push(self.bcache_cache(&child, name, with_priority)?);
            }
        }

        Ok(stats)
    }

    fn bcache_bdev(&self, dir: &Path, name: String) -> Result<BcacheBackingDevice, CollectError> {
        let total = dir.join("stats_total");
        let readaheads = total.join("cache_readaheads");
        Ok(BcacheBackingDevice {
            name,
            dirty_data: self.read_size(&dir.join("dirty_data"))?,
            total: PeriodStats {
                bypassed: self.read_size(&total.join("bypassed"))?,
                cache_hits: self.read_size(&total.join("cache_hits"))?,
                cache_misses: self.read_size(&total.join("cache_misses"))?,
                cache_bypass_hits: self.read_size(&total.join("cache_bypass_hits"))?,
                cache_bypass_misses: self.read_size(&total.join("cache_bypass_misses"))?,
                cache_miss_collisions: self.read_size(&total.join("cache_miss_collisions"))?,
                cache_readaheads: if self.fs.exists(&readaheads) {
                    Some(self.read_size(&readaheads)?)
                } else {
                    None
                },
            },
        })
    }

    fn bcache_cache(
        &self,
        dir: &Path,
        name: String,
        with_priority: bool,
    ) -> Result<BcacheCacheDevice, CollectError> {
        let priority = if with_priority {
            let path = dir.join("priority_stats");
            let content = self.read(&path)?;
            Some(parse_priority_stats(&content).map_err(|e| {
                CollectError::malformed(format!("{}: {}", path.display(), e.message))
            })?)
        } else {
            None
        };

        Ok(BcacheCacheDevice {
            name,
            io_errors: self.read_size(&dir.join("io_errors"))?,
            metadata_written: self.read_size(&dir.join("metadata_written"))?,
            written: self.read_size(&dir.join("written"))?,
            priority,
        })
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
