//! Pre-built mock filesystem scenarios for testing.
//!
//! These scenarios provide realistic `/proc` and `/sys` states for the
//! builtin collectors.

use std::fmt::Write;

use super::filesystem::MockFs;

/// Per-CPU tick counters as laid out on a `/proc/stat` `cpuN` line:
/// user nice system idle iowait irq softirq steal guest guest_nice.
pub type CpuTicks = [u64; 10];

const TYPICAL_CPU_TICKS: [CpuTicks; 4] = [
    [2500, 125, 750, 20000, 250, 50, 25, 0, 0, 0],
    [2400, 100, 700, 20100, 240, 40, 20, 0, 0, 0],
    [2600, 150, 800, 19900, 260, 60, 30, 0, 10, 0],
    [2500, 125, 750, 20000, 250, 50, 25, 5, 0, 0],
];

impl MockFs {
    /// Creates a typical 4-CPU system with every file the builtin collectors read.
    pub fn typical_system() -> Self {
        let fs = Self::new();

        fs.add_file("/proc/loadavg", "0.15 0.10 0.05 1/150 1234\n");
        fs.add_file(
            "/proc/meminfo",
            "\
MemTotal:       16384000 kB
MemFree:         8192000 kB
MemAvailable:   12000000 kB
Buffers:          512000 kB
Cached:          2048000 kB
SwapTotal:       4096000 kB
SwapFree:        4096000 kB
Active(anon):     100000 kB
HugePages_Total:       0
",
        );
        fs.write_proc_stat(&TYPICAL_CPU_TICKS);
        fs.add_file(
            "/proc/buddyinfo",
            "\
Node 0, zone      DMA      1      0      1      0      2      1      1      0      1      1      3
Node 0, zone    DMA32    759    572    791    475    194     45     12      0      0      0      0
Node 0, zone   Normal   4381   1093    185   1530    567    102      4      0      0      0      0
",
        );

        let mut cpuinfo = String::new();
        for cpu in 0..4 {
            let _ = write!(
                cpuinfo,
                "\
processor\t: {cpu}
vendor_id\t: GenuineIntel
cpu family\t: 6
model\t\t: 142
model name\t: Intel(R) Core(TM) i7-8650U CPU @ 1.90GHz
stepping\t: 10
microcode\t: 0xb4
cpu MHz\t\t: 1800.000
cache size\t: 8192 KB
physical id\t: 0
core id\t\t: {core}
flags\t\t: fpu vme de pse tsc msr pae aes avx avx2 vmx
bugs\t\t: cpu_meltdown spectre_v1 spectre_v2 mds

",
                core = cpu % 2,
            );
        }
        fs.add_file("/proc/cpuinfo", cpuinfo);

        for cpu in 0..4 {
            let base = format!("/sys/devices/system/cpu/cpu{cpu}");
            fs.add_file(format!("{base}/cpufreq/cpuinfo_min_freq"), "800000\n");
            fs.add_file(format!("{base}/cpufreq/cpuinfo_max_freq"), "4200000\n");
            fs.add_file(format!("{base}/cpufreq/scaling_cur_freq"), "1800000\n");
            fs.add_file(format!("{base}/cpufreq/scaling_min_freq"), "800000\n");
            fs.add_file(format!("{base}/cpufreq/scaling_max_freq"), "4200000\n");
            fs.add_file(format!("{base}/topology/physical_package_id"), "0\n");
            fs.add_file(format!("{base}/topology/core_id"), format!("{}\n", cpu % 2));
            let core_throttles = if cpu % 2 == 0 { 3 } else { 5 };
            fs.add_file(
                format!("{base}/thermal_throttle/core_throttle_count"),
                format!("{core_throttles}\n"),
            );
            fs.add_file(
                format!("{base}/thermal_throttle/package_throttle_count"),
                "12\n",
            );
        }
        fs.add_file("/sys/devices/system/cpu/online", "0-3\n");

        let set = "/sys/fs/bcache/deaddd54-c735-46d5-868e-f331c5fd7c74";
        fs.add_file("/sys/fs/bcache/register", "");
        for (name, value) in [
            ("average_key_size", "0"),
            ("btree_cache_size", "2.0M"),
            ("cache_available_percent", "100"),
            ("congested", "0"),
            ("root_usage_percent", "0"),
            ("tree_depth", "0"),
            ("internal/active_journal_entries", "1"),
            ("internal/btree_nodes", "2"),
            ("internal/btree_read_average_duration_us", "1305"),
            ("internal/cache_read_races", "0"),
            ("bdev0/dirty_data", "0"),
            ("bdev0/stats_total/bypassed", "1.5M"),
            ("bdev0/stats_total/cache_hits", "546"),
            ("bdev0/stats_total/cache_misses", "23"),
            ("bdev0/stats_total/cache_bypass_hits", "0"),
            ("bdev0/stats_total/cache_bypass_misses", "0"),
            ("bdev0/stats_total/cache_miss_collisions", "0"),
            ("cache0/io_errors", "0"),
            ("cache0/metadata_written", "512"),
            ("cache0/written", "1.2M"),
            (
                "cache0/priority_stats",
                "Unused:\t\t99%\nClean:\t\t0%\nDirty:\t\t0%\nMetadata:\t1%\nAverage:\t0\n",
            ),
        ] {
            fs.add_file(format!("{set}/{name}"), format!("{value}\n"));
        }

        fs
    }

    /// Replaces `/proc/stat` with the given per-CPU tick counters.
    ///
    /// The aggregate `cpu` line is the column-wise sum.
    pub fn write_proc_stat(&self, cpus: &[CpuTicks]) {
        let mut total = [0u64; 10];
        for ticks in cpus {
            for (sum, value) in total.iter_mut().zip(ticks) {
                *sum += value;
            }
        }

        let join = |ticks: &CpuTicks| {
            ticks
                .iter()
                .map(u64::to_string)
                .collect::<Vec<_>>()
                .join(" ")
        };

        let mut content = format!("cpu  {}\n", join(&total));
        for (id, ticks) in cpus.iter().enumerate() {
            let _ = writeln!(content, "cpu{} {}", id, join(ticks));
        }
        content.push_str(
            "\
intr 1000000 50 0 0 0 0 0 0 0 1 0 0 0 100 0 0 1000
ctxt 500000
btime 1700000000
processes 10000
procs_running 2
procs_blocked 0
",
        );

        self.add_file("/proc/stat", content);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::procfs::parser::parse_global_stat;
    use crate::collector::traits::FileSystem;
    use std::path::Path;

    #[test]
    fn test_write_proc_stat_round_trips_through_parser() {
        let fs = MockFs::new();
        fs.write_proc_stat(&[[100, 0, 50, 1000, 0, 0, 0, 0, 0, 0]; 2]);

        let content = fs.read_to_string(Path::new("/proc/stat")).unwrap();
        let stat = parse_global_stat(&content).unwrap();

        assert_eq!(stat.cpus.len(), 2);
        assert_eq!(stat.total.unwrap().idle, 20.0);
        assert_eq!(stat.ctxt, 500000);
    }

    #[test]
    fn test_typical_system_has_sysfs_and_procfs() {
        let fs = MockFs::typical_system();

        assert!(fs.exists(Path::new("/proc/cpuinfo")));
        assert!(fs.exists(Path::new("/sys/devices/system/cpu/cpu3/cpufreq")));
        assert!(fs.exists(Path::new("/sys/fs/bcache")));
    }
}
