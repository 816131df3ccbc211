//! bcache cache-set, backing-device and cache-device statistics from
//! `/sys/fs/bcache`.

use std::sync::Arc;

use tracing::debug;

use crate::collector::error::CollectError;
use crate::collector::settings::CollectorSettings;
use crate::collector::sysfs::{BcacheBackingDevice, BcacheCacheDevice, BcacheStats, SysFs};
use crate::collector::traits::FileSystem;
use crate::collector::Collector;
use crate::metric::{MetricDescriptor, MetricKind, MetricSample, NAMESPACE, fq_name};

const SUBSYSTEM: &str = "bcache";

/// One metric family and how to read its value from a parsed record.
struct Family<T> {
    desc: Arc<MetricDescriptor>,
    value: fn(&T) -> Option<f64>,
}

fn family<T>(
    kind: MetricKind,
    name: &str,
    help: &str,
    labels: &[&str],
    value: fn(&T) -> Option<f64>,
) -> Family<T> {
    Family {
        desc: MetricDescriptor::new(fq_name(NAMESPACE, SUBSYSTEM, name), help, labels, kind),
        value,
    }
}

pub struct BcacheCollector<F: FileSystem> {
    sysfs: SysFs<F>,
    priority_stats: bool,
    sets: Vec<Family<BcacheStats>>,
    backing: Vec<Family<BcacheBackingDevice>>,
    caches: Vec<Family<BcacheCacheDevice>>,
}

impl<F: FileSystem + Clone> BcacheCollector<F> {
    pub fn new(settings: &CollectorSettings<F>) -> Result<Self, CollectError> {
        use MetricKind::{Counter, Gauge};

        let set = |kind: MetricKind, name: &str, help: &str, value: fn(&BcacheStats) -> Option<f64>| {
            family(kind, name, help, &["uuid"], value)
        };
        let bdev = |kind: MetricKind,
                    name: &str,
                    help: &str,
                    value: fn(&BcacheBackingDevice) -> Option<f64>| {
            family(kind, name, help, &["uuid", "backing_device"], value)
        };
        let cache = |kind: MetricKind,
                     name: &str,
                     help: &str,
                     value: fn(&BcacheCacheDevice) -> Option<f64>| {
            family(kind, name, help, &["uuid", "cache_device"], value)
        };

        let sets = vec![
            set(
                Gauge,
                "average_key_size_sectors",
                "Average data per key in the btree (sectors).",
                |s| Some(s.average_key_size),
            ),
            set(
                Gauge,
                "btree_cache_size_bytes",
                "Amount of memory currently used by the btree cache.",
                |s| Some(s.btree_cache_size),
            ),
            set(
                Gauge,
                "cache_available_percent",
                "Percentage of cache device without dirty data, usable for writeback (may contain clean cached data).",
                |s| Some(s.cache_available_percent),
            ),
            set(Gauge, "congested", "Congestion.", |s| Some(s.congested)),
            set(
                Gauge,
                "root_usage_percent",
                "Percentage of the root btree node in use (tree depth increases if too high).",
                |s| Some(s.root_usage_percent),
            ),
            set(Gauge, "tree_depth", "Depth of the btree.", |s| {
                Some(s.tree_depth)
            }),
            set(
                Gauge,
                "active_journal_entries",
                "Number of journal entries that are newer than the index.",
                |s| Some(s.active_journal_entries),
            ),
            set(Gauge, "btree_nodes", "Total nodes in the btree.", |s| {
                Some(s.btree_nodes)
            }),
            set(
                Gauge,
                "btree_read_average_duration_seconds",
                "Average btree read duration.",
                |s| Some(s.btree_read_average_duration_us * 1e-6),
            ),
            set(
                Counter,
                "cache_read_races_total",
                "Counts instances where while data was being read from the cache, the bucket was reused and invalidated.",
                |s| Some(s.cache_read_races),
            ),
        ];

        let backing = vec![
            bdev(
                Gauge,
                "dirty_data_bytes",
                "Amount of dirty data for this backing device in the cache.",
                |d| Some(d.dirty_data),
            ),
            bdev(
                Counter,
                "bypassed_bytes_total",
                "Amount of IO (both reads and writes) that has bypassed the cache.",
                |d| Some(d.total.bypassed),
            ),
            bdev(
                Counter,
                "cache_hits_total",
                "Hits counted per individual IO as bcache sees them.",
                |d| Some(d.total.cache_hits),
            ),
            bdev(
                Counter,
                "cache_misses_total",
                "Misses counted per individual IO as bcache sees them.",
                |d| Some(d.total.cache_misses),
            ),
            bdev(
                Counter,
                "cache_bypass_hits_total",
                "Hits for IO intended to skip the cache.",
                |d| Some(d.total.cache_bypass_hits),
            ),
            bdev(
                Counter,
                "cache_bypass_misses_total",
                "Misses for IO intended to skip the cache.",
                |d| Some(d.total.cache_bypass_misses),
            ),
            bdev(
                Counter,
                "cache_miss_collisions_total",
                "Instances where data insertion from cache miss raced with write (data already present).",
                |d| Some(d.total.cache_miss_collisions),
            ),
            bdev(
                Counter,
                "cache_readaheads_total",
                "Count of times readahead occurred.",
                |d| d.total.cache_readaheads,
            ),
        ];

        let caches = vec![
            cache(
                Gauge,
                "io_errors",
                "Number of errors that have occurred, decayed by io_error_halflife.",
                |c| Some(c.io_errors),
            ),
            cache(
                Counter,
                "metadata_written_bytes_total",
                "Sum of all non data writes (btree writes and all other metadata).",
                |c| Some(c.metadata_written),
            ),
            cache(
                Counter,
                "written_bytes_total",
                "Sum of all data that has been written to the cache.",
                |c| Some(c.written),
            ),
            cache(
                Gauge,
                "priority_stats_unused_percent",
                "The percentage of the cache that doesn't contain any data.",
                |c| c.priority.as_ref().map(|p| p.unused_percent),
            ),
            cache(
                Gauge,
                "priority_stats_metadata_percent",
                "Bcache's metadata overhead.",
                |c| c.priority.as_ref().map(|p| p.metadata_percent),
            ),
        ];

        Ok(Self {
            sysfs: settings.sysfs()?,
            priority_stats: settings.bcache.priority_stats,
            sets,
            backing,
            caches,
        })
    }
}

fn emit_families<T>(
    families: &[Family<T>],
    record: &T,
    labels: &[&str],
    emit: &mut dyn FnMut(MetricSample),
) {
    for family in families {
        if let Some(value) = (family.value)(record) {
            emit(MetricSample::new(&family.desc, value, labels.iter().copied()));
        }
    }
}

impl<F: FileSystem + Clone> Collector for BcacheCollector<F> {
    fn update(&self, emit: &mut dyn FnMut(MetricSample)) -> Result<(), CollectError> {
        if !self.sysfs.exists("fs/bcache") {
            debug!("bcache not loaded, nothing to collect");
            return Ok(());
        }

        for set in self.sysfs.bcache(self.priority_stats)? {
            emit_families(&self.sets, &set, &[set.uuid.as_str()], emit);
            for bdev in &set.backing_devices {
                emit_families(&self.backing, bdev, &[set.uuid.as_str(), bdev.name.as_str()], emit);
            }
            for cache in &set.cache_devices {
                emit_families(&self.caches, cache, &[set.uuid.as_str(), cache.name.as_str()], emit);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::collect_all;
    use crate::collector::mock::MockFs;

    const UUID: &str = "deaddd54-c735-46d5-868e-f331c5fd7c74";

    fn find<'a>(samples: &'a [MetricSample], name: &str) -> Option<&'a MetricSample> {
        samples.iter().find(|s| s.name() == name)
    }

    #[test]
    fn test_bcache_metrics() {
        let settings = CollectorSettings::new(MockFs::typical_system());
        let samples = collect_all(&BcacheCollector::new(&settings).unwrap()).unwrap();

        // 10 set + 7 backing (no readaheads) + 3 cache families
        assert_eq!(samples.len(), 20);

        let duration = find(&samples, "node_bcache_btree_read_average_duration_seconds").unwrap();
        assert!((duration.value - 0.001305).abs() < 1e-12);
        assert_eq!(duration.label("uuid"), Some(UUID));

        let hits = find(&samples, "node_bcache_cache_hits_total").unwrap();
        assert_eq!(hits.value, 546.0);
        assert_eq!(hits.label("backing_device"), Some("bdev0"));

        let written = find(&samples, "node_bcache_written_bytes_total").unwrap();
        assert_eq!(written.label("cache_device"), Some("cache0"));
        assert_eq!(written.descriptor.kind, MetricKind::Counter);

        assert!(find(&samples, "node_bcache_cache_readaheads_total").is_none());
        assert!(find(&samples, "node_bcache_priority_stats_unused_percent").is_none());
    }

    #[test]
    fn test_bcache_priority_stats() {
        let mut settings = CollectorSettings::new(MockFs::typical_system());
        settings.bcache.priority_stats = true;
        let samples = collect_all(&BcacheCollector::new(&settings).unwrap()).unwrap();

        assert_eq!(
            find(&samples, "node_bcache_priority_stats_unused_percent").map(|s| s.value),
            Some(99.0)
        );
        assert_eq!(
            find(&samples, "node_bcache_priority_stats_metadata_percent").map(|s| s.value),
            Some(1.0)
        );
    }

    #[test]
    fn test_bcache_readaheads_on_old_kernels() {
        let fs = MockFs::typical_system();
        fs.add_file(
            format!("/sys/fs/bcache/{UUID}/bdev0/stats_total/cache_readaheads"),
            "13\n",
        );
        let samples =
            collect_all(&BcacheCollector::new(&CollectorSettings::new(fs)).unwrap()).unwrap();

        assert_eq!(
            find(&samples, "node_bcache_cache_readaheads_total").map(|s| s.value),
            Some(13.0)
        );
    }

    #[test]
    fn test_bcache_not_loaded() {
        let fs = MockFs::new();
        fs.add_dir("/sys/devices");
        let collector = BcacheCollector::new(&CollectorSettings::new(fs)).unwrap();

        assert!(collect_all(&collector).unwrap().is_empty());
    }
}
