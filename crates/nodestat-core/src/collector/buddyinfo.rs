//! Free memory fragmentation from `/proc/buddyinfo`.

use std::sync::Arc;

use tracing::debug;

use crate::collector::error::CollectError;
use crate::collector::procfs::ProcFs;
use crate::collector::settings::CollectorSettings;
use crate::collector::traits::FileSystem;
use crate::collector::Collector;
use crate::metric::{MetricDescriptor, MetricSample};

pub struct BuddyInfoCollector<F: FileSystem> {
    procfs: ProcFs<F>,
    blocks: Arc<MetricDescriptor>,
}

impl<F: FileSystem + Clone> BuddyInfoCollector<F> {
    pub fn new(settings: &CollectorSettings<F>) -> Result<Self, CollectError> {
        Ok(Self {
            procfs: settings.procfs()?,
            blocks: MetricDescriptor::gauge(
                "buddyinfo",
                "blocks",
                "Count of free blocks according to size.",
                &["node", "zone", "size"],
            ),
        })
    }
}

impl<F: FileSystem + Clone> Collector for BuddyInfoCollector<F> {
    fn update(&self, emit: &mut dyn FnMut(MetricSample)) -> Result<(), CollectError> {
        let entries = self.procfs.buddyinfo()?;
        debug!(zones = entries.len(), "read buddyinfo");

        for entry in &entries {
            for (size, count) in entry.sizes.iter().enumerate() {
                emit(MetricSample::new(
                    &self.blocks,
                    *count,
                    [entry.node.clone(), entry.zone.clone(), size.to_string()],
                ));
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

    #[test]
    fn test_buddyinfo_blocks() {
        let settings = CollectorSettings::new(MockFs::typical_system());
        let samples = collect_all(&BuddyInfoCollector::new(&settings).unwrap()).unwrap();

        assert_eq!(samples.len(), 3 * 11);
        let dma32_order1 = samples
            .iter()
            .find(|s| s.label("zone") == Some("DMA32") && s.label("size") == Some("1"))
            .unwrap();
        assert_eq!(dma32_order1.value, 572.0);
        assert_eq!(dma32_order1.label("node"), Some("0"));
    }

    #[test]
    fn test_buddyinfo_missing_file() {
        let fs = MockFs::new();
        fs.add_dir("/proc");
        let collector = BuddyInfoCollector::new(&CollectorSettings::new(fs)).unwrap();

        assert!(matches!(
            collect_all(&collector),
            Err(CollectError::DataSourceUnavailable { .. })
        ));
    }
}
