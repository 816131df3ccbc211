//! Memory statistics from `/proc/meminfo`.
//!
//! Field names come from the kernel, so descriptors are built the first
//! time a field is seen and kept for the life of the collector:
//! `MemTotal: 16384 kB` becomes `node_memory_MemTotal_bytes`, unitless
//! fields such as `HugePages_Total` keep their name.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use crate::collector::error::CollectError;
use crate::collector::procfs::ProcFs;
use crate::collector::settings::CollectorSettings;
use crate::collector::traits::FileSystem;
use crate::collector::Collector;
use crate::metric::{MetricDescriptor, MetricSample};

const SUBSYSTEM: &str = "memory";

pub struct MemInfoCollector<F: FileSystem> {
    procfs: ProcFs<F>,
    descriptors: Mutex<HashMap<String, Arc<MetricDescriptor>>>,
}

impl<F: FileSystem + Clone> MemInfoCollector<F> {
    pub fn new(settings: &CollectorSettings<F>) -> Result<Self, CollectError> {
        Ok(Self {
            procfs: settings.procfs()?,
            descriptors: Mutex::new(HashMap::new()),
        })
    }
}

fn describe(name: &str) -> Arc<MetricDescriptor> {
    let help = format!("Memory information field {}.", name);
    if name.ends_with("_total") {
        MetricDescriptor::counter(SUBSYSTEM, name, &help, &[])
    } else {
        MetricDescriptor::gauge(SUBSYSTEM, name, &help, &[])
    }
}

impl<F: FileSystem + Clone> Collector for MemInfoCollector<F> {
    fn update(&self, emit: &mut dyn FnMut(MetricSample)) -> Result<(), CollectError> {
        let none: [&str; 0] = [];
        let fields = self.procfs.meminfo()?;
        let mut descriptors = self
            .descriptors
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for field in fields {
            let name = if field.bytes {
                format!("{}_bytes", field.name)
            } else {
                field.name
            };
            let desc = descriptors
                .entry(name)
                .or_insert_with_key(|name| describe(name));
            emit(MetricSample::new(desc, field.value, none));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::collect_all;
    use crate::collector::mock::MockFs;
    use crate::metric::MetricKind;

    #[test]
    fn test_meminfo_names_and_units() {
        let settings = CollectorSettings::new(MockFs::typical_system());
        let samples = collect_all(&MemInfoCollector::new(&settings).unwrap()).unwrap();

        assert_eq!(samples.len(), 9);
        assert_eq!(samples[0].name(), "node_memory_MemTotal_bytes");
        assert_eq!(samples[0].value, 16384000.0 * 1024.0);

        let anon = samples
            .iter()
            .find(|s| s.name() == "node_memory_Active_anon_bytes")
            .unwrap();
        assert_eq!(anon.value, 100000.0 * 1024.0);

        let huge = samples
            .iter()
            .find(|s| s.name() == "node_memory_HugePages_Total")
            .unwrap();
        assert_eq!(huge.descriptor.kind, MetricKind::Gauge);
    }

    #[test]
    fn test_meminfo_descriptors_are_reused() {
        let settings = CollectorSettings::new(MockFs::typical_system());
        let collector = MemInfoCollector::new(&settings).unwrap();

        let first = collect_all(&collector).unwrap();
        let second = collect_all(&collector).unwrap();

        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(&second) {
            assert!(Arc::ptr_eq(&a.descriptor, &b.descriptor), "{}", a.name());
        }
        assert_eq!(collector.descriptors.lock().unwrap().len(), 9);
    }

    #[test]
    fn test_meminfo_empty_is_malformed() {
        let fs = MockFs::new();
        fs.add_file("/proc/meminfo", "");
        let collector = MemInfoCollector::new(&CollectorSettings::new(fs)).unwrap();

        assert!(matches!(
            collect_all(&collector),
            Err(CollectError::MalformedData(_))
        ));
    }
}
