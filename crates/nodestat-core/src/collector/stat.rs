//! Kernel-wide counters from `/proc/stat`: interrupts, context switches,
//! forks, boot time and runnable/blocked process counts.

use std::sync::Arc;

use crate::collector::error::CollectError;
use crate::collector::procfs::ProcFs;
use crate::collector::settings::CollectorSettings;
use crate::collector::traits::FileSystem;
use crate::collector::Collector;
use crate::metric::{MetricDescriptor, MetricSample};

pub struct StatCollector<F: FileSystem> {
    procfs: ProcFs<F>,
    intr: Arc<MetricDescriptor>,
    context_switches: Arc<MetricDescriptor>,
    forks: Arc<MetricDescriptor>,
    boot_time: Arc<MetricDescriptor>,
    procs_running: Arc<MetricDescriptor>,
    procs_blocked: Arc<MetricDescriptor>,
}

impl<F: FileSystem + Clone> StatCollector<F> {
    pub fn new(settings: &CollectorSettings<F>) -> Result<Self, CollectError> {
        Ok(Self {
            procfs: settings.procfs()?,
            intr: MetricDescriptor::counter("", "intr_total", "Total number of interrupts serviced.", &[]),
            context_switches: MetricDescriptor::counter(
                "",
                "context_switches_total",
                "Total number of context switches.",
                &[],
            ),
            forks: MetricDescriptor::counter("", "forks_total", "Total number of forks.", &[]),
            boot_time: MetricDescriptor::gauge(
                "",
                "boot_time_seconds",
                "Node boot time, in unixtime.",
                &[],
            ),
            procs_running: MetricDescriptor::gauge(
                "",
                "procs_running",
                "Number of processes in runnable state.",
                &[],
            ),
            procs_blocked: MetricDescriptor::gauge(
                "",
                "procs_blocked",
                "Number of processes blocked waiting for I/O to complete.",
                &[],
            ),
        })
    }
}

impl<F: FileSystem + Clone> Collector for StatCollector<F> {
    fn update(&self, emit: &mut dyn FnMut(MetricSample)) -> Result<(), CollectError> {
        let stat = self.procfs.stat()?;
        let none: [&str; 0] = [];

        for (desc, value) in [
            (&self.intr, stat.intr),
            (&self.context_switches, stat.ctxt),
            (&self.forks, stat.processes),
            (&self.boot_time, stat.btime),
            (&self.procs_running, stat.procs_running),
            (&self.procs_blocked, stat.procs_blocked),
        ] {
            emit(MetricSample::new(desc, value as f64, none));
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
    fn test_stat_counters() {
        let settings = CollectorSettings::new(MockFs::typical_system());
        let samples = collect_all(&StatCollector::new(&settings).unwrap()).unwrap();

        let get = |name: &str| samples.iter().find(|s| s.name() == name).map(|s| s.value);
        assert_eq!(get("node_intr_total"), Some(1_000_000.0));
        assert_eq!(get("node_context_switches_total"), Some(500_000.0));
        assert_eq!(get("node_forks_total"), Some(10_000.0));
        assert_eq!(get("node_boot_time_seconds"), Some(1_700_000_000.0));
        assert_eq!(get("node_procs_running"), Some(2.0));
        assert_eq!(get("node_procs_blocked"), Some(0.0));
    }
}
