//! CPU frequency scaling state from `/sys/devices/system/cpu/cpu*/cpufreq`.

use std::sync::Arc;

use crate::collector::cpu::SUBSYSTEM;
use crate::collector::error::CollectError;
use crate::collector::settings::CollectorSettings;
use crate::collector::sysfs::SysFs;
use crate::collector::traits::FileSystem;
use crate::collector::Collector;
use crate::metric::{MetricDescriptor, MetricSample};

pub struct CpuFreqCollector<F: FileSystem> {
    sysfs: SysFs<F>,
    cpu_freq: Arc<MetricDescriptor>,
    cpu_freq_min: Arc<MetricDescriptor>,
    cpu_freq_max: Arc<MetricDescriptor>,
    scaling_freq: Arc<MetricDescriptor>,
    scaling_freq_min: Arc<MetricDescriptor>,
    scaling_freq_max: Arc<MetricDescriptor>,
}

impl<F: FileSystem + Clone> CpuFreqCollector<F> {
    pub fn new(settings: &CollectorSettings<F>) -> Result<Self, CollectError> {
        let gauge = |name: &str, help: &str| MetricDescriptor::gauge(SUBSYSTEM, name, help, &["cpu"]);

        Ok(Self {
            sysfs: settings.sysfs()?,
            cpu_freq: gauge("frequency_hertz", "Current cpu thread frequency in hertz."),
            cpu_freq_min: gauge("frequency_min_hertz", "Minimum cpu thread frequency in hertz."),
            cpu_freq_max: gauge("frequency_max_hertz", "Maximum cpu thread frequency in hertz."),
            scaling_freq: gauge(
                "scaling_frequency_hertz",
                "Current scaled CPU thread frequency in hertz.",
            ),
            scaling_freq_min: gauge(
                "scaling_frequency_min_hertz",
                "Minimum scaled CPU thread frequency in hertz.",
            ),
            scaling_freq_max: gauge(
                "scaling_frequency_max_hertz",
                "Maximum scaled CPU thread frequency in hertz.",
            ),
        })
    }
}

impl<F: FileSystem + Clone> Collector for CpuFreqCollector<F> {
    fn update(&self, emit: &mut dyn FnMut(MetricSample)) -> Result<(), CollectError> {
        for stats in self.sysfs.cpufreq()? {
            let cpu = stats.cpu.to_string();
            // sysfs reports kHz
            for (desc, khz) in [
                (&self.cpu_freq, stats.cpuinfo_cur),
                (&self.cpu_freq_min, stats.cpuinfo_min),
                (&self.cpu_freq_max, stats.cpuinfo_max),
                (&self.scaling_freq, stats.scaling_cur),
                (&self.scaling_freq_min, stats.scaling_min),
                (&self.scaling_freq_max, stats.scaling_max),
            ] {
                if let Some(khz) = khz {
                    emit(MetricSample::new(desc, khz as f64 * 1000.0, [cpu.as_str()]));
                }
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
    fn test_cpufreq_hertz() {
        let settings = CollectorSettings::new(MockFs::typical_system());
        let samples = collect_all(&CpuFreqCollector::new(&settings).unwrap()).unwrap();

        // five attributes per CPU, cpuinfo_cur_freq absent
        assert_eq!(samples.len(), 4 * 5);
        assert!(samples.iter().all(|s| s.name() != "node_cpu_frequency_hertz"));

        let scaling = samples
            .iter()
            .find(|s| s.name() == "node_cpu_scaling_frequency_hertz" && s.label("cpu") == Some("2"))
            .unwrap();
        assert_eq!(scaling.value, 1_800_000_000.0);

        let max = samples
            .iter()
            .find(|s| s.name() == "node_cpu_frequency_max_hertz")
            .unwrap();
        assert_eq!(max.value, 4_200_000_000.0);
    }

    #[test]
    fn test_cpufreq_root_required() {
        let settings = CollectorSettings::new(MockFs::new());
        assert!(CpuFreqCollector::new(&settings).is_err());
    }

    #[test]
    fn test_cpu_without_cpufreq_skipped() {
        let fs = MockFs::new();
        fs.add_file(
            "/sys/devices/system/cpu/cpu0/cpufreq/scaling_cur_freq",
            "1000\n",
        );
        fs.add_file("/sys/devices/system/cpu/cpu1/topology/core_id", "1\n");
        let settings = CollectorSettings::new(fs);
        let samples = collect_all(&CpuFreqCollector::new(&settings).unwrap()).unwrap();

        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].label("cpu"), Some("0"));
        assert_eq!(samples[0].value, 1_000_000.0);
    }
}
