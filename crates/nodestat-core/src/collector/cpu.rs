//! Per-CPU time accounting, CPU identification and thermal throttling.
//!
//! `/proc/stat` counters go through [`CpuStatsCache`] before they are
//! emitted, so the exposed series stay monotonic across CPU hotplug.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::collector::consolidate::{CpuStatsCache, CpuTimes};
use crate::collector::error::CollectError;
use crate::collector::procfs::ProcFs;
use crate::collector::settings::{CollectorSettings, CpuSettings};
use crate::collector::sysfs::SysFs;
use crate::collector::traits::FileSystem;
use crate::collector::Collector;
use crate::metric::{MetricDescriptor, MetricSample};

pub const SUBSYSTEM: &str = "cpu";

/// Modes exposed through `node_cpu_seconds_total`; guest time has its own family.
const SECONDS_MODES: usize = 8;

pub struct CpuCollector<F: FileSystem> {
    procfs: ProcFs<F>,
    sysfs: Option<SysFs<F>>,
    settings: CpuSettings,
    cache: CpuStatsCache,
    seconds: Arc<MetricDescriptor>,
    guest: Arc<MetricDescriptor>,
    info: Arc<MetricDescriptor>,
    flag_info: Arc<MetricDescriptor>,
    bug_info: Arc<MetricDescriptor>,
    core_throttles: Arc<MetricDescriptor>,
    package_throttles: Arc<MetricDescriptor>,
}

impl<F: FileSystem + Clone> CpuCollector<F> {
    pub fn new(settings: &CollectorSettings<F>) -> Result<Self, CollectError> {
        let procfs = settings.procfs()?;
        // Throttle counters are optional; a missing sysfs only drops them.
        let sysfs = settings.sysfs().ok();

        Ok(Self {
            procfs,
            sysfs,
            settings: settings.cpu.clone(),
            cache: CpuStatsCache::new(),
            seconds: MetricDescriptor::counter(
                SUBSYSTEM,
                "seconds_total",
                "Seconds the CPUs spent in each mode.",
                &["cpu", "mode"],
            ),
            guest: MetricDescriptor::counter(
                SUBSYSTEM,
                "guest_seconds_total",
                "Seconds the CPUs spent in guests (VMs) for each mode.",
                &["cpu", "mode"],
            ),
            info: MetricDescriptor::gauge(
                SUBSYSTEM,
                "info",
                "CPU information from /proc/cpuinfo.",
                &[
                    "package",
                    "core",
                    "cpu",
                    "vendor",
                    "family",
                    "model",
                    "model_name",
                    "microcode",
                    "stepping",
                    "cachesize",
                ],
            ),
            flag_info: MetricDescriptor::gauge(
                SUBSYSTEM,
                "flag_info",
                "The `flags` field of CPU information from /proc/cpuinfo taken from the first core.",
                &["flag"],
            ),
            bug_info: MetricDescriptor::gauge(
                SUBSYSTEM,
                "bug_info",
                "The `bugs` field of CPU information from /proc/cpuinfo taken from the first core.",
                &["bug"],
            ),
            core_throttles: MetricDescriptor::counter(
                SUBSYSTEM,
                "core_throttles_total",
                "Number of times this CPU core has been throttled.",
                &["package", "core"],
            ),
            package_throttles: MetricDescriptor::counter(
                SUBSYSTEM,
                "package_throttles_total",
                "Number of times this CPU package has been throttled.",
                &["package"],
            ),
        })
    }

    /// The cache is keyed by position in `/proc/stat`, the `cpu` label by
    /// kernel id; with offline CPUs the two differ and only the label names
    /// the CPU.
    fn update_stat(&self, emit: &mut dyn FnMut(MetricSample)) -> Result<(), CollectError> {
        let stat = self.procfs.stat()?;
        let raw: Vec<CpuTimes> = stat.cpus.iter().map(CpuTimes::from).collect();
        let consolidated = self.cache.update(&raw);

        for (cpu, times) in stat.cpus.iter().zip(&consolidated) {
            let cpu_label = cpu.cpu_id.to_string();
            for (mode, value) in times.fields().into_iter().take(SECONDS_MODES) {
                emit(MetricSample::new(
                    &self.seconds,
                    value,
                    [cpu_label.as_str(), mode],
                ));
            }

            if self.settings.guest {
                emit(MetricSample::new(
                    &self.guest,
                    times.guest,
                    [cpu_label.as_str(), "user"],
                ));
                emit(MetricSample::new(
                    &self.guest,
                    times.guest_nice,
                    [cpu_label.as_str(), "nice"],
                ));
            }
        }

        Ok(())
    }

    fn update_info(&self, emit: &mut dyn FnMut(MetricSample)) -> Result<(), CollectError> {
        let infos = self.procfs.cpuinfo()?;

        for info in &infos {
            emit(MetricSample::new(
                &self.info,
                1.0,
                [
                    info.physical_id.clone(),
                    info.core_id.clone(),
                    info.processor.to_string(),
                    info.vendor_id.clone(),
                    info.cpu_family.clone(),
                    info.model.clone(),
                    info.model_name.clone(),
                    info.microcode.clone(),
                    info.stepping.clone(),
                    info.cache_size.clone(),
                ],
            ));
        }

        let Some(first) = infos.first() else {
            return Ok(());
        };
        if let Some(filter) = &self.settings.flags_include {
            for flag in first.flags.iter().filter(|f| filter.is_match(f)) {
                emit(MetricSample::new(&self.flag_info, 1.0, [flag.as_str()]));
            }
        }
        if let Some(filter) = &self.settings.bugs_include {
            for bug in first.bugs.iter().filter(|b| filter.is_match(b)) {
                emit(MetricSample::new(&self.bug_info, 1.0, [bug.as_str()]));
            }
        }

        Ok(())
    }

    fn update_thermal_throttle(&self, emit: &mut dyn FnMut(MetricSample)) {
        let Some(sysfs) = &self.sysfs else {
            return;
        };
        let throttles = match sysfs.thermal_throttle() {
            Ok(throttles) => throttles,
            Err(e) => {
                debug!("CPU thermal throttle stats unavailable: {}", e);
                return;
            }
        };

        // Hyperthreads share a core, cores share a package: report each once.
        let mut cores: BTreeMap<(&str, &str), u64> = BTreeMap::new();
        let mut packages: BTreeMap<&str, u64> = BTreeMap::new();
        for throttle in &throttles {
            if let Some(count) = throttle.core_throttle_count {
                cores
                    .entry((throttle.package.as_str(), throttle.core.as_str()))
                    .or_insert(count);
            }
            if let Some(count) = throttle.package_throttle_count {
                packages.entry(throttle.package.as_str()).or_insert(count);
            }
        }

        for ((package, core), count) in cores {
            emit(MetricSample::new(
                &self.core_throttles,
                count as f64,
                [package, core],
            ));
        }
        for (package, count) in packages {
            emit(MetricSample::new(
                &self.package_throttles,
                count as f64,
                [package],
            ));
        }
    }
}

impl<F: FileSystem + Clone> Collector for CpuCollector<F> {
    fn update(&self, emit: &mut dyn FnMut(MetricSample)) -> Result<(), CollectError> {
        if self.settings.info {
            self.update_info(emit)?;
        }
        self.update_thermal_throttle(emit);
        self.update_stat(emit)
    }
}
