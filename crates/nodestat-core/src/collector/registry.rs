//! Collector registry: name -> factory table populated once at startup.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};

use crate::collector::bcache::BcacheCollector;
use crate::collector::buddyinfo::BuddyInfoCollector;
use crate::collector::cpu::CpuCollector;
use crate::collector::cpufreq::CpuFreqCollector;
use crate::collector::error::CollectError;
use crate::collector::loadavg::LoadAvgCollector;
use crate::collector::meminfo::MemInfoCollector;
use crate::collector::settings::CollectorSettings;
use crate::collector::stat::StatCollector;
use crate::collector::traits::FileSystem;
use crate::collector::Collector;

/// Builds a collector, opening and validating its data source.
pub type CollectorFactory<F> =
    fn(&CollectorSettings<F>) -> Result<Box<dyn Collector>, CollectError>;

/// Errors raised while populating or building a registry.
#[derive(Debug)]
pub enum RegistryError {
    DuplicateCollector(String),
    UnknownCollector(String),
    Construction { name: String, source: CollectError },
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::DuplicateCollector(name) => {
                write!(f, "collector '{}' registered twice", name)
            }
            RegistryError::UnknownCollector(name) => write!(f, "unknown collector '{}'", name),
            RegistryError::Construction { name, source } => {
                write!(f, "failed to create collector '{}': {}", name, source)
            }
        }
    }
}

impl std::error::Error for RegistryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RegistryError::Construction { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Which collectors to build.
///
/// A collector is enabled when it is on by default (and defaults are not
/// disabled) or listed in `enable`; `disable` wins over both.
#[derive(Debug, Clone, Default)]
pub struct CollectorSelection {
    pub disable_defaults: bool,
    pub enable: Vec<String>,
    pub disable: Vec<String>,
}

impl CollectorSelection {
    /// Selection that builds exactly the named collectors.
    pub fn only<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Self {
        Self {
            disable_defaults: true,
            enable: names.into_iter().map(Into::into).collect(),
            disable: Vec::new(),
        }
    }

    fn is_enabled(&self, name: &str, enabled_by_default: bool) -> bool {
        if self.disable.iter().any(|n| n == name) {
            return false;
        }
        (enabled_by_default && !self.disable_defaults) || self.enable.iter().any(|n| n == name)
    }
}

struct Entry<F: FileSystem> {
    name: String,
    enabled_by_default: bool,
    factory: CollectorFactory<F>,
}

/// Table of known collectors, in registration order.
pub struct CollectorRegistry<F: FileSystem> {
    entries: Vec<Entry<F>>,
}

impl<F: FileSystem> Default for CollectorRegistry<F> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<F: FileSystem> CollectorRegistry<F> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a collector. Names must be unique.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        enabled_by_default: bool,
        factory: CollectorFactory<F>,
    ) -> Result<(), RegistryError> {
        let name = name.into();
        if self.entries.iter().any(|e| e.name == name) {
            return Err(RegistryError::DuplicateCollector(name));
        }
        self.entries.push(Entry {
            name,
            enabled_by_default,
            factory,
        });
        Ok(())
    }

    /// Registered names with their default state, in registration order.
    pub fn names(&self) -> impl Iterator<Item = (&str, bool)> {
        self.entries
            .iter()
            .map(|e| (e.name.as_str(), e.enabled_by_default))
    }

    /// Constructs the selected collectors in registration order.
    ///
    /// Any factory failure aborts the build: a collector that cannot open
    /// its data source at startup is a configuration error.
    pub fn build(
        self,
        settings: &CollectorSettings<F>,
        selection: &CollectorSelection,
    ) -> Result<Vec<(String, Arc<dyn Collector>)>, RegistryError> {
        for name in selection.enable.iter().chain(&selection.disable) {
            if !self.entries.iter().any(|e| &e.name == name) {
                return Err(RegistryError::UnknownCollector(name.clone()));
            }
        }

        let mut collectors: Vec<(String, Arc<dyn Collector>)> = Vec::new();
        for entry in self.entries {
            if !selection.is_enabled(&entry.name, entry.enabled_by_default) {
                debug!("collector {} disabled", entry.name);
                continue;
            }
            let collector = (entry.factory)(settings).map_err(|source| {
                RegistryError::Construction {
                    name: entry.name.clone(),
                    source,
                }
            })?;
            info!("enabled collector {}", entry.name);
            collectors.push((entry.name, Arc::from(collector)));
        }

        Ok(collectors)
    }
}

fn boxed<C: Collector + 'static>(
    collector: Result<C, CollectError>,
) -> Result<Box<dyn Collector>, CollectError> {
    Ok(Box::new(collector?))
}

fn new_bcache<F: FileSystem + Clone + 'static>(
    s: &CollectorSettings<F>,
) -> Result<Box<dyn Collector>, CollectError> {
    boxed(BcacheCollector::new(s))
}

fn new_buddyinfo<F: FileSystem + Clone + 'static>(
    s: &CollectorSettings<F>,
) -> Result<Box<dyn Collector>, CollectError> {
    boxed(BuddyInfoCollector::new(s))
}

fn new_cpu<F: FileSystem + Clone + 'static>(
    s: &CollectorSettings<F>,
) -> Result<Box<dyn Collector>, CollectError> {
    boxed(CpuCollector::new(s))
}

fn new_cpufreq<F: FileSystem + Clone + 'static>(
    s: &CollectorSettings<F>,
) -> Result<Box<dyn Collector>, CollectError> {
    boxed(CpuFreqCollector::new(s))
}

fn new_loadavg<F: FileSystem + Clone + 'static>(
    s: &CollectorSettings<F>,
) -> Result<Box<dyn Collector>, CollectError> {
    boxed(LoadAvgCollector::new(s))
}

fn new_meminfo<F: FileSystem + Clone + 'static>(
    s: &CollectorSettings<F>,
) -> Result<Box<dyn Collector>, CollectError> {
    boxed(MemInfoCollector::new(s))
}

fn new_stat<F: FileSystem + Clone + 'static>(
    s: &CollectorSettings<F>,
) -> Result<Box<dyn Collector>, CollectError> {
    boxed(StatCollector::new(s))
}

impl<F: FileSystem + Clone + 'static> CollectorRegistry<F> {
    /// Registry with every collector this crate ships.
    pub fn builtin() -> Self {
        let builtin: [(&str, bool, CollectorFactory<F>); 7] = [
            ("bcache", true, new_bcache::<F>),
            ("buddyinfo", false, new_buddyinfo::<F>),
            ("cpu", true, new_cpu::<F>),
            ("cpufreq", true, new_cpufreq::<F>),
            ("loadavg", true, new_loadavg::<F>),
            ("meminfo", true, new_meminfo::<F>),
            ("stat", true, new_stat::<F>),
        ];

        let mut registry = Self::new();
        for (name, enabled, factory) in builtin {
            // names above are distinct
            let _ = registry.register(name, enabled, factory);
        }
        registry
    }
}
