//! Kernel metric collectors for Linux.
//!
//! Every data source implements [`Collector`]. Collectors read `/proc` and
//! `/sys` through the [`FileSystem`] trait, so the same code runs against the
//! live kernel and against [`MockFs`] scenarios in tests.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     CollectorRegistry                        │
//! │   name -> (enabled_by_default, factory(&CollectorSettings))  │
//! └──────────────────────────────┬───────────────────────────────┘
//!                                │ build()
//!        ┌───────────┬───────────┼───────────┬───────────┐
//!        │           │           │           │           │
//!  ┌─────▼─────┐ ┌───▼───┐ ┌─────▼─────┐ ┌───▼───┐ ┌─────▼─────┐
//!  │    cpu    │ │cpufreq│ │  bcache   │ │  ...  │ │ buddyinfo │
//!  │ + cache   │ │       │ │           │ │       │ │           │
//!  └─────┬─────┘ └───┬───┘ └─────┬─────┘ └───┬───┘ └─────┬─────┘
//!        └───────────┴─────┬─────┴───────────┴───────────┘
//!                          │
//!              ┌───────────┴───────────┐
//!        ┌─────▼─────┐           ┌─────▼─────┐
//!        │  ProcFs   │           │   SysFs   │
//!        └─────┬─────┘           └─────┬─────┘
//!              └───────────┬───────────┘
//!                   ┌──────▼──────┐
//!                   │  FileSystem │ (trait)
//!                   └──────┬──────┘
//!              ┌───────────┼───────────┐
//!       ┌──────▼──────┐ ┌──▼──────────┐ ┌──────▼──────┐
//!       │   RealFs    │ │   MockFs    │ │  Scenarios  │
//!       │ (Linux)     │ │ (Testing)   │ │ (Fixtures)  │
//!       └─────────────┘ └─────────────┘ └─────────────┘
//! ```
//!
//! # Usage
//!
//! ```
//! use nodestat_core::collector::{Collector, CollectorRegistry, CollectorSelection, CollectorSettings, MockFs};
//!
//! let settings = CollectorSettings::new(MockFs::typical_system());
//! let collectors = CollectorRegistry::builtin()
//!     .build(&settings, &CollectorSelection::default())
//!     .unwrap();
//!
//! let mut samples = Vec::new();
//! for (_, collector) in &collectors {
//!     collector.update(&mut |sample| samples.push(sample)).unwrap();
//! }
//! assert!(samples.iter().any(|s| s.name() == "node_cpu_seconds_total"));
//! ```

pub mod bcache;
pub mod buddyinfo;
pub mod consolidate;
pub mod cpu;
pub mod cpufreq;
mod error;
pub mod loadavg;
pub mod meminfo;
pub mod mock;
pub mod procfs;
mod registry;
mod settings;
pub mod stat;
pub mod sysfs;
pub mod traits;

pub use error::CollectError;
pub use mock::MockFs;
pub use registry::{CollectorFactory, CollectorRegistry, CollectorSelection, RegistryError};
pub use settings::{BcacheSettings, CollectorSettings, CpuSettings};
pub use traits::{FileSystem, RealFs};

use crate::metric::MetricSample;

/// A source of metric samples.
///
/// `update` is called once per scrape and may run concurrently with other
/// collectors and with another scrape of the same collector. Implementations
/// that keep state across scrapes guard it with their own lock.
pub trait Collector: Send + Sync {
    /// Reads the data source and emits zero or more samples.
    ///
    /// On error, samples emitted before the failure are discarded by the
    /// scraper.
    fn update(&self, emit: &mut dyn FnMut(MetricSample)) -> Result<(), CollectError>;
}

/// Runs `collector` once and collects its samples.
pub fn collect_all(collector: &dyn Collector) -> Result<Vec<MetricSample>, CollectError> {
    let mut samples = Vec::new();
    collector.update(&mut |sample| samples.push(sample))?;
    Ok(samples)
}
