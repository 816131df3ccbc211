//! Consolidation of per-CPU accounting counters across scrapes.
//!
//! `/proc/stat` CPU times are cumulative since boot but regress when a CPU
//! is hot-removed and re-added, or when the kernel reinitializes the
//! accounting source. [`CpuStatsCache`] keeps the last exposed value of every
//! counter and only ever moves it forward:
//!
//! - a change in the number of CPUs discards the whole cache;
//! - an `idle` drop of [`JUMP_BACK_SECONDS`] or more on one CPU is treated as
//!   a hotplug of that CPU and zeroes only its slot;
//! - any other regression keeps the previous value for that one field.
//!
//! The cached values, not the raw reading, are what the CPU collector emits.

use std::sync::{Mutex, PoisonError};

use tracing::debug;

use crate::collector::procfs::parser::CpuStat;

/// Idle counter drop, in seconds, that marks a CPU as hot-plugged.
pub const JUMP_BACK_SECONDS: f64 = 3.0;

/// Accumulated CPU times of one CPU, in seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CpuTimes {
    pub user: f64,
    pub nice: f64,
    pub system: f64,
    pub idle: f64,
    pub iowait: f64,
    pub irq: f64,
    pub softirq: f64,
    pub steal: f64,
    pub guest: f64,
    pub guest_nice: f64,
}

impl CpuTimes {
    /// Field values paired with their names, in `/proc/stat` column order.
    pub fn fields(&self) -> [(&'static str, f64); 10] {
        [
            ("user", self.user),
            ("nice", self.nice),
            ("system", self.system),
            ("idle", self.idle),
            ("iowait", self.iowait),
            ("irq", self.irq),
            ("softirq", self.softirq),
            ("steal", self.steal),
            ("guest", self.guest),
            ("guest_nice", self.guest_nice),
        ]
    }

    fn fields_mut(&mut self) -> [(&'static str, &mut f64); 10] {
        let CpuTimes {
            user,
            nice,
            system,
            idle,
            iowait,
            irq,
            softirq,
            steal,
            guest,
            guest_nice,
        } = self;
        [
            ("user", user),
            ("nice", nice),
            ("system", system),
            ("idle", idle),
            ("iowait", iowait),
            ("irq", irq),
            ("softirq", softirq),
            ("steal", steal),
            ("guest", guest),
            ("guest_nice", guest_nice),
        ]
    }
}

impl From<&CpuStat> for CpuTimes {
    fn from(stat: &CpuStat) -> Self {
        Self {
            user: stat.user,
            nice: stat.nice,
            system: stat.system,
            idle: stat.idle,
            iowait: stat.iowait,
            irq: stat.irq,
            softirq: stat.softirq,
            steal: stat.steal,
            guest: stat.guest,
            guest_nice: stat.guest_nice,
        }
    }
}

/// Last exposed CPU times, indexed by CPU ordinal.
///
/// Overlapping scrapes serialize on the internal lock, so each reading is
/// reconciled against the result of the previous one.
#[derive(Debug, Default)]
pub struct CpuStatsCache {
    stats: Mutex<Vec<CpuTimes>>,
}

impl CpuStatsCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reconciles a raw reading with the cache and returns the new cached values.
    pub fn update(&self, raw: &[CpuTimes]) -> Vec<CpuTimes> {
        // Every write below leaves the cache consistent, so a panic in another
        // holder does not invalidate it.
        let mut cache = self.stats.lock().unwrap_or_else(PoisonError::into_inner);

        if cache.len() != raw.len() {
            if !cache.is_empty() {
                debug!(
                    old_count = cache.len(),
                    new_count = raw.len(),
                    "CPU count changed, resetting CPU stats cache"
                );
            }
            *cache = vec![CpuTimes::default(); raw.len()];
        }

        for (cpu, (cached, new)) in cache.iter_mut().zip(raw).enumerate() {
            if cached.idle - new.idle >= JUMP_BACK_SECONDS {
                debug!(
                    cpu,
                    old_value = cached.idle,
                    new_value = new.idle,
                    threshold = JUMP_BACK_SECONDS,
                    "CPU idle counter jumped backwards past threshold, possible hotplug event, resetting CPU stats"
                );
                *cached = CpuTimes::default();
            }
            ratchet(cpu, cached, new);
        }

        cache.clone()
    }

    /// Current cached values without applying a new reading.
    pub fn snapshot(&self) -> Vec<CpuTimes> {
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

fn ratchet(cpu: usize, cached: &mut CpuTimes, new: &CpuTimes) {
    for ((mode, slot), (_, value)) in cached.fields_mut().into_iter().zip(new.fields()) {
        if value >= *slot {
            *slot = value;
        } else {
            debug!(
                cpu,
                mode,
                old_value = *slot,
                new_value = value,
                "CPU counter jumped backwards"
            );
        }
    }
}
