//! Scrape orchestration.
//!
//! A [`Scraper`] runs every built collector once per [`Scraper::scrape`],
//! either each on its own thread or one after another, and merges their
//! samples with two meta-metrics per collector:
//!
//! - `node_scrape_collector_success{collector}`: 1 if `update` returned `Ok`
//! - `node_scrape_collector_duration_seconds{collector}`: wall-clock time
//!
//! A failing or panicking collector contributes only its meta-metrics. The
//! optional timeout is soft: the scraper stops waiting, but collector threads
//! that are still running finish in the background.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, mpsc};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, error, warn};

use crate::collector::Collector;
use crate::metric::{MetricDescriptor, MetricSample};

/// How collectors are executed within one scrape.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ScrapeMode {
    /// One thread per collector.
    #[default]
    Concurrent,
    /// Registration order, one at a time.
    Sequential,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ScrapeOptions {
    pub mode: ScrapeMode,
    /// Stop waiting for collectors after this long.
    pub timeout: Option<Duration>,
}

/// Outcome of one collector within a scrape.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrapeMeta {
    pub collector: String,
    pub success: bool,
    pub duration: Duration,
}

/// Result of one scrape.
#[derive(Debug, Clone, Default)]
pub struct Scrape {
    /// Collector samples followed by the meta-metric samples.
    pub samples: Vec<MetricSample>,
    /// One entry per collector, in registration order.
    pub meta: Vec<ScrapeMeta>,
}

impl Scrape {
    /// Meta entry of the named collector.
    pub fn collector(&self, name: &str) -> Option<&ScrapeMeta> {
        self.meta.iter().find(|m| m.collector == name)
    }

    /// Collectors that did not succeed.
    pub fn failed(&self) -> impl Iterator<Item = &ScrapeMeta> {
        self.meta.iter().filter(|m| !m.success)
    }
}

#[derive(Debug)]
pub enum ScrapeError {
    /// The scraper has nothing to run.
    NoCollectors,
    /// The scrape ran past its timeout.
    ///
    /// `partial` holds everything that did finish, plus meta-metrics for
    /// all collectors with the pending ones marked as failed. `pending` is
    /// empty when the last collector to run finished, but too late.
    Timeout {
        elapsed: Duration,
        pending: Vec<String>,
        partial: Scrape,
    },
}

impl fmt::Display for ScrapeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScrapeError::NoCollectors => write!(f, "no collectors enabled"),
            ScrapeError::Timeout {
                elapsed, pending, ..
            } if pending.is_empty() => {
                write!(f, "scrape timed out after {:.3}s", elapsed.as_secs_f64())
            }
            ScrapeError::Timeout {
                elapsed, pending, ..
            } => write!(
                f,
                "scrape timed out after {:.3}s waiting for {}",
                elapsed.as_secs_f64(),
                pending.join(", ")
            ),
        }
    }
}

impl std::error::Error for ScrapeError {}

struct Outcome {
    samples: Vec<MetricSample>,
    success: bool,
    duration: Duration,
}

impl Outcome {
    fn failed(duration: Duration) -> Self {
        Self {
            samples: Vec::new(),
            success: false,
            duration,
        }
    }
}

/// Runs one collector, isolating errors and panics.
fn execute(name: &str, collector: &dyn Collector) -> Outcome {
    let start = Instant::now();
    let mut samples = Vec::new();
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        collector.update(&mut |sample| samples.push(sample))
    }));
    let duration = start.elapsed();

    match result {
        Ok(Ok(())) => {
            debug!(
                collector = name,
                duration_seconds = duration.as_secs_f64(),
                samples = samples.len(),
                "collector succeeded"
            );
            Outcome {
                samples,
                success: true,
                duration,
            }
        }
        Ok(Err(e)) => {
            error!(
                collector = name,
                duration_seconds = duration.as_secs_f64(),
                "collector failed: {}",
                e
            );
            Outcome::failed(duration)
        }
        Err(_) => {
            error!(
                collector = name,
                duration_seconds = duration.as_secs_f64(),
                "collector panicked"
            );
            Outcome::failed(duration)
        }
    }
}

/// Runs a fixed set of collectors and aggregates their output.
pub struct Scraper {
    collectors: Vec<(String, Arc<dyn Collector>)>,
    options: ScrapeOptions,
    success: Arc<MetricDescriptor>,
    duration: Arc<MetricDescriptor>,
}

impl Scraper {
    pub fn new(collectors: Vec<(String, Arc<dyn Collector>)>, options: ScrapeOptions) -> Self {
        Self {
            collectors,
            options,
            success: MetricDescriptor::gauge(
                "scrape",
                "collector_success",
                "Whether a collector succeeded.",
                &["collector"],
            ),
            duration: MetricDescriptor::gauge(
                "scrape",
                "collector_duration_seconds",
                "Duration of a collector scrape.",
                &["collector"],
            ),
        }
    }

    /// Names of the collectors this scraper runs, in order.
    pub fn collector_names(&self) -> impl Iterator<Item = &str> {
        self.collectors.iter().map(|(name, _)| name.as_str())
    }

    /// Runs every collector once.
    ///
    /// Safe to call from several threads at once; each stateful collector
    /// serializes on its own lock.
    pub fn scrape(&self) -> Result<Scrape, ScrapeError> {
        if self.collectors.is_empty() {
            return Err(ScrapeError::NoCollectors);
        }

        let start = Instant::now();
        let deadline = self.options.timeout.map(|t| start + t);

        let outcomes = match self.options.mode {
            ScrapeMode::Concurrent => self.run_concurrent(deadline),
            ScrapeMode::Sequential => self.run_sequential(deadline),
        };
        let elapsed = start.elapsed();

        let mut scrape = Scrape::default();
        let mut pending = Vec::new();
        for ((name, _), outcome) in self.collectors.iter().zip(outcomes) {
            let outcome = outcome.unwrap_or_else(|| {
                warn!("collector {} did not finish within the scrape timeout", name);
                pending.push(name.clone());
                Outcome::failed(elapsed)
            });
            scrape.samples.extend(outcome.samples);
            scrape.meta.push(ScrapeMeta {
                collector: name.clone(),
                success: outcome.success,
                duration: outcome.duration,
            });
        }

        for meta in &scrape.meta {
            let success = if meta.success { 1.0 } else { 0.0 };
            scrape.samples.push(MetricSample::new(
                &self.success,
                success,
                [meta.collector.as_str()],
            ));
            scrape.samples.push(MetricSample::new(
                &self.duration,
                meta.duration.as_secs_f64(),
                [meta.collector.as_str()],
            ));
        }

        debug!(
            duration_seconds = elapsed.as_secs_f64(),
            samples = scrape.samples.len(),
            "scrape finished"
        );

        let overran = self.options.timeout.is_some_and(|t| elapsed > t);
        if pending.is_empty() && !overran {
            Ok(scrape)
        } else {
            Err(ScrapeError::Timeout {
                elapsed,
                pending,
                partial: scrape,
            })
        }
    }

    fn run_sequential(&self, deadline: Option<Instant>) -> Vec<Option<Outcome>> {
        let mut outcomes = Vec::with_capacity(self.collectors.len());
        for (name, collector) in &self.collectors {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                outcomes.push(None);
                continue;
            }
            outcomes.push(Some(execute(name, collector.as_ref())));
        }
        outcomes
    }

    fn run_concurrent(&self, deadline: Option<Instant>) -> Vec<Option<Outcome>> {
        let mut outcomes: Vec<Option<Outcome>> =
            (0..self.collectors.len()).map(|_| None).collect();
        let (tx, rx) = mpsc::channel();

        let mut waiting = 0;
        for (index, (name, collector)) in self.collectors.iter().enumerate() {
            let tx = tx.clone();
            let thread_name = name.clone();
            let collector = Arc::clone(collector);
            let spawned = thread::Builder::new()
                .name(format!("collector-{}", name))
                .spawn(move || {
                    let outcome = execute(&thread_name, collector.as_ref());
                    // The receiver is gone if the scrape already timed out.
                    let _ = tx.send((index, outcome));
                });
            match spawned {
                Ok(_) => waiting += 1,
                Err(e) => {
                    error!("failed to spawn thread for collector {}: {}", name, e);
                    outcomes[index] = Some(Outcome::failed(Duration::ZERO));
                }
            }
        }
        drop(tx);

        while waiting > 0 {
            let next = match deadline {
                Some(deadline) => match deadline.checked_duration_since(Instant::now()) {
                    Some(left) => rx.recv_timeout(left).ok(),
                    None => None,
                },
                None => rx.recv().ok(),
            };
            let Some((index, outcome)) = next else {
                break;
            };
            outcomes[index] = Some(outcome);
            waiting -= 1;
        }

        outcomes
    }
}
