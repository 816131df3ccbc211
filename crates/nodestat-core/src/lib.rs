//! nodestat-core: kernel metric collection engine.
//!
//! Provides:
//! - `metric`: metric descriptors and samples
//! - `collector`: the `Collector` capability, builtin collectors for
//!   `/proc` and `/sys`, CPU counter consolidation and the collector registry
//! - `scrape`: concurrent/sequential scrape orchestration with per-collector
//!   success and duration meta-metrics
//! - `sink`: consumers of scrape results (JSON lines, in-memory)

pub mod collector;
pub mod metric;
pub mod scrape;
pub mod sink;
