//! Mock filesystem implementation for testing.
//!
//! Provides an in-memory filesystem that can simulate `/proc` and `/sys`
//! for running collector tests off Linux and in CI.

mod filesystem;
mod scenarios;

pub use filesystem::MockFs;
pub use scenarios::CpuTicks;
