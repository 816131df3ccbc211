//! nodestatd - kernel metrics collector daemon.
//!
//! Periodically runs the enabled collectors against /proc and /sys and
//! hands every scrape to a sink (JSON lines on stdout or in a file).

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;
#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use std::fs::OpenOptions;
use std::io::{self, BufWriter};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::Utc;
use clap::{ArgAction, Parser, ValueEnum};
use regex::Regex;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use nodestat_core::collector::{
    BcacheSettings, CollectorRegistry, CollectorSelection, CollectorSettings, CpuSettings, RealFs,
};
use nodestat_core::scrape::{Scrape, ScrapeError, ScrapeMode, ScrapeOptions, Scraper};
use nodestat_core::sink::{JsonLinesSink, MetricSink};

/// Kernel metrics collector daemon.
#[derive(Parser)]
#[command(name = "nodestatd", about = "Kernel metrics collector daemon", version)]
struct Args {
    /// Scrape interval in seconds.
    #[arg(short, long, default_value = "15")]
    interval: u64,

    /// Run a single scrape and exit.
    #[arg(long)]
    once: bool,

    /// procfs mountpoint.
    #[arg(long, env = "NODESTAT_PROC_PATH", default_value = "/proc")]
    proc_path: String,

    /// sysfs mountpoint.
    #[arg(long, env = "NODESTAT_SYS_PATH", default_value = "/sys")]
    sys_path: String,

    /// Enable a collector (repeatable).
    #[arg(long = "collector", value_name = "NAME")]
    collectors: Vec<String>,

    /// Disable a collector (repeatable). Wins over --collector.
    #[arg(long = "no-collector", value_name = "NAME")]
    no_collectors: Vec<String>,

    /// Start from an empty set; only --collector entries are enabled.
    #[arg(long)]
    disable_default_collectors: bool,

    /// Print the available collectors and exit.
    #[arg(long)]
    list_collectors: bool,

    /// Expose node_cpu_guest_seconds_total. Disable with --cpu-guest=false.
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    cpu_guest: bool,

    /// Expose node_cpu_info.
    #[arg(long)]
    cpu_info: bool,

    /// Expose the first core's cpuinfo flags matching this regex (needs --cpu-info).
    #[arg(long, value_name = "REGEX", value_parser = parse_regex)]
    cpu_flags_include: Option<Regex>,

    /// Expose the first core's cpuinfo bugs matching this regex (needs --cpu-info).
    #[arg(long, value_name = "REGEX", value_parser = parse_regex)]
    cpu_bugs_include: Option<Regex>,

    /// Expose bcache priority stats (expensive for the kernel).
    #[arg(long)]
    bcache_priority_stats: bool,

    /// How collectors run within a scrape.
    #[arg(long, value_enum, default_value_t = Mode::Concurrent)]
    scrape_mode: Mode,

    /// Stop waiting for collectors after this many seconds.
    #[arg(long, value_name = "SECS", value_parser = parse_timeout)]
    scrape_timeout: Option<Duration>,

    /// Write samples as JSON lines to this file, or "-" for stdout.
    #[arg(short, long, value_name = "PATH")]
    output: Option<String>,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is info level.
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    Concurrent,
    Sequential,
}

impl From<Mode> for ScrapeMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Concurrent => ScrapeMode::Concurrent,
            Mode::Sequential => ScrapeMode::Sequential,
        }
    }
}

fn parse_regex(s: &str) -> Result<Regex, String> {
    Regex::new(s).map_err(|e| format!("invalid regex '{}': {}", s, e))
}

fn parse_timeout(s: &str) -> Result<Duration, String> {
    let secs: f64 = s
        .trim()
        .parse()
        .map_err(|e| format!("invalid timeout '{}': {}", s, e))?;
    if !secs.is_finite() || secs <= 0.0 {
        return Err(format!("timeout must be a positive number of seconds, got '{}'", s));
    }
    Ok(Duration::from_secs_f64(secs))
}

/// Initializes the tracing subscriber with the appropriate log level.
/// Default level is INFO. Use -q for quiet mode (errors only).
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let mut filter = EnvFilter::from_default_env();
    for target in ["nodestatd", "nodestat_core"] {
        if let Ok(directive) = format!("{}={}", target, level).parse() {
            filter = filter.add_directive(directive);
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn collector_settings(args: &Args) -> CollectorSettings<RealFs> {
    let mut settings = CollectorSettings::new(RealFs::new())
        .with_proc_path(&args.proc_path)
        .with_sys_path(&args.sys_path);
    settings.cpu = CpuSettings {
        guest: args.cpu_guest,
        info: args.cpu_info,
        flags_include: args.cpu_flags_include.clone(),
        bugs_include: args.cpu_bugs_include.clone(),
    };
    settings.bcache = BcacheSettings {
        priority_stats: args.bcache_priority_stats,
    };
    settings
}

fn open_sink(output: &str) -> io::Result<Box<dyn MetricSink>> {
    if output == "-" {
        return Ok(Box::new(JsonLinesSink::new(io::stdout())));
    }
    let file = OpenOptions::new().create(true).append(true).open(output)?;
    Ok(Box::new(JsonLinesSink::new(BufWriter::new(file))))
}

/// Describes a scrape for logging.
fn describe_scrape(scrape: &Scrape) -> String {
    let failed: Vec<&str> = scrape.failed().map(|m| m.collector.as_str()).collect();
    let mut description = format!(
        "{} samples from {} collectors",
        scrape.samples.len(),
        scrape.meta.len()
    );
    if !failed.is_empty() {
        description.push_str(&format!(", failed: {}", failed.join(", ")));
    }
    description
}

fn main() {
    let args = Args::parse();

    // Initialize logging
    init_logging(args.verbose, args.quiet);

    let registry = CollectorRegistry::<RealFs>::builtin();
    if args.list_collectors {
        for (name, enabled) in registry.names() {
            let state = if enabled { "enabled" } else { "disabled" };
            println!("{:<12} {}", name, state);
        }
        return;
    }

    info!("nodestatd {} starting", env!("CARGO_PKG_VERSION"));
    info!(
        "Config: interval={}s, proc={}, sys={}, mode={:?}",
        args.interval, args.proc_path, args.sys_path, args.scrape_mode
    );

    let settings = collector_settings(&args);
    let selection = CollectorSelection {
        disable_defaults: args.disable_default_collectors,
        enable: args.collectors.clone(),
        disable: args.no_collectors.clone(),
    };
    let collectors = match registry.build(&settings, &selection) {
        Ok(collectors) => collectors,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    let scraper = Scraper::new(
        collectors,
        ScrapeOptions {
            mode: args.scrape_mode.into(),
            timeout: args.scrape_timeout,
        },
    );
    if scraper.collector_names().next().is_none() {
        error!("No collectors enabled");
        std::process::exit(1);
    }
    info!(
        "Collectors: {}",
        scraper.collector_names().collect::<Vec<_>>().join(", ")
    );

    let mut sink = match args.output.as_deref().map(open_sink).transpose() {
        Ok(sink) => sink,
        Err(e) => {
            error!("Failed to open output: {}", e);
            std::process::exit(1);
        }
    };

    let interval = Duration::from_secs(args.interval);

    // Setup graceful shutdown
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();

    if let Err(e) = ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        r.store(false, Ordering::SeqCst);
    }) {
        warn!("Failed to set Ctrl-C handler: {}", e);
    }

    info!("Starting scrape loop");

    let mut scrape_count: u64 = 0;
    while running.load(Ordering::SeqCst) {
        let started = Instant::now();
        let timestamp = Utc::now();

        let scrape = match scraper.scrape() {
            Ok(scrape) => Some(scrape),
            Err(ScrapeError::Timeout {
                elapsed,
                pending,
                partial,
            }) => {
                if pending.is_empty() {
                    warn!("Scrape overran its timeout: {:.3}s", elapsed.as_secs_f64());
                } else {
                    warn!(
                        "Scrape timed out after {:.3}s, still running: {}",
                        elapsed.as_secs_f64(),
                        pending.join(", ")
                    );
                }
                Some(partial)
            }
            Err(e) => {
                error!("Scrape failed: {}", e);
                None
            }
        };

        if let Some(scrape) = scrape {
            scrape_count += 1;
            info!("Scrape #{}: {}", scrape_count, describe_scrape(&scrape));

            if let Some(sink) = sink.as_mut()
                && let Err(e) = sink.write_scrape(&scrape, timestamp)
            {
                error!("Failed to write scrape: {}", e);
            }
        }
        debug!("Scrape took {:?}", started.elapsed());

        if args.once {
            break;
        }

        // Sleep with periodic checks for shutdown signal
        let sleep_interval = Duration::from_millis(100);
        let mut remaining = interval.saturating_sub(started.elapsed());
        while remaining > Duration::ZERO && running.load(Ordering::SeqCst) {
            let sleep_time = remaining.min(sleep_interval);
            std::thread::sleep(sleep_time);
            remaining = remaining.saturating_sub(sleep_time);
        }
    }

    info!("Shutdown complete");
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodestat_core::scrape::ScrapeMeta;

    fn meta(collector: &str, success: bool) -> ScrapeMeta {
        ScrapeMeta {
            collector: collector.to_string(),
            success,
            duration: Duration::from_millis(3),
        }
    }

    #[test]
    fn describe_scrape_lists_failures() {
        let scrape = Scrape {
            samples: Vec::new(),
            meta: vec![meta("cpu", true), meta("bcache", false), meta("stat", false)],
        };

        assert_eq!(
            describe_scrape(&scrape),
            "0 samples from 3 collectors, failed: bcache, stat"
        );
    }

    #[test]
    fn describe_scrape_all_ok() {
        let scrape = Scrape {
            samples: Vec::new(),
            meta: vec![meta("cpu", true)],
        };

        assert_eq!(describe_scrape(&scrape), "0 samples from 1 collectors");
    }

    #[test]
    fn parse_timeout_rejects_non_positive() {
        assert_eq!(parse_timeout("1.5").unwrap(), Duration::from_millis(1500));
        assert!(parse_timeout("0").is_err());
        assert!(parse_timeout("-2").is_err());
        assert!(parse_timeout("soon").is_err());
    }

    #[test]
    fn args_map_onto_settings() {
        let args = Args::parse_from([
            "nodestatd",
            "--proc-path",
            "/host/proc",
            "--cpu-guest=false",
            "--cpu-info",
            "--cpu-flags-include",
            "^avx",
            "--collector",
            "buddyinfo",
            "--no-collector",
            "bcache",
            "--scrape-mode",
            "sequential",
        ]);
        let settings = collector_settings(&args);

        assert_eq!(settings.proc_path, std::path::PathBuf::from("/host/proc"));
        assert!(!settings.cpu.guest);
        assert!(settings.cpu.info);
        assert!(settings.cpu.flags_include.is_some_and(|r| r.is_match("avx2")));
        assert_eq!(args.collectors, vec!["buddyinfo"]);
        assert_eq!(args.no_collectors, vec!["bcache"]);
        assert_eq!(ScrapeMode::from(args.scrape_mode), ScrapeMode::Sequential);
    }

    #[test]
    fn invalid_regex_is_rejected() {
        let result = Args::try_parse_from(["nodestatd", "--cpu-bugs-include", "("]);
        assert!(result.is_err());
    }
}
