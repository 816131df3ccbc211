//! Parsers for `/proc` filesystem files.
//!
//! These are pure functions that parse the content of various `/proc` files
//! into structured data. They are designed to be easily testable with string inputs.

/// Clock ticks per second (USER_HZ). Standard value for Linux.
pub const CLK_TCK: f64 = 100.0;

/// Error type for parsing failures.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
}

impl ParseError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Parse error: {}", self.message)
    }
}

impl std::error::Error for ParseError {}

/// Single CPU line from `/proc/stat`, converted from ticks to seconds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CpuStat {
    pub cpu_id: u32,
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

/// Global stats from `/proc/stat`.
#[derive(Debug, Clone, Default)]
pub struct GlobalStat {
    /// Aggregate `cpu` line.
    pub total: Option<CpuStat>,
    /// Per-CPU `cpuN` lines, in file order.
    pub cpus: Vec<CpuStat>,
    pub intr: u64,
    pub ctxt: u64,
    pub btime: u64,
    pub processes: u64,
    pub procs_running: u64,
    pub procs_blocked: u64,
}

fn parse_cpu_line(parts: &[&str], cpu_id: u32) -> Result<CpuStat, ParseError> {
    // Kernels older than 2.6.11 stop after idle; the rest default to zero.
    if parts.len() < 5 {
        return Err(ParseError::new(format!(
            "cpu line '{}' has {} fields, expected at least 4",
            parts[0],
            parts.len() - 1
        )));
    }

    let mut values = [0.0f64; 10];
    for (slot, raw) in values.iter_mut().zip(&parts[1..]) {
        let ticks: u64 = raw
            .parse()
            .map_err(|_| ParseError::new(format!("invalid counter '{}' in {}", raw, parts[0])))?;
        *slot = ticks as f64 / CLK_TCK;
    }

    let [user, nice, system, idle, iowait, irq, softirq, steal, guest, guest_nice] = values;
    Ok(CpuStat {
        cpu_id,
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
    })
}

/// Parses `/proc/stat` content.
pub fn parse_global_stat(content: &str) -> Result<GlobalStat, ParseError> {
    let mut stat = GlobalStat::default();

    for line in content.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.is_empty() {
            continue;
        }

        let first_value = || -> u64 { parts.get(1).and_then(|s| s.parse().ok()).unwrap_or(0) };

        if parts[0] == "cpu" {
            stat.total = Some(parse_cpu_line(&parts, 0)?);
        } else if let Some(id) = parts[0].strip_prefix("cpu") {
            let cpu_id = id
                .parse()
                .map_err(|_| ParseError::new(format!("invalid cpu label '{}'", parts[0])))?;
            stat.cpus.push(parse_cpu_line(&parts, cpu_id)?);
        } else {
            match parts[0] {
                "intr" => stat.intr = first_value(),
                "ctxt" => stat.ctxt = first_value(),
                "btime" => stat.btime = first_value(),
                "processes" => stat.processes = first_value(),
                "procs_running" => stat.procs_running = first_value(),
                "procs_blocked" => stat.procs_blocked = first_value(),
                _ => {}
            }
        }
    }

    if stat.total.is_none() && stat.cpus.is_empty() {
        return Err(ParseError::new("no cpu lines in /proc/stat"));
    }

    Ok(stat)
}

/// One processor entry from `/proc/cpuinfo`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CpuInfo {
    pub processor: u32,
    pub vendor_id: String,
    pub cpu_family: String,
    pub model: String,
    pub model_name: String,
    pub microcode: String,
    pub stepping: String,
    pub cache_size: String,
    pub physical_id: String,
    pub core_id: String,
    pub flags: Vec<String>,
    pub bugs: Vec<String>,
}

/// Parses x86-style `/proc/cpuinfo` content.
///
/// Entries are separated by blank lines; each line is `key<tabs>: value`.
/// Keys that are not listed in [`CpuInfo`] are ignored.
pub fn parse_cpuinfo(content: &str) -> Result<Vec<CpuInfo>, ParseError> {
    let mut infos = Vec::new();
    let mut current: Option<CpuInfo> = None;

    for line in content.lines() {
        if line.trim().is_empty() {
            if let Some(info) = current.take() {
                infos.push(info);
            }
            continue;
        }

        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim();

        if key == "processor" {
            if let Some(info) = current.take() {
                infos.push(info);
            }
            let processor = value
                .parse()
                .map_err(|_| ParseError::new(format!("invalid processor id '{}'", value)))?;
            current = Some(CpuInfo {
                processor,
                ..Default::default()
            });
            continue;
        }

        let Some(info) = current.as_mut() else {
            return Err(ParseError::new(format!(
                "cpuinfo field '{}' before any processor line",
                key
            )));
        };

        match key {
            "vendor_id" => info.vendor_id = value.to_string(),
            "cpu family" => info.cpu_family = value.to_string(),
            "model" => info.model = value.to_string(),
            "model name" => info.model_name = value.to_string(),
            "microcode" => info.microcode = value.to_string(),
            "stepping" => info.stepping = value.to_string(),
            "cache size" => info.cache_size = value.to_string(),
            "physical id" => info.physical_id = value.to_string(),
            "core id" => info.core_id = value.to_string(),
            "flags" => info.flags = value.split_whitespace().map(String::from).collect(),
            "bugs" => info.bugs = value.split_whitespace().map(String::from).collect(),
            _ => {}
        }
    }

    if let Some(info) = current {
        infos.push(info);
    }

    Ok(infos)
}

/// One `Node N, zone Z ...` line from `/proc/buddyinfo`.
#[derive(Debug, Clone, PartialEq)]
pub struct BuddyInfo {
    pub node: String,
    pub zone: String,
    /// Free block counts, indexed by order (block size 2^order pages).
    pub sizes: Vec<f64>,
}

/// Parses `/proc/buddyinfo` content.
///
/// All lines must report the same number of orders.
pub fn parse_buddyinfo(content: &str) -> Result<Vec<BuddyInfo>, ParseError> {
    let mut entries: Vec<BuddyInfo> = Vec::new();

    for line in content.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.is_empty() {
            continue;
        }
        if parts.len() < 4 || parts[0] != "Node" || parts[2] != "zone" {
            return Err(ParseError::new(format!("invalid buddyinfo line '{}'", line)));
        }

        let node = parts[1].trim_end_matches(',').to_string();
        let zone = parts[3].to_string();
        let sizes = parts[4..]
            .iter()
            .map(|s| {
                s.parse::<f64>()
                    .map_err(|_| ParseError::new(format!("invalid block count '{}'", s)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        if let Some(first) = entries.first()
            && first.sizes.len() != sizes.len()
        {
            return Err(ParseError::new(format!(
                "mismatched buddyinfo order count: {} vs {}",
                first.sizes.len(),
                sizes.len()
            )));
        }

        entries.push(BuddyInfo { node, zone, sizes });
    }

    Ok(entries)
}

/// One `/proc/meminfo` field, normalized for use in a metric name.
#[derive(Debug, Clone, PartialEq)]
pub struct MemInfoField {
    /// Field name with `(x)` rewritten to `_x` (`Active(anon)` -> `Active_anon`).
    pub name: String,
    /// Value in bytes when the kernel reports `kB`, otherwise the raw count.
    pub value: f64,
    /// Whether the kernel reported a unit, i.e. `value` is in bytes.
    pub bytes: bool,
}

/// Parses `/proc/meminfo` content.
pub fn parse_meminfo(content: &str) -> Result<Vec<MemInfoField>, ParseError> {
    let mut fields = Vec::new();

    for line in content.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 2 {
            continue;
        }

        let key = parts[0].trim_end_matches(':');
        let raw: f64 = parts[1]
            .parse()
            .map_err(|_| ParseError::new(format!("invalid meminfo value for {}", key)))?;
        let (value, bytes) = match parts.get(2) {
            Some(&"kB") => (raw * 1024.0, true),
            Some(_) => (raw, true),
            None => (raw, false),
        };

        let name = key.replace('(', "_").replace(')', "");
        fields.push(MemInfoField { name, value, bytes });
    }

    if fields.is_empty() {
        return Err(ParseError::new("empty meminfo"));
    }

    Ok(fields)
}

/// Parsed data from `/proc/loadavg`.
#[derive(Debug, Clone, Default)]
pub struct LoadAvg {
    pub load1: f64,
    pub load5: f64,
    pub load15: f64,
    pub running: u32,
    pub total: u32,
}

/// Parses `/proc/loadavg` content.
pub fn parse_loadavg(content: &str) -> Result<LoadAvg, ParseError> {
    let parts: Vec<&str> = content.split_whitespace().collect();
    if parts.len() < 4 {
        return Err(ParseError::new("invalid loadavg format"));
    }

    let load1 = parts[0]
        .parse()
        .map_err(|_| ParseError::new("invalid load1"))?;
    let load5 = parts[1]
        .parse()
        .map_err(|_| ParseError::new("invalid load5"))?;
    let load15 = parts[2]
        .parse()
        .map_err(|_| ParseError::new("invalid load15"))?;

    // Format: running/total
    let (running, total) = if let Some((r, t)) = parts[3].split_once('/') {
        (r.parse().unwrap_or(0), t.parse().unwrap_or(0))
    } else {
        (0, 0)
    };

    Ok(LoadAvg {
        load1,
        load5,
        load15,
        running,
        total,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_global_stat() {
        let content = "\
cpu  10000 500 3000 80000 1000 200 100 0 0 0
cpu0 2500 125 750 20000 250 50 25 0 0 0
cpu1 2500 125 750 20000 250 50 25 0 10 5
intr 1000000 50 0 0
ctxt 500000
btime 1700000000
processes 10000
procs_running 2
procs_blocked 0
";
        let stat = parse_global_stat(content).unwrap();

        assert_eq!(stat.total.as_ref().unwrap().user, 100.0);
        assert_eq!(stat.cpus.len(), 2);
        assert_eq!(stat.cpus[0].cpu_id, 0);
        assert_eq!(stat.cpus[0].user, 25.0);
        assert_eq!(stat.cpus[0].idle, 200.0);
        assert_eq!(stat.cpus[1].cpu_id, 1);
        assert_eq!(stat.cpus[1].guest, 0.1);
        assert_eq!(stat.cpus[1].guest_nice, 0.05);
        assert_eq!(stat.intr, 1000000);
        assert_eq!(stat.ctxt, 500000);
        assert_eq!(stat.btime, 1700000000);
        assert_eq!(stat.processes, 10000);
        assert_eq!(stat.procs_running, 2);
        assert_eq!(stat.procs_blocked, 0);
    }

    #[test]
    fn test_parse_global_stat_short_cpu_line() {
        let stat = parse_global_stat("cpu0 100 0 50 900\n").unwrap();

        assert_eq!(stat.cpus[0].idle, 9.0);
        assert_eq!(stat.cpus[0].iowait, 0.0);
        assert_eq!(stat.cpus[0].guest_nice, 0.0);
    }

    #[test]
    fn test_parse_global_stat_keeps_offline_gaps() {
        let stat = parse_global_stat("cpu0 1 0 0 1\ncpu2 1 0 0 1\n").unwrap();

        let ids: Vec<u32> = stat.cpus.iter().map(|c| c.cpu_id).collect();
        assert_eq!(ids, vec![0, 2]);
    }

    #[test]
    fn test_parse_global_stat_malformed() {
        assert!(parse_global_stat("cpu0 1 2 x 4\n").is_err());
        assert!(parse_global_stat("cpu0 1 2\n").is_err());
        assert!(parse_global_stat("cpuX 1 2 3 4\n").is_err());
        assert!(parse_global_stat("ctxt 5\n").is_err());
    }

    #[test]
    fn test_parse_cpuinfo() {
        let content = "\
processor\t: 0
vendor_id\t: GenuineIntel
cpu family\t: 6
model\t\t: 142
model name\t: Intel(R) Core(TM) i7-8650U CPU @ 1.90GHz
stepping\t: 10
microcode\t: 0xb4
cache size\t: 8192 KB
physical id\t: 0
core id\t\t: 0
flags\t\t: fpu vme de pse tsc msr aes avx2
bugs\t\t: cpu_meltdown spectre_v1 spectre_v2

processor\t: 1
vendor_id\t: GenuineIntel
cpu family\t: 6
model\t\t: 142
physical id\t: 0
core id\t\t: 1
flags\t\t: fpu vme
";
        let infos = parse_cpuinfo(content).unwrap();

        assert_eq!(infos.len(), 2);
        assert_eq!(infos[0].processor, 0);
        assert_eq!(infos[0].vendor_id, "GenuineIntel");
        assert_eq!(infos[0].cpu_family, "6");
        assert_eq!(infos[0].model, "142");
        assert_eq!(
            infos[0].model_name,
            "Intel(R) Core(TM) i7-8650U CPU @ 1.90GHz"
        );
        assert_eq!(infos[0].microcode, "0xb4");
        assert_eq!(infos[0].cache_size, "8192 KB");
        assert_eq!(infos[0].flags.len(), 7);
        assert_eq!(infos[0].bugs, vec!["cpu_meltdown", "spectre_v1", "spectre_v2"]);
        assert_eq!(infos[1].core_id, "1");
        assert!(infos[1].bugs.is_empty());
    }

    #[test]
    fn test_parse_cpuinfo_field_before_processor() {
        assert!(parse_cpuinfo("vendor_id\t: GenuineIntel\n").is_err());
    }

    #[test]
    fn test_parse_buddyinfo() {
        let content = "\
Node 0, zone      DMA      1      0      1      0      2      1      1      0      1      1      3
Node 0, zone    DMA32    759    572    791    475    194     45     12      0      0      0      0
Node 0, zone   Normal   4381   1093    185   1530    567    102      4      0      0      0      0
";
        let info = parse_buddyinfo(content).unwrap();

        assert_eq!(info.len(), 3);
        assert_eq!(info[0].node, "0");
        assert_eq!(info[0].zone, "DMA");
        assert_eq!(info[0].sizes.len(), 11);
        assert_eq!(info[2].zone, "Normal");
        assert_eq!(info[2].sizes[0], 4381.0);
        assert_eq!(info[2].sizes[3], 1530.0);
    }

    #[test]
    fn test_parse_buddyinfo_malformed() {
        assert!(parse_buddyinfo("Node 0, zone DMA 1 x\n").is_err());
        assert!(parse_buddyinfo("garbage line here\n").is_err());
        assert!(parse_buddyinfo("Node 0, zone DMA 1 2\nNode 0, zone Normal 1\n").is_err());
    }

    #[test]
    fn test_parse_meminfo() {
        let content = "\
MemTotal:       16384000 kB
MemFree:         8192000 kB
Active(anon):     100000 kB
HugePages_Total:       0
";
        let fields = parse_meminfo(content).unwrap();

        assert_eq!(fields.len(), 4);
        assert_eq!(fields[0].name, "MemTotal");
        assert_eq!(fields[0].value, 16384000.0 * 1024.0);
        assert_eq!(fields[2].name, "Active_anon");
        assert_eq!(fields[3].name, "HugePages_Total");
        assert_eq!(fields[3].value, 0.0);
        assert!(fields[0].bytes);
        assert!(!fields[3].bytes);
    }

    #[test]
    fn test_parse_meminfo_malformed() {
        assert!(parse_meminfo("MemTotal: lots kB\n").is_err());
        assert!(parse_meminfo("").is_err());
    }

    #[test]
    fn test_parse_loadavg() {
        let content = "0.15 0.10 0.05 1/150 1234\n";
        let load = parse_loadavg(content).unwrap();

        assert!((load.load1 - 0.15).abs() < 0.001);
        assert!((load.load5 - 0.10).abs() < 0.001);
        assert!((load.load15 - 0.05).abs() < 0.001);
        assert_eq!(load.running, 1);
        assert_eq!(load.total, 150);
    }

    #[test]
    fn test_parse_loadavg_invalid() {
        assert!(parse_loadavg("0.15 0.10\n").is_err());
        assert!(parse_loadavg("a b c 1/2 3\n").is_err());
    }
}
