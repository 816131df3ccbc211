//! Parsers for single-value and small multi-line `/sys` attribute files.

use crate::collector::procfs::parser::ParseError;

/// Parses a file holding one unsigned integer.
pub fn parse_u64(content: &str) -> Result<u64, ParseError> {
    let trimmed = content.trim();
    trimmed
        .parse()
        .map_err(|_| ParseError::new(format!("invalid integer '{}'", trimmed)))
}

/// Parses a bcache human-readable size such as `1.5k`, `20.0M` or `512`.
///
/// Suffixes are powers of 1024 (`k`, `M`, `G`, `T`, `P`, `E`, `Z`, `Y`).
pub fn parse_human_size(content: &str) -> Result<f64, ParseError> {
    let s = content.trim();
    if s.is_empty() {
        return Err(ParseError::new("empty size string"));
    }

    const SUFFIXES: [char; 8] = ['k', 'M', 'G', 'T', 'P', 'E', 'Z', 'Y'];

    let (num_str, multiplier) = match s.chars().last() {
        Some(c) => match SUFFIXES
            .iter()
            .position(|suffix| suffix.eq_ignore_ascii_case(&c))
        {
            Some(idx) => (&s[..s.len() - c.len_utf8()], 1024f64.powi(idx as i32 + 1)),
            None => (s, 1.0),
        },
        None => (s, 1.0),
    };

    num_str
        .trim()
        .parse::<f64>()
        .map(|n| n * multiplier)
        .map_err(|e| ParseError::new(format!("invalid size '{}': {}", s, e)))
}

/// Parsed subset of a bcache `priority_stats` file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriorityStats {
    pub unused_percent: f64,
    pub metadata_percent: f64,
}

/// Parses a bcache `priority_stats` file.
///
/// Format: `Key:<tabs>value` lines; only `Unused` and `Metadata` are kept.
pub fn parse_priority_stats(content: &str) -> Result<PriorityStats, ParseError> {
    let mut stats = PriorityStats::default();
    let mut seen = 0;

    let parse_percent = |value: &str| -> Result<f64, ParseError> {
        value
            .trim()
            .trim_end_matches('%')
            .parse()
            .map_err(|_| ParseError::new(format!("invalid percentage '{}'", value.trim())))
    };

    for line in content.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        match key.trim() {
            "Unused" => {
                stats.unused_percent = parse_percent(value)?;
                seen += 1;
            }
            "Metadata" => {
                stats.metadata_percent = parse_percent(value)?;
                seen += 1;
            }
            _ => {}
        }
    }

    if seen < 2 {
        return Err(ParseError::new("priority_stats lacks Unused/Metadata lines"));
    }

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_u64() {
        assert_eq!(parse_u64("1800000\n").unwrap(), 1800000);
        assert!(parse_u64("<unknown>\n").is_err());
    }

    #[test]
    fn test_parse_human_size() {
        assert_eq!(parse_human_size("512\n").unwrap(), 512.0);
        assert_eq!(parse_human_size("1.5k").unwrap(), 1536.0);
        assert_eq!(parse_human_size("2.0M").unwrap(), 2.0 * 1024.0 * 1024.0);
        assert_eq!(parse_human_size("1G").unwrap(), 1024.0 * 1024.0 * 1024.0);
        assert_eq!(parse_human_size("3K").unwrap(), 3072.0);
    }

    #[test]
    fn test_parse_human_size_invalid() {
        assert!(parse_human_size("").is_err());
        assert!(parse_human_size("k").is_err());
        assert!(parse_human_size("12Q").is_err());
    }

    #[test]
    fn test_parse_priority_stats() {
        let content = "\
Unused:\t\t99%
Clean:\t\t0%
Dirty:\t\t0%
Metadata:\t0%
Average:\t0
Sectors per Q:\t1024
Quantiles:\t[0 0 0 0]
";
        let stats = parse_priority_stats(content).unwrap();

        assert_eq!(stats.unused_percent, 99.0);
        assert_eq!(stats.metadata_percent, 0.0);
    }

    #[test]
    fn test_parse_priority_stats_incomplete() {
        assert!(parse_priority_stats("Unused:\t99%\n").is_err());
        assert!(parse_priority_stats("Unused:\tlots\nMetadata:\t1%\n").is_err());
    }
}
