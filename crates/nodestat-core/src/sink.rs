//! Consumers of scrape results.

use std::collections::BTreeMap;
use std::io::{self, Write};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::metric::MetricKind;
use crate::scrape::Scrape;

/// Receives the sample set of every scrape.
pub trait MetricSink {
    fn write_scrape(&mut self, scrape: &Scrape, timestamp: DateTime<Utc>) -> io::Result<()>;
}

#[derive(Serialize)]
struct SampleRecord<'a> {
    timestamp: &'a str,
    name: &'a str,
    kind: MetricKind,
    labels: BTreeMap<&'a str, &'a str>,
    value: f64,
}

/// Writes one JSON object per sample, one per line.
///
/// ```text
/// {"timestamp":"2024-01-01T00:00:00.000Z","name":"node_load1","kind":"gauge","labels":{},"value":0.15}
/// ```
pub struct JsonLinesSink<W: Write> {
    writer: W,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> MetricSink for JsonLinesSink<W> {
    fn write_scrape(&mut self, scrape: &Scrape, timestamp: DateTime<Utc>) -> io::Result<()> {
        let timestamp = timestamp.to_rfc3339_opts(SecondsFormat::Millis, true);
        for sample in &scrape.samples {
            let record = SampleRecord {
                timestamp: &timestamp,
                name: sample.name(),
                kind: sample.descriptor.kind,
                labels: sample.labels().collect(),
                value: sample.value,
            };
            serde_json::to_writer(&mut self.writer, &record)?;
            self.writer.write_all(b"\n")?;
        }
        self.writer.flush()
    }
}

/// Keeps the most recent scrape in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub last: Option<(DateTime<Utc>, Scrape)>,
    pub scrapes: usize,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MetricSink for MemorySink {
    fn write_scrape(&mut self, scrape: &Scrape, timestamp: DateTime<Utc>) -> io::Result<()> {
        self.last = Some((timestamp, scrape.clone()));
        self.scrapes += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::{MetricDescriptor, MetricSample};
    use chrono::TimeZone;

    fn scrape() -> Scrape {
        let seconds = MetricDescriptor::counter(
            "cpu",
            "seconds_total",
            "Seconds the CPUs spent in each mode.",
            &["cpu", "mode"],
        );
        let load = MetricDescriptor::gauge("", "load1", "1m load average.", &[]);
        let none: [&str; 0] = [];
        Scrape {
            samples: vec![
                MetricSample::new(&seconds, 25.5, ["0", "user"]),
                MetricSample::new(&load, 0.15, none),
            ],
            meta: Vec::new(),
        }
    }

    #[test]
    fn test_json_lines_shape() {
        let mut sink = JsonLinesSink::new(Vec::new());
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        sink.write_scrape(&scrape(), ts).unwrap();

        let output = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["timestamp"], "2024-01-01T00:00:00.000Z");
        assert_eq!(first["name"], "node_cpu_seconds_total");
        assert_eq!(first["kind"], "counter");
        assert_eq!(first["labels"]["cpu"], "0");
        assert_eq!(first["labels"]["mode"], "user");
        assert_eq!(first["value"], 25.5);

        assert_eq!(
            lines[1],
            r#"{"timestamp":"2024-01-01T00:00:00.000Z","name":"node_load1","kind":"gauge","labels":{},"value":0.15}"#
        );
    }

    #[test]
    fn test_memory_sink_keeps_last() {
        let mut sink = MemorySink::new();
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

        sink.write_scrape(&scrape(), ts).unwrap();
        sink.write_scrape(&Scrape::default(), ts).unwrap();

        assert_eq!(sink.scrapes, 2);
        let (_, last) = sink.last.unwrap();
        assert!(last.samples.is_empty());
    }
}
