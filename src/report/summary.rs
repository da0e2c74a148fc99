//! Aggregation of trace records into counter snapshots.

use std::{
    collections::BTreeMap,
    fmt,
    io::BufRead,
};

use serde::Serialize;

use crate::{
    report::{Operation, Timestamp, TraceRecord},
    Result,
};

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Settings of a [`LogSummarizer`].
#[derive(Clone, Debug)]
pub struct ReportConfig {
    /// Trace tag the lines carry (default: `HEAPSCOPE`).
    pub tag: String,
    /// Minimum seconds between two snapshots (default: 10).
    pub interval: f64,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            tag: "HEAPSCOPE".to_string(),
            interval: 10.0,
        }
    }
}

impl ReportConfig {
    /// Creates the default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the trace tag.
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }

    /// Sets the snapshot interval in seconds.
    #[must_use]
    pub fn with_interval(mut self, seconds: f64) -> Self {
        self.interval = seconds;
        self
    }
}

/// The latest value of one counter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CounterEntry {
    /// Owner of the counter.
    pub name: String,
    /// What it counts.
    pub operation: Operation,
    /// Latest value seen.
    pub value: i64,
}

/// Every counter as of one point in the log.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Snapshot {
    /// Time of the record that triggered the snapshot.
    pub time: Timestamp,
    /// Counters sorted by name, then operation.
    pub counters: Vec<CounterEntry>,
}

/// Result of summarizing a log.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Summary {
    /// Number of trace records parsed.
    pub records: usize,
    /// Lines carrying the tag that could not be parsed.
    pub malformed: usize,
    /// Periodic snapshots in log order.
    pub snapshots: Vec<Snapshot>,
    /// Final value of every counter.
    pub latest: Vec<CounterEntry>,
}

impl Summary {
    /// Final value of one counter.
    #[must_use]
    pub fn latest_value(&self, name: &str, operation: Operation) -> Option<i64> {
        self.latest
            .iter()
            .find(|e| e.name == name && e.operation == operation)
            .map(|e| e.value)
    }
}

fn write_counters(f: &mut fmt::Formatter<'_>, counters: &[CounterEntry]) -> fmt::Result {
    for entry in counters {
        writeln!(f, "{} -> {} {}", entry.name, entry.value, entry.operation)?;
    }
    Ok(())
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for snapshot in &self.snapshots {
            writeln!(f, "Time: {}", snapshot.time)?;
            write_counters(f, &snapshot.counters)?;
            writeln!(f, "==============")?;
        }
        writeln!(f, "Final:")?;
        write_counters(f, &self.latest)
    }
}

/// Streams trace lines and keeps the latest value per (name, operation).
///
/// A snapshot of all counters is taken whenever a timestamped record arrives at least
/// [`ReportConfig::interval`] seconds after the previous snapshot point. The first timestamped
/// record only sets that point. Logs crossing midnight are handled by treating a backwards
/// jump in time of day as a day wrap.
pub struct LogSummarizer {
    config: ReportConfig,
    latest: BTreeMap<(String, Operation), i64>,
    last_snapshot: Option<f64>,
    summary: Summary,
}

impl LogSummarizer {
    /// Creates a summarizer.
    #[must_use]
    pub fn new(config: ReportConfig) -> Self {
        Self {
            config,
            latest: BTreeMap::new(),
            last_snapshot: None,
            summary: Summary::default(),
        }
    }

    /// Feeds one line. Returns `true` if it was a trace record.
    pub fn feed_line(&mut self, line: &str) -> bool {
        let Some(record) = TraceRecord::parse(line, &self.config.tag) else {
            if line.contains(&format!("{}:", self.config.tag)) {
                log::debug!("unparsed trace line: {line}");
                self.summary.malformed += 1;
            }
            return false;
        };
        self.feed(record);
        true
    }

    /// Feeds one parsed record.
    pub fn feed(&mut self, record: TraceRecord) {
        self.summary.records += 1;
        self.latest
            .insert((record.name, record.operation), record.value);

        let Some(time) = record.timestamp else {
            return;
        };
        let now = time.seconds_of_day();
        match self.last_snapshot {
            None => self.last_snapshot = Some(now),
            Some(last) => {
                let mut elapsed = now - last;
                if elapsed < 0.0 {
                    elapsed += SECONDS_PER_DAY;
                }
                if elapsed >= self.config.interval {
                    self.summary.snapshots.push(Snapshot {
                        time,
                        counters: self.entries(),
                    });
                    self.last_snapshot = Some(now);
                }
            }
        }
    }

    /// Feeds every line of a reader.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::FileError`] if reading fails.
    pub fn feed_reader<R: BufRead>(&mut self, reader: R) -> Result<()> {
        for line in reader.lines() {
            self.feed_line(&line?);
        }
        Ok(())
    }

    fn entries(&self) -> Vec<CounterEntry> {
        self.latest
            .iter()
            .map(|((name, operation), value)| CounterEntry {
                name: name.clone(),
                operation: *operation,
                value: *value,
            })
            .collect()
    }

    /// Ends the run.
    #[must_use]
    pub fn finish(mut self) -> Summary {
        self.summary.latest = self.entries();
        self.summary
    }
}

/// Summarizes a whole log held in memory.
#[must_use]
pub fn summarize(text: &str, config: ReportConfig) -> Summary {
    let mut summarizer = LogSummarizer::new(config);
    for line in text.lines() {
        summarizer.feed_line(line);
    }
    summarizer.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latest_value_wins() {
        let log = "\
HEAPSCOPE: a.Foo writes counter = 1
HEAPSCOPE: a.Foo writes counter = 2
HEAPSCOPE: a.Foo reads counter = 5
unrelated line
HEAPSCOPE: garbage
";
        let summary = summarize(log, ReportConfig::default());
        assert_eq!(summary.records, 3);
        assert_eq!(summary.malformed, 1);
        assert!(summary.snapshots.is_empty());
        assert_eq!(summary.latest_value("a.Foo", Operation::Write), Some(2));
        assert_eq!(summary.latest_value("a.Foo", Operation::Read), Some(5));
        assert_eq!(summary.latest_value("a.Foo", Operation::Serial), None);
    }

    #[test]
    fn test_snapshots_every_interval() {
        let log = "\
10-16 12:00:01.000 1 1 I HEAPSCOPE: a.Foo reads counter = 1
10-16 12:00:05.000 1 1 I HEAPSCOPE: a.Foo reads counter = 2
10-16 12:00:11.000 1 1 I HEAPSCOPE: a.Foo reads counter = 3
10-16 12:00:15.000 1 1 I HEAPSCOPE: a.Foo reads counter = 4
10-16 12:00:21.500 1 1 I HEAPSCOPE: a.Foo reads counter = 5
";
        let summary = summarize(log, ReportConfig::default());
        assert_eq!(summary.snapshots.len(), 2);
        assert_eq!(summary.snapshots[0].counters[0].value, 3);
        assert_eq!(summary.snapshots[1].counters[0].value, 5);
        assert_eq!(summary.latest_value("a.Foo", Operation::Read), Some(5));
    }

    #[test]
    fn test_minute_and_day_wrap() {
        let log = "\
10-16 12:00:55.000 1 1 I HEAPSCOPE: a.Foo reads counter = 1
10-16 12:01:06.000 1 1 I HEAPSCOPE: a.Foo reads counter = 2
10-16 23:59:58.000 1 1 I HEAPSCOPE: a.Foo reads counter = 3
10-17 00:00:09.000 1 1 I HEAPSCOPE: a.Foo reads counter = 4
";
        let summary = summarize(log, ReportConfig::default().with_interval(10.0));
        let values: Vec<i64> = summary
            .snapshots
            .iter()
            .map(|s| s.counters[0].value)
            .collect();
        assert_eq!(values, vec![2, 3, 4]);
    }

    #[test]
    fn test_display() {
        let summary = summarize(
            "HEAPSCOPE: a.Foo serial id = 3\n",
            ReportConfig::default(),
        );
        assert_eq!(summary.to_string(), "Final:\na.Foo -> 3 serial id\n");
    }
}
