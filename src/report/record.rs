//! Parsing of single trace lines.
//!
//! Instrumented programs print lines of two shapes through the trace sink:
//!
//! ```text
//! HEAPSCOPE: com.example.Foo writes counter = 3
//! HEAPSCOPE: com.example.Foo serial id = 7
//! ```
//!
//! When the lines come from `logcat`, they carry a `MM-DD HH:MM:SS.mmm` prefix plus process
//! and priority columns before the tag. Anything before the tag that is not a timestamp is
//! ignored.

use std::fmt;

use serde::Serialize;
use strum::{Display, EnumIter};

/// What a trace record counts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Display, EnumIter)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Field or element reads (`read` and `reads` labels).
    #[strum(to_string = "reads")]
    Read,
    /// Field or element writes (`write` and `writes` labels).
    #[strum(to_string = "writes")]
    Write,
    /// Method calls.
    #[strum(to_string = "function calls")]
    FunctionCall,
    /// Instance serial numbers.
    #[strum(to_string = "serial id")]
    Serial,
}

/// Time of day of a logcat line.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Timestamp {
    /// Month, 1-12.
    pub month: u8,
    /// Day of month.
    pub day: u8,
    /// Hour, 0-23.
    pub hour: u8,
    /// Minute, 0-59.
    pub minute: u8,
    /// Seconds including the fraction.
    pub seconds: f64,
}

impl Timestamp {
    /// Parses the two leading columns `MM-DD HH:MM:SS.mmm`.
    #[must_use]
    pub fn parse(date: &str, time: &str) -> Option<Self> {
        let (month, day) = date.split_once('-')?;
        let mut parts = time.splitn(3, ':');
        let hour = parts.next()?.parse().ok()?;
        let minute = parts.next()?.parse().ok()?;
        let seconds: f64 = parts.next()?.parse().ok()?;

        let stamp = Timestamp {
            month: month.parse().ok()?,
            day: day.parse().ok()?,
            hour,
            minute,
            seconds,
        };
        (stamp.hour < 24 && stamp.minute < 60 && (0.0..61.0).contains(&stamp.seconds))
            .then_some(stamp)
    }

    /// Seconds since midnight.
    #[must_use]
    pub fn seconds_of_day(&self) -> f64 {
        f64::from(self.hour) * 3600.0 + f64::from(self.minute) * 60.0 + self.seconds
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}-{:02} {:02}:{:02}:{:06.3}",
            self.month, self.day, self.hour, self.minute, self.seconds
        )
    }
}

/// One parsed trace line.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TraceRecord {
    /// Timestamp, if the line had one.
    pub timestamp: Option<Timestamp>,
    /// Class, type or method name the value belongs to.
    pub name: String,
    /// What is counted.
    pub operation: Operation,
    /// Counter value or serial number.
    pub value: i64,
}

impl TraceRecord {
    /// Parses a line carrying `tag`. Returns `None` for lines without the tag or with a payload
    /// of unknown shape.
    #[must_use]
    pub fn parse(line: &str, tag: &str) -> Option<Self> {
        let marker = format!("{tag}:");
        let at = line.find(&marker)?;
        let (prefix, rest) = line.split_at(at);
        let payload = rest[marker.len()..].trim();

        let mut columns = prefix.split_whitespace();
        let timestamp = match (columns.next(), columns.next()) {
            (Some(date), Some(time)) => Timestamp::parse(date, time),
            _ => None,
        };

        let (head, value) = payload.rsplit_once(" = ")?;
        let value = value.trim().parse().ok()?;

        let (name, operation) = if let Some(name) = head.strip_suffix(" serial id") {
            (name, Operation::Serial)
        } else {
            let head = head.strip_suffix(" counter")?;
            let (name, label) = head.split_once(' ')?;
            let operation = match label {
                "read" | "reads" => Operation::Read,
                "write" | "writes" => Operation::Write,
                "function call" | "function calls" => Operation::FunctionCall,
                _ => return None,
            };
            (name, operation)
        };
        if name.is_empty() || name.contains(char::is_whitespace) {
            return None;
        }

        Some(TraceRecord {
            timestamp,
            name: name.to_string(),
            operation,
            value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_lines() {
        let r = TraceRecord::parse("HEAPSCOPE: com.example.Foo writes counter = 3", "HEAPSCOPE")
            .unwrap();
        assert_eq!(r.name, "com.example.Foo");
        assert_eq!(r.operation, Operation::Write);
        assert_eq!(r.value, 3);
        assert!(r.timestamp.is_none());

        let r = TraceRecord::parse("HEAPSCOPE: com.example.Foo serial id = 7", "HEAPSCOPE").unwrap();
        assert_eq!(r.operation, Operation::Serial);
        assert_eq!(r.value, 7);

        let r = TraceRecord::parse(
            "HEAPSCOPE: com.example.Foo_run function call counter = 12",
            "HEAPSCOPE",
        )
        .unwrap();
        assert_eq!(r.name, "com.example.Foo_run");
        assert_eq!(r.operation, Operation::FunctionCall);

        let r = TraceRecord::parse("HEAPSCOPE: int read counter = 5", "HEAPSCOPE").unwrap();
        assert_eq!(r.operation, Operation::Read);
    }

    #[test]
    fn test_logcat_line() {
        let line = "10-16 12:34:56.789  1234  1250 I HEAPSCOPE: a.Foo reads counter = 41";
        let r = TraceRecord::parse(line, "HEAPSCOPE").unwrap();
        let stamp = r.timestamp.unwrap();
        assert_eq!((stamp.month, stamp.day, stamp.hour, stamp.minute), (10, 16, 12, 34));
        assert!((stamp.seconds - 56.789).abs() < 1e-9);
        assert_eq!(stamp.to_string(), "10-16 12:34:56.789");
        assert_eq!(r.value, 41);
    }

    #[test]
    fn test_rejects_other_lines() {
        assert!(TraceRecord::parse("I ActivityManager: started", "HEAPSCOPE").is_none());
        assert!(TraceRecord::parse("HEAPSCOPE: a.Foo frobs counter = 1", "HEAPSCOPE").is_none());
        assert!(TraceRecord::parse("HEAPSCOPE: a.Foo reads counter = x", "HEAPSCOPE").is_none());
        assert!(TraceRecord::parse("OTHER: a.Foo reads counter = 1", "HEAPSCOPE").is_none());
    }
}
