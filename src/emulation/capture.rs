//! Capture of diagnostic lines emitted through the trace sink.

use std::fmt;

use serde::Serialize;

/// One line printed by instrumented code.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TraceLine {
    /// Log tag of the sink.
    pub tag: String,
    /// Label argument, for example `"com.example.Foo writes counter = "`.
    pub label: String,
    /// Value argument.
    pub value: i64,
}

impl fmt::Display for TraceLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}{}", self.tag, self.label, self.value)
    }
}

/// Collects every [`TraceLine`] of one emulator run, in emission order.
#[derive(Clone, Debug, Default)]
pub struct TraceCapture {
    lines: Vec<TraceLine>,
}

impl TraceCapture {
    /// Creates an empty capture.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a line.
    pub fn push(&mut self, line: TraceLine) {
        log::trace!("{line}");
        self.lines.push(line);
    }

    /// All captured lines.
    #[must_use]
    pub fn lines(&self) -> &[TraceLine] {
        &self.lines
    }

    /// Number of captured lines.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Returns `true` if nothing was captured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Lines whose label starts with `prefix`.
    pub fn with_label_prefix<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = &'a TraceLine> + 'a {
        self.lines.iter().filter(move |l| l.label.starts_with(prefix))
    }

    /// The rendered lines, one per entry.
    #[must_use]
    pub fn render(&self) -> Vec<String> {
        self.lines.iter().map(ToString::to_string).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render() {
        let mut capture = TraceCapture::new();
        capture.push(TraceLine {
            tag: "HEAPSCOPE".into(),
            label: "a.Foo serial id = ".into(),
            value: 1,
        });
        assert_eq!(capture.render(), vec!["HEAPSCOPE: a.Foo serial id = 1"]);
        assert_eq!(capture.with_label_prefix("a.Foo").count(), 1);
        assert_eq!(capture.with_label_prefix("a.Bar").count(), 0);
    }
}
