//! Unified event logging for the rewrite pipeline.
//!
//! Every rewrite step records what it did as an [`Event`]: an applied transformation, a step
//! skipped because metadata was missing, or a step skipped because the shape is unsupported.
//! Statistics are derived from the log rather than tracked separately, and the log is
//! thread-safe so passes running on the rayon pool can record into it through `&self`.
//!
//! # Example
//!
//! ```rust,ignore
//! use heapscope::rewrite::{EventLog, EventKind};
//!
//! let log = EventLog::new();
//! log.record(EventKind::FieldAccessInstrumented)
//!     .at("com.example.Foo.set", 3)
//!     .message("write <com.example.Foo: int x>");
//! log.record(EventKind::SkippedMissingMetadata)
//!     .at("com.example.Foo.set", 5)
//!     .message("no profile for java.util.List");
//! println!("{}", log.summary());
//! ```

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    fmt,
    time::Duration,
};

use strum::{Display, EnumIter};

/// Result of a single rewrite step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumIter)]
pub enum StepOutcome {
    /// The rewrite was performed.
    Applied,
    /// The shape is outside what the rewriter supports (multi-dimensional arrays, impossible
    /// adaptations).
    SkippedUnsupported,
    /// The target has no instrumentation metadata (library or interface types).
    SkippedMissingMetadata,
}

/// Categories of events that can be logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter)]
pub enum EventKind {
    /// Serial/reads/writes infrastructure was added to a class.
    ClassInstrumented,
    /// A static instance counter was added to the counter class.
    CounterCreated,
    /// An incrementor method was synthesized.
    IncrementorSynthesized,
    /// Serial assignment was inserted into a constructor.
    ConstructorPatched,
    /// A read or write incrementor call was inserted before a field access.
    FieldAccessInstrumented,
    /// An array wrapper class was synthesized.
    WrapperSynthesized,
    /// Array types in a method signature were replaced by wrapper types.
    SignatureRewritten,
    /// A parameter binding was retyped to a wrapper type.
    BindingRetyped,
    /// A wrapper argument was unwrapped before a call into unrewritten code.
    ArgumentUnwrapped,
    /// An array allocation was replaced by a wrapper allocation.
    AllocationWrapped,
    /// An element read or write was replaced by a wrapper accessor call.
    ElementAccessRewritten,
    /// The repair scan inserted a wrap or unwrap to fix a type mismatch.
    AdaptationInserted,
    /// A per-type counter call was inserted.
    TypeCounterInserted,
    /// A per-method call counter was inserted.
    CallCounterInserted,

    /// A step was skipped because the target has no instrumentation metadata.
    SkippedMissingMetadata,
    /// A step was skipped because the shape is unsupported.
    SkippedUnsupported,

    /// A pass started.
    PassStarted,
    /// A pass completed.
    PassCompleted,
    /// The verifier rejected a method.
    VerificationFailed,
}

impl EventKind {
    /// Returns a human-readable description of this event kind.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::ClassInstrumented => "class instrumented",
            Self::CounterCreated => "instance counter created",
            Self::IncrementorSynthesized => "incrementor synthesized",
            Self::ConstructorPatched => "constructor patched",
            Self::FieldAccessInstrumented => "field access instrumented",
            Self::WrapperSynthesized => "array wrapper synthesized",
            Self::SignatureRewritten => "signature rewritten",
            Self::BindingRetyped => "binding retyped",
            Self::ArgumentUnwrapped => "argument unwrapped",
            Self::AllocationWrapped => "allocation wrapped",
            Self::ElementAccessRewritten => "element access rewritten",
            Self::AdaptationInserted => "adaptation inserted",
            Self::TypeCounterInserted => "type counter inserted",
            Self::CallCounterInserted => "call counter inserted",
            Self::SkippedMissingMetadata => "skipped (missing metadata)",
            Self::SkippedUnsupported => "skipped (unsupported)",
            Self::PassStarted => "pass started",
            Self::PassCompleted => "pass completed",
            Self::VerificationFailed => "verification failed",
        }
    }

    /// Returns true if this event represents a code transformation.
    #[must_use]
    pub fn is_transformation(&self) -> bool {
        self.outcome() == Some(StepOutcome::Applied)
    }

    /// The rewrite-step outcome this event stands for, if it records a step.
    #[must_use]
    pub fn outcome(&self) -> Option<StepOutcome> {
        match self {
            Self::ClassInstrumented
            | Self::CounterCreated
            | Self::IncrementorSynthesized
            | Self::ConstructorPatched
            | Self::FieldAccessInstrumented
            | Self::WrapperSynthesized
            | Self::SignatureRewritten
            | Self::BindingRetyped
            | Self::ArgumentUnwrapped
            | Self::AllocationWrapped
            | Self::ElementAccessRewritten
            | Self::AdaptationInserted
            | Self::TypeCounterInserted
            | Self::CallCounterInserted => Some(StepOutcome::Applied),
            Self::SkippedMissingMetadata => Some(StepOutcome::SkippedMissingMetadata),
            Self::SkippedUnsupported => Some(StepOutcome::SkippedUnsupported),
            Self::PassStarted | Self::PassCompleted | Self::VerificationFailed => None,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// A single logged event.
#[derive(Debug, Clone)]
pub struct Event {
    /// The type of event.
    pub kind: EventKind,
    /// Qualified name of the method where the event occurred (if applicable).
    pub method: Option<String>,
    /// Instruction index within the method.
    pub location: Option<usize>,
    /// Human-readable description.
    pub message: String,
    /// Associated pass name (if from a pass).
    pub pass: Option<String>,
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] ", self.kind)?;
        if let Some(method) = &self.method {
            match self.location {
                Some(location) => write!(f, "{method}@{location}: ")?,
                None => write!(f, "{method}: ")?,
            }
        }
        f.write_str(&self.message)
    }
}

/// Builder for creating events with a fluent API.
///
/// Created by [`EventLog::record`]. The event is automatically added
/// to the log when the builder is dropped.
pub struct EventBuilder<'a> {
    log: &'a EventLog,
    kind: EventKind,
    method: Option<String>,
    location: Option<usize>,
    message: Option<String>,
    pass: Option<String>,
}

impl<'a> EventBuilder<'a> {
    fn new(log: &'a EventLog, kind: EventKind) -> Self {
        Self {
            log,
            kind,
            method: None,
            location: None,
            message: None,
            pass: None,
        }
    }

    /// Sets the method and instruction index where the event occurred.
    pub fn at(mut self, method: impl Into<String>, location: usize) -> Self {
        self.method = Some(method.into());
        self.location = Some(location);
        self
    }

    /// Sets only the method (for method-level events without specific location).
    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    /// Sets a custom message describing the event.
    pub fn message(mut self, msg: impl Into<String>) -> Self {
        self.message = Some(msg.into());
        self
    }

    /// Associates this event with a specific pass.
    pub fn pass(mut self, pass_name: impl Into<String>) -> Self {
        self.pass = Some(pass_name.into());
        self
    }
}

impl Drop for EventBuilder<'_> {
    fn drop(&mut self) {
        let message = self
            .message
            .take()
            .unwrap_or_else(|| self.kind.description().to_string());

        let event = Event {
            kind: self.kind,
            method: self.method.take(),
            location: self.location.take(),
            message,
            pass: self.pass.take(),
        };

        self.log.events.push(event);
    }
}

/// Collection of events from a rewrite run.
///
/// This type is thread-safe: events can be appended concurrently from
/// multiple threads using shared references (`&self`).
#[derive(Debug)]
pub struct EventLog {
    events: boxcar::Vec<Event>,
}

impl Default for EventLog {
    fn default() -> Self {
        Self {
            events: boxcar::Vec::new(),
        }
    }
}

impl Clone for EventLog {
    fn clone(&self) -> Self {
        self.iter().cloned().collect()
    }
}

impl EventLog {
    /// Creates a new empty event log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if no events have been logged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.count() == 0
    }

    /// Returns the number of events logged.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.count()
    }

    /// Starts recording a new event with the given kind.
    ///
    /// Returns a builder that can be used to add details. The event
    /// is added to the log when the builder is dropped.
    pub fn record(&self, kind: EventKind) -> EventBuilder<'_> {
        EventBuilder::new(self, kind)
    }

    /// Returns true if any event of the given kind was logged.
    #[must_use]
    pub fn has(&self, kind: EventKind) -> bool {
        self.iter().any(|e| e.kind == kind)
    }

    /// Counts events of a specific kind.
    #[must_use]
    pub fn count_kind(&self, kind: EventKind) -> usize {
        self.iter().filter(|e| e.kind == kind).count()
    }

    /// Returns an iterator over all events.
    pub fn iter(&self) -> EventLogIter<'_> {
        self.into_iter()
    }

    /// Counts events grouped by kind.
    #[must_use]
    pub fn count_by_kind(&self) -> HashMap<EventKind, usize> {
        let mut counts = HashMap::new();
        for event in self {
            *counts.entry(event.kind).or_insert(0) += 1;
        }
        counts
    }

    /// Counts rewrite steps grouped by outcome.
    #[must_use]
    pub fn count_by_outcome(&self) -> BTreeMap<StepOutcome, usize> {
        let mut counts = BTreeMap::new();
        for outcome in self.iter().filter_map(|e| e.kind.outcome()) {
            *counts.entry(outcome).or_insert(0) += 1;
        }
        counts
    }

    /// Returns the number of unique methods with transformation events.
    #[must_use]
    pub fn methods_affected(&self) -> usize {
        self.iter()
            .filter(|e| e.kind.is_transformation())
            .filter_map(|e| e.method.as_deref())
            .collect::<HashSet<_>>()
            .len()
    }

    /// Generates a human-readable summary of all events.
    #[must_use]
    pub fn summary(&self) -> String {
        if self.is_empty() {
            return "no events".to_string();
        }

        let counts = self.count_by_kind();

        let mut parts: Vec<String> = counts
            .iter()
            .filter(|(k, _)| k.outcome().is_some())
            .map(|(kind, count)| format!("{} {}", count, kind.description()))
            .collect();

        if parts.is_empty() {
            return format!("{} events", self.len());
        }

        parts.sort();
        parts.join(", ")
    }
}

/// Iterator wrapper for EventLog that yields &Event
pub struct EventLogIter<'a> {
    inner: boxcar::Iter<'a, Event>,
}

impl<'a> Iterator for EventLogIter<'a> {
    type Item = &'a Event;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, e)| e)
    }
}

impl<'a> IntoIterator for &'a EventLog {
    type Item = &'a Event;
    type IntoIter = EventLogIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        EventLogIter {
            inner: self.events.iter(),
        }
    }
}

impl FromIterator<Event> for EventLog {
    fn from_iter<T: IntoIterator<Item = Event>>(iter: T) -> Self {
        let log = Self::new();
        for event in iter {
            log.events.push(event);
        }
        log
    }
}

/// Statistics derived from an [`EventLog`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewriteStats {
    /// Methods with at least one transformation.
    pub methods_rewritten: usize,
    /// Classes that received serial/reads/writes infrastructure.
    pub classes_instrumented: usize,
    /// Constructors patched with serial assignment.
    pub constructors_patched: usize,
    /// Incrementor calls inserted before field accesses.
    pub field_accesses: usize,
    /// Array wrapper classes synthesized.
    pub wrappers_created: usize,
    /// Array allocations, element accesses, signatures and bindings rewritten.
    pub array_rewrites: usize,
    /// Wraps and unwraps inserted by the repair scan or at call sites.
    pub adaptations: usize,
    /// Per-type and per-method counter calls inserted.
    pub profiling_calls: usize,
    /// Steps skipped for missing metadata.
    pub skipped_missing_metadata: usize,
    /// Steps skipped as unsupported.
    pub skipped_unsupported: usize,
    /// Methods rejected by the verifier.
    pub verification_failures: usize,
    /// Wall-clock time of the run.
    pub total_time: Duration,
}

impl RewriteStats {
    /// Derives statistics from an event log.
    #[must_use]
    pub fn from_log(log: &EventLog) -> Self {
        let counts = log.count_by_kind();
        let get = |kind: EventKind| counts.get(&kind).copied().unwrap_or(0);

        Self {
            methods_rewritten: log.methods_affected(),
            classes_instrumented: get(EventKind::ClassInstrumented),
            constructors_patched: get(EventKind::ConstructorPatched),
            field_accesses: get(EventKind::FieldAccessInstrumented),
            wrappers_created: get(EventKind::WrapperSynthesized),
            array_rewrites: get(EventKind::AllocationWrapped)
                + get(EventKind::ElementAccessRewritten)
                + get(EventKind::SignatureRewritten)
                + get(EventKind::BindingRetyped),
            adaptations: get(EventKind::AdaptationInserted) + get(EventKind::ArgumentUnwrapped),
            profiling_calls: get(EventKind::TypeCounterInserted)
                + get(EventKind::CallCounterInserted),
            skipped_missing_metadata: get(EventKind::SkippedMissingMetadata),
            skipped_unsupported: get(EventKind::SkippedUnsupported),
            verification_failures: get(EventKind::VerificationFailed),
            total_time: Duration::ZERO,
        }
    }

    /// Sets the processing time.
    #[must_use]
    pub fn with_time(mut self, time: Duration) -> Self {
        self.total_time = time;
        self
    }

    /// Generates a one-line summary.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        if self.classes_instrumented > 0 {
            parts.push(format!("{} classes instrumented", self.classes_instrumented));
        }
        if self.constructors_patched > 0 {
            parts.push(format!("{} constructors patched", self.constructors_patched));
        }
        if self.field_accesses > 0 {
            parts.push(format!("{} field accesses", self.field_accesses));
        }
        if self.wrappers_created > 0 {
            parts.push(format!("{} wrappers", self.wrappers_created));
        }
        if self.array_rewrites > 0 {
            parts.push(format!("{} array rewrites", self.array_rewrites));
        }
        if self.adaptations > 0 {
            parts.push(format!("{} adaptations", self.adaptations));
        }
        if self.profiling_calls > 0 {
            parts.push(format!("{} profiling calls", self.profiling_calls));
        }
        let skipped = self.skipped_missing_metadata + self.skipped_unsupported;
        if skipped > 0 {
            parts.push(format!("{skipped} skipped"));
        }
        if parts.is_empty() {
            return "no changes".to_string();
        }
        format!(
            "{} in {} methods ({:.2?})",
            parts.join(", "),
            self.methods_rewritten,
            self.total_time
        )
    }
}
