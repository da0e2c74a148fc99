//! Configuration for the rewrite engine.
//!
//! This module provides [`RewriteConfig`], which controls where synthesized classes are placed,
//! which diagnostic sink the inserted code calls, and which passes run.

use crate::ir::{MethodRef, Type};

/// Default package for synthesized classes.
pub const DEFAULT_PACKAGE: &str = "heapscope.generated";

/// Default simple name of the shared counter class.
pub const DEFAULT_COUNTER_CLASS: &str = "StaticCounter";

/// The static method every inserted diagnostic calls.
///
/// The sink takes a label and an integer and is expected to print
/// `<tag>: <label><value>` to the platform log. It is external to the program being
/// rewritten; the emulator provides it natively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceSink {
    /// Class declaring the sink method.
    pub class: String,
    /// Sink method name; its signature is `(java.lang.String, int) -> void`.
    pub method: String,
    /// Log tag every emitted line carries.
    pub tag: String,
}

impl Default for TraceSink {
    fn default() -> Self {
        Self {
            class: "heapscope.runtime.Trace".to_string(),
            method: "emit".to_string(),
            tag: "HEAPSCOPE".to_string(),
        }
    }
}

impl TraceSink {
    /// Reference to the sink method.
    #[must_use]
    pub fn method_ref(&self) -> MethodRef {
        MethodRef::new(
            self.class.clone(),
            self.method.clone(),
            vec![Type::string(), Type::Int],
            Type::Void,
        )
    }
}

/// Configuration for the rewrite engine.
#[derive(Debug, Clone)]
pub struct RewriteConfig {
    /// Package that receives the counter class and every array wrapper.
    pub package: String,

    /// Simple name of the shared counter class (default: `StaticCounter`).
    pub counter_class: String,

    /// Diagnostic sink called by inserted code.
    pub trace: TraceSink,

    /// Instrument instances: serial/reads/writes fields, constructor patching and field access
    /// counting (default: true).
    pub enable_object_profiling: bool,

    /// Replace raw arrays with counting wrappers (default: true).
    pub enable_array_wrapping: bool,

    /// Per-type static read/write counters on the counter class (default: false).
    pub enable_type_profiling: bool,

    /// Per-method call counters (default: false).
    pub enable_call_tracking: bool,

    /// Rewrite method bodies on the rayon thread pool (default: true).
    pub parallel: bool,

    /// Run the verifier after the batch and fail on violations (default: true).
    pub verify: bool,

    /// Package prefixes of application classes that are never rewritten.
    pub excluded_packages: Vec<String>,
}

impl Default for RewriteConfig {
    fn default() -> Self {
        Self {
            package: DEFAULT_PACKAGE.to_string(),
            counter_class: DEFAULT_COUNTER_CLASS.to_string(),
            trace: TraceSink::default(),
            enable_object_profiling: true,
            enable_array_wrapping: true,
            enable_type_profiling: false,
            enable_call_tracking: false,
            parallel: true,
            verify: true,
            excluded_packages: vec![
                "android.".to_string(),
                "androidx.".to_string(),
                "java.".to_string(),
                "kotlin.".to_string(),
            ],
        }
    }
}

impl RewriteConfig {
    /// Creates a new configuration with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every pass enabled, including type profiling and call tracking.
    #[must_use]
    pub fn full() -> Self {
        Self {
            enable_type_profiling: true,
            enable_call_tracking: true,
            ..Self::default()
        }
    }

    /// Object and array instrumentation only, single-threaded.
    ///
    /// Produces byte-for-byte reproducible output regardless of thread scheduling, which makes
    /// it the preset used by tests.
    #[must_use]
    pub fn deterministic() -> Self {
        Self {
            parallel: false,
            ..Self::default()
        }
    }

    /// Sets the package for synthesized classes.
    #[must_use]
    pub fn with_package(mut self, package: impl Into<String>) -> Self {
        self.package = package.into();
        self
    }

    /// Sets the diagnostic sink.
    #[must_use]
    pub fn with_trace_sink(mut self, trace: TraceSink) -> Self {
        self.trace = trace;
        self
    }

    /// Enables or disables instance profiling and array wrapping.
    #[must_use]
    pub fn with_object_profiling(mut self, objects: bool, arrays: bool) -> Self {
        self.enable_object_profiling = objects;
        self.enable_array_wrapping = arrays;
        self
    }

    /// Enables or disables per-type counters.
    #[must_use]
    pub fn with_type_profiling(mut self, enable: bool) -> Self {
        self.enable_type_profiling = enable;
        self
    }

    /// Enables or disables per-method call counters.
    #[must_use]
    pub fn with_call_tracking(mut self, enable: bool) -> Self {
        self.enable_call_tracking = enable;
        self
    }

    /// Enables or disables parallel rewriting.
    #[must_use]
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Enables or disables the post-rewrite verifier.
    #[must_use]
    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    /// Fully qualified name of the shared counter class.
    #[must_use]
    pub fn counter_class_name(&self) -> String {
        self.qualify(&self.counter_class)
    }

    /// Prefixes `simple` with the configured package.
    #[must_use]
    pub fn qualify(&self, simple: &str) -> String {
        if self.package.is_empty() {
            simple.to_string()
        } else {
            format!("{}.{}", self.package, simple)
        }
    }

    /// Returns `true` if `class` lies in an excluded package or in the package of
    /// synthesized classes.
    #[must_use]
    pub fn is_excluded(&self, class: &str) -> bool {
        if !self.package.is_empty()
            && class
                .strip_prefix(self.package.as_str())
                .is_some_and(|rest| rest.starts_with('.'))
        {
            return true;
        }
        self.excluded_packages
            .iter()
            .any(|prefix| class.starts_with(prefix.as_str()))
    }
}
