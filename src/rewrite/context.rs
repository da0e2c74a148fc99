//! Rewrite context shared by every pass of a run.
//!
//! The [`RewriteContext`] holds all cross-method state of one rewrite run: the counter
//! registry, the per-class instrumentation profiles, the array wrapper cache and the event
//! log. Nothing lives in statics, so independent runs never observe each other.
//!
//! All collection fields use thread-safe types (`DashMap`, `DashSet`) so method bodies can be
//! rewritten in parallel. Only registry lookups and insertions synchronize; a pass working on
//! one body holds no lock while it transforms it.
//!
//! # Lock order
//!
//! Registry entries are locked in the order wrappers, then profiles / type counters / call
//! counters, then counters, then program classes. Code holding an entry of a later registry
//! never requests one of an earlier registry.

use std::time::{Duration, Instant};

use dashmap::{DashMap, DashSet};

use crate::{
    ir::{MethodId, MethodRef},
    rewrite::{
        calltrack::CallCounter, counters::CounterRegistry, events::EventLog,
        profile::ObjectProfile, typeprof::TypeCounter, wrappers::WrapperClass, RewriteConfig,
        RewriteStats,
    },
};

/// Shared state of one rewrite run.
pub struct RewriteContext {
    /// Configuration of the run.
    pub config: RewriteConfig,

    /// Static counters on the shared counter class.
    pub counters: CounterRegistry,

    /// Instrumentation metadata per class name.
    pub profiles: DashMap<String, ObjectProfile>,

    /// Array wrapper classes per wrapper class name.
    pub wrappers: DashMap<String, WrapperClass>,

    /// Per-type read/write counters per type name.
    pub type_counters: DashMap<String, TypeCounter>,

    /// Per-method call counters per `Class_method` name.
    pub call_counters: DashMap<String, CallCounter>,

    /// Qualified names (`Class.method`) of every method synthesized by the rewriter.
    pub generated_methods: DashSet<String>,

    /// Methods whose bodies were changed by at least one pass.
    pub rewritten_methods: DashSet<MethodId>,

    /// Accumulated events from all passes.
    pub events: EventLog,

    start_time: Instant,
}

impl RewriteContext {
    /// Creates a new context for a run with `config`.
    #[must_use]
    pub fn new(config: RewriteConfig) -> Self {
        Self {
            counters: CounterRegistry::new(config.counter_class_name()),
            config,
            profiles: DashMap::new(),
            wrappers: DashMap::new(),
            type_counters: DashMap::new(),
            call_counters: DashMap::new(),
            generated_methods: DashSet::new(),
            rewritten_methods: DashSet::new(),
            events: EventLog::new(),
            start_time: Instant::now(),
        }
    }

    /// Returns the elapsed time since the context was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Cached profile of an instrumented class.
    #[must_use]
    pub fn profile(&self, class: &str) -> Option<ObjectProfile> {
        self.profiles.get(class).map(|p| p.clone())
    }

    /// Cached wrapper by wrapper class name.
    #[must_use]
    pub fn wrapper(&self, name: &str) -> Option<WrapperClass> {
        self.wrappers.get(name).map(|w| w.clone())
    }

    /// Returns `true` if `class` is a synthesized wrapper.
    #[must_use]
    pub fn is_wrapper(&self, class: &str) -> bool {
        self.wrappers.contains_key(class)
    }

    /// Records a synthesized method.
    pub fn mark_generated(&self, method: &MethodRef) {
        self.generated_methods.insert(method.qualified_name());
    }

    /// Returns `true` if `qualified_name` (`Class.method`) was synthesized by the rewriter.
    #[must_use]
    pub fn is_generated(&self, qualified_name: &str) -> bool {
        self.generated_methods.contains(qualified_name)
    }

    /// Records that a pass changed a method body.
    pub fn mark_rewritten(&self, method: &MethodId) {
        self.rewritten_methods.insert(method.clone());
    }

    /// Statistics derived from the event log.
    #[must_use]
    pub fn stats(&self) -> RewriteStats {
        RewriteStats::from_log(&self.events).with_time(self.elapsed())
    }
}
