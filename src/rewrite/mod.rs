//! The rewrite engine.
//!
//! This module turns an application into a self-profiling one: every instance learns its serial
//! number and counts the reads and writes of its fields, and every raw array is replaced by a
//! wrapper object that counts its element accesses the same way. The inserted code reports
//! through a single static trace sink ([`TraceSink`]).
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        Rewrite Pipeline                          │
//! ├──────────────────────────────────────────────────────────────────┤
//! │                                                                  │
//! │  RewriteContext              Shared state of one run             │
//! │    ├─ CounterRegistry         (static counters, counter class)   │
//! │    ├─ profiles / wrappers     (per-class and per-element caches) │
//! │    └─ EventLog                                                   │
//! │                                                                  │
//! │  PassScheduler               Ordered pass execution              │
//! │    ├─ InstanceInstrumentation serial/reads/writes + incrementors │
//! │    ├─ ConstructorPatch        serial assignment                  │
//! │    ├─ TypeProfiling           per-type static counters (opt-in)  │
//! │    ├─ FieldAccess             incReads/incWrites before accesses │
//! │    ├─ CallTracking            per-method call counters (opt-in)  │
//! │    ├─ SignatureRewrite        array params/returns → wrappers    │
//! │    └─ ArrayPropagation        array bodies → wrappers + repair   │
//! │                                                                  │
//! │  crate::verify               Post-run type and reference checks  │
//! │                                                                  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use heapscope::{ir::Program, rewrite::{rewrite_program, RewriteConfig}};
//!
//! let report = rewrite_program(&program, RewriteConfig::default())?;
//! println!("{}", report.stats.summary());
//! ```

mod calltrack;
mod config;
mod constructor;
mod context;
mod counters;
mod edits;
mod events;
mod fields;
mod pass;
mod profile;
mod propagation;
mod repair;
mod scheduler;
pub mod trace;
mod typeprof;
mod wrappers;

pub use calltrack::{call_counter, call_counter_name, CallCounter, CallTrackingPass};
pub use config::{RewriteConfig, TraceSink, DEFAULT_COUNTER_CLASS, DEFAULT_PACKAGE};
pub use constructor::{patch_constructor, ConstructorPatchPass, PatchSkip};
pub use context::RewriteContext;
pub use counters::{
    counter_key, static_incrementor, CounterOwner, CounterRegistry, COUNTER_SUFFIX,
};
pub use edits::PendingEdits;
pub use events::{Event, EventBuilder, EventKind, EventLog, EventLogIter, RewriteStats, StepOutcome};
pub use fields::FieldAccessPass;
pub use pass::{is_rewritable, is_rewritable_class, qualified_name, RewritePass};
pub use profile::{
    flattened_name, instrument, is_instrumentation_field_name, Access,
    InstanceInstrumentationPass, ObjectProfile, INC_READS, INC_WRITES, READS_FIELD, SERIAL_FIELD,
    WRITES_FIELD,
};
pub use propagation::{keeps_raw_signature, map_type, ArrayPropagationPass, SignatureRewritePass};
pub use repair::{adapt_operand, plan, repair, wrapper_of_type, Adaptation};
pub use scheduler::{rewrite_program, PassScheduler, RewriteReport};
pub use typeprof::{type_counter, TypeCounter, TypeProfilingPass};
pub use wrappers::{wrapper_for, wrapper_name, WrapperClass, ARRAY_FIELD, GET_METHOD, SET_METHOD};
