//! # heapscope Prelude
//!
//! This module provides a convenient prelude for the most commonly used types of the heapscope
//! library: the IR, the rewrite entry points, the verifier, the emulator and the log report.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all heapscope operations
pub use crate::Error;

/// The result type used throughout heapscope
pub use crate::Result;

// ================================================================================================
// Intermediate Representation
// ================================================================================================

/// Program table, its serialized form and method handles
pub use crate::ir::{MethodId, Program, ProgramImage};

/// Class, field and method descriptors
pub use crate::ir::{
    Class, ClassFlags, ClassKind, Field, FieldFlags, Method, MethodFlags, CONSTRUCTOR_NAME,
    STATIC_INITIALIZER_NAME,
};

/// Bodies, instructions and values
pub use crate::ir::{
    BinOp, Body, CallKind, Constant, FieldRef, IdentitySource, Instruction, InvokeExpr, LocalId,
    MethodRef, Operand, Type, Value,
};

// ================================================================================================
// Rewriting
// ================================================================================================

/// Pipeline entry point and its configuration
pub use crate::rewrite::{rewrite_program, RewriteConfig, RewriteReport, TraceSink};

/// Pass infrastructure for custom pipelines
pub use crate::rewrite::{PassScheduler, RewriteContext, RewritePass};

/// Event log and statistics
pub use crate::rewrite::{EventKind, EventLog, RewriteStats, StepOutcome};

// ================================================================================================
// Verification, Emulation and Reports
// ================================================================================================

/// Post-rewrite verifier
pub use crate::verify::{verify_program, Violation};

/// Reference interpreter
pub use crate::emulation::{EmValue, EmulationLimits, Emulator, TraceLine};

/// Trace log summaries
pub use crate::report::{summarize, LogSummarizer, Operation, ReportConfig, Summary};
