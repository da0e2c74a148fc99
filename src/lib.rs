// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![deny(unsafe_code)]

//! # heapscope
//!
//! Memory-access profiling by static bytecode rewriting.
//!
//! `heapscope` takes a program in a typed three-address IR (the shape a JVM/Dalvik bytecode
//! loader produces) and rewrites it so that, when run, it reports how often each object and
//! array is read and written:
//!
//! - **Instance profiling** - every application class gets a serial number, read and write
//!   counters, and `incReads()` / `incWrites()` methods that bump and print them
//! - **Constructor patching** - each new instance takes the next serial of its class
//! - **Field access counting** - every instance field read or write calls the incrementor on
//!   the accessed object first
//! - **Array wrapping** - raw arrays are replaced by synthesized wrapper classes whose
//!   `get`/`set` accessors count element accesses, with signatures and call sites adapted
//! - **Type profiling and call tracking** - optional per-type and per-method static counters
//!
//! The rewritten program is then checked by a verifier. An interpreter ([`emulation`]) can run
//! it to observe the printed counters, and [`report`] summarizes captured trace logs.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use heapscope::prelude::*;
//!
//! let json = std::fs::read_to_string("app.json")?;
//! let program = Program::from_image(serde_json::from_str(&json)?)?;
//!
//! let report = rewrite_program(&program, RewriteConfig::default())?;
//! println!("{}", report.stats.summary());
//!
//! std::fs::write("app.instrumented.json", serde_json::to_string(&program.to_image())?)?;
//! # Ok::<(), heapscope::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`ir`] - classes, methods, bodies and the thread-safe [`ir::Program`] table
//! - [`rewrite`] - the passes, their shared [`rewrite::RewriteContext`] and the scheduler
//! - [`verify`] - post-rewrite consistency checks
//! - [`emulation`] - reference interpreter for rewritten and original programs
//! - [`report`] - trace log parsing and periodic counter snapshots
//!
//! ## Error Handling
//!
//! All fallible operations return [`Result<T>`]. Rewrite steps that cannot be applied are not
//! errors: they are recorded as events with a [`rewrite::StepOutcome`] and summarized in the
//! [`RewriteReport`].

#[macro_use]
pub(crate) mod error;

/// Shared functionality which is used in unit tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types.
///
/// # Example
///
/// ```rust,no_run
/// use heapscope::prelude::*;
///
/// let program = Program::new();
/// let report = rewrite_program(&program, RewriteConfig::deterministic())?;
/// assert_eq!(report.stats.classes_instrumented, 0);
/// # Ok::<(), heapscope::Error>(())
/// ```
pub mod prelude;

/// The typed three-address intermediate representation.
///
/// Programs are loaded from and saved to [`ir::ProgramImage`], their serde form. The class
/// table is a [`dashmap::DashMap`], so passes running on different methods can add fields and
/// methods concurrently.
pub mod ir;

/// The rewrite engine: passes, shared context, event log and scheduler.
pub mod rewrite;

/// Post-rewrite verifier.
///
/// # Examples
///
/// ```rust,no_run
/// use heapscope::{ir::Program, verify};
///
/// let program = Program::new();
/// for violation in verify::verify_program(&program, None) {
///     eprintln!("{violation}");
/// }
/// ```
pub mod verify;

/// Reference interpreter.
pub mod emulation;

/// Trace log summaries.
pub mod report;

/// `heapscope` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `heapscope` Error type
///
/// # Examples
///
/// ```rust,no_run
/// use heapscope::{ir::Program, rewrite_program, Error, RewriteConfig};
///
/// let program = Program::new();
/// match rewrite_program(&program, RewriteConfig::default()) {
///     Ok(report) => println!("{}", report.stats.summary()),
///     Err(Error::Verification { method, message, .. }) => eprintln!("{method}: {message}"),
///     Err(e) => eprintln!("{e}"),
/// }
/// ```
pub use error::Error;

/// Runs the full rewrite pipeline. See [`rewrite::rewrite_program`].
pub use rewrite::{rewrite_program, RewriteConfig, RewriteReport};
