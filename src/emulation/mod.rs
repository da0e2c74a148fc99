//! Reference interpreter for IR programs.
//!
//! The emulator executes instrumented (or original) programs so their observable behavior can be
//! checked: counters, serial numbers and the lines printed through the trace sink. It models just
//! enough of the JVM for that purpose:
//!
//! - Objects and single-dimensional arrays on a bounded [`Heap`]
//! - Static fields in [`StaticStorage`], with `<clinit>` run on first use of a class
//! - Static, special, virtual and interface dispatch
//! - `java.lang.Object.<init>` as a no-op when the program does not define `java.lang.Object`
//! - Calls to the configured [`crate::rewrite::TraceSink`] captured as [`TraceLine`]s
//!
//! # Examples
//!
//! ```rust,no_run
//! use heapscope::{emulation::Emulator, ir::Program};
//!
//! # fn load() -> Program { Program::new() }
//! let program = load();
//! let mut emulator = Emulator::new(&program);
//! emulator.run_entry("com.example.Main.main")?;
//! for line in emulator.trace().render() {
//!     println!("{line}");
//! }
//! # Ok::<(), heapscope::Error>(())
//! ```

mod capture;
mod config;
mod interpreter;
mod memory;
mod value;

pub use capture::{TraceCapture, TraceLine};
pub use config::EmulationLimits;
pub use interpreter::Emulator;
pub use memory::{Heap, HeapObject, StaticStorage};
pub use value::{EmValue, HeapRef};
