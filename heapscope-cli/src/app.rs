use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// heapscope - memory-access profiling by bytecode rewriting
#[derive(Debug, Parser)]
#[command(name = "heapscope", version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOptions,

    #[command(subcommand)]
    pub command: Command,
}

/// Options shared across all subcommands.
#[derive(Debug, Parser)]
pub struct GlobalOptions {
    /// Emit output as JSON instead of human-readable text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable verbose (debug-level) logging output.
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Instrument a program image and write the rewritten image.
    Instrument {
        /// Path to the program image (JSON).
        #[arg(value_name = "FILE")]
        path: PathBuf,

        /// Where to write the instrumented image.
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,

        /// Package receiving the counter class and array wrappers.
        #[arg(long)]
        package: Option<String>,

        /// Add per-type static read/write counters.
        #[arg(long)]
        type_profiling: bool,

        /// Add per-method call counters.
        #[arg(long)]
        call_tracking: bool,

        /// Skip serial numbers and per-object field access counting.
        #[arg(long)]
        no_objects: bool,

        /// Leave raw arrays unwrapped.
        #[arg(long)]
        no_arrays: bool,

        /// Rewrite methods on a single thread.
        #[arg(long)]
        sequential: bool,

        /// Skip post-rewrite verification.
        #[arg(long)]
        no_verify: bool,

        /// List every rewrite event.
        #[arg(long)]
        events: bool,
    },

    /// Verify a program image and list violations.
    Verify {
        /// Path to the program image (JSON).
        #[arg(value_name = "FILE")]
        path: PathBuf,
    },

    /// Execute a static method of a program image and print its trace lines.
    Run {
        /// Path to the program image (JSON).
        #[arg(value_name = "FILE")]
        path: PathBuf,

        /// Entry method as `Class.method`.
        #[arg(short, long, value_name = "CLASS.METHOD")]
        entry: String,

        /// Maximum instructions to execute (0 = unlimited).
        #[arg(long, default_value_t = 10_000_000)]
        max_instructions: u64,

        /// Maximum call depth (0 = unlimited).
        #[arg(long, default_value_t = 512)]
        max_depth: usize,
    },

    /// Summarize a captured trace log (e.g. `adb logcat` output).
    Report {
        /// Path to the log file.
        #[arg(value_name = "FILE")]
        path: PathBuf,

        /// Seconds between snapshots.
        #[arg(short, long, default_value_t = 10.0)]
        interval: f64,

        /// Trace tag the lines carry.
        #[arg(long, default_value = "HEAPSCOPE")]
        tag: String,

        /// Print every snapshot, not only the final counters.
        #[arg(long)]
        snapshots: bool,
    },
}
