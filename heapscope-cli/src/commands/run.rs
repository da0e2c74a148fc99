use std::path::Path;

use anyhow::Context;
use heapscope::emulation::{EmValue, EmulationLimits, Emulator, TraceLine};
use serde::Serialize;

use crate::{
    app::GlobalOptions,
    commands::common::{file_display_name, load_program},
    output::print_output,
};

#[derive(Debug, Serialize)]
pub struct RunResult {
    path: String,
    entry: String,
    result: String,
    instructions: u64,
    heap_objects: usize,
    trace: Vec<TraceLine>,
}

pub fn run(
    path: &Path,
    entry: &str,
    max_instructions: u64,
    max_depth: usize,
    opts: &GlobalOptions,
) -> anyhow::Result<()> {
    let program = load_program(path)?;
    let limits = EmulationLimits::new()
        .with_max_instructions(max_instructions)
        .with_max_call_depth(max_depth);
    let mut emulator = Emulator::new(&program).with_limits(limits);

    let value = emulator
        .run_entry(entry)
        .with_context(|| format!("emulation of {entry} failed"))?;

    let result = RunResult {
        path: file_display_name(path),
        entry: entry.to_string(),
        result: match value {
            EmValue::Void => "void".to_string(),
            other => other.to_string(),
        },
        instructions: emulator.executed(),
        heap_objects: emulator.heap().len(),
        trace: emulator.trace().lines().to_vec(),
    };

    print_output(&result, opts, |r| {
        for line in &r.trace {
            println!("{line}");
        }
        log::info!(
            "{} returned {} after {} instructions ({} heap objects)",
            r.entry,
            r.result,
            r.instructions,
            r.heap_objects
        );
    })
}
