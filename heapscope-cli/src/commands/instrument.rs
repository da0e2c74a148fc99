use std::path::Path;

use anyhow::Context;
use heapscope::{rewrite_program, RewriteConfig};
use serde::Serialize;

use crate::{
    app::GlobalOptions,
    commands::common::{file_display_name, load_program, save_program},
    output::{heading, print_output, Align, TabWriter},
};

pub struct InstrumentOptions<'a> {
    pub output: &'a Path,
    pub package: Option<&'a str>,
    pub type_profiling: bool,
    pub call_tracking: bool,
    pub objects: bool,
    pub arrays: bool,
    pub parallel: bool,
    pub verify: bool,
    pub events: bool,
    pub global: &'a GlobalOptions,
}

#[derive(Debug, Serialize)]
pub struct EventEntry {
    kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    location: Option<usize>,
    message: String,
}

#[derive(Debug, Serialize)]
pub struct OutcomeEntry {
    outcome: String,
    steps: usize,
}

#[derive(Debug, Serialize)]
pub struct InstrumentResult {
    input: String,
    output: String,
    summary: String,
    methods_rewritten: usize,
    classes_instrumented: usize,
    constructors_patched: usize,
    field_accesses: usize,
    wrappers_created: usize,
    array_rewrites: usize,
    adaptations: usize,
    profiling_calls: usize,
    skipped: usize,
    outcomes: Vec<OutcomeEntry>,
    time_ms: u128,
    #[serde(skip_serializing_if = "Option::is_none")]
    counter_class: Option<String>,
    wrappers: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    events: Vec<EventEntry>,
}

pub fn run(path: &Path, opts: &InstrumentOptions<'_>) -> anyhow::Result<()> {
    let program = load_program(path)?;

    let mut config = RewriteConfig::default()
        .with_object_profiling(opts.objects, opts.arrays)
        .with_type_profiling(opts.type_profiling)
        .with_call_tracking(opts.call_tracking)
        .with_parallel(opts.parallel)
        .with_verify(opts.verify);
    if let Some(package) = opts.package {
        config = config.with_package(package);
    }

    let report = rewrite_program(&program, config)
        .with_context(|| format!("failed to instrument: {}", path.display()))?;
    save_program(&program, opts.output)?;

    let stats = &report.stats;
    let events = if opts.events {
        report
            .events
            .iter()
            .map(|e| EventEntry {
                kind: e.kind.to_string(),
                method: e.method.clone(),
                location: e.location,
                message: e.message.clone(),
            })
            .collect()
    } else {
        Vec::new()
    };

    let result = InstrumentResult {
        input: file_display_name(path),
        output: opts.output.display().to_string(),
        summary: stats.summary(),
        methods_rewritten: stats.methods_rewritten,
        classes_instrumented: stats.classes_instrumented,
        constructors_patched: stats.constructors_patched,
        field_accesses: stats.field_accesses,
        wrappers_created: stats.wrappers_created,
        array_rewrites: stats.array_rewrites,
        adaptations: stats.adaptations,
        profiling_calls: stats.profiling_calls,
        skipped: stats.skipped_missing_metadata + stats.skipped_unsupported,
        outcomes: report
            .outcomes
            .iter()
            .map(|(outcome, steps)| OutcomeEntry {
                outcome: outcome.to_string(),
                steps: *steps,
            })
            .collect(),
        time_ms: stats.total_time.as_millis(),
        counter_class: report.counter_class.clone(),
        wrappers: report.wrappers.clone(),
        events,
    };

    print_output(&result, opts.global, |r| {
        println!("{} -> {}", r.input, r.output);
        println!("  {}", r.summary);
        println!();

        let mut table = TabWriter::new(&[("Step", Align::Left), ("Count", Align::Right)]).indent("  ");
        for (step, count) in [
            ("methods rewritten", r.methods_rewritten),
            ("classes instrumented", r.classes_instrumented),
            ("constructors patched", r.constructors_patched),
            ("field accesses", r.field_accesses),
            ("wrappers created", r.wrappers_created),
            ("array rewrites", r.array_rewrites),
            ("adaptations", r.adaptations),
            ("profiling calls", r.profiling_calls),
            ("skipped", r.skipped),
        ] {
            table.row(vec![step.to_string(), count.to_string()]);
        }
        table.print();

        if !r.outcomes.is_empty() {
            println!();
            heading("Outcomes");
            let mut table =
                TabWriter::new(&[("Outcome", Align::Left), ("Steps", Align::Right)]).indent("  ");
            for entry in &r.outcomes {
                table.row(vec![entry.outcome.clone(), entry.steps.to_string()]);
            }
            table.print();
        }

        if !r.wrappers.is_empty() {
            println!();
            heading("Wrappers");
            for wrapper in &r.wrappers {
                println!("  {wrapper}");
            }
        }

        if !r.events.is_empty() {
            println!();
            heading("Events");
            let mut table = TabWriter::new(&[
                ("Kind", Align::Left),
                ("Method", Align::Left),
                ("At", Align::Right),
                ("Message", Align::Left),
            ])
            .indent("  ");
            for e in &r.events {
                table.row(vec![
                    e.kind.clone(),
                    e.method.clone().unwrap_or_default(),
                    e.location.map(|l| l.to_string()).unwrap_or_default(),
                    e.message.clone(),
                ]);
            }
            table.print();
        }
    })
}
