mod app;
mod commands;
mod output;

use clap::Parser;

use crate::app::{Cli, Command};

fn main() -> anyhow::Result<()> {
    ctrlc::set_handler(|| {
        eprintln!("\nCancelled.");
        std::process::exit(130);
    })?;

    let cli = Cli::parse();

    // Show heapscope info+ on stderr unless --json; --verbose enables debug; RUST_LOG overrides
    if !cli.global.json {
        let level = if cli.global.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        };
        env_logger::Builder::new()
            .filter_module("heapscope", level)
            .parse_default_env()
            .target(env_logger::Target::Stderr)
            .format_timestamp(None)
            .format_module_path(false)
            .format_target(false)
            .init();
    }

    match &cli.command {
        Command::Instrument {
            path,
            output,
            package,
            type_profiling,
            call_tracking,
            no_objects,
            no_arrays,
            sequential,
            no_verify,
            events,
        } => commands::instrument::run(
            path,
            &commands::instrument::InstrumentOptions {
                output: output.as_path(),
                package: package.as_deref(),
                type_profiling: *type_profiling,
                call_tracking: *call_tracking,
                objects: !*no_objects,
                arrays: !*no_arrays,
                parallel: !*sequential,
                verify: !*no_verify,
                events: *events,
                global: &cli.global,
            },
        ),
        Command::Verify { path } => commands::verify::run(path, &cli.global),
        Command::Run {
            path,
            entry,
            max_instructions,
            max_depth,
        } => commands::run::run(path, entry, *max_instructions, *max_depth, &cli.global),
        Command::Report {
            path,
            interval,
            tag,
            snapshots,
        } => commands::report::run(path, *interval, tag, *snapshots, &cli.global),
    }
}
