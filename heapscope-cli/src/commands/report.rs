use std::{fs::File, io::BufReader, path::Path};

use anyhow::Context;
use heapscope::report::{CounterEntry, LogSummarizer, ReportConfig};

use crate::{
    app::GlobalOptions,
    output::{heading, print_output, Align, TabWriter},
};

fn print_counters(counters: &[CounterEntry]) {
    let mut table = TabWriter::new(&[
        ("Name", Align::Left),
        ("Counter", Align::Left),
        ("Value", Align::Right),
    ])
    .indent("  ");
    for entry in counters {
        table.row(vec![
            entry.name.clone(),
            entry.operation.to_string(),
            entry.value.to_string(),
        ]);
    }
    if table.is_empty() {
        println!("  (no counters)");
    } else {
        table.print();
    }
}

pub fn run(
    path: &Path,
    interval: f64,
    tag: &str,
    snapshots: bool,
    opts: &GlobalOptions,
) -> anyhow::Result<()> {
    let file = File::open(path).with_context(|| format!("failed to open: {}", path.display()))?;
    let config = ReportConfig::new().with_tag(tag).with_interval(interval);
    let mut summarizer = LogSummarizer::new(config);
    summarizer
        .feed_reader(BufReader::new(file))
        .with_context(|| format!("failed to read: {}", path.display()))?;
    let summary = summarizer.finish();

    print_output(&summary, opts, |s| {
        println!(
            "{} trace records, {} snapshots, {} unparsed",
            s.records,
            s.snapshots.len(),
            s.malformed
        );
        if snapshots {
            for snapshot in &s.snapshots {
                println!();
                heading(&format!("Time: {}", snapshot.time));
                print_counters(&snapshot.counters);
            }
        }
        println!();
        heading("Final");
        print_counters(&s.latest);
    })
}
