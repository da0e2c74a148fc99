//! Trace log summaries built from emulator output and from logcat captures.

mod common;

use std::io::Cursor;

use common::*;
use heapscope::prelude::*;

const LOGCAT: &str = "\
10-16 09:15:00.120  4120  4120 I ActivityManager: Start proc com.example
10-16 09:15:00.500  4120  4120 I HEAPSCOPE: com.example.Foo serial id = 1
10-16 09:15:00.501  4120  4120 I HEAPSCOPE: com.example.Foo writes counter = 1
10-16 09:15:04.010  4120  4120 I HEAPSCOPE: com.example.Foo reads counter = 1
10-16 09:15:10.600  4120  4120 I HEAPSCOPE: com.example.Foo reads counter = 2
10-16 09:15:12.000  4120  4120 I HEAPSCOPE: com.example.Foo_run function call counter = 4
10-16 09:15:21.000  4120  4120 I HEAPSCOPE: com.example.Foo reads counter = 3
";

#[test]
fn test_logcat_capture() -> Result<()> {
    let mut summarizer = LogSummarizer::new(ReportConfig::default());
    summarizer.feed_reader(Cursor::new(LOGCAT))?;
    let summary = summarizer.finish();

    assert_eq!(summary.records, 6);
    assert_eq!(summary.snapshots.len(), 2);
    let first = &summary.snapshots[0];
    assert_eq!(first.time.to_string(), "10-16 09:15:10.600");
    assert_eq!(first.counters.len(), 3);

    assert_eq!(summary.latest_value("com.example.Foo", Operation::Read), Some(3));
    assert_eq!(
        summary.latest_value("com.example.Foo_run", Operation::FunctionCall),
        Some(4)
    );
    assert_eq!(summary.latest_value("com.example.Foo", Operation::Serial), Some(1));
    Ok(())
}

#[test]
fn test_custom_tag_and_interval() {
    let log = LOGCAT.replace("HEAPSCOPE", "<SOOT_PROFILING>");
    let config = ReportConfig::new()
        .with_tag("<SOOT_PROFILING>")
        .with_interval(3.0);
    let summary = summarize(&log, config);
    assert_eq!(summary.records, 6);
    assert_eq!(summary.snapshots.len(), 3);
}

#[test]
fn test_emulated_run_summarizes() -> Result<()> {
    let mut main = Code::new();
    for _ in 0..2 {
        let foo = main.new_object("a.Foo");
        main.call_virtual(foo, MethodRef::new("a.Foo", "touch", vec![], Type::Void));
    }
    let program = program_with_main(vec![foo_class()], main.ret(), Type::Void);
    rewrite_program(&program, RewriteConfig::deterministic())?;

    let (_, emulator) = run(&program);
    let summary = summarize(&emulator.trace().render().join("\n"), ReportConfig::default());
    assert!(summary.snapshots.is_empty());
    assert_eq!(summary.malformed, 0);
    assert_eq!(summary.latest_value("a.Foo", Operation::Serial), Some(2));

    let json = serde_json::to_value(&summary)?;
    assert!(json["latest"].as_array().is_some_and(|l| !l.is_empty()));
    Ok(())
}
