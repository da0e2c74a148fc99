use std::path::Path;

use anyhow::bail;
use heapscope::verify::verify_program;
use serde::Serialize;

use crate::{
    app::GlobalOptions,
    commands::common::{file_display_name, load_program},
    output::{print_output, Align, TabWriter},
};

#[derive(Debug, Serialize)]
pub struct ViolationEntry {
    method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    location: Option<usize>,
    message: String,
}

#[derive(Debug, Serialize)]
pub struct VerifyResult {
    path: String,
    classes: usize,
    valid: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    violations: Vec<ViolationEntry>,
}

pub fn run(path: &Path, opts: &GlobalOptions) -> anyhow::Result<()> {
    let program = load_program(path)?;
    let violations: Vec<ViolationEntry> = verify_program(&program, None)
        .into_iter()
        .map(|v| ViolationEntry {
            method: v.method,
            location: v.location,
            message: v.message,
        })
        .collect();

    let result = VerifyResult {
        path: file_display_name(path),
        classes: program.application_classes().len(),
        valid: violations.is_empty(),
        violations,
    };

    print_output(&result, opts, |r| {
        let status = if r.valid { "PASS" } else { "FAIL" };
        println!("{status}  {}  ({} application classes)", r.path, r.classes);
        if !r.violations.is_empty() {
            println!();
            let mut table = TabWriter::new(&[
                ("Method", Align::Left),
                ("At", Align::Right),
                ("Violation", Align::Left),
            ])
            .indent("  ");
            for v in &r.violations {
                table.row(vec![
                    v.method.clone(),
                    v.location.map(|l| l.to_string()).unwrap_or_default(),
                    v.message.clone(),
                ]);
            }
            table.print();
        }
    })?;

    if !result.valid {
        bail!("{} violation(s)", result.violations.len());
    }
    Ok(())
}
