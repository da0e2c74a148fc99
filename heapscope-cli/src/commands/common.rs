use std::{fs::File, io::BufReader, path::Path};

use anyhow::Context;
use heapscope::ir::{Program, ProgramImage};

/// Load a program image from a JSON file.
pub fn load_program(path: &Path) -> anyhow::Result<Program> {
    let file = File::open(path).with_context(|| format!("failed to open: {}", path.display()))?;
    let image: ProgramImage = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("failed to parse program image: {}", path.display()))?;
    Program::from_image(image)
        .with_context(|| format!("invalid program image: {}", path.display()))
}

/// Write a program image as JSON.
pub fn save_program(program: &Program, path: &Path) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(&program.to_image())?;
    std::fs::write(path, json).with_context(|| format!("failed to write: {}", path.display()))
}

/// Extract a display-friendly filename from a path.
pub fn file_display_name(path: &Path) -> String {
    path.file_name().map_or_else(
        || path.display().to_string(),
        |f| f.to_string_lossy().to_string(),
    )
}
