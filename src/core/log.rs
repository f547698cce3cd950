use std::{
    fs::OpenOptions,
    io::Write,
    path::Path,
};

use chrono::Local;

/// Append a timestamped line to the run log. Mirrors the console so a recalc
/// can be reconstructed after the fact; log failures are swallowed since the
/// log is best-effort.
pub fn printf(path: &Path, msg: &str) {
    let line = format!("{}: {}", Local::now().format("%Y-%m-%d %H:%M:%S"), msg);
    println!("{}", line);

    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
        let _ = writeln!(file, "{}", line);
    }
}

pub fn clear_log(path: &Path) -> std::io::Result<()> {
    std::fs::write(path, "")
}
