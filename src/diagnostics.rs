//! Diagnostics helpers: about info and log-file housekeeping for the
//! rolling appender configured in `lib.rs`.

use serde_json::{json, Value};
use std::fs;
use std::path::PathBuf;

use crate::db;

/// Maximum number of log files to retain.
pub const MAX_LOG_FILES: usize = 10;

/// Returns version and platform info for support requests.
pub fn get_about_info() -> Value {
    json!({
        "version": env!("CARGO_PKG_VERSION"),
        "platform": std::env::consts::OS,
        "arch": std::env::consts::ARCH,
    })
}

/// Directory for rolling log files, next to the database.
pub fn get_log_dir() -> PathBuf {
    db::default_data_dir().join("logs")
}

/// Prune old log files, keeping only the most recent `MAX_LOG_FILES`.
pub fn prune_old_logs() {
    let log_dir = get_log_dir();
    if !log_dir.exists() {
        return;
    }

    let mut log_files: Vec<(PathBuf, std::time::SystemTime)> = Vec::new();
    if let Ok(entries) = fs::read_dir(&log_dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                if name.starts_with("residence.") || name == "residence.log" {
                    let modified = entry
                        .metadata()
                        .ok()
                        .and_then(|m| m.modified().ok())
                        .unwrap_or(std::time::SystemTime::UNIX_EPOCH);
                    log_files.push((path, modified));
                }
            }
        }
    }

    if log_files.len() <= MAX_LOG_FILES {
        return;
    }

    // Newest first; everything past the cap goes.
    log_files.sort_by(|a, b| b.1.cmp(&a.1));
    for (path, _) in log_files.into_iter().skip(MAX_LOG_FILES) {
        let _ = fs::remove_file(path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_about_info_shape() {
        let about = get_about_info();
        assert!(about["version"].as_str().is_some());
        assert!(about["platform"].as_str().is_some());
    }
}
