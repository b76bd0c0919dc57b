//! JSON file persistence.
//!
//! Writes go to a temp file next to the target (PID+TID suffix), are synced,
//! then renamed over the target, so a reader of the exported catalog never
//! sees a half-written file.

use crate::error::{Result, TuneboxError};
use serde::{de::DeserializeOwned, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::process;
use std::thread;
use tracing::debug;

/// Read and parse a JSON file.
///
/// Returns `None` if the file doesn't exist, or an error if parsing fails.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(TuneboxError::io_with_path(e, path)),
    };

    let data: T = serde_json::from_str(&contents).map_err(|e| TuneboxError::Json {
        message: format!("Failed to parse {}: {}", path.display(), e),
        source: Some(e),
    })?;

    Ok(Some(data))
}

/// Write data to a JSON file atomically.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, data: &T, pretty: bool) -> Result<()> {
    let serialized = if pretty {
        serde_json::to_string_pretty(data)
    } else {
        serde_json::to_string(data)
    }
    .map_err(|e| TuneboxError::Json {
        message: format!("Failed to serialize data: {}", e),
        source: Some(e),
    })?;

    write_atomic(path, serialized.as_bytes())
}

/// Write raw bytes to `path` through a synced temp file and a rename.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| TuneboxError::io_with_path(e, parent))?;
        }
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| TuneboxError::Other(format!("Not a file path: {}", path.display())))?;
    let temp_path = path.with_file_name(format!(
        ".{}.{}.{}.tmp",
        file_name,
        process::id(),
        thread_id()
    ));

    let written = (|| -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)?;
        file.write_all(bytes)?;
        file.flush()?;
        file.sync_all()
    })();

    if let Err(e) = written {
        let _ = fs::remove_file(&temp_path);
        return Err(TuneboxError::io_with_path(e, &temp_path));
    }

    fs::rename(&temp_path, path).map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        TuneboxError::io_with_path(e, path)
    })?;

    debug!("Wrote {} ({} bytes)", path.display(), bytes.len());
    Ok(())
}

fn thread_id() -> String {
    // ThreadId's Debug form is "ThreadId(N)"; keep just the digits.
    format!("{:?}", thread::current().id())
        .chars()
        .filter(|c| c.is_ascii_digit())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_read_missing_is_none() {
        let temp_dir = TempDir::new().unwrap();
        let value: Option<serde_json::Value> =
            read_json(&temp_dir.path().join("missing.json")).unwrap();
        assert!(value.is_none());
    }

    #[test]
    fn test_write_then_read() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("out").join("catalog.json");
        let data = json!([{"name": "alex22"}]);

        write_json_atomic(&path, &data, true).unwrap();
        let loaded: serde_json::Value = read_json(&path).unwrap().unwrap();
        assert_eq!(loaded, data);

        // No temp files left behind
        let leftovers: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_read_malformed_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bad.json");
        std::fs::write(&path, "{not json").unwrap();
        let result: Result<Option<serde_json::Value>> = read_json(&path);
        assert!(matches!(result, Err(TuneboxError::Json { .. })));
    }
}
