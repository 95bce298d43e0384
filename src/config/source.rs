//! Configuration snapshot sources

use super::{Config, ConfigError, Snapshot};
use parking_lot::Mutex;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;

/// Where the session reads its key/value configuration from
pub trait ConfigSource: Send {
    fn snapshot(&mut self) -> Result<Snapshot, ConfigError>;
}

/// Reads the `[capture]` table of a TOML configuration file
pub struct FileConfigSource {
    path: PathBuf,
}

impl FileConfigSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ConfigSource for FileConfigSource {
    fn snapshot(&mut self) -> Result<Snapshot, ConfigError> {
        let config = Config::load(&self.path)?;
        Ok(config.capture.to_snapshot())
    }
}

/// In-memory snapshot the host can update at any time
#[derive(Clone, Default)]
pub struct SharedConfigSource {
    inner: Arc<Mutex<Snapshot>>,
}

impl SharedConfigSource {
    pub fn new(snapshot: Snapshot) -> Self {
        Self {
            inner: Arc::new(Mutex::new(snapshot)),
        }
    }

    /// Set one key
    pub fn set(&self, key: &str, value: impl Into<String>) {
        self.inner.lock().insert(key.to_string(), value.into());
    }

    /// Swap in a complete snapshot
    pub fn replace(&self, snapshot: Snapshot) {
        *self.inner.lock() = snapshot;
    }

    /// Merge a JSON object of settings
    pub fn merge_json(&self, json: &str) -> Result<usize, ConfigError> {
        let update = snapshot_from_json(json)?;
        let count = update.len();
        self.inner.lock().extend(update);
        Ok(count)
    }
}

impl ConfigSource for SharedConfigSource {
    fn snapshot(&mut self) -> Result<Snapshot, ConfigError> {
        Ok(self.inner.lock().clone())
    }
}

/// Parse a flat JSON object into a snapshot; scalars are stringified and
/// nulls dropped
pub fn snapshot_from_json(json: &str) -> Result<Snapshot, ConfigError> {
    let value: Value = serde_json::from_str(json)?;
    let Value::Object(map) = value else {
        return Err(ConfigError::Parse("settings must be a JSON object".into()));
    };

    let mut snapshot = Snapshot::new();
    for (key, value) in map {
        let text = match value {
            Value::Null => continue,
            Value::String(s) => s,
            Value::Bool(b) => u8::from(b).to_string(),
            Value::Number(n) => n.to_string(),
            other => {
                return Err(ConfigError::Parse(format!(
                    "setting {:?} must be a scalar, got {}",
                    key, other
                )))
            }
        };
        snapshot.insert(key, text);
    }
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CaptureMode;
    use std::io::Write;

    #[test]
    fn json_values_are_stringified() {
        let snapshot = snapshot_from_json(
            r#"{"capture_type": "gdi", "capture_fps": 60, "anti_cheat": true, "window_handle": null}"#,
        )
        .unwrap();
        assert_eq!(snapshot["capture_type"], "gdi");
        assert_eq!(snapshot["capture_fps"], "60");
        assert_eq!(snapshot["anti_cheat"], "1");
        assert!(!snapshot.contains_key("window_handle"));
    }

    #[test]
    fn json_rejects_non_objects() {
        assert!(snapshot_from_json("[1, 2]").is_err());
        assert!(snapshot_from_json(r#"{"capture_id": [1]}"#).is_err());
        assert!(snapshot_from_json("not json").is_err());
    }

    #[test]
    fn file_source_reads_capture_table() {
        let path = std::env::temp_dir().join(format!(
            "capture-pacer-{}.toml",
            uuid::Uuid::new_v4()
        ));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "[capture]\nmode = \"inject\"\nfps = 25\nanti_cheat = true").unwrap();
        drop(file);

        let snapshot = FileConfigSource::new(&path).snapshot().unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(snapshot["capture_type"], CaptureMode::Inject.as_str());
        assert_eq!(snapshot["capture_fps"], "25");
        assert_eq!(snapshot["anti_cheat"], "1");
    }

    #[test]
    fn shared_source_merges_updates() {
        let source = SharedConfigSource::default();
        source.set("capture_type", "desktop");
        assert_eq!(source.merge_json(r#"{"capture_fps": 15}"#).unwrap(), 1);
        let snapshot = source.clone().snapshot().unwrap();
        assert_eq!(snapshot.len(), 2);

        source.replace(Snapshot::new());
        assert!(source.clone().snapshot().unwrap().is_empty());
    }
}
