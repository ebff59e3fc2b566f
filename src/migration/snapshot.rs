//! Persisted schema snapshots
//!
//! The snapshot is the schema descriptor saved after the last generated
//! migration. Its encoding is picked from the file extension: `.json` is
//! written pretty-printed, `.yaml`/`.yml` as YAML. A snapshot file that does
//! not exist yet loads as an empty descriptor.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::{debug, info};

use super::error::MigrationError;

/// Nested mapping: table → { columns, indexes, options }
pub type SchemaDescriptor = Map<String, Value>;

/// Default snapshot file name, relative to the working directory
pub const DEFAULT_SCHEMA_FILE: &str = "schema.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotFormat {
    Json,
    Yaml,
}

impl SnapshotFormat {
    pub fn from_path(path: &Path) -> Result<Self, MigrationError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("json") => Ok(SnapshotFormat::Json),
            Some("yaml") | Some("yml") => Ok(SnapshotFormat::Yaml),
            _ => Err(MigrationError::UnsupportedSnapshotExtension(
                path.to_path_buf(),
            )),
        }
    }
}

/// Loads and saves the schema snapshot at one path
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
    format: SnapshotFormat,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, MigrationError> {
        let path = path.into();
        let format = SnapshotFormat::from_path(&path)?;
        Ok(SnapshotStore { path, format })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> SnapshotFormat {
        self.format
    }

    pub fn load(&self) -> Result<SchemaDescriptor, MigrationError> {
        if !self.path.exists() {
            debug!(
                "schema file {} does not exist, starting from an empty schema",
                self.path.display()
            );
            return Ok(SchemaDescriptor::new());
        }

        let content = fs::read_to_string(&self.path).map_err(MigrationError::io(&self.path))?;
        self.decode(&content)
    }

    pub fn save(&self, descriptor: &SchemaDescriptor) -> Result<(), MigrationError> {
        let content = self.encode(descriptor)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(MigrationError::io(parent))?;
        }
        fs::write(&self.path, content).map_err(MigrationError::io(&self.path))?;
        info!("schema file {} updated", self.path.display());
        Ok(())
    }

    pub fn encode(&self, descriptor: &SchemaDescriptor) -> Result<String, MigrationError> {
        let encoded = match self.format {
            SnapshotFormat::Json => serde_json::to_string_pretty(descriptor)
                .map(|s| s + "\n")
                .map_err(|e| e.to_string()),
            SnapshotFormat::Yaml => serde_yaml::to_string(descriptor).map_err(|e| e.to_string()),
        };
        encoded.map_err(|message| MigrationError::Encode {
            path: self.path.clone(),
            message,
        })
    }

    pub fn decode(&self, content: &str) -> Result<SchemaDescriptor, MigrationError> {
        let decode_err = |message: String| MigrationError::Decode {
            path: self.path.clone(),
            message,
        };
        if content.trim().is_empty() {
            return Ok(SchemaDescriptor::new());
        }

        let value: Value = match self.format {
            SnapshotFormat::Json => {
                serde_json::from_str(content).map_err(|e| decode_err(e.to_string()))?
            }
            SnapshotFormat::Yaml => {
                serde_yaml::from_str(content).map_err(|e| decode_err(e.to_string()))?
            }
        };
        match value {
            Value::Object(map) => Ok(map),
            Value::Null => Ok(SchemaDescriptor::new()),
            other => Err(decode_err(format!(
                "expected a mapping at the top level, found {}",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn sample() -> SchemaDescriptor {
        let value = json!({
            "users": {
                "columns": {
                    "id": {"type": "INTEGER", "notnull": true, "default": null, "pk": 1},
                    "score": {"type": "REAL", "notnull": false, "default": 1.5, "pk": 0}
                },
                "indexes": {
                    "users_email": {"columns": ["email"], "unique": true}
                },
                "options": {}
            }
        });
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("schema.json")).unwrap();
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_unsupported_extension() {
        assert!(matches!(
            SnapshotStore::new("schema.php"),
            Err(MigrationError::UnsupportedSnapshotExtension(_))
        ));
        assert!(matches!(
            SnapshotStore::new("schema"),
            Err(MigrationError::UnsupportedSnapshotExtension(_))
        ));
        assert_eq!(
            SnapshotStore::new("Schema.YML").unwrap().format(),
            SnapshotFormat::Yaml
        );
    }

    #[test]
    fn test_json_is_pretty_printed() {
        let dir = tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("schema.json")).unwrap();
        store.save(&sample()).unwrap();

        let content = fs::read_to_string(store.path()).unwrap();
        assert!(content.starts_with("{\n  \"users\": {\n"));
    }

    #[test]
    fn test_roundtrip_is_stable() {
        let dir = tempdir().unwrap();
        for file in ["schema.json", "nested/schema.yaml"] {
            let store = SnapshotStore::new(dir.path().join(file)).unwrap();
            store.save(&sample()).unwrap();
            let first = fs::read_to_string(store.path()).unwrap();

            let loaded = store.load().unwrap();
            assert_eq!(loaded, sample(), "{}", file);

            store.save(&loaded).unwrap();
            let second = fs::read_to_string(store.path()).unwrap();
            assert_eq!(first, second, "{}", file);
        }
    }

    #[test]
    fn test_both_encodings_decode_identically() {
        let json = SnapshotStore::new("a.json").unwrap();
        let yaml = SnapshotStore::new("a.yaml").unwrap();

        let from_json = json.decode(&json.encode(&sample()).unwrap()).unwrap();
        let from_yaml = yaml.decode(&yaml.encode(&sample()).unwrap()).unwrap();
        assert_eq!(from_json, from_yaml);
    }

    #[test]
    fn test_non_mapping_is_rejected() {
        let store = SnapshotStore::new("a.json").unwrap();
        assert!(matches!(
            store.decode("[1, 2]"),
            Err(MigrationError::Decode { .. })
        ));
        assert!(store.decode("").unwrap().is_empty());
    }
}
