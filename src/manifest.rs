#![forbid(unsafe_code)]

//! Split manifests in the ActivityNet Captions layout: a JSON object keyed by
//! video key, e.g. `{"v_QOlSCBRmfWY": {"duration": 82.73, ...}}`.

use serde_json::{Map, Value};
use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Marker some dataset keys carry in front of the bare video id.
pub const VIDEO_KEY_PREFIX: &str = "v_";

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("reading manifest {}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("manifest {} is not a JSON object keyed by video", .path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Video key to per-video metadata, in file order.
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    entries: Map<String, Value>,
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let file = File::open(path).map_err(|source| ManifestError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let entries = serde_json::from_reader(BufReader::new(file)).map_err(|source| {
            ManifestError::Malformed {
                path: path.to_path_buf(),
                source,
            }
        })?;
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

impl<K: Into<String>> FromIterator<K> for Manifest {
    fn from_iter<I: IntoIterator<Item = K>>(keys: I) -> Self {
        let entries = keys
            .into_iter()
            .map(|key| (key.into(), Value::Object(Map::new())))
            .collect();
        Self { entries }
    }
}

/// Strips [`VIDEO_KEY_PREFIX`] when present, yielding the bare video id.
pub fn normalize_key(key: &str) -> &str {
    key.strip_prefix(VIDEO_KEY_PREFIX).unwrap_or(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn normalize_key_strips_marker_only_when_present() {
        assert_eq!(normalize_key("v_abc123"), "abc123");
        assert_eq!(normalize_key("xyz789"), "xyz789");
        assert_eq!(normalize_key("v_"), "");
        assert_eq!(normalize_key("vv_abc"), "vv_abc");
    }

    #[test]
    fn load_keeps_file_order() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("train.json");
        fs::write(
            &path,
            r#"{
                "v_zeta": {"duration": 10.0, "sentences": ["a"]},
                "v_alpha": {"duration": 3.5},
                "mid": {}
            }"#,
        )?;

        let manifest = Manifest::load(&path)?;
        assert_eq!(manifest.len(), 3);
        assert_eq!(
            manifest.keys().collect::<Vec<_>>(),
            vec!["v_zeta", "v_alpha", "mid"]
        );
        Ok(())
    }

    #[test]
    fn load_accepts_empty_object() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("val_1.json");
        fs::write(&path, "{}")?;
        let manifest = Manifest::load(&path)?;
        assert!(manifest.is_empty());
        Ok(())
    }

    #[test]
    fn load_missing_file_is_read_error() {
        let dir = tempdir().unwrap();
        let err = Manifest::load(&dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, ManifestError::Read { .. }));
        assert!(err.to_string().contains("missing.json"));
    }

    #[test]
    fn load_rejects_non_object_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("train.json");
        fs::write(&path, r#"["v_abc", "v_def"]"#).unwrap();
        let err = Manifest::load(&path).unwrap_err();
        assert!(matches!(err, ManifestError::Malformed { .. }));
    }

    #[test]
    fn load_rejects_truncated_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("train.json");
        fs::write(&path, r#"{"v_abc": {"duration": 1"#).unwrap();
        assert!(matches!(
            Manifest::load(&path),
            Err(ManifestError::Malformed { .. })
        ));
    }
}
