#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use std::{
    collections::HashMap,
    env, fs,
    path::{Path, PathBuf},
};

pub const DEFAULT_ENV_PATH: &str = ".env";
pub const DEFAULT_DATASET_DIR: &str = "./activity-net-captions.v1-3";
pub const DEFAULT_VIDEOS_ROOT: &str = "./videos";
pub const DEFAULT_YT_DLP: &str = "yt-dlp";

const TRAIN_MANIFEST_FILE: &str = "train.json";
// val_2.json lists a subset of val_1.json, so only the larger file is read.
const VALIDATION_MANIFEST_FILE: &str = "val_1.json";
const FAILURE_LOG_FILE: &str = "failed_downloads.csv";
const COOKIES_FILE: &str = "cookies.txt";
const TRAINING_SUBDIR: &str = "training";
const VALIDATION_SUBDIR: &str = "validation";

/// Dataset partition, each with its own manifest and output directory.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Split {
    Training,
    Validation,
}

impl Split {
    /// Processing order for a full run.
    pub const ALL: [Split; 2] = [Split::Training, Split::Validation];

    pub fn label(self) -> &'static str {
        match self {
            Split::Training => "training",
            Split::Validation => "validation",
        }
    }

    fn subdir(self) -> &'static str {
        match self {
            Split::Training => TRAINING_SUBDIR,
            Split::Validation => VALIDATION_SUBDIR,
        }
    }

    fn manifest_file(self) -> &'static str {
        match self {
            Split::Training => TRAIN_MANIFEST_FILE,
            Split::Validation => VALIDATION_MANIFEST_FILE,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    pub dataset_dir: PathBuf,
    pub videos_root: PathBuf,
    pub yt_dlp: PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct RuntimeOverrides {
    pub dataset_dir: Option<PathBuf>,
    pub videos_root: Option<PathBuf>,
    pub yt_dlp: Option<PathBuf>,
    pub env_path: Option<PathBuf>,
}

/// Resolves every setting as CLI override, then process environment, then
/// the `.env` file, then the built-in default.
pub fn resolve_runtime_settings(overrides: RuntimeOverrides) -> Result<RuntimeSettings> {
    let env_path = overrides
        .env_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_ENV_PATH));
    let file_vars = read_env_file(&env_path)?;
    Ok(build_runtime_settings(&file_vars, env_var_string, overrides))
}

fn build_runtime_settings(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
    overrides: RuntimeOverrides,
) -> RuntimeSettings {
    let pick = |override_value: Option<PathBuf>, key: &str, default: &str| {
        override_value
            .filter(|path| !path.as_os_str().is_empty())
            .or_else(|| lookup_value(key, file_vars, &env_lookup).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(default))
    };

    RuntimeSettings {
        dataset_dir: pick(overrides.dataset_dir, "ANET_DATASET_DIR", DEFAULT_DATASET_DIR),
        videos_root: pick(overrides.videos_root, "ANET_VIDEOS_ROOT", DEFAULT_VIDEOS_ROOT),
        yt_dlp: pick(overrides.yt_dlp, "ANET_YT_DLP", DEFAULT_YT_DLP),
    }
}

fn env_var_string(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn lookup_value(
    key: &str,
    file_vars: &HashMap<String, String>,
    env_lookup: &impl Fn(&str) -> Option<String>,
) -> Option<String> {
    env_lookup(key).or_else(|| {
        file_vars
            .get(key)
            .filter(|value| !value.trim().is_empty())
            .cloned()
    })
}

pub fn read_env_file(path: &Path) -> Result<HashMap<String, String>> {
    let mut vars = HashMap::new();
    if !path.exists() {
        return Ok(vars);
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let line = trimmed.strip_prefix("export ").unwrap_or(trimmed);
        let Some((key, value_raw)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let value = value_raw.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|value| value.strip_suffix('"'))
            .or_else(|| {
                value
                    .strip_prefix('\'')
                    .and_then(|value| value.strip_suffix('\''))
            })
            .unwrap_or(value);
        vars.insert(key.to_string(), value.to_string());
    }
    Ok(vars)
}

/// Every filesystem location a download run reads or writes.
#[derive(Debug, Clone)]
pub struct DatasetPaths {
    pub dataset_dir: PathBuf,
    pub train_manifest: PathBuf,
    pub validation_manifest: PathBuf,
    pub failure_log: PathBuf,
    pub cookies: PathBuf,
    pub training_dir: PathBuf,
    pub validation_dir: PathBuf,
}

impl DatasetPaths {
    pub fn from_settings(settings: &RuntimeSettings) -> Self {
        Self::with_roots(&settings.dataset_dir, &settings.videos_root)
    }

    pub fn with_roots(dataset_dir: &Path, videos_root: &Path) -> Self {
        let dataset_dir = dataset_dir.to_path_buf();
        Self {
            train_manifest: dataset_dir.join(Split::Training.manifest_file()),
            validation_manifest: dataset_dir.join(Split::Validation.manifest_file()),
            failure_log: dataset_dir.join(FAILURE_LOG_FILE),
            cookies: dataset_dir.join(COOKIES_FILE),
            training_dir: videos_root.join(Split::Training.subdir()),
            validation_dir: videos_root.join(Split::Validation.subdir()),
            dataset_dir,
        }
    }

    pub fn manifest(&self, split: Split) -> &Path {
        match split {
            Split::Training => &self.train_manifest,
            Split::Validation => &self.validation_manifest,
        }
    }

    pub fn output_dir(&self, split: Split) -> &Path {
        match split {
            Split::Training => &self.training_dir,
            Split::Validation => &self.validation_dir,
        }
    }

    /// Output directories of every split. Files in any of them count as
    /// completed, whichever split is being processed.
    pub fn output_dirs(&self) -> Vec<PathBuf> {
        Split::ALL
            .iter()
            .map(|split| self.output_dir(*split).to_path_buf())
            .collect()
    }

    pub fn cookies_if_present(&self) -> Option<PathBuf> {
        self.cookies.is_file().then(|| self.cookies.clone())
    }
}
