#![forbid(unsafe_code)]

//! Bookkeeping that makes repeated runs idempotent. A video counts as handled
//! once its file sits in an output directory or its id is in the failure log.

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

/// Video ids that must not be fetched again during this run.
pub type DownloadedSet = HashSet<String>;

#[derive(Debug, Clone)]
pub struct ProgressStore {
    failure_log: PathBuf,
}

impl ProgressStore {
    pub fn new(failure_log: impl Into<PathBuf>) -> Self {
        Self {
            failure_log: failure_log.into(),
        }
    }

    pub fn failure_log(&self) -> &Path {
        &self.failure_log
    }

    /// Creates the failure log and output directories when missing, then
    /// returns every id already downloaded or known to fail.
    pub fn initialize(&self, output_dirs: &[PathBuf]) -> Result<DownloadedSet> {
        if let Some(parent) = self.failure_log.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        if !self.failure_log.exists() {
            File::create(&self.failure_log)
                .with_context(|| format!("creating {}", self.failure_log.display()))?;
        }
        for dir in output_dirs {
            fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        }

        let mut downloaded = load_failures(&self.failure_log)?;
        let failed = downloaded.len();
        for dir in output_dirs {
            downloaded.extend(scan_output_dir(dir)?);
        }

        info!(
            failed,
            total = downloaded.len(),
            log = %self.failure_log.display(),
            "loaded download progress"
        );
        Ok(downloaded)
    }

    /// Appends a `{id},{reason}` row to the failure log.
    pub fn record_failure(&self, video_id: &str, reason: &str) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.failure_log)
            .with_context(|| format!("opening failure log {}", self.failure_log.display()))?;
        writeln!(file, "{video_id},{reason}")
            .with_context(|| format!("writing failure entry for {video_id}"))?;
        debug!(video_id, reason, "recorded failure");
        Ok(())
    }
}

/// Reads the id column of the failure log. Anything before the first comma is
/// taken as the id, so blank, malformed or non-UTF-8 rows never abort the run.
fn load_failures(path: &Path) -> Result<HashSet<String>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let reader = BufReader::new(file);
    let mut entries = HashSet::new();

    for row in reader.split(b'\n') {
        let row = row.with_context(|| format!("reading {}", path.display()))?;
        let field = row.split(|byte| *byte == b',').next().unwrap_or_default();
        let id = String::from_utf8_lossy(field);
        let id = id.trim();
        if !id.is_empty() {
            entries.insert(id.to_owned());
        }
    }

    Ok(entries)
}

/// Collects the stem of every file or symlink directly inside `dir`.
/// Links are not followed, so a dangling link still marks its id as handled.
/// Subdirectories are not videos and are skipped.
fn scan_output_dir(dir: &Path) -> Result<HashSet<String>> {
    let mut stems = HashSet::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.with_context(|| format!("scanning {}", dir.display()))?;
        if entry.file_type().is_dir() {
            continue;
        }
        if let Some(stem) = entry.path().file_stem() {
            stems.insert(stem.to_string_lossy().into_owned());
        }
    }
    Ok(stems)
}
