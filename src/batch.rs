#![forbid(unsafe_code)]

//! Walks split manifests and downloads whatever is not already handled.

use crate::config::{DatasetPaths, Split};
use crate::fetcher::{FetchOutcome, FetchPolicy, Fetcher};
use crate::manifest::{Manifest, normalize_key};
use crate::platform::VideoPlatform;
use crate::progress::{DownloadedSet, ProgressStore};
use anyhow::Result;
use std::io::Write;
use std::path::Path;
use tracing::info;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SplitSummary {
    pub downloaded: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Processes every entry of `manifest` in order, writing one progress line
/// per entry to `out`. Handled ids, including ones finished earlier in this
/// run, are skipped; per-video failures never stop the loop.
pub fn run_split<P: VideoPlatform + ?Sized>(
    split: Split,
    manifest: &Manifest,
    output_dir: &Path,
    fetcher: &Fetcher<'_, P>,
    downloaded: &mut DownloadedSet,
    out: &mut impl Write,
) -> Result<SplitSummary> {
    let label = split.label();
    let mut summary = SplitSummary::default();

    if manifest.is_empty() {
        writeln!(out, "No {label} videos listed")?;
        writeln!(out)?;
        return Ok(summary);
    }

    let total = manifest.len();
    writeln!(out, "Found {total} {label} videos")?;
    writeln!(out)?;

    for (index, key) in manifest.keys().enumerate() {
        let current = index + 1;
        let video_id = normalize_key(key);

        if downloaded.contains(video_id) {
            writeln!(out, "Skipping already downloaded video {current}/{total}")?;
            summary.skipped += 1;
            continue;
        }

        match fetcher.fetch(video_id, output_dir)? {
            FetchOutcome::Downloaded(path) => {
                info!(video_id, path = %path.display(), "downloaded");
                writeln!(out, "Downloaded {label} video {current}/{total}")?;
                summary.downloaded += 1;
            }
            FetchOutcome::Failed(failure) => {
                info!(video_id, reason = %failure, "download failed");
                writeln!(out, "Download failed {current}/{total}")?;
                summary.failed += 1;
            }
        }
        downloaded.insert(video_id.to_owned());
    }

    writeln!(out)?;
    writeln!(
        out,
        "{} download complete! ({} downloaded, {} skipped, {} failed)",
        capitalize(label),
        summary.downloaded,
        summary.skipped,
        summary.failed
    )?;
    writeln!(out)?;

    Ok(summary)
}

/// Full run over `splits`. Every manifest is loaded before anything touches
/// the disk or the network, so a bad manifest aborts the run up front. Then
/// progress is seeded from disk and each split is processed in turn.
pub fn run_dataset<P: VideoPlatform + ?Sized>(
    paths: &DatasetPaths,
    splits: &[Split],
    platform: &P,
    policy: FetchPolicy,
    out: &mut impl Write,
) -> Result<Vec<(Split, SplitSummary)>> {
    let manifests = splits
        .iter()
        .map(|&split| -> Result<(Split, Manifest)> {
            Ok((split, Manifest::load(paths.manifest(split))?))
        })
        .collect::<Result<Vec<_>>>()?;

    let progress = ProgressStore::new(&paths.failure_log);
    let mut downloaded = progress.initialize(&paths.output_dirs())?;
    let fetcher = Fetcher::new(platform, &progress, policy);

    let mut summaries = Vec::with_capacity(manifests.len());
    for (split, manifest) in manifests {
        let summary = run_split(
            split,
            &manifest,
            paths.output_dir(split),
            &fetcher,
            &mut downloaded,
            &mut *out,
        )?;
        summaries.push((split, summary));
    }

    Ok(summaries)
}

fn capitalize(label: &str) -> String {
    label
        .chars()
        .next()
        .map(|c| c.to_uppercase().to_string() + &label[c.len_utf8()..])
        .unwrap_or_else(|| label.to_string())
}
