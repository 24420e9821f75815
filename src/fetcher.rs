#![forbid(unsafe_code)]

//! Per-video download with a two-tier quality preference. Tier one is the
//! first progressive encoding matching the target frame rate and height; tier
//! two is whatever progressive encoding the platform lists first.

use crate::platform::{EncodingDescriptor, VideoPlatform};
use crate::progress::ProgressStore;
use anyhow::Result;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

pub const DEFAULT_RETRIES: u32 = 5;

pub fn watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={video_id}")
}

/// Which encodings are acceptable and which one is preferred.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchPolicy {
    pub container: String,
    pub target_fps: u32,
    pub target_height: u32,
    pub retries: u32,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            container: "mp4".to_owned(),
            target_fps: 30,
            target_height: 480,
            retries: DEFAULT_RETRIES,
        }
    }
}

impl FetchPolicy {
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    fn file_name(&self, video_id: &str) -> String {
        format!("{video_id}.{}", self.container)
    }
}

/// Keeps progressive encodings in the policy's container, preserving order.
pub fn constrain(
    encodings: Vec<EncodingDescriptor>,
    policy: &FetchPolicy,
) -> Vec<EncodingDescriptor> {
    encodings
        .into_iter()
        .filter(|encoding| {
            encoding.is_progressive() && encoding.container.eq_ignore_ascii_case(&policy.container)
        })
        .collect()
}

/// First candidate at the target height and frame rate, if any.
pub fn select_preferred<'a>(
    candidates: &'a [EncodingDescriptor],
    policy: &FetchPolicy,
) -> Option<&'a EncodingDescriptor> {
    candidates.iter().find(|encoding| {
        encoding.height == Some(policy.target_height)
            && encoding
                .fps
                .is_some_and(|fps| fps.round() == f64::from(policy.target_fps))
    })
}

/// Why a video ended up in the failure log. The display strings are the
/// persisted reasons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FetchFailure {
    #[error("Video unavailable")]
    VideoUnavailable,

    #[error("No viable videos")]
    NoViableEncoding,

    #[error("Failed to download video")]
    Transfer,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Downloaded(PathBuf),
    Failed(FetchFailure),
}

pub struct Fetcher<'a, P: VideoPlatform + ?Sized> {
    platform: &'a P,
    progress: &'a ProgressStore,
    policy: FetchPolicy,
}

impl<'a, P: VideoPlatform + ?Sized> Fetcher<'a, P> {
    pub fn new(platform: &'a P, progress: &'a ProgressStore, policy: FetchPolicy) -> Self {
        Self {
            platform,
            progress,
            policy,
        }
    }

    /// Downloads `video_id` into `output_dir`. Per-video problems come back as
    /// [`FetchOutcome::Failed`] after being logged; only a failure to write the
    /// failure log itself is an error.
    pub fn fetch(&self, video_id: &str, output_dir: &Path) -> Result<FetchOutcome> {
        let url = watch_url(video_id);
        let target = output_dir.join(self.policy.file_name(video_id));

        let encodings = match self.platform.list_encodings(&url) {
            Ok(encodings) => encodings,
            Err(err) => {
                warn!(video_id, error = %err, "could not resolve video");
                return self.fail(video_id, FetchFailure::VideoUnavailable);
            }
        };

        let candidates = constrain(encodings, &self.policy);
        let Some(fallback) = candidates.first() else {
            warn!(video_id, "no progressive {} encodings", self.policy.container);
            return self.fail(video_id, FetchFailure::NoViableEncoding);
        };

        if let Some(preferred) = select_preferred(&candidates, &self.policy) {
            debug!(
                video_id,
                format_id = %preferred.format_id,
                note = preferred.note.as_deref().unwrap_or_default(),
                "trying preferred encoding"
            );
            match self.platform.transfer(&url, preferred, &target, self.policy.retries) {
                Ok(()) => return Ok(FetchOutcome::Downloaded(target)),
                Err(err) => {
                    warn!(video_id, error = %err, "preferred encoding failed, falling back");
                }
            }
        }

        debug!(
            video_id,
            format_id = %fallback.format_id,
            note = fallback.note.as_deref().unwrap_or_default(),
            "trying fallback encoding"
        );
        match self.platform.transfer(&url, fallback, &target, self.policy.retries) {
            Ok(()) => Ok(FetchOutcome::Downloaded(target)),
            Err(err) => {
                warn!(video_id, error = %err, "fallback encoding failed");
                self.fail(video_id, FetchFailure::Transfer)
            }
        }
    }

    fn fail(&self, video_id: &str, failure: FetchFailure) -> Result<FetchOutcome> {
        self.progress.record_failure(video_id, &failure.to_string())?;
        Ok(FetchOutcome::Failed(failure))
    }
}
