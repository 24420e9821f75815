#![forbid(unsafe_code)]

//! Building blocks for the dataset video downloader: configuration, manifest
//! parsing, progress bookkeeping, the yt-dlp boundary and the batch driver.

pub mod batch;
pub mod config;
pub mod fetcher;
pub mod logging;
pub mod manifest;
pub mod platform;
pub mod progress;
