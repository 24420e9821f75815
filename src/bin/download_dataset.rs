#![forbid(unsafe_code)]

//! Command-line entry point that downloads every video listed in the
//! ActivityNet Captions split manifests.
//!
//! Re-running is safe: videos already on disk or listed in the failure log are
//! skipped, so an interrupted run simply picks up where it stopped.

use anet_tools::batch::run_dataset;
use anet_tools::config::{DatasetPaths, RuntimeOverrides, Split, resolve_runtime_settings};
use anet_tools::fetcher::{DEFAULT_RETRIES, FetchPolicy};
use anet_tools::logging::init_logging;
use anet_tools::platform::YtDlpClient;
use anyhow::Result;
use clap::{Parser, ValueEnum};
use std::io;
use std::path::PathBuf;
use tracing::info;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum SplitArg {
    Training,
    Validation,
    All,
}

impl SplitArg {
    fn splits(self) -> Vec<Split> {
        match self {
            SplitArg::Training => vec![Split::Training],
            SplitArg::Validation => vec![Split::Validation],
            SplitArg::All => Split::ALL.to_vec(),
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "download_dataset",
    version,
    about = "Download the ActivityNet Captions videos with yt-dlp"
)]
struct Args {
    /// Directory holding train.json, val_1.json and the failure log
    #[arg(long, value_name = "PATH")]
    dataset_dir: Option<PathBuf>,

    /// Root of the training/ and validation/ output directories
    #[arg(long, value_name = "PATH")]
    videos_root: Option<PathBuf>,

    /// Env file with ANET_* settings
    #[arg(long, value_name = "PATH")]
    env_file: Option<PathBuf>,

    /// yt-dlp executable to run
    #[arg(long = "yt-dlp", value_name = "PROGRAM")]
    yt_dlp: Option<PathBuf>,

    /// Which split to process
    #[arg(long, value_enum, default_value_t = SplitArg::All)]
    split: SplitArg,

    /// Retry count handed to each yt-dlp transfer
    #[arg(long, default_value_t = DEFAULT_RETRIES)]
    retries: u32,

    /// Debug-level diagnostics on stderr
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    /// Only errors on stderr
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet)?;

    let settings = resolve_runtime_settings(RuntimeOverrides {
        dataset_dir: args.dataset_dir.clone(),
        videos_root: args.videos_root.clone(),
        yt_dlp: args.yt_dlp.clone(),
        env_path: args.env_file.clone(),
    })?;
    let paths = DatasetPaths::from_settings(&settings);

    let client = YtDlpClient::new(&settings.yt_dlp).with_cookies(paths.cookies_if_present());
    client.ensure_available()?;

    println!("===================================");
    println!("ActivityNet Captions Downloader");
    println!("===================================");
    println!("Dataset directory: {}", paths.dataset_dir.display());
    println!("Training videos: {}", paths.training_dir.display());
    println!("Validation videos: {}", paths.validation_dir.display());
    println!("Failure log: {}", paths.failure_log.display());
    println!();
    info!(
        yt_dlp = %client.program().display(),
        cookies = paths.cookies_if_present().is_some(),
        retries = args.retries,
        "starting download run"
    );

    let stdout = io::stdout();
    run_dataset(
        &paths,
        &args.split.splits(),
        &client,
        FetchPolicy::default().with_retries(args.retries),
        &mut stdout.lock(),
    )?;

    println!("Finished downloading all videos!");
    Ok(())
}
