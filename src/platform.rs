#![forbid(unsafe_code)]

//! Boundary to the video platform. Everything that talks to the network goes
//! through [`VideoPlatform`]; [`YtDlpClient`] implements it by shelling out to
//! yt-dlp.

use anyhow::{Result, bail};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use thiserror::Error;
use tracing::debug;

/// One downloadable format as reported by the platform.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodingDescriptor {
    pub format_id: String,
    /// Container extension, e.g. `mp4` or `webm`.
    pub container: String,
    pub has_video: bool,
    pub has_audio: bool,
    pub height: Option<u32>,
    pub fps: Option<f64>,
    pub note: Option<String>,
}

impl EncodingDescriptor {
    /// Audio and video muxed in a single stream.
    pub fn is_progressive(&self) -> bool {
        self.has_video && self.has_audio
    }
}

#[derive(Debug, Error)]
pub enum PlatformError {
    /// The video could not be resolved or its formats could not be listed.
    #[error("video unavailable: {0}")]
    Unavailable(String),

    #[error("transfer failed: {0}")]
    Transfer(String),
}

pub trait VideoPlatform {
    /// Resolves `url` and lists its encodings in the order the platform
    /// reports them.
    fn list_encodings(&self, url: &str) -> Result<Vec<EncodingDescriptor>, PlatformError>;

    /// Downloads `encoding` to `target`, letting the platform retry up to
    /// `retries` times.
    fn transfer(
        &self,
        url: &str,
        encoding: &EncodingDescriptor,
        target: &Path,
        retries: u32,
    ) -> Result<(), PlatformError>;
}

/// Minimal view of `yt-dlp --dump-single-json`, enough to pick a format.
#[derive(Deserialize)]
struct VideoInfo {
    #[serde(default)]
    formats: Vec<FormatInfo>,
}

#[derive(Deserialize)]
struct FormatInfo {
    format_id: Option<String>,
    ext: Option<String>,
    vcodec: Option<String>,
    acodec: Option<String>,
    height: Option<u32>,
    fps: Option<f64>,
    format_note: Option<String>,
}

/// Converts yt-dlp metadata JSON into encoding descriptors. Entries without a
/// format id cannot be requested and are dropped.
pub fn parse_encodings(raw_json: &str) -> Result<Vec<EncodingDescriptor>, serde_json::Error> {
    let info: VideoInfo = serde_json::from_str(raw_json)?;
    let has_codec = |codec: &Option<String>| {
        codec
            .as_deref()
            .is_some_and(|codec| !codec.is_empty() && !codec.eq_ignore_ascii_case("none"))
    };

    Ok(info
        .formats
        .into_iter()
        .filter_map(|format| {
            let format_id = format.format_id.as_deref()?.trim();
            if format_id.is_empty() {
                return None;
            }
            Some(EncodingDescriptor {
                format_id: format_id.to_owned(),
                container: format.ext.clone().unwrap_or_default(),
                has_video: has_codec(&format.vcodec),
                has_audio: has_codec(&format.acodec),
                height: format.height,
                fps: format.fps,
                note: format.format_note,
            })
        })
        .collect())
}

/// Drives a local yt-dlp executable.
#[derive(Debug, Clone)]
pub struct YtDlpClient {
    program: PathBuf,
    cookies: Option<PathBuf>,
}

impl YtDlpClient {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            cookies: None,
        }
    }

    /// Passes a Netscape cookie file on every call, which lets age-gated
    /// videos resolve.
    pub fn with_cookies(mut self, cookies: Option<PathBuf>) -> Self {
        self.cookies = cookies;
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Runs `<program> --version` to fail loudly when yt-dlp is missing.
    pub fn ensure_available(&self) -> Result<()> {
        let status = Command::new(&self.program)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        match status {
            Ok(status) if status.success() => Ok(()),
            Ok(_) => bail!(
                "{} is installed but returned a failure status",
                self.program.display()
            ),
            Err(err) => bail!(
                "{} is not installed or not in PATH: {}",
                self.program.display(),
                err
            ),
        }
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.arg("--no-warnings").arg("--no-progress").arg("--no-playlist");
        if let Some(cookies) = &self.cookies {
            command.arg("--cookies").arg(cookies);
        }
        command
    }
}

impl VideoPlatform for YtDlpClient {
    fn list_encodings(&self, url: &str) -> Result<Vec<EncodingDescriptor>, PlatformError> {
        let mut command = self.command();
        command
            .arg("--dump-single-json")
            .arg("--skip-download")
            .arg(url);
        debug!(?command, "listing encodings");

        let output = command.output().map_err(|err| {
            PlatformError::Unavailable(format!("running {}: {err}", self.program.display()))
        })?;
        if !output.status.success() {
            return Err(PlatformError::Unavailable(failure_summary(&output)));
        }

        let raw_json = String::from_utf8_lossy(&output.stdout);
        parse_encodings(&raw_json)
            .map_err(|err| PlatformError::Unavailable(format!("parsing metadata for {url}: {err}")))
    }

    fn transfer(
        &self,
        url: &str,
        encoding: &EncodingDescriptor,
        target: &Path,
        retries: u32,
    ) -> Result<(), PlatformError> {
        // yt-dlp expands `%(...)s` in output templates.
        let template = target.to_string_lossy().replace('%', "%%");
        let mut command = self.command();
        command
            .arg("--format")
            .arg(&encoding.format_id)
            .arg("--output")
            .arg(template)
            .arg("--retries")
            .arg(retries.to_string())
            .arg("--no-continue")
            .arg(url);
        debug!(?command, format_id = %encoding.format_id, "transferring");

        let output = command.output().map_err(|err| {
            PlatformError::Transfer(format!("running {}: {err}", self.program.display()))
        })?;
        if !output.status.success() {
            return Err(PlatformError::Transfer(failure_summary(&output)));
        }
        if !target.is_file() {
            return Err(PlatformError::Transfer(format!(
                "{} reported success but {} is missing",
                self.program.display(),
                target.display()
            )));
        }
        Ok(())
    }
}

/// Exit status plus the last stderr line, which is where yt-dlp puts its
/// `ERROR:` message.
fn failure_summary(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    match stderr.lines().rev().map(str::trim).find(|line| !line.is_empty()) {
        Some(line) => format!("yt-dlp exited with {}: {line}", output.status),
        None => format!("yt-dlp exited with {}", output.status),
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::fs;
    #[cfg(unix)]
    use std::os::unix::fs::PermissionsExt;
    use std::sync::Mutex;
    use tempfile::tempdir;

    // Writing a script while another test forks can leave it busy on exec.
    static STUB_LOCK: Mutex<()> = Mutex::new(());

    const SAMPLE_INFO: &str = r#"{
        "id": "alpha",
        "title": "Alpha",
        "formats": [
            {"format_id": "sb0", "ext": "mhtml", "vcodec": "none", "acodec": "none"},
            {"format_id": "140", "ext": "m4a", "vcodec": "none", "acodec": "mp4a.40.2"},
            {"format_id": "135", "ext": "mp4", "vcodec": "avc1.4d401e", "acodec": "none", "height": 480, "fps": 30},
            {"format_id": "18", "ext": "mp4", "vcodec": "avc1.42001E", "acodec": "mp4a.40.2", "height": 360, "fps": 30, "format_note": "360p"},
            {"format_id": "59", "ext": "mp4", "vcodec": "avc1.4d401f", "acodec": "mp4a.40.2", "height": 480, "fps": 29.97},
            {"format_id": null, "ext": "mp4"},
            {"format_id": "   ", "ext": "mp4"}
        ]
    }"#;

    #[test]
    fn parse_encodings_reads_codecs_and_dimensions() -> Result<()> {
        let encodings = parse_encodings(SAMPLE_INFO)?;
        let ids: Vec<_> = encodings.iter().map(|e| e.format_id.as_str()).collect();
        assert_eq!(ids, vec!["sb0", "140", "135", "18", "59"]);

        assert!(!encodings[0].has_video && !encodings[0].has_audio);
        assert!(!encodings[1].is_progressive());
        assert!(encodings[2].has_video && !encodings[2].has_audio);
        assert!(encodings[3].is_progressive());
        assert_eq!(encodings[3].height, Some(360));
        assert_eq!(encodings[3].note.as_deref(), Some("360p"));
        assert_eq!(encodings[4].fps, Some(29.97));
        assert_eq!(encodings[4].container, "mp4");
        Ok(())
    }

    #[test]
    fn parse_encodings_tolerates_missing_formats() -> Result<()> {
        assert!(parse_encodings(r#"{"id": "live"}"#)?.is_empty());
        assert!(parse_encodings("not json").is_err());
        Ok(())
    }

    #[cfg(unix)]
    fn install_ytdlp_stub(dir: &Path) -> Result<PathBuf> {
        let script_path = dir.join("yt-dlp");
        let script = format!(
            r#"#!/usr/bin/env bash
set -eu
args=("$@")
output=""
format_id=""
retries=""
while [[ $# -gt 0 ]]; do
  case "$1" in
    --output)
      shift
      output="$1"
      ;;
    --format)
      shift
      format_id="$1"
      ;;
    --retries)
      shift
      retries="$1"
      ;;
  esac
  shift
done

if printf '%s\n' "${{args[@]}}" | grep -q -- '^--version$'; then
  echo "2025.01.01"
  exit 0
fi

url="${{args[${{#args[@]}}-1]}}"
case "$url" in
  *gone*)
    echo "ERROR: [youtube] gone: Video unavailable" >&2
    exit 1
    ;;
esac

if printf '%s\n' "${{args[@]}}" | grep -q -- '--dump-single-json'; then
  cat <<'JSON'
{SAMPLE_INFO}
JSON
  exit 0
fi

if [[ -n "$format_id" ]]; then
  if [[ "$format_id" == "broken" ]]; then
    echo "ERROR: unable to download video data: HTTP Error 403" >&2
    exit 1
  fi
  if [[ "$format_id" == "silent" ]]; then
    exit 0
  fi
  mkdir -p "$(dirname "$output")"
  printf '%s retries=%s\n' "$format_id" "$retries" > "$output"
  exit 0
fi

exit 2
"#
        );
        fs::write(&script_path, script)?;
        let mut perms = fs::metadata(&script_path)?.permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&script_path, perms)?;
        Ok(script_path)
    }

    #[cfg(unix)]
    #[test]
    fn ytdlp_client_lists_and_transfers() -> Result<()> {
        let _lock = STUB_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let dir = tempdir()?;
        let client = YtDlpClient::new(install_ytdlp_stub(dir.path())?);
        client.ensure_available()?;

        let encodings = client.list_encodings("https://www.youtube.com/watch?v=alpha")?;
        assert_eq!(encodings.len(), 5);

        let target = dir.path().join("training").join("alpha.mp4");
        client.transfer(
            "https://www.youtube.com/watch?v=alpha",
            &encodings[4],
            &target,
            5,
        )?;
        assert_eq!(fs::read_to_string(&target)?, "59 retries=5\n");
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn ytdlp_client_classifies_failures() -> Result<()> {
        let _lock = STUB_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let dir = tempdir()?;
        let client = YtDlpClient::new(install_ytdlp_stub(dir.path())?);

        let err = client
            .list_encodings("https://www.youtube.com/watch?v=gone")
            .unwrap_err();
        assert!(matches!(err, PlatformError::Unavailable(_)));
        assert!(err.to_string().contains("Video unavailable"));

        let target = dir.path().join("alpha.mp4");
        let mut broken = fake::encoding("broken", "mp4", 480, 30.0, true);
        let err = client
            .transfer("https://www.youtube.com/watch?v=alpha", &broken, &target, 5)
            .unwrap_err();
        assert!(matches!(err, PlatformError::Transfer(_)));
        assert!(err.to_string().contains("HTTP Error 403"));

        broken.format_id = "silent".into();
        let err = client
            .transfer("https://www.youtube.com/watch?v=alpha", &broken, &target, 5)
            .unwrap_err();
        assert!(err.to_string().contains("is missing"));
        Ok(())
    }

    #[test]
    fn ensure_available_reports_missing_program() {
        let dir = tempdir().unwrap();
        let client = YtDlpClient::new(dir.path().join("no-such-yt-dlp"));
        let err = client.ensure_available().unwrap_err();
        assert!(err.to_string().contains("not installed"));
    }

    #[test]
    fn missing_program_is_unavailable_not_panic() {
        let dir = tempdir().unwrap();
        let client = YtDlpClient::new(dir.path().join("no-such-yt-dlp"));
        assert!(matches!(
            client.list_encodings("https://www.youtube.com/watch?v=alpha"),
            Err(PlatformError::Unavailable(_))
        ));
    }
}
