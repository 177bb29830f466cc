use std::{
    ffi::OsStr,
    path::{Path, PathBuf},
    process::Command,
};

use miette::{Context, IntoDiagnostic};
use serde::Deserialize;

use super::command::{assert_success_command, error_lines, run_command, Capture, YT_DLP};
use crate::{
    result::{Error, Result},
    selector::StreamChoice,
    types::{AudioFormat, Bitrate, ExtractionStrategy, MediaStream, ProbeInfo},
};

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
    (KHTML, like Gecko) Chrome/124.0 Safari/537.36";
const ACCEPT_LANGUAGE: &str = "Accept-Language:en-US,en;q=0.9";
const OUTPUT_TEMPLATE: &str = "%(title).90s.%(ext)s";

/// How one attempt presents itself to the upstream service
#[derive(Debug, Clone, Copy)]
pub struct Profile<'a> {
    pub strategy: &'a ExtractionStrategy,
    /// Cookie jar to send, already filtered on [`ExtractionStrategy::use_credentials`]
    pub cookies: Option<&'a Path>,
}

/// Everything needed to download the selected stream
#[derive(Debug, Clone, Copy)]
pub struct FetchRequest<'a> {
    pub url: &'a str,
    pub profile: Profile<'a>,
    pub stream: &'a StreamChoice,
    /// Directory owned by this attempt only
    pub out_dir: &'a Path,
}

/// Metadata-only calls to the extractor
pub trait Prober: Send + Sync {
    /// List the target title, state and available streams
    fn probe(&self, url: &str, profile: &Profile<'_>) -> Result<ProbeInfo>;
}

/// Download calls to the extractor
pub trait Downloader: Send + Sync {
    /// Download the requested stream into `request.out_dir`.
    ///
    /// The produced file name is left to the extractor.
    fn fetch(&self, request: &FetchRequest<'_>) -> Result<()>;
}

/// Audio conversion applied after download, when an encoder is present
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioConversion {
    pub format: AudioFormat,
    pub quality: Bitrate,
}

/// Interface for the [yt-dlp](https://github.com/yt-dlp/yt-dlp) program
#[derive(Debug)]
pub struct Ytdl {
    proxy: Option<String>,
    conversion: Option<AudioConversion>,
    /// Browser to read cookies from when no cookie jar is staged
    cookies_from_browser: Option<String>,
}

impl Ytdl {
    /// Verify that the `yt-dlp` binary is reachable
    pub fn new(proxy: Option<String>) -> Result<Self> {
        assert_success_command(YT_DLP, |cmd| cmd.arg("--version"))
            .map_err(|err| err.wrap_err_with(|| "yt-dlp not found"))?;

        Ok(Self {
            proxy,
            conversion: None,
            cookies_from_browser: None,
        })
    }

    /// Convert every download, `None` keeps the source container
    #[must_use]
    pub fn with_conversion(mut self, conversion: Option<AudioConversion>) -> Self {
        self.conversion = conversion;
        self
    }

    /// Fall back to the cookies of a local browser profile, e.g. `chrome` or `firefox`
    #[must_use]
    pub fn with_cookies_from_browser(mut self, browser: Option<String>) -> Self {
        self.cookies_from_browser = browser.map(|browser| browser.to_lowercase());
        self
    }

    /// Options shared by the probe and the download calls
    fn apply_profile<'c>(&self, cmd: &'c mut Command, profile: &Profile<'_>) -> &'c mut Command {
        let strategy = profile.strategy;
        let retries = if strategy.aggressive { "10" } else { "3" };

        cmd.arg("--no-playlist")
            .arg("--no-cache-dir")
            .arg("--no-check-certificates")
            .args(["--retries", retries])
            .args(["--fragment-retries", retries])
            .args(["--geo-bypass-country", "US"])
            .args(["--user-agent", USER_AGENT])
            .args(["--add-headers", ACCEPT_LANGUAGE])
            .args([
                "--extractor-args",
                &format!(
                    "youtube:player_client={};player_skip=configs",
                    strategy.client_identities.join(",")
                ),
            ]);

        if strategy.aggressive {
            cmd.arg("--force-ipv4");
        }
        if let Some(proxy) = &self.proxy {
            cmd.args(["--proxy", proxy]);
        }
        match (profile.cookies, &self.cookies_from_browser) {
            (Some(cookies), _) => {
                cmd.args([OsStr::new("--cookies"), cookies.as_os_str()]);
            }
            (None, Some(browser)) if strategy.use_credentials => {
                cmd.args(["--cookies-from-browser", browser.as_str()]);
            }
            _ => {}
        }

        cmd
    }
}

impl Prober for Ytdl {
    fn probe(&self, url: &str, profile: &Profile<'_>) -> Result<ProbeInfo> {
        let res = run_command(
            YT_DLP,
            |cmd| {
                self.apply_profile(cmd, profile)
                    .arg("-q")
                    .arg("--skip-download")
                    .arg("-J")
                    .arg("--")
                    .arg(url)
            },
            Capture::STDOUT | Capture::STDERR,
        )?;

        if !res.status.success() {
            return Err(Error::Extractor(error_lines(&res.stderr)));
        }

        let output = String::from_utf8_lossy(&res.stdout);
        let info = serde_json::from_str::<RawInfo>(&output)
            .into_diagnostic()
            .wrap_err("Could not parse the extractor JSON output")?;

        Ok(info.into())
    }
}

impl Downloader for Ytdl {
    fn fetch(&self, request: &FetchRequest<'_>) -> Result<()> {
        let template: PathBuf = request.out_dir.join(OUTPUT_TEMPLATE);

        let res = run_command(
            YT_DLP,
            |cmd| {
                let cmd = self
                    .apply_profile(cmd, &request.profile)
                    .arg("-q")
                    .arg("--no-continue")
                    .args(["--concurrent-fragments", "4"])
                    .args(["-f", &request.stream.selector()])
                    .args([OsStr::new("-o"), template.as_os_str()]);

                if let Some(conversion) = &self.conversion {
                    cmd.arg("-x")
                        .args(["--audio-format", conversion.format.as_str()])
                        .args(["--audio-quality", &conversion.quality.to_string()]);
                }

                cmd.arg("--").arg(request.url)
            },
            Capture::STDERR,
        )?;

        if res.status.success() {
            Ok(())
        } else {
            Err(Error::Extractor(error_lines(&res.stderr)))
        }
    }
}

/// Subset of the extractor JSON output
#[derive(Debug, Deserialize)]
struct RawInfo {
    id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    ext: Option<String>,
    #[serde(default)]
    is_live: Option<bool>,
    #[serde(default)]
    live_status: Option<String>,
    #[serde(default)]
    availability: Option<String>,
    #[serde(default)]
    formats: Vec<RawFormat>,
}

#[derive(Debug, Deserialize)]
struct RawFormat {
    format_id: String,
    #[serde(default)]
    acodec: Option<String>,
    #[serde(default)]
    vcodec: Option<String>,
    #[serde(default)]
    abr: Option<f64>,
    #[serde(default)]
    tbr: Option<f64>,
    #[serde(default)]
    ext: Option<String>,
}

/// The extractor writes `"none"` for a missing track
fn codec(value: Option<String>) -> Option<String> {
    value.filter(|codec| !codec.is_empty() && codec != "none")
}

impl From<RawFormat> for MediaStream {
    fn from(raw: RawFormat) -> Self {
        Self {
            id: raw.format_id,
            audio_codec: codec(raw.acodec),
            video_codec: codec(raw.vcodec),
            average_bitrate: raw.abr.or(raw.tbr),
            container: raw.ext,
        }
    }
}

impl From<RawInfo> for ProbeInfo {
    fn from(raw: RawInfo) -> Self {
        let is_live = raw.is_live.unwrap_or(false)
            || matches!(raw.live_status.as_deref(), Some("is_live" | "is_upcoming"));

        Self {
            title: raw.title.unwrap_or_else(|| raw.id.clone()),
            id: raw.id,
            ext: raw.ext,
            is_live,
            availability: raw.availability,
            streams: raw.formats.into_iter().map(MediaStream::from).collect(),
        }
    }
}
