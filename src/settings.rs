use std::{path::PathBuf, time::Duration};

use config::{Config, Environment, File};
use miette::{Context, IntoDiagnostic, Result};
use serde::Deserialize;

use crate::{
    cli::Args,
    orchestrator::RetryPolicy,
    types::{AudioFormat, Bitrate},
};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind: String,
    /// Downloads running at the same time, others wait for a slot
    pub max_concurrent_downloads: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:5000".to_owned(),
            max_concurrent_downloads: 2,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CookieSettings {
    /// Checked before the conventional secret mounts
    pub path: Option<PathBuf>,
    /// Where the cookie jar in use is copied
    pub staging_path: PathBuf,
    /// Browser profile read by the extractor when no jar is staged
    pub from_browser: Option<String>,
}

impl Default for CookieSettings {
    fn default() -> Self {
        Self {
            path: None,
            staging_path: std::env::temp_dir().join("cookies.txt"),
            from_browser: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    /// Format produced when `ffmpeg` is available
    pub format: AudioFormat,
    pub quality: Bitrate,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            format: AudioFormat::Mp3,
            quality: Bitrate::kbps(192),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub jitter_ms: u64,
    pub auth_cooldown_secs: u64,
    pub rate_limit_cooldown_secs: u64,
    pub transient_cooldown_secs: u64,
    pub refresh_window: usize,
    pub time_budget_secs: Option<u64>,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            jitter_ms: policy.jitter.as_millis() as u64,
            auth_cooldown_secs: policy.auth_cooldown.as_secs(),
            rate_limit_cooldown_secs: policy.rate_limit_cooldown.as_secs(),
            transient_cooldown_secs: policy.transient_cooldown.as_secs(),
            refresh_window: policy.refresh_window,
            time_budget_secs: None,
        }
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(retry: &RetrySettings) -> Self {
        Self {
            jitter: Duration::from_millis(retry.jitter_ms),
            auth_cooldown: Duration::from_secs(retry.auth_cooldown_secs),
            rate_limit_cooldown: Duration::from_secs(retry.rate_limit_cooldown_secs),
            transient_cooldown: Duration::from_secs(retry.transient_cooldown_secs),
            refresh_window: retry.refresh_window,
            time_budget: retry.time_budget_secs.map(Duration::from_secs),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    /// Requests allowed per client in a window, 0 to disable
    pub max_requests: usize,
    pub window_secs: u64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            max_requests: 10,
            window_secs: 60 * 60,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub download_dir: PathBuf,
    /// Upstream proxy URL
    pub proxy: Option<String>,
    pub cookies: CookieSettings,
    pub audio: AudioSettings,
    pub retry: RetrySettings,
    pub rate_limit: RateLimitSettings,
    /// Sites accepted on top of the built-in ones
    pub extra_hosts: Vec<String>,
}

impl Settings {
    /// Layer the configuration file, the environment and the command line
    pub fn load(args: &Args) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = &args.config {
            builder = builder.add_source(File::from(path.as_path()).required(true));
        }

        builder = builder
            .add_source(
                Environment::with_prefix("AUDIOFETCH")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("extra_hosts"),
            )
            .set_override_option("server.bind", args.bind.clone())
            .into_diagnostic()?
            .set_override_option(
                "download_dir",
                args.download_dir
                    .as_ref()
                    .map(|path| path.to_string_lossy().into_owned()),
            )
            .into_diagnostic()?
            .set_override_option("proxy", args.proxy.clone())
            .into_diagnostic()?
            .set_override_option(
                "cookies.path",
                args.cookies
                    .as_ref()
                    .map(|path| path.to_string_lossy().into_owned()),
            )
            .into_diagnostic()?
            .set_override_option("cookies.from_browser", args.cookies_from_browser.clone())
            .into_diagnostic()?;

        let mut settings: Settings = builder
            .build()
            .into_diagnostic()
            .wrap_err("Could not read the configuration")?
            .try_deserialize()
            .into_diagnostic()
            .wrap_err("Invalid configuration")?;

        if settings.download_dir.as_os_str().is_empty() {
            settings.download_dir = PathBuf::from("downloads");
        }

        Ok(settings)
    }
}
