use std::path::PathBuf;

use clap::{Parser, ValueEnum};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

macro_rules! arg_env {
    ($v:literal) => {
        concat!("AUDIOFETCH_", $v)
    };
}

/// Web service turning video links into audio files with `yt-dlp`.
/// Tries several extraction strategies until one gets through.
///
/// Settings are read from the configuration file, then from `AUDIOFETCH__<SECTION>__<KEY>`
/// environment variables. The options below take precedence over both.
#[derive(Parser, Debug)]
#[command(version, about)]
pub struct Args {
    /// The path to a TOML configuration file
    #[arg(long, short, env=arg_env!("CONFIG"))]
    pub config: Option<PathBuf>,

    /// The address to listen on, e.g. `0.0.0.0:5000`
    #[arg(long, env=arg_env!("BIND"))]
    pub bind: Option<String>,

    /// The directory where finished audio files are stored
    #[arg(long, env=arg_env!("DOWNLOAD_DIR"))]
    pub download_dir: Option<PathBuf>,

    /// Proxy URL given to the extractor for all upstream requests
    #[arg(long, env=arg_env!("PROXY"))]
    pub proxy: Option<String>,

    /// A cookies.txt file to use before the conventional secret locations
    #[arg(long, env=arg_env!("COOKIES"))]
    pub cookies: Option<PathBuf>,

    /// Browser whose cookies are used when no cookies.txt is available, e.g. `chrome` or `firefox`.
    /// Only useful when the service runs on a desktop
    #[arg(long, env=arg_env!("COOKIES_FROM_BROWSER"))]
    pub cookies_from_browser: Option<String>,

    /// The maximum level of the logged messages
    #[arg(long, value_enum, default_value_t=LogLevel::Info, env=arg_env!("LOG_LEVEL"))]
    pub log_level: LogLevel,
}
