use std::{fmt::Display, path::PathBuf};

use miette::miette;

use crate::orchestrator::Classification;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The link does not look like a supported video link
    #[error("Invalid link: {0}")]
    InvalidInput(String),

    /// Live broadcasts cannot be turned into a file
    #[error("Live broadcasts are not supported")]
    UnsupportedContent,

    #[error("Content unavailable: {0}")]
    ContentUnavailable(String),

    /// Every strategy was tried without success
    #[error("All download strategies failed: {last_error}")]
    AllStrategiesFailed {
        last_error: String,
        classification: Classification,
    },

    /// The extractor reported success but no new file appeared
    #[error("No downloaded file found in {}", .0.display())]
    OutputResolutionFailed(PathBuf),

    /// Raw extractor failure, classified by the orchestrator
    #[error("{0}")]
    Extractor(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Miette(miette::Report),
}

impl From<miette::Report> for Error {
    fn from(err: miette::Report) -> Self {
        Error::Miette(err)
    }
}

impl From<Error> for miette::Report {
    fn from(err: Error) -> Self {
        match err {
            Error::Miette(err) => err,
            err => miette!("{err}"),
        }
    }
}

impl Error {
    pub fn wrap_err_with<D, F>(self, f: F) -> Error
    where
        D: Display + Send + Sync + 'static,
        F: FnOnce() -> D,
    {
        match self {
            Error::Miette(report) => Error::Miette(report.wrap_err(f())),
            Error::Io(err) => Error::Miette(miette::Report::msg(err.to_string()).wrap_err(f())),
            err => err,
        }
    }

    /// Message that can be shown to an end user.
    /// Contains the remediation hint but no internal classification names.
    pub fn user_message(&self) -> String {
        match self {
            Error::InvalidInput(reason) => {
                format!("This does not look like a video link ({reason}).")
            }
            Error::UnsupportedContent => {
                "This is a live broadcast. Try again once the stream has ended.".to_owned()
            }
            Error::ContentUnavailable(reason) => format!(
                "This video cannot be downloaded: {reason}. {}",
                Classification::ContentUnavailable.hint()
            ),
            Error::AllStrategiesFailed {
                last_error,
                classification,
            } => format!(
                "The download failed: {last_error}. {}",
                classification.hint()
            ),
            _ => "Something went wrong on the server. Please try again later.".to_owned(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

pub fn bail<T>(msg: impl Into<String>) -> Result<T> {
    Err(Error::Miette(miette!("{}", msg.into())))
}
