use std::fmt::Debug;

use tracing::{info, warn};

use super::command::{assert_success_command, FFMPEG};

/// Availability of the audio encoder used for the final conversion
pub trait Transcoder: Send + Sync + Debug {
    /// Whether downloads can be converted to the configured audio format
    fn available(&self) -> bool;
}

/// Interface for the [ffmpeg](https://ffmpeg.org) program
#[derive(Debug)]
pub struct Ffmpeg {
    available: bool,
}

impl Ffmpeg {
    /// Check once whether the `ffmpeg` binary is reachable.
    ///
    /// A missing encoder is not an error: downloads keep their original container.
    pub fn detect() -> Self {
        let available = assert_success_command(FFMPEG, |cmd| cmd.arg("-version")).is_ok();
        if available {
            info!("ffmpeg found, audio will be converted");
        } else {
            warn!("ffmpeg not found, audio will keep its original container");
        }

        Self { available }
    }
}

impl Transcoder for Ffmpeg {
    fn available(&self) -> bool {
        self.available
    }
}
