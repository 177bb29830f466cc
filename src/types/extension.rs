use std::path::Path;

use serde::Deserialize;

/// Audio containers the service produces or passes through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Mp3,
    M4a,
    Opus,
    Ogg,
    Webm,
}

impl AudioFormat {
    /// Name understood by the extractor `--audio-format` option
    pub fn as_str(self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::M4a => "m4a",
            AudioFormat::Opus => "opus",
            AudioFormat::Ogg => "vorbis",
            AudioFormat::Webm => "webm",
        }
    }

    pub fn mime(self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "audio/mpeg",
            AudioFormat::M4a => "audio/mp4",
            AudioFormat::Opus | AudioFormat::Ogg => "audio/ogg",
            AudioFormat::Webm => "audio/webm",
        }
    }

    /// Parse the path file extension.
    /// Return None in case of no or unknown extension.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Option<Self> {
        path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| match ext.to_ascii_lowercase().as_str() {
                "mp3" => Some(Self::Mp3),
                "m4a" => Some(Self::M4a),
                "opus" => Some(Self::Opus),
                "ogg" => Some(Self::Ogg),
                "webm" => Some(Self::Webm),
                _ => None,
            })
    }
}
