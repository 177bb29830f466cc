use std::fmt::Display;

/// One selectable encoding of the target media, as reported by a probe
#[derive(Debug, Clone, PartialEq)]
pub struct MediaStream {
    pub id: String,
    pub audio_codec: Option<String>,
    pub video_codec: Option<String>,
    /// Average bitrate in kbit/s
    pub average_bitrate: Option<f64>,
    pub container: Option<String>,
}

impl MediaStream {
    pub fn has_audio(&self) -> bool {
        self.audio_codec.is_some()
    }

    pub fn has_video(&self) -> bool {
        self.video_codec.is_some()
    }
}

/// What a probe learned about the target, without downloading it
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeInfo {
    pub id: String,
    pub title: String,
    pub ext: Option<String>,
    pub is_live: bool,
    /// Raw availability marker, e.g. `public`, `private`, `needs_auth`
    pub availability: Option<String>,
    pub streams: Vec<MediaStream>,
}

impl ProbeInfo {
    /// Whether the availability marker rules out any download, whatever the strategy
    pub fn is_restricted(&self) -> bool {
        matches!(
            self.availability.as_deref(),
            Some("private" | "premium_only" | "subscriber_only")
        )
    }
}

impl Display for ProbeInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "'{}' ({}, {} streams, availability: {})",
            self.title,
            self.id,
            self.streams.len(),
            self.availability.as_deref().unwrap_or("unknown")
        )
    }
}
