//! Pick the audio stream to download out of a probe result.

use crate::types::MediaStream;

/// Bitrate (kbit/s) above which a stream gets no extra credit
const BITRATE_CEILING: f64 = 320.0;
/// Dominates any bitrate difference: no video means no wasted bandwidth
const AUDIO_ONLY_BONUS: f64 = 1000.0;
/// Let the extractor apply its own preference
const BEST_AUDIO_SELECTOR: &str = "bestaudio/best";

/// The stream to request from the extractor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamChoice {
    Stream(String),
    BestAudio,
}

impl StreamChoice {
    /// Value for the extractor `-f` option
    pub fn selector(&self) -> String {
        match self {
            StreamChoice::Stream(id) => id.clone(),
            StreamChoice::BestAudio => BEST_AUDIO_SELECTOR.to_owned(),
        }
    }
}

fn container_bonus(container: Option<&str>) -> f64 {
    match container {
        Some("m4a") => 30.0,
        Some("webm") => 20.0,
        Some("mp4") => 10.0,
        _ => 0.0,
    }
}

fn score(stream: &MediaStream) -> f64 {
    let mut score = stream.average_bitrate.unwrap_or(0.0).min(BITRATE_CEILING);
    if !stream.has_video() {
        score += AUDIO_ONLY_BONUS;
    }
    score + container_bonus(stream.container.as_deref())
}

/// Choose the best audio stream.
///
/// Streams without audio are ignored. Under equal score, the first listed stream wins.
pub fn choose(streams: &[MediaStream]) -> StreamChoice {
    let mut best: Option<(&MediaStream, f64)> = None;

    for stream in streams.iter().filter(|stream| stream.has_audio()) {
        let score = score(stream);
        match best {
            Some((_, best_score)) if best_score >= score => {}
            _ => best = Some((stream, score)),
        }
    }

    best.map_or(StreamChoice::BestAudio, |(stream, _)| {
        StreamChoice::Stream(stream.id.clone())
    })
}
