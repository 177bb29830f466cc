mod bitrate;
mod extension;
mod metadata;
mod strategy;

pub use bitrate::Bitrate;
pub use extension::AudioFormat;
pub use metadata::{MediaStream, ProbeInfo};
pub use strategy::{default_strategies, ExtractionStrategy};
