mod command;
mod ffmpeg;
mod ytdl;

pub use ffmpeg::{Ffmpeg, Transcoder};
pub use ytdl::{AudioConversion, Downloader, FetchRequest, Prober, Profile, Ytdl};
