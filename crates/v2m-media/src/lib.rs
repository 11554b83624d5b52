//! Media I/O for the worker pipeline.
//!
//! This crate provides:
//! - `ResumableFetcher`: HTTP download with byte-range resume and bounded retries
//! - `Transcoder` / `FfmpegTranscoder`: MP3 extraction via the ffmpeg CLI

pub mod error;
pub mod fetch;
pub mod transcode;

pub use error::{MediaError, MediaResult};
pub use fetch::{FetchConfig, ResumableFetcher, BROWSER_USER_AGENT};
pub use transcode::{FfmpegTranscoder, Mp3Encoding, Transcoder};
