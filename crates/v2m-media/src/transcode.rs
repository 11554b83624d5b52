//! MP3 extraction through the ffmpeg CLI.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use v2m_models::{truncate_message, MAX_ERROR_LEN};

use crate::error::{MediaError, MediaResult};

/// Converts a downloaded media file into an MP3.
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Write an MP3 at `output`. The output must exist on success.
    async fn transcode(&self, input: &Path, output: &Path) -> MediaResult<()>;
}

/// Fixed MP3 encoding parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mp3Encoding {
    pub codec: String,
    pub sample_rate: u32,
    pub bitrate: String,
}

impl Default for Mp3Encoding {
    fn default() -> Self {
        Self {
            codec: "libmp3lame".to_string(),
            sample_rate: 44_100,
            bitrate: "128k".to_string(),
        }
    }
}

impl Mp3Encoding {
    /// Build the ffmpeg argument list: drop video, encode audio, overwrite.
    pub fn build_args(&self, input: &Path, output: &Path) -> Vec<String> {
        vec![
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-y".to_string(),
            "-i".to_string(),
            input.to_string_lossy().to_string(),
            "-vn".to_string(),
            "-acodec".to_string(),
            self.codec.clone(),
            "-ar".to_string(),
            self.sample_rate.to_string(),
            "-b:a".to_string(),
            self.bitrate.clone(),
            output.to_string_lossy().to_string(),
        ]
    }
}

/// `Transcoder` that shells out to `ffmpeg`.
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    program: PathBuf,
    encoding: Mp3Encoding,
}

impl Default for FfmpegTranscoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FfmpegTranscoder {
    /// Use `ffmpeg` from `PATH`.
    pub fn new() -> Self {
        Self::with_program("ffmpeg")
    }

    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            encoding: Mp3Encoding::default(),
        }
    }

    /// Check that the binary resolves.
    pub fn check_available(&self) -> MediaResult<PathBuf> {
        which::which(&self.program).map_err(|_| MediaError::FfmpegNotFound)
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn transcode(&self, input: &Path, output: &Path) -> MediaResult<()> {
        let binary = self.check_available()?;
        let args = self.encoding.build_args(input, output);
        debug!("Running FFmpeg: ffmpeg {}", args.join(" "));

        let result = Command::new(binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await?;

        if !result.status.success() {
            let mut combined = String::from_utf8_lossy(&result.stdout).into_owned();
            combined.push_str(&String::from_utf8_lossy(&result.stderr));
            let combined = truncate_message(combined.trim(), MAX_ERROR_LEN);

            let message = if combined.is_empty() {
                format!("exit status {}", result.status)
            } else {
                combined.clone()
            };
            return Err(MediaError::ffmpeg_failed(
                message,
                Some(combined),
                result.status.code(),
            ));
        }

        match tokio::fs::metadata(output).await {
            Ok(meta) if meta.len() > 0 => {
                info!(bytes = meta.len(), "Transcoded {}", output.display());
                Ok(())
            }
            _ => Err(MediaError::MissingOutput(output.to_path_buf())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_args() {
        let args = Mp3Encoding::default().build_args(Path::new("/w/in.mp4"), Path::new("/w/out.mp3"));
        assert_eq!(
            args.join(" "),
            "-hide_banner -loglevel error -y -i /w/in.mp4 -vn -acodec libmp3lame -ar 44100 -b:a 128k /w/out.mp3"
        );
    }

    #[test]
    fn test_missing_binary() {
        let transcoder = FfmpegTranscoder::with_program("definitely-not-ffmpeg-v2m");
        assert!(matches!(
            transcoder.check_available(),
            Err(MediaError::FfmpegNotFound)
        ));
    }

    #[tokio::test]
    #[ignore = "requires ffmpeg"]
    async fn test_transcode_rejects_garbage_input() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.mp4");
        std::fs::write(&input, b"not a video").unwrap();

        let err = FfmpegTranscoder::new()
            .transcode(&input, &dir.path().join("out.mp3"))
            .await
            .unwrap_err();
        match err {
            MediaError::FfmpegFailed { message, .. } => assert!(message.len() <= MAX_ERROR_LEN + 3),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
