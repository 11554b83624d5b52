//! Resolution result types.

use serde::{Deserialize, Serialize};

/// What the direct URL points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    /// Extension used for the downloaded source file.
    pub fn file_extension(&self) -> &'static str {
        match self {
            MediaKind::Audio => "m4a",
            MediaKind::Video => "mp4",
        }
    }
}

/// A resolved direct media link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMedia {
    /// Platform name as reported by the service
    pub platform: String,
    pub media_url: String,
    pub kind: MediaKind,
    pub title: Option<String>,
}

/// Request body for `POST /api/parse`.
#[derive(Debug, Serialize)]
pub(crate) struct ParseRequest<'a> {
    pub text: &'a str,
}

/// Response body from `POST /api/parse`.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ParseResponse {
    #[serde(default)]
    pub retcode: i64,
    #[serde(default)]
    pub retdesc: String,
    #[serde(default)]
    pub succ: bool,
    #[serde(default)]
    pub data: ParseData,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ParseData {
    #[serde(default)]
    pub platform: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub video_url: String,
    #[serde(default)]
    pub audio_url: String,
}

impl ParseData {
    /// Prefer audio-only streams; they are smaller and skip demuxing.
    pub fn into_resolved(self) -> Option<ResolvedMedia> {
        let audio = self.audio_url.trim();
        let video = self.video_url.trim();
        let (media_url, kind) = if !audio.is_empty() {
            (audio.to_string(), MediaKind::Audio)
        } else if !video.is_empty() {
            (video.to_string(), MediaKind::Video)
        } else {
            return None;
        };

        Some(ResolvedMedia {
            platform: self.platform,
            media_url,
            kind,
            title: Some(self.title).filter(|t| !t.is_empty()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefers_audio() {
        let data = ParseData {
            platform: "douyin".into(),
            video_url: "https://cdn/v.mp4".into(),
            audio_url: "https://cdn/a.m4a".into(),
            ..Default::default()
        };
        let resolved = data.into_resolved().unwrap();
        assert_eq!(resolved.kind, MediaKind::Audio);
        assert_eq!(resolved.media_url, "https://cdn/a.m4a");
        assert_eq!(resolved.kind.file_extension(), "m4a");
    }

    #[test]
    fn test_falls_back_to_video() {
        let data = ParseData {
            video_url: "https://cdn/v.mp4".into(),
            audio_url: "  ".into(),
            ..Default::default()
        };
        let resolved = data.into_resolved().unwrap();
        assert_eq!(resolved.kind, MediaKind::Video);
        assert_eq!(resolved.kind.file_extension(), "mp4");
        assert!(resolved.title.is_none());
    }

    #[test]
    fn test_no_media() {
        assert!(ParseData::default().into_resolved().is_none());
    }
}
