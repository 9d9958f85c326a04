//! Media kind model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const AUDIO_MIME_TYPES: &[&str] = &[
    "audio/wav",
    "audio/mpeg",
    "audio/webm",
    "audio/ogg",
    "audio/mp4",
];
const VIDEO_MIME_TYPES: &[&str] = &["video/mp4", "video/webm"];

/// Kind of media stored in a recording
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    /// Wire representation used by the upload form and the catalog table
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Audio => "audio",
            Self::Video => "video",
        }
    }

    /// MIME types accepted for this kind
    pub const fn allowed_mime_types(self) -> &'static [&'static str] {
        match self {
            Self::Audio => AUDIO_MIME_TYPES,
            Self::Video => VIDEO_MIME_TYPES,
        }
    }

    /// Check a content type against this kind, ignoring parameters like `;codecs=opus`.
    pub fn accepts_mime(self, content_type: &str) -> bool {
        let essence = mime_essence(content_type);
        self.allowed_mime_types()
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(&essence))
    }

    /// Content type of a file with `extension` holding this kind of media.
    ///
    /// `webm` and `mp4` containers carry either kind, so the answer depends
    /// on `self`.
    pub fn mime_type_for_extension(self, extension: &str) -> Option<&'static str> {
        let extension = extension.trim_start_matches('.').to_ascii_lowercase();
        let mime_type = match (self, extension.as_str()) {
            (Self::Audio, "wav") => "audio/wav",
            (Self::Audio, "mp3") => "audio/mpeg",
            (Self::Audio, "webm" | "weba") => "audio/webm",
            (Self::Audio, "ogg" | "oga" | "opus") => "audio/ogg",
            (Self::Audio, "m4a" | "mp4") => "audio/mp4",
            (Self::Video, "mp4" | "m4v") => "video/mp4",
            (Self::Video, "webm") => "video/webm",
            _ => return None,
        };
        Some(mime_type)
    }

    /// The kind a file extension settles on its own.
    ///
    /// `None` for extensions shared by both kinds and for unknown ones.
    pub fn from_extension(extension: &str) -> Option<Self> {
        match (
            Self::Audio.mime_type_for_extension(extension),
            Self::Video.mime_type_for_extension(extension),
        ) {
            (Some(_), None) => Some(Self::Audio),
            (None, Some(_)) => Some(Self::Video),
            _ => None,
        }
    }

    /// File extension for a content type of this kind.
    ///
    /// Falls back to `webm` when the type is unknown.
    pub fn extension_for(self, content_type: &str) -> &'static str {
        match mime_essence(content_type).as_str() {
            "audio/wav" => "wav",
            "audio/mpeg" => "mp3",
            "audio/ogg" => "ogg",
            "audio/mp4" => "m4a",
            "video/mp4" => "mp4",
            _ => "webm",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "audio" => Ok(Self::Audio),
            "video" => Ok(Self::Video),
            other => Err(format!("Unsupported media kind '{other}'")),
        }
    }
}

fn mime_essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_mime_ignores_parameters() {
        assert!(MediaKind::Audio.accepts_mime("audio/webm;codecs=opus"));
        assert!(MediaKind::Video.accepts_mime("Video/MP4"));
        assert!(!MediaKind::Audio.accepts_mime("video/webm"));
        assert!(!MediaKind::Video.accepts_mime("application/octet-stream"));
    }

    #[test]
    fn parses_wire_names() {
        assert_eq!("audio".parse::<MediaKind>(), Ok(MediaKind::Audio));
        assert_eq!(" VIDEO ".parse::<MediaKind>(), Ok(MediaKind::Video));
        assert!("image".parse::<MediaKind>().is_err());
    }

    #[test]
    fn shared_containers_take_their_type_from_the_kind() {
        assert_eq!(MediaKind::Audio.mime_type_for_extension("webm"), Some("audio/webm"));
        assert_eq!(MediaKind::Video.mime_type_for_extension("WEBM"), Some("video/webm"));
        assert_eq!(MediaKind::Audio.mime_type_for_extension(".m4a"), Some("audio/mp4"));
        assert_eq!(MediaKind::Audio.mime_type_for_extension("mp4"), Some("audio/mp4"));
        assert_eq!(MediaKind::Video.mime_type_for_extension("m4a"), None);
        assert_eq!(MediaKind::Video.mime_type_for_extension("wav"), None);
    }

    #[test]
    fn only_unambiguous_extensions_settle_the_kind() {
        assert_eq!(MediaKind::from_extension("m4a"), Some(MediaKind::Audio));
        assert_eq!(MediaKind::from_extension("wav"), Some(MediaKind::Audio));
        assert_eq!(MediaKind::from_extension("m4v"), Some(MediaKind::Video));
        assert_eq!(MediaKind::from_extension("webm"), None);
        assert_eq!(MediaKind::from_extension("mp4"), None);
        assert_eq!(MediaKind::from_extension("png"), None);
    }

    #[test]
    fn extension_follows_content_type() {
        assert_eq!(MediaKind::Audio.extension_for("audio/wav"), "wav");
        assert_eq!(MediaKind::Audio.extension_for("audio/webm;codecs=opus"), "webm");
        assert_eq!(MediaKind::Video.extension_for("video/mp4"), "mp4");
    }
}
