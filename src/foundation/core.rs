use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::foundation::error::{ExportError, ExportResult};

/// Raw image encoding of the frames fed into a stream.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum FrameEncoding {
    /// `image/png`
    #[default]
    #[serde(rename = "image/png")]
    Png,
    /// `image/jpeg`
    #[serde(rename = "image/jpeg")]
    Jpeg,
}

impl FrameEncoding {
    /// Mime type string as sent by the browser.
    pub fn mime(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
        }
    }

    /// Returns `true` if a declared mime type names this encoding.
    pub fn matches_mime(self, mime: &str) -> bool {
        mime.trim().eq_ignore_ascii_case(self.mime())
    }
}

impl fmt::Display for FrameEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mime())
    }
}

impl FromStr for FrameEncoding {
    type Err = ExportError;

    fn from_str(s: &str) -> ExportResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "image/png" => Ok(Self::Png),
            "image/jpeg" => Ok(Self::Jpeg),
            other => Err(ExportError::validation(format!(
                "unsupported stream encoding '{other}', expected \"image/png\" or \"image/jpeg\""
            ))),
        }
    }
}

/// Container produced by a stream session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamFormat {
    /// Animated GIF.
    Gif,
    /// H.264 MP4.
    Mp4,
}

impl StreamFormat {
    /// File extension, without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Gif => "gif",
            Self::Mp4 => "mp4",
        }
    }

    /// Frame rates above this produce visibly choppy output for this format.
    pub fn advisory_max_fps(self) -> Option<f64> {
        match self {
            Self::Gif => Some(50.0),
            Self::Mp4 => None,
        }
    }
}

impl fmt::Display for StreamFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for StreamFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> ExportResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gif" => Ok(Self::Gif),
            "mp4" => Ok(Self::Mp4),
            other => Err(ExportError::config(format!(
                "stream format must be either gif or mp4, got '{other}'"
            ))),
        }
    }
}

/// Strip any directory components from a client-supplied filename.
///
/// Rejects names with no usable final component (`""`, `".."`, `"/"`).
pub fn base_name(name: &str) -> ExportResult<String> {
    // Browsers on Windows may send backslash-separated names.
    let last = name.rsplit(['/', '\\']).next().unwrap_or(name);
    match Path::new(last).file_name().and_then(|s| s.to_str()) {
        Some(base) if !base.is_empty() => Ok(base.to_owned()),
        _ => Err(ExportError::validation(format!(
            "invalid filename '{name}'"
        ))),
    }
}

/// Final component of the output directory, as reported back to the client.
pub fn dir_name(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
