//! Server configuration, fixed for the lifetime of the process.

use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::foundation::core::{StreamFormat, dir_name};
use crate::foundation::error::{ExportError, ExportResult};

/// Default request body limit for frame uploads (64 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

/// Top-level server configuration.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Directory frames and encoded outputs are written to. `None` disables all writes.
    pub output: Option<PathBuf>,
    /// Streaming export settings. `None` writes every frame as a standalone file.
    pub stream: Option<StreamConfig>,
    /// Verbose logging, including encoder output.
    pub debug: bool,
    /// Maximum accepted request body size.
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            output: None,
            stream: None,
            debug: false,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

/// Settings for a streaming export; everything past `format`/`buffer` is handed to the sink.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StreamConfig {
    /// Output container.
    pub format: StreamFormat,
    /// Collect each uploaded frame fully in memory before handing it to the sink.
    pub buffer: bool,
    /// Encoder binary.
    pub ffmpeg: PathBuf,
    /// Constant rate factor for MP4 output (lower is better quality).
    pub crf: Option<u8>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            format: StreamFormat::Mp4,
            buffer: false,
            ffmpeg: PathBuf::from("ffmpeg"),
            crf: None,
        }
    }
}

impl ServerConfig {
    /// Load a JSON config file.
    pub fn from_path(path: impl AsRef<Path>) -> ExportResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read config '{}'", path.display()))?;
        Self::from_json_str(&text)
    }

    /// Parse a JSON config document.
    pub fn from_json_str(text: &str) -> ExportResult<Self> {
        let cfg: Self = serde_json::from_str(text)
            .map_err(|e| ExportError::config(format!("invalid config JSON: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Check startup invariants.
    pub fn validate(&self) -> ExportResult<()> {
        if self.max_upload_bytes == 0 {
            return Err(ExportError::config("max_upload_bytes must be non-zero"));
        }
        if let Some(stream) = &self.stream {
            if stream.ffmpeg.as_os_str().is_empty() {
                return Err(ExportError::config("stream.ffmpeg must not be empty"));
            }
            if let Some(crf) = stream.crf
                && crf > 51
            {
                return Err(ExportError::config(format!(
                    "stream.crf must be in 0..=51, got {crf}"
                )));
            }
        }
        Ok(())
    }

    /// Returns `true` when streaming export is configured.
    pub fn is_streaming(&self) -> bool {
        self.stream.is_some()
    }

    /// Final path component of the output directory, if writes are enabled.
    pub fn output_dir_name(&self) -> Option<String> {
        self.output.as_deref().map(dir_name)
    }
}

#[cfg(test)]
#[path = "../tests/unit/config.rs"]
mod tests;
