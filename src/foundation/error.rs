/// Convenience result type used across the export server.
pub type ExportResult<T> = Result<T, ExportError>;

/// Top-level error taxonomy used by the session and HTTP layers.
#[derive(thiserror::Error, Debug)]
pub enum ExportError {
    /// A feature needed by the request is disabled by the server configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Invalid request data (unknown encoding, bad frame rate, bad filename).
    #[error("validation error: {0}")]
    Validation(String),

    /// Directory creation, disk write, or sink open/write/finalize failure.
    #[error("resource error: {0}")]
    Resource(String),

    /// The open sink refuses further frames.
    #[error("stream no longer writable")]
    NotWritable,

    /// A frame's declared mime type differs from the sink's input encoding.
    #[error("frame encoding mismatch: stream expects {expected}, got {actual}")]
    EncodingMismatch {
        /// Encoding the sink was opened with.
        expected: String,
        /// Mime type declared by the upload.
        actual: String,
    },

    /// The session a frame belonged to was ended or replaced before the frame was written.
    #[error("export stream stopped early")]
    StoppedEarly,

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ExportError {
    /// Build a [`ExportError::Config`] value.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Build a [`ExportError::Validation`] value.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Build a [`ExportError::Resource`] value.
    pub fn resource(msg: impl Into<String>) -> Self {
        Self::Resource(msg.into())
    }

    /// Default HTTP status for this error.
    ///
    /// Request-shape problems are client errors; everything that happened while touching the
    /// disk or the encoder is a server error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Config(_) | Self::Validation(_) => 400,
            Self::Resource(_)
            | Self::NotWritable
            | Self::EncodingMismatch { .. }
            | Self::StoppedEarly
            | Self::Other(_) => 500,
        }
    }

    /// Returns `true` when the failure leaves an open sink in an unusable state.
    pub fn is_session_fatal(&self) -> bool {
        matches!(self, Self::Resource(_) | Self::Other(_))
    }
}

impl From<std::io::Error> for ExportError {
    fn from(err: std::io::Error) -> Self {
        Self::Resource(err.to_string())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
