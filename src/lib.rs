//! Export coordinator for browser-based sketches.
//!
//! A browser client renders frames and posts them here. Frames are either written to the
//! output directory as standalone files or, while a stream session is open, piped into a
//! single encoder process that produces one GIF or MP4.
//!
//! # Pieces
//!
//! - [`ExportSession`]: owns the at-most-one open [`StreamSink`] and implements
//!   `stream-start`, `stream-end` and frame ingestion.
//! - [`StreamSink`] / [`SinkFactory`]: the encoder seam. [`FfmpegSinkFactory`] spawns the system
//!   `ffmpeg`; [`RecordingSinkFactory`] keeps frames in memory for tests and dry runs.
//! - [`api::router`]: the axum HTTP surface the browser talks to.
#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod foundation;

/// HTTP endpoints.
pub mod api;
/// Server configuration.
pub mod config;
/// Encoding sinks.
pub mod encode;
/// Export session lifecycle and frame routing.
pub mod session;

pub use crate::config::{DEFAULT_MAX_UPLOAD_BYTES, ServerConfig, StreamConfig};
pub use crate::encode::ffmpeg::{FfmpegSink, FfmpegSinkFactory, encoder_args};
pub use crate::encode::memory::{RecordingSink, RecordingSinkFactory, SinkEvent, SinkFaults};
pub use crate::encode::sink::{FrameMode, FrameStream, SinkFactory, SinkOpts, StreamSink};
pub use crate::foundation::core::{FrameEncoding, StreamFormat, base_name, dir_name};
pub use crate::foundation::error::{ExportError, ExportResult};
pub use crate::session::{
    DEFAULT_FPS, EndRequest, ExportReply, ExportSession, SessionStatus, StartRequest,
    UploadedFrame,
};
