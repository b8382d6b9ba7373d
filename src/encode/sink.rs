use std::path::PathBuf;

use bytes::Bytes;
use futures::stream::BoxStream;

use crate::foundation::core::{FrameEncoding, StreamFormat};
use crate::foundation::error::ExportResult;

/// Incremental byte source for one uploaded frame.
pub type FrameStream<'a> = BoxStream<'a, std::io::Result<Bytes>>;

/// How uploaded frames are handed to the sink. Chosen once when the session starts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FrameMode {
    /// Pass the upload's byte stream straight through to [`StreamSink::write_frame`].
    #[default]
    Streaming,
    /// Collect the whole frame in memory, then call [`StreamSink::write_buffer_frame`].
    Buffered,
}

impl FrameMode {
    /// Map the `stream.buffer` config flag onto a mode.
    pub fn from_buffer_flag(buffer: bool) -> Self {
        if buffer { Self::Buffered } else { Self::Streaming }
    }
}

/// Parameters a sink is opened with.
#[derive(Clone, Debug)]
pub struct SinkOpts {
    /// Output container.
    pub format: StreamFormat,
    /// Raw image encoding of incoming frames.
    pub encoding: FrameEncoding,
    /// Frames per second of the output.
    pub fps: f64,
    /// Full path of the encoded output file.
    pub out_path: PathBuf,
    /// Frame hand-off mode.
    pub mode: FrameMode,
    /// Encoder binary.
    pub ffmpeg: PathBuf,
    /// Optional MP4 constant rate factor.
    pub crf: Option<u8>,
    /// Verbose encoder logging.
    pub debug: bool,
}

/// One open encoding pipe.
///
/// Ordering contract: frames are written in the order the session receives them; `end` or
/// `close` is called exactly once, after which the sink is dropped.
#[async_trait::async_trait]
pub trait StreamSink: Send {
    /// Returns `false` once the sink can no longer accept frames.
    fn is_writable(&self) -> bool;

    /// Encoding the sink was opened with.
    fn encoding(&self) -> FrameEncoding;

    /// Write one frame from an incremental byte source. `name` is the client's declared filename.
    async fn write_frame(&mut self, frame: FrameStream<'_>, name: &str) -> ExportResult<()>;

    /// Write one fully buffered frame.
    async fn write_buffer_frame(&mut self, frame: Bytes) -> ExportResult<()>;

    /// Flush and finalize the output file.
    async fn end(&mut self) -> ExportResult<()>;

    /// Abort immediately, discarding any partial output.
    fn close(&mut self);
}

/// Opens sinks for new sessions.
#[async_trait::async_trait]
pub trait SinkFactory: Send + Sync {
    /// Open a sink; resolves once the sink is ready to accept frames.
    async fn open(&self, opts: SinkOpts) -> ExportResult<Box<dyn StreamSink>>;
}
