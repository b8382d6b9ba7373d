#![allow(dead_code)]

use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use futures::StreamExt as _;
use sketch_export::{
    ExportSession, FrameStream, RecordingSinkFactory, ServerConfig, StreamConfig, StreamFormat,
    UploadedFrame,
};
use tempfile::TempDir;

pub struct Harness {
    pub dir: TempDir,
    pub output: PathBuf,
    pub sinks: RecordingSinkFactory,
    pub session: Arc<ExportSession>,
}

/// Session writing into `<tempdir>/out`, streaming in `format` when given.
pub fn harness(stream: Option<StreamFormat>, buffer: bool) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("out");
    let config = ServerConfig {
        output: Some(output.clone()),
        stream: stream.map(|format| StreamConfig {
            format,
            buffer,
            ..Default::default()
        }),
        ..Default::default()
    };
    harness_with(dir, output, config)
}

pub fn harness_with(dir: TempDir, output: PathBuf, config: ServerConfig) -> Harness {
    let sinks = RecordingSinkFactory::new();
    let session = Arc::new(ExportSession::new(config, Arc::new(sinks.clone())));
    Harness {
        dir,
        output,
        sinks,
        session,
    }
}

pub fn body(bytes: &'static [u8]) -> FrameStream<'static> {
    // Two chunks, so streaming writers see more than one piece.
    let mid = bytes.len() / 2;
    let chunks: Vec<std::io::Result<Bytes>> = vec![
        Ok(Bytes::from_static(&bytes[..mid])),
        Ok(Bytes::from_static(&bytes[mid..])),
    ];
    futures::stream::iter(chunks).boxed()
}

pub fn frame(name: &str, mime: Option<&str>, bytes: &'static [u8]) -> UploadedFrame<'static> {
    UploadedFrame {
        field: "file".into(),
        filename: name.into(),
        mime: mime.map(str::to_owned),
        body: body(bytes),
    }
}

pub fn png(name: &str, bytes: &'static [u8]) -> UploadedFrame<'static> {
    frame(name, Some("image/png"), bytes)
}

/// Log output captured by [`capture_logs`].
#[derive(Clone, Default)]
pub struct SharedLog(Arc<Mutex<Vec<u8>>>);

impl SharedLog {
    pub fn text(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl Write for SharedLog {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Route this thread's tracing output at `level` and above into a buffer until the guard drops.
pub fn capture_logs(
    level: tracing::Level,
) -> (SharedLog, tracing::subscriber::DefaultGuard) {
    let log = SharedLog::default();
    let writer = log.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_max_level(level)
        .with_ansi(false)
        .finish();
    (log, tracing::subscriber::set_default(subscriber))
}
