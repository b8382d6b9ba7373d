//! The export session: at most one open sink, started and ended by the client, fed by frame
//! uploads.
//!
//! All transitions go through one async mutex. `start` finalizes the previous sink before the
//! next one is opened, and a frame holds the lock while it is handed to the sink, so a frame can
//! never land in a sink that is being torn down. Each sink gets a generation number; an upload
//! remembers the generation it arrived under and is rejected with
//! [`ExportError::StoppedEarly`](crate::ExportError::StoppedEarly) if that session is gone by the
//! time the frame is written.
//!
//! The open sink is also published through a watch channel. Ticket reads and status never wait
//! for the lock, and `end`/`start`/`reset` mark the sink as closing before they queue for it, which
//! cuts off a streamed frame whose body is still arriving.

mod ingest;
mod lifecycle;
mod state;

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::config::ServerConfig;
use crate::encode::sink::SinkFactory;
use state::{OpenSink, SessionState, SessionView};

pub use ingest::UploadedFrame;

/// Frame rate used when `stream-start` does not name one.
pub const DEFAULT_FPS: f64 = 24.0;

/// Body of a `stream-start` request.
#[derive(Clone, Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct StartRequest {
    /// Output name without extension.
    pub filename: String,
    /// `image/png` (default) or `image/jpeg`.
    pub encoding: Option<String>,
    /// Output frame rate.
    pub fps: Option<f64>,
}

/// Body of a `stream-end` request.
#[derive(Clone, Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct EndRequest {
    /// Name the client believes it is exporting; echoed when no session is open.
    pub filename: Option<String>,
}

/// Successful outcome of a session operation.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportReply {
    /// Whether the operation went through (or left) a streaming session.
    pub streaming: bool,
    /// File the client should report as written.
    pub filename: String,
    /// Last component of the output directory.
    pub output_directory_name: Option<String>,
    /// Marks replies produced by this server.
    pub client: bool,
}

/// Point-in-time view of the session, for health reporting.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    /// Streaming export is configured.
    pub streaming: bool,
    /// A sink is currently open.
    pub open: bool,
    /// Output filename of the open sink.
    pub filename: Option<String>,
}

/// Owns the session state and the sink factory for the lifetime of the server.
pub struct ExportSession {
    config: ServerConfig,
    factory: Arc<dyn SinkFactory>,
    state: Mutex<SessionState>,
    view: SessionView,
}

impl ExportSession {
    /// Create a session with no sink open.
    pub fn new(config: ServerConfig, factory: Arc<dyn SinkFactory>) -> Self {
        let state = SessionState::default();
        Self {
            config,
            factory,
            view: state.view(),
            state: Mutex::new(state),
        }
    }

    /// Configuration the session was created with.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Abort the open sink, if any, without finalizing it.
    pub async fn reset(&self) -> bool {
        self.mark_closing();
        self.state.lock().await.reset()
    }

    /// Snapshot of the current state. Does not wait for in-flight work.
    pub fn status(&self) -> SessionStatus {
        let view = self.view.borrow();
        SessionStatus {
            streaming: self.config.is_streaming(),
            open: view.is_some(),
            filename: view.as_ref().map(|open| open.filename.clone()),
        }
    }

    /// Generation of the sink open right now, without waiting for in-flight work.
    fn ticket(&self) -> Option<u64> {
        self.view.borrow().as_ref().map(|open| open.generation)
    }

    /// Whether frames of `generation` may still be written.
    fn accepts(&self, generation: u64) -> bool {
        OpenSink::accepts(&self.view.borrow(), generation)
    }

    /// Tell in-flight frames of the open sink to stop before queueing for the lock.
    fn mark_closing(&self) {
        self.view.send_if_modified(|view| match view {
            Some(open) if !open.closing => {
                open.closing = true;
                true
            }
            _ => false,
        });
    }

    fn reply(&self, streaming: bool, filename: String) -> ExportReply {
        ExportReply {
            streaming,
            filename,
            output_directory_name: self.config.output_dir_name(),
            client: true,
        }
    }
}
