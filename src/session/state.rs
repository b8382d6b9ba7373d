use std::sync::Arc;

use tokio::sync::watch;

use crate::encode::sink::StreamSink;

/// The sink of the current session and what it was opened for.
pub(crate) struct ActiveSink {
    pub(crate) sink: Box<dyn StreamSink>,
    /// Output filename reported to the client, e.g. `anim.mp4`.
    pub(crate) filename: String,
    pub(crate) generation: u64,
}

/// What the rest of the server can see of the open sink without taking the session lock.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct OpenSink {
    pub(crate) generation: u64,
    pub(crate) filename: String,
    /// An `end`, `reset` or superseding `start` is waiting to take this sink.
    pub(crate) closing: bool,
}

impl OpenSink {
    /// Frames of `generation` may still be written.
    pub(crate) fn accepts(view: &Option<OpenSink>, generation: u64) -> bool {
        view.as_ref()
            .is_some_and(|open| open.generation == generation && !open.closing)
    }
}

/// Published view of the session, updated on every install and take.
pub(crate) type SessionView = Arc<watch::Sender<Option<OpenSink>>>;

/// Mutable session record. Sink and filename live in one `Option` so neither can exist
/// without the other.
pub(crate) struct SessionState {
    active: Option<ActiveSink>,
    last_generation: u64,
    view: SessionView,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            active: None,
            last_generation: 0,
            view: Arc::new(watch::channel(None).0),
        }
    }
}

impl SessionState {
    /// Install a freshly opened sink. The caller must have emptied the slot first.
    pub(crate) fn install(&mut self, sink: Box<dyn StreamSink>, filename: String) -> u64 {
        debug_assert!(self.active.is_none(), "installing over an open sink");
        self.last_generation += 1;
        let generation = self.last_generation;
        self.view.send_replace(Some(OpenSink {
            generation,
            filename: filename.clone(),
            closing: false,
        }));
        self.active = Some(ActiveSink {
            sink,
            filename,
            generation,
        });
        generation
    }

    /// Remove the current sink without finalizing it.
    pub(crate) fn take(&mut self) -> Option<ActiveSink> {
        self.view.send_replace(None);
        self.active.take()
    }

    /// Shared handle to the published view.
    pub(crate) fn view(&self) -> SessionView {
        Arc::clone(&self.view)
    }

    /// Abort and discard the current sink, if any.
    pub(crate) fn reset(&mut self) -> bool {
        match self.take() {
            Some(mut active) => {
                active.sink.close();
                tracing::warn!(
                    generation = active.generation,
                    filename = %active.filename,
                    "export stream reset"
                );
                true
            }
            None => false,
        }
    }

    /// Abort the current sink only if it still belongs to `generation`.
    pub(crate) fn reset_if(&mut self, generation: u64) -> bool {
        if self.generation() == Some(generation) {
            self.reset()
        } else {
            false
        }
    }

    /// Generation of the open sink, if one is open.
    pub(crate) fn generation(&self) -> Option<u64> {
        self.active.as_ref().map(|a| a.generation)
    }

    /// The open sink, if it still belongs to `generation`.
    pub(crate) fn active_mut(&mut self, generation: u64) -> Option<&mut ActiveSink> {
        self.active
            .as_mut()
            .filter(|active| active.generation == generation)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/session/state.rs"]
mod tests;
