use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use futures::TryStreamExt as _;

use crate::encode::sink::{FrameStream, SinkFactory, SinkOpts, StreamSink};
use crate::foundation::core::FrameEncoding;
use crate::foundation::error::{ExportError, ExportResult};

/// One observable sink operation, in the order it happened.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SinkEvent {
    /// A sink was opened.
    Opened {
        /// Sink id, assigned in open order starting at 1.
        id: u64,
        /// Output path the sink was opened for.
        out_path: PathBuf,
    },
    /// A frame was absorbed.
    Frame {
        /// Sink id.
        id: u64,
        /// Declared filename for streamed frames, `None` for buffered frames.
        name: Option<String>,
        /// Frame size in bytes.
        len: usize,
    },
    /// The sink was finalized successfully.
    Ended {
        /// Sink id.
        id: u64,
    },
    /// The sink was aborted.
    Closed {
        /// Sink id.
        id: u64,
    },
}

/// Failures to inject into recording sinks. Read on every call, so toggling applies to sinks
/// that are already open.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SinkFaults {
    /// `open` fails.
    pub fail_open: bool,
    /// Every frame write fails.
    pub fail_write: bool,
    /// `end` fails.
    pub fail_end: bool,
    /// `is_writable` reports `false`.
    pub unwritable: bool,
}

#[derive(Debug, Default)]
struct Journal {
    events: Vec<SinkEvent>,
    frames: Vec<(u64, Bytes)>,
    next_id: u64,
    open: BTreeSet<u64>,
    max_open: usize,
    faults: SinkFaults,
    keep_bytes: bool,
}

/// [`SinkFactory`] whose sinks keep everything in memory and record what happened to them.
#[derive(Clone, Debug)]
pub struct RecordingSinkFactory {
    journal: Arc<Mutex<Journal>>,
}

impl Default for RecordingSinkFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingSinkFactory {
    /// Factory that retains frame bytes.
    pub fn new() -> Self {
        Self {
            journal: Arc::new(Mutex::new(Journal {
                keep_bytes: true,
                ..Default::default()
            })),
        }
    }

    /// Factory that only records frame sizes.
    pub fn discarding() -> Self {
        Self {
            journal: Arc::new(Mutex::new(Journal::default())),
        }
    }

    /// Replace the injected faults.
    pub fn set_faults(&self, faults: SinkFaults) {
        self.journal().faults = faults;
    }

    /// Every event recorded so far.
    pub fn events(&self) -> Vec<SinkEvent> {
        self.journal().events.clone()
    }

    /// Number of sinks currently open (opened and neither ended nor closed).
    pub fn open_count(&self) -> usize {
        self.journal().open.len()
    }

    /// Largest number of sinks that were ever open at the same time.
    pub fn max_open(&self) -> usize {
        self.journal().max_open
    }

    /// Frame bytes absorbed by sink `id`, in write order.
    pub fn frames(&self, id: u64) -> Vec<Bytes> {
        self.journal()
            .frames
            .iter()
            .filter(|(owner, _)| *owner == id)
            .map(|(_, bytes)| bytes.clone())
            .collect()
    }

    /// Count of recorded events matching `pred`.
    pub fn count(&self, pred: impl Fn(&SinkEvent) -> bool) -> usize {
        self.journal().events.iter().filter(|e| pred(e)).count()
    }

    fn journal(&self) -> MutexGuard<'_, Journal> {
        lock(&self.journal)
    }
}

fn lock(journal: &Mutex<Journal>) -> MutexGuard<'_, Journal> {
    journal.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait::async_trait]
impl SinkFactory for RecordingSinkFactory {
    async fn open(&self, opts: SinkOpts) -> ExportResult<Box<dyn StreamSink>> {
        let mut j = self.journal();
        if j.faults.fail_open {
            return Err(ExportError::resource("recording sink: injected open failure"));
        }
        j.next_id += 1;
        let id = j.next_id;
        j.open.insert(id);
        j.max_open = j.max_open.max(j.open.len());
        j.events.push(SinkEvent::Opened {
            id,
            out_path: opts.out_path,
        });
        Ok(Box::new(RecordingSink {
            id,
            encoding: opts.encoding,
            journal: Arc::clone(&self.journal),
            finished: false,
        }))
    }
}

/// Sink produced by [`RecordingSinkFactory`].
#[derive(Debug)]
pub struct RecordingSink {
    id: u64,
    encoding: FrameEncoding,
    journal: Arc<Mutex<Journal>>,
    finished: bool,
}

impl RecordingSink {
    fn absorb(&self, name: Option<String>, bytes: Bytes) -> ExportResult<()> {
        let mut j = lock(&self.journal);
        if self.finished {
            return Err(ExportError::resource("recording sink: write after finish"));
        }
        if j.faults.fail_write {
            return Err(ExportError::resource("recording sink: injected write failure"));
        }
        j.events.push(SinkEvent::Frame {
            id: self.id,
            name,
            len: bytes.len(),
        });
        if j.keep_bytes {
            j.frames.push((self.id, bytes));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl StreamSink for RecordingSink {
    fn is_writable(&self) -> bool {
        !self.finished && !lock(&self.journal).faults.unwritable
    }

    fn encoding(&self) -> FrameEncoding {
        self.encoding
    }

    async fn write_frame(&mut self, frame: FrameStream<'_>, name: &str) -> ExportResult<()> {
        let chunks: Vec<Bytes> = frame.try_collect().await?;
        self.absorb(Some(name.to_owned()), chunks.concat().into())
    }

    async fn write_buffer_frame(&mut self, frame: Bytes) -> ExportResult<()> {
        self.absorb(None, frame)
    }

    async fn end(&mut self) -> ExportResult<()> {
        let mut j = lock(&self.journal);
        if self.finished {
            return Err(ExportError::resource("recording sink: already finished"));
        }
        if j.faults.fail_end {
            return Err(ExportError::resource("recording sink: injected finalize failure"));
        }
        self.finished = true;
        j.open.remove(&self.id);
        j.events.push(SinkEvent::Ended { id: self.id });
        Ok(())
    }

    fn close(&mut self) {
        let mut j = lock(&self.journal);
        if j.open.remove(&self.id) {
            j.events.push(SinkEvent::Closed { id: self.id });
        }
        self.finished = true;
    }
}
