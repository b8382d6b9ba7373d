use std::path::Path;

use anyhow::Context as _;
use bytes::{Bytes, BytesMut};
use futures::StreamExt as _;
use tokio::io::AsyncWriteExt as _;
use tokio::sync::watch;

use crate::encode::sink::{FrameMode, FrameStream};
use crate::foundation::core::base_name;
use crate::foundation::error::{ExportError, ExportResult};
use crate::session::state::{OpenSink, SessionState};
use crate::session::{ExportReply, ExportSession};

/// One uploaded frame, as yielded by the upload decoder.
pub struct UploadedFrame<'a> {
    /// Form field name.
    pub field: String,
    /// Client-declared filename.
    pub filename: String,
    /// Client-declared mime type.
    pub mime: Option<String>,
    /// Frame bytes.
    pub body: FrameStream<'a>,
}

impl std::fmt::Debug for UploadedFrame<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadedFrame")
            .field("field", &self.field)
            .field("filename", &self.filename)
            .field("mime", &self.mime)
            .finish_non_exhaustive()
    }
}

impl ExportSession {
    /// Absorb one uploaded frame into the open sink, or write it to the output directory when
    /// no sink is open.
    ///
    /// I/O failures while a sink is open abort that sink: a half-written container cannot be
    /// resumed. Buffered frames are read in full before the session lock is taken; streamed
    /// frames are cut off with [`ExportError::StoppedEarly`] once their sink starts closing.
    #[tracing::instrument(skip(self, frame), fields(field = %frame.field, name = %frame.filename))]
    pub async fn ingest(&self, frame: UploadedFrame<'_>) -> ExportResult<ExportReply> {
        let Some(output) = self.config.output.as_deref() else {
            return Err(ExportError::config(
                "cannot save frame, output is disabled",
            ));
        };
        // The session this frame belongs to is fixed on arrival.
        let ticket = self.ticket();
        let declared = base_name(&frame.filename)?;

        if let Err(e) = tokio::fs::create_dir_all(output)
            .await
            .with_context(|| format!("failed to create output directory '{}'", output.display()))
        {
            if let Some(generation) = ticket {
                self.state.lock().await.reset_if(generation);
            }
            return Err(e.into());
        }

        let Some(generation) = ticket else {
            let path = output.join(&declared);
            write_file(&path, frame.body).await?;
            tracing::debug!(path = %path.display(), "frame written");
            return Ok(self.reply(false, declared));
        };

        let buffered = self.config.stream.as_ref().is_some_and(|s| s.buffer);
        let payload = match FrameMode::from_buffer_flag(buffered) {
            FrameMode::Buffered => match buffer(frame.body).await {
                Ok(bytes) => Payload::Whole(bytes),
                Err(e) => {
                    self.state.lock().await.reset_if(generation);
                    return Err(e);
                }
            },
            FrameMode::Streaming => Payload::Streamed(until_closing(
                frame.body,
                self.view.subscribe(),
                generation,
            )),
        };

        let mut state = self.state.lock().await;
        let result = match absorb(&mut state, generation, frame.mime.as_deref(), payload, &declared)
            .await
        {
            // The body was cut off because the sink is being ended or replaced.
            Err(e) if e.is_session_fatal() && !self.accepts(generation) => {
                tracing::debug!(generation, "frame interrupted: {e}");
                Err(ExportError::StoppedEarly)
            }
            other => other,
        };
        if let Err(e) = &result
            && e.is_session_fatal()
        {
            state.reset_if(generation);
        }
        Ok(self.reply(true, result?))
    }
}

enum Payload<'a> {
    Whole(Bytes),
    Streamed(FrameStream<'a>),
}

async fn absorb(
    state: &mut SessionState,
    generation: u64,
    mime: Option<&str>,
    payload: Payload<'_>,
    declared: &str,
) -> ExportResult<String> {
    let active = state
        .active_mut(generation)
        .ok_or(ExportError::StoppedEarly)?;

    if !active.sink.is_writable() {
        return Err(ExportError::NotWritable);
    }
    let expected = active.sink.encoding();
    if let Some(mime) = mime.filter(|m| !m.is_empty())
        && !expected.matches_mime(mime)
    {
        return Err(ExportError::EncodingMismatch {
            expected: expected.mime().to_owned(),
            actual: mime.to_owned(),
        });
    }

    match payload {
        Payload::Whole(bytes) => active.sink.write_buffer_frame(bytes).await?,
        Payload::Streamed(body) => active.sink.write_frame(body, declared).await?,
    }
    tracing::trace!(generation, declared, "frame absorbed");
    Ok(active.filename.clone())
}

/// Pass `body` through until the sink of `generation` starts closing, then fail the read.
fn until_closing<'a>(
    body: FrameStream<'a>,
    view: watch::Receiver<Option<OpenSink>>,
    generation: u64,
) -> FrameStream<'a> {
    futures::stream::unfold(Some((body, view)), move |state| async move {
        let (mut body, mut view) = state?;
        let next = tokio::select! {
            biased;
            () = closing(&mut view, generation) => None,
            chunk = body.next() => Some(chunk),
        };
        match next {
            None => Some((
                Err(std::io::Error::other("export stream stopped early")),
                None,
            )),
            Some(None) => None,
            Some(Some(chunk)) => Some((chunk, Some((body, view)))),
        }
    })
    .boxed()
}

async fn closing(view: &mut watch::Receiver<Option<OpenSink>>, generation: u64) {
    // A dropped sender means the session itself is gone.
    let _ = view
        .wait_for(|open| !OpenSink::accepts(open, generation))
        .await;
}

async fn buffer(mut body: FrameStream<'_>) -> ExportResult<Bytes> {
    let mut buf = BytesMut::new();
    while let Some(chunk) = body.next().await {
        buf.extend_from_slice(&chunk?);
    }
    Ok(buf.freeze())
}

async fn write_file(path: &Path, body: FrameStream<'_>) -> ExportResult<()> {
    let result = copy_to_file(path, body).await;
    if result.is_err()
        && let Err(e) = tokio::fs::remove_file(path).await
    {
        // Do not leave a truncated frame behind; if that fails, say where it is.
        tracing::debug!(path = %path.display(), "failed to remove partial frame: {e}");
    }
    result
}

async fn copy_to_file(path: &Path, mut body: FrameStream<'_>) -> ExportResult<()> {
    let mut file = tokio::fs::File::create(path)
        .await
        .with_context(|| format!("failed to create '{}'", path.display()))?;
    while let Some(chunk) = body.next().await {
        file.write_all(&chunk?).await?;
    }
    file.flush().await?;
    Ok(())
}
