use crate::encode::sink::{FrameMode, SinkOpts};
use crate::foundation::core::{FrameEncoding, base_name};
use crate::foundation::error::{ExportError, ExportResult};
use crate::session::state::ActiveSink;
use crate::session::{DEFAULT_FPS, EndRequest, ExportReply, ExportSession, StartRequest};

impl ExportSession {
    /// Open a new sink, superseding any open one.
    ///
    /// The previous sink is finalized first; its failures are logged and do not stop the new
    /// session. A rejected request leaves the current session untouched.
    #[tracing::instrument(skip(self, req), fields(filename = %req.filename))]
    pub async fn start(&self, req: StartRequest) -> ExportResult<ExportReply> {
        let Some(stream) = self.config.stream.as_ref() else {
            return Ok(self.reply(false, req.filename));
        };
        let Some(output) = self.config.output.as_ref() else {
            return Err(ExportError::config(
                "cannot start stream, output is disabled",
            ));
        };

        let encoding = match req.encoding.as_deref() {
            None => FrameEncoding::default(),
            Some(s) => s.parse()?,
        };
        let fps = req.fps.unwrap_or(DEFAULT_FPS);
        if !fps.is_finite() || fps <= 0.0 {
            return Err(ExportError::validation(format!(
                "fps must be a positive number, got {fps}"
            )));
        }
        let filename = format!("{}.{}", base_name(&req.filename)?, stream.format.extension());

        self.mark_closing();
        let mut state = self.state.lock().await;
        if let Some(previous) = state.take() {
            quiesce(previous).await;
        }

        if let Some(max) = stream.format.advisory_max_fps()
            && fps > max
        {
            tracing::warn!(fps, max, "values above {max} FPS may produce choppy {}s", stream.format);
        }

        let mode = FrameMode::from_buffer_flag(stream.buffer);
        let opts = SinkOpts {
            format: stream.format,
            encoding,
            fps,
            out_path: output.join(&filename),
            mode,
            ffmpeg: stream.ffmpeg.clone(),
            crf: stream.crf,
            debug: self.config.debug || debug_ffmpeg_env(),
        };

        // The previous sink is already gone; a failed open leaves the session empty.
        let sink = self.factory.open(opts).await?;
        let generation = state.install(sink, filename.clone());
        tracing::info!(generation, %encoding, fps, ?mode, "export stream started");

        Ok(self.reply(true, filename))
    }

    /// Finalize the open sink. Succeeds when nothing is open.
    ///
    /// If finalizing fails the sink is aborted and the session is cleared anyway.
    #[tracing::instrument(skip(self, req))]
    pub async fn end(&self, req: EndRequest) -> ExportResult<ExportReply> {
        let requested = req.filename.unwrap_or_default();
        if !self.config.is_streaming() {
            return Ok(self.reply(false, requested));
        }

        self.mark_closing();
        let mut state = self.state.lock().await;
        let Some(mut active) = state.take() else {
            tracing::debug!("stream-end with no open stream");
            return Ok(self.reply(true, requested));
        };

        match active.sink.end().await {
            Ok(()) => {
                tracing::info!(
                    generation = active.generation,
                    filename = %active.filename,
                    "export stream finished"
                );
                Ok(self.reply(true, active.filename))
            }
            Err(e) => {
                active.sink.close();
                tracing::warn!(
                    generation = active.generation,
                    "export stream aborted after failed finalize"
                );
                Err(e)
            }
        }
    }

    /// Finalize any open sink before the process exits.
    pub async fn shutdown(&self) {
        self.mark_closing();
        if let Some(active) = self.state.lock().await.take() {
            quiesce(active).await;
        }
    }
}

/// Best-effort finalize of a sink that is being replaced.
async fn quiesce(mut previous: ActiveSink) {
    tracing::info!(
        generation = previous.generation,
        filename = %previous.filename,
        "closing previous export stream"
    );
    if let Err(e) = previous.sink.end().await {
        tracing::warn!(
            generation = previous.generation,
            "previous export stream did not finish cleanly: {e}"
        );
        previous.sink.close();
    }
}

fn debug_ffmpeg_env() -> bool {
    std::env::var("DEBUG_FFMPEG").is_ok_and(|v| v == "1")
}
