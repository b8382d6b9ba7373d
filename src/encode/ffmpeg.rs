use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;

use anyhow::Context as _;
use bytes::Bytes;
use futures::StreamExt as _;
use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _};
use tokio::process::{Child, ChildStdin, Command};
use tokio::task::JoinHandle;

use crate::encode::sink::{FrameStream, SinkFactory, SinkOpts, StreamSink};
use crate::foundation::core::{FrameEncoding, StreamFormat};
use crate::foundation::error::{ExportError, ExportResult};

/// Opens [`FfmpegSink`]s.
#[derive(Clone, Copy, Debug, Default)]
pub struct FfmpegSinkFactory;

#[async_trait::async_trait]
impl SinkFactory for FfmpegSinkFactory {
    async fn open(&self, opts: SinkOpts) -> ExportResult<Box<dyn StreamSink>> {
        Ok(Box::new(FfmpegSink::spawn(opts).await?))
    }
}

/// Sink that spawns the system `ffmpeg` and pipes encoded PNG/JPEG frames into stdin.
pub struct FfmpegSink {
    encoding: FrameEncoding,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stderr_drain: Option<JoinHandle<std::io::Result<Vec<u8>>>>,
    frames: u64,
    broken: bool,
}

impl FfmpegSink {
    /// Spawn `ffmpeg` for one output file.
    #[tracing::instrument(skip(opts), fields(out = %opts.out_path.display(), format = %opts.format))]
    pub async fn spawn(opts: SinkOpts) -> ExportResult<Self> {
        if !opts.fps.is_finite() || opts.fps <= 0.0 {
            return Err(ExportError::validation("fps must be positive"));
        }
        ensure_parent_dir(&opts.out_path).await?;

        if !is_ffmpeg_runnable(&opts.ffmpeg).await {
            return Err(ExportError::resource(format!(
                "'{}' is required for {} export, but could not be run",
                opts.ffmpeg.display(),
                opts.format
            )));
        }

        let mut cmd = Command::new(&opts.ffmpeg);
        cmd.args(encoder_args(&opts))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            ExportError::resource(format!(
                "failed to spawn '{}': {e}",
                opts.ffmpeg.display()
            ))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ExportError::resource("failed to open ffmpeg stdin (unexpected)"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| ExportError::resource("failed to open ffmpeg stderr (unexpected)"))?;
        let stderr_drain = tokio::spawn(async move {
            let mut stderr_bytes = Vec::new();
            stderr.read_to_end(&mut stderr_bytes).await?;
            Ok(stderr_bytes)
        });

        tracing::debug!(pid = ?child.id(), "ffmpeg spawned");
        Ok(Self {
            encoding: opts.encoding,
            child: Some(child),
            stdin: Some(stdin),
            stderr_drain: Some(stderr_drain),
            frames: 0,
            broken: false,
        })
    }

    async fn write_chunk(&mut self, chunk: &[u8]) -> ExportResult<()> {
        let Some(stdin) = self.stdin.as_mut() else {
            return Err(ExportError::resource("ffmpeg sink is already finalized"));
        };
        if let Err(e) = stdin.write_all(chunk).await {
            self.broken = true;
            return Err(ExportError::resource(format!(
                "failed to write frame to ffmpeg stdin: {e}"
            )));
        }
        Ok(())
    }

    async fn collect_stderr(&mut self) -> Vec<u8> {
        match self.stderr_drain.take() {
            Some(handle) => match handle.await {
                Ok(Ok(bytes)) => bytes,
                Ok(Err(e)) => format!("ffmpeg stderr read failed: {e}").into_bytes(),
                Err(_) => b"ffmpeg stderr drain task panicked".to_vec(),
            },
            None => Vec::new(),
        }
    }
}

#[async_trait::async_trait]
impl StreamSink for FfmpegSink {
    fn is_writable(&self) -> bool {
        self.stdin.is_some() && !self.broken
    }

    fn encoding(&self) -> FrameEncoding {
        self.encoding
    }

    async fn write_frame(&mut self, mut frame: FrameStream<'_>, name: &str) -> ExportResult<()> {
        while let Some(chunk) = frame.next().await {
            let chunk = chunk.map_err(|e| {
                ExportError::resource(format!("failed to read frame '{name}': {e}"))
            })?;
            self.write_chunk(&chunk).await?;
        }
        self.frames += 1;
        tracing::trace!(frame = self.frames, name, "frame piped");
        Ok(())
    }

    async fn write_buffer_frame(&mut self, frame: Bytes) -> ExportResult<()> {
        self.write_chunk(&frame).await?;
        self.frames += 1;
        tracing::trace!(frame = self.frames, bytes = frame.len(), "frame piped");
        Ok(())
    }

    async fn end(&mut self) -> ExportResult<()> {
        if let Some(mut stdin) = self.stdin.take() {
            // A failed flush shows up as a non-zero exit below.
            let _ = stdin.shutdown().await;
        }
        let mut child = self
            .child
            .take()
            .ok_or_else(|| ExportError::resource("ffmpeg sink not started"))?;

        let status = child
            .wait()
            .await
            .context("failed to wait for ffmpeg to finish")?;
        let stderr_bytes = self.collect_stderr().await;

        if !status.success() {
            let stderr = String::from_utf8_lossy(&stderr_bytes);
            return Err(ExportError::resource(format!(
                "ffmpeg exited with status {}: {}",
                status,
                stderr.trim()
            )));
        }

        tracing::debug!(frames = self.frames, "ffmpeg finished");
        Ok(())
    }

    fn close(&mut self) {
        drop(self.stdin.take());
        if let Some(mut child) = self.child.take()
            && let Err(e) = child.start_kill()
        {
            tracing::warn!("failed to kill ffmpeg: {e}");
        }
        if let Some(handle) = self.stderr_drain.take() {
            handle.abort();
        }
    }
}

/// Build the `ffmpeg` argument list for a sink.
pub fn encoder_args(opts: &SinkOpts) -> Vec<OsString> {
    let mut args: Vec<OsString> = Vec::new();
    let mut push = |s: &str| args.push(OsString::from(s));

    push("-y");
    push("-loglevel");
    push(if opts.debug { "info" } else { "error" });

    // Input: a concatenated pipe of encoded still images.
    push("-f");
    push("image2pipe");
    push("-framerate");
    push(&format_fps(opts.fps));
    push("-c:v");
    push(match opts.encoding {
        FrameEncoding::Png => "png",
        FrameEncoding::Jpeg => "mjpeg",
    });
    push("-i");
    push("-");

    match opts.format {
        StreamFormat::Mp4 => {
            push("-an");
            push("-c:v");
            push("libx264");
            // yuv420p needs even dimensions.
            push("-vf");
            push("scale=trunc(iw/2)*2:trunc(ih/2)*2");
            push("-pix_fmt");
            push("yuv420p");
            if let Some(crf) = opts.crf {
                push("-crf");
                push(&crf.to_string());
            }
            push("-movflags");
            push("+faststart");
        }
        StreamFormat::Gif => {
            push("-filter_complex");
            push("[0:v]split[a][b];[a]palettegen[p];[b][p]paletteuse");
            push("-loop");
            push("0");
        }
    }

    args.push(opts.out_path.clone().into_os_string());
    args
}

fn format_fps(fps: f64) -> String {
    if fps.fract() == 0.0 {
        format!("{}", fps as u64)
    } else {
        format!("{fps}")
    }
}

/// Ensure the parent directory of `path` exists.
pub async fn ensure_parent_dir(path: &Path) -> ExportResult<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create output directory '{}'", parent.display()))?;
    }
    Ok(())
}

/// Return `true` when `ffmpeg -version` runs successfully.
pub async fn is_ffmpeg_runnable(ffmpeg: &Path) -> bool {
    Command::new(ffmpeg)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map(|s| s.success())
        .unwrap_or(false)
}

#[cfg(test)]
#[path = "../../tests/unit/encode/ffmpeg.rs"]
mod tests;
