use super::*;
use crate::encode::sink::FrameMode;
use futures::StreamExt as _;
use std::path::PathBuf;

fn opts(format: StreamFormat, encoding: FrameEncoding, fps: f64) -> SinkOpts {
    SinkOpts {
        format,
        encoding,
        fps,
        out_path: PathBuf::from("out/anim.mp4"),
        mode: FrameMode::Streaming,
        ffmpeg: PathBuf::from("ffmpeg"),
        crf: None,
        debug: false,
    }
}

fn args_as_strings(opts: &SinkOpts) -> Vec<String> {
    encoder_args(opts)
        .into_iter()
        .map(|a| a.to_string_lossy().into_owned())
        .collect()
}

fn value_after(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1).cloned())
}

#[test]
fn mp4_args_read_png_pipe_and_write_h264() {
    let args = args_as_strings(&opts(StreamFormat::Mp4, FrameEncoding::Png, 30.0));
    assert_eq!(value_after(&args, "-f").as_deref(), Some("image2pipe"));
    assert_eq!(value_after(&args, "-framerate").as_deref(), Some("30"));
    assert_eq!(value_after(&args, "-i").as_deref(), Some("-"));
    assert!(args.iter().any(|a| a == "libx264"));
    assert_eq!(value_after(&args, "-pix_fmt").as_deref(), Some("yuv420p"));
    assert!(!args.iter().any(|a| a == "-crf"));
    assert_eq!(args.last().map(String::as_str), Some("out/anim.mp4"));
}

#[test]
fn jpeg_input_uses_mjpeg_decoder() {
    let args = args_as_strings(&opts(StreamFormat::Mp4, FrameEncoding::Jpeg, 24.0));
    let input_codec = args
        .iter()
        .position(|a| a == "-i")
        .and_then(|i| args[..i].iter().rposition(|a| a == "-c:v"))
        .map(|i| args[i + 1].clone());
    assert_eq!(input_codec.as_deref(), Some("mjpeg"));
}

#[test]
fn gif_args_use_palette_filter_and_loop() {
    let args = args_as_strings(&opts(StreamFormat::Gif, FrameEncoding::Png, 12.5));
    assert_eq!(value_after(&args, "-framerate").as_deref(), Some("12.5"));
    assert!(
        value_after(&args, "-filter_complex")
            .unwrap()
            .contains("palettegen")
    );
    assert_eq!(value_after(&args, "-loop").as_deref(), Some("0"));
    assert!(!args.iter().any(|a| a == "libx264"));
}

#[test]
fn crf_and_debug_are_passed_through() {
    let mut o = opts(StreamFormat::Mp4, FrameEncoding::Png, 60.0);
    o.crf = Some(18);
    o.debug = true;
    let args = args_as_strings(&o);
    assert_eq!(value_after(&args, "-crf").as_deref(), Some("18"));
    assert_eq!(value_after(&args, "-loglevel").as_deref(), Some("info"));
}

#[tokio::test]
async fn spawn_fails_cleanly_without_encoder() {
    let dir = tempfile::tempdir().unwrap();
    let mut o = opts(StreamFormat::Mp4, FrameEncoding::Png, 30.0);
    o.out_path = dir.path().join("anim.mp4");
    o.ffmpeg = dir.path().join("no-such-ffmpeg");
    let err = FfmpegSink::spawn(o).await.err().unwrap();
    assert!(matches!(err, ExportError::Resource(_)));
}

#[tokio::test]
async fn spawn_rejects_non_positive_fps() {
    let o = opts(StreamFormat::Gif, FrameEncoding::Png, 0.0);
    let err = FfmpegSink::spawn(o).await.err().unwrap();
    assert!(matches!(err, ExportError::Validation(_)));
}

#[cfg(unix)]
#[tokio::test]
async fn frames_are_piped_to_the_encoder_process() {
    use std::os::unix::fs::PermissionsExt as _;

    let dir = tempfile::tempdir().unwrap();
    // Stand-in encoder: copies stdin to the last argument.
    let script = dir.path().join("fake-ffmpeg");
    std::fs::write(
        &script,
        "#!/bin/sh\nif [ \"$1\" = \"-version\" ]; then exit 0; fi\nfor last; do :; done\ncat > \"$last\"\n",
    )
    .unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

    let mut o = opts(StreamFormat::Mp4, FrameEncoding::Png, 30.0);
    o.out_path = dir.path().join("nested").join("anim.mp4");
    o.ffmpeg = script;

    let mut sink = FfmpegSink::spawn(o.clone()).await.unwrap();
    assert!(sink.is_writable());
    assert_eq!(sink.encoding(), FrameEncoding::Png);

    let chunks: Vec<std::io::Result<Bytes>> =
        vec![Ok(Bytes::from_static(b"ab")), Ok(Bytes::from_static(b"cd"))];
    sink.write_frame(futures::stream::iter(chunks).boxed(), "frame0.png")
        .await
        .unwrap();
    sink.write_buffer_frame(Bytes::from_static(b"ef"))
        .await
        .unwrap();
    sink.end().await.unwrap();
    assert!(!sink.is_writable());

    assert_eq!(std::fs::read(&o.out_path).unwrap(), b"abcdef");
}
