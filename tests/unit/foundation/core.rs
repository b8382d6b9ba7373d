use super::*;

#[test]
fn encoding_parses_only_png_and_jpeg() {
    assert_eq!("image/png".parse::<FrameEncoding>().unwrap(), FrameEncoding::Png);
    assert_eq!("IMAGE/JPEG".parse::<FrameEncoding>().unwrap(), FrameEncoding::Jpeg);
    assert!(matches!(
        "image/webp".parse::<FrameEncoding>(),
        Err(ExportError::Validation(_))
    ));
    assert!("".parse::<FrameEncoding>().is_err());
}

#[test]
fn encoding_serde_uses_mime_strings() {
    let json = serde_json::to_string(&FrameEncoding::Jpeg).unwrap();
    assert_eq!(json, "\"image/jpeg\"");
    let back: FrameEncoding = serde_json::from_str("\"image/png\"").unwrap();
    assert_eq!(back, FrameEncoding::Png);
}

#[test]
fn mime_matching_ignores_case_and_whitespace() {
    assert!(FrameEncoding::Png.matches_mime(" Image/PNG "));
    assert!(!FrameEncoding::Png.matches_mime("image/jpeg"));
}

#[test]
fn stream_format_rejects_unknown_containers() {
    assert_eq!("gif".parse::<StreamFormat>().unwrap(), StreamFormat::Gif);
    assert_eq!("MP4".parse::<StreamFormat>().unwrap(), StreamFormat::Mp4);
    assert!(matches!(
        "webm".parse::<StreamFormat>(),
        Err(ExportError::Config(_))
    ));
}

#[test]
fn only_gif_has_an_fps_advisory() {
    assert_eq!(StreamFormat::Gif.advisory_max_fps(), Some(50.0));
    assert_eq!(StreamFormat::Mp4.advisory_max_fps(), None);
}

#[test]
fn base_name_strips_directories() {
    assert_eq!(base_name("frame0.png").unwrap(), "frame0.png");
    assert_eq!(base_name("a/b/frame0.png").unwrap(), "frame0.png");
    assert_eq!(base_name("../../etc/passwd").unwrap(), "passwd");
    assert_eq!(base_name("C:\\sketch\\x.png").unwrap(), "x.png");
}

#[test]
fn base_name_rejects_empty_components() {
    assert!(base_name("").is_err());
    assert!(base_name("..").is_err());
    assert!(base_name("dir/").is_err());
}

#[test]
fn dir_name_reports_last_component() {
    assert_eq!(dir_name(Path::new("/tmp/out")), "out");
    assert_eq!(dir_name(Path::new("out")), "out");
}
