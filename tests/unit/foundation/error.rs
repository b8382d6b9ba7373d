use super::*;

#[test]
fn display_prefixes_are_stable() {
    assert!(
        ExportError::config("x")
            .to_string()
            .contains("configuration error:")
    );
    assert!(
        ExportError::validation("x")
            .to_string()
            .contains("validation error:")
    );
    assert!(
        ExportError::resource("x")
            .to_string()
            .contains("resource error:")
    );
    assert_eq!(
        ExportError::StoppedEarly.to_string(),
        "export stream stopped early"
    );
}

#[test]
fn request_errors_are_client_errors() {
    assert_eq!(ExportError::config("off").status_code(), 400);
    assert_eq!(ExportError::validation("bad").status_code(), 400);
    assert_eq!(ExportError::resource("disk").status_code(), 500);
    assert_eq!(ExportError::NotWritable.status_code(), 500);
    assert_eq!(ExportError::StoppedEarly.status_code(), 500);
}

#[test]
fn only_io_failures_are_session_fatal() {
    assert!(ExportError::resource("pipe").is_session_fatal());
    assert!(ExportError::Other(anyhow::anyhow!("boom")).is_session_fatal());
    assert!(!ExportError::NotWritable.is_session_fatal());
    assert!(
        !ExportError::EncodingMismatch {
            expected: "image/png".into(),
            actual: "image/jpeg".into(),
        }
        .is_session_fatal()
    );
}

#[test]
fn io_errors_become_resource_errors() {
    let err: ExportError = std::io::Error::other("boom").into();
    assert!(matches!(err, ExportError::Resource(ref m) if m.contains("boom")));
}

#[test]
fn other_preserves_source() {
    let base = std::io::Error::other("boom");
    let err = ExportError::Other(anyhow::Error::new(base));
    assert!(err.to_string().contains("boom"));
}
