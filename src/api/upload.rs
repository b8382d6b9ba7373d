use axum::extract::Multipart;
use axum::extract::multipart::{Field, MultipartError};
use futures::{StreamExt as _, TryStreamExt as _};

use crate::foundation::error::{ExportError, ExportResult};
use crate::session::{ExportReply, ExportSession, UploadedFrame};

/// Feed the first file part of a multipart body into the session, then consume the rest of
/// the body before reporting the outcome.
pub(crate) async fn ingest_multipart(
    session: &ExportSession,
    mut multipart: Multipart,
) -> ExportResult<ExportReply> {
    let mut outcome: Option<ExportResult<ExportReply>> = None;

    loop {
        let mut field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            // The frame already has its answer; a broken tail does not change it.
            Err(_) if outcome.is_some() => break,
            Err(e) => return Err(malformed(e)),
        };

        if outcome.is_some() || field.file_name().is_none() {
            if let Err(e) = drain(&mut field).await {
                if outcome.is_some() {
                    break;
                }
                return Err(malformed(e));
            }
            continue;
        }

        outcome = Some(session.ingest(into_frame(field)).await);
    }

    outcome.unwrap_or_else(|| Err(ExportError::validation("upload contained no file part")))
}

fn into_frame(field: Field<'_>) -> UploadedFrame<'_> {
    UploadedFrame {
        field: field.name().unwrap_or_default().to_owned(),
        filename: field.file_name().unwrap_or_default().to_owned(),
        mime: field.content_type().map(str::to_owned),
        body: field.map_err(std::io::Error::other).boxed(),
    }
}

async fn drain(field: &mut Field<'_>) -> Result<(), MultipartError> {
    while field.chunk().await?.is_some() {}
    Ok(())
}

fn malformed(e: MultipartError) -> ExportError {
    ExportError::validation(format!("malformed upload: {}", e.body_text()))
}
