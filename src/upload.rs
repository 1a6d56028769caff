use axum::{
    extract::{Multipart, multipart::MultipartError},
    http::StatusCode,
};
use serde::de::DeserializeOwned;

use crate::{
    error::{AppError, AppResult},
    images::ImageError,
    models::Upload,
};

/// Multipart part carrying the JSON body of a film, actor or profile write.
pub const DATA_PART: &str = "data";

/// Largest request body accepted on upload routes; per-kind image limits are
/// enforced later by the image pipeline.
pub const BODY_LIMIT: usize = 8 * 1024 * 1024;

/// Reads a `data` JSON part and an optional file part named `file_part`. A missing
/// `data` part yields `T::default()`, which then fails validation field by field.
pub async fn read_form<T>(mut form: Multipart, file_part: &str) -> AppResult<(T, Option<Upload>)>
where
    T: DeserializeOwned + Default,
{
    let mut data = None;
    let mut upload = None;

    while let Some(field) = form.next_field().await.map_err(malformed)? {
        let name = field.name().unwrap_or_default().to_string();
        if name == DATA_PART {
            let raw = field.text().await.map_err(malformed)?;
            let parsed = serde_json::from_str(&raw)
                .map_err(|e| AppError::invalid("data", format!("is not valid JSON: {e}")))?;
            data = Some(parsed);
        } else if name == file_part {
            let content_type = field.content_type().map(str::to_string);
            let bytes = field.bytes().await.map_err(malformed)?;
            if !bytes.is_empty() {
                upload = Some(Upload { bytes: bytes.to_vec(), content_type });
            }
        }
    }

    Ok((data.unwrap_or_default(), upload))
}

fn malformed(err: MultipartError) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return ImageError::TooLarge { limit: BODY_LIMIT }.into();
    }
    tracing::debug!(error = %err, "unreadable multipart body");
    AppError::invalid("body", "is not a valid multipart form")
}
