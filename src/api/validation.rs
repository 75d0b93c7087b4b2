use std::path::Path;

use crate::api::errors::ApiError;

pub(crate) const MAX_SUBJECT_LEN: usize = 50;

/// Checks extension and MIME type. Returns the lowercased extension.
pub(crate) fn validate_image_upload(
    filename: &str,
    content_type: &str,
    allowed_extensions: &[String],
) -> Result<String, ApiError> {
    let extension = Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .ok_or_else(|| ApiError::BadRequest("File must have an extension".to_string()))?;

    if !allowed_extensions.iter().any(|allowed| allowed == &extension) {
        return Err(ApiError::BadRequest(format!("File extension '{extension}' is not allowed")));
    }

    let mime = content_type.trim().to_ascii_lowercase();
    if mime_allowed_for_extension(&mime, &extension) {
        Ok(extension)
    } else {
        Err(ApiError::BadRequest(format!(
            "MIME type '{mime}' does not match extension '.{extension}'"
        )))
    }
}

fn mime_allowed_for_extension(mime: &str, extension: &str) -> bool {
    match extension {
        "jpg" | "jpeg" => matches!(mime, "image/jpeg" | "image/jpg"),
        "png" => mime == "image/png",
        "webp" => mime == "image/webp",
        "bmp" => matches!(mime, "image/bmp" | "image/x-ms-bmp"),
        "tif" | "tiff" => mime == "image/tiff",
        _ => false,
    }
}

/// Empty subjects are treated as absent.
pub(crate) fn normalize_subject(subject: &str) -> Result<Option<String>, ApiError> {
    let subject = subject.trim();
    if subject.is_empty() {
        return Ok(None);
    }
    if subject.chars().count() > MAX_SUBJECT_LEN {
        return Err(ApiError::BadRequest(format!(
            "Subject must be at most {MAX_SUBJECT_LEN} characters"
        )));
    }
    Ok(Some(subject.to_string()))
}
