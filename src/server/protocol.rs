use super::WebError;
use crate::prediction::ImagePayload;
use actix_multipart::Multipart;
use actix_web::http::header;
use anyhow::anyhow;
use tokio_stream::StreamExt;
use tracing::warn;

/// Name of the multipart form field carrying the image
pub const FILE_FIELD: &str = "file";

/// Pull the `file` part out of a multipart upload and put it through the
/// image content-type gate
pub async fn read_image(mut payload: Multipart, limit: usize) -> Result<ImagePayload, WebError> {
    while let Some(field) = payload.next().await {
        let mut field = field?;

        if field.content_disposition().get_name() != Some(FILE_FIELD) {
            while let Some(chunk) = field.next().await {
                chunk?;
            }
            continue;
        }

        // the declared header text, not the parsed mime, which is lowercased
        let content_type = field
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();

        let mut bytes = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk?;
            if bytes.len() + chunk.len() > limit {
                return Err(WebError::payload_too_large(limit));
            }
            bytes.extend_from_slice(&chunk);
        }

        return ImagePayload::new(bytes, content_type.as_str()).map_err(|err| {
            warn!(%content_type, "rejected upload that is not an image");
            err.into()
        });
    }

    Err(WebError::bad_request(anyhow!(
        "missing `{FILE_FIELD}` field in upload"
    )))
}
