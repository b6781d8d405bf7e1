use crate::assembler::ErrorBody;
use crate::prediction::ValidationError;
use actix_web::http::header::ContentType;
use actix_web::http::StatusCode;
use actix_web::HttpResponse;

mod protocol;
pub mod routes;

/// An error that ends a request before or outside of prediction. Always
/// rendered as a JSON `{"error": ...}` body
#[derive(Debug)]
pub struct WebError {
    status: StatusCode,
    err: anyhow::Error,
}

impl WebError {
    pub fn bad_request(err: impl Into<anyhow::Error>) -> Self {
        WebError {
            status: StatusCode::BAD_REQUEST,
            err: err.into(),
        }
    }

    pub fn payload_too_large(limit: usize) -> Self {
        WebError {
            status: StatusCode::PAYLOAD_TOO_LARGE,
            err: anyhow::anyhow!("uploaded file exceeds {limit} bytes"),
        }
    }
}

impl std::fmt::Display for WebError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.err)
    }
}

impl actix_web::error::ResponseError for WebError {
    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .json(ErrorBody::new(self.to_string()))
    }

    fn status_code(&self) -> StatusCode {
        self.status
    }
}

impl From<anyhow::Error> for WebError {
    fn from(err: anyhow::Error) -> WebError {
        WebError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            err,
        }
    }
}

impl From<ValidationError> for WebError {
    fn from(err: ValidationError) -> Self {
        WebError::bad_request(err)
    }
}

impl From<actix_multipart::MultipartError> for WebError {
    fn from(err: actix_multipart::MultipartError) -> Self {
        WebError::bad_request(anyhow::anyhow!("malformed upload: {err}"))
    }
}
