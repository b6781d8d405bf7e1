//! Merges adapter outcomes into the single object returned to the caller.
//!
//! The primary outcome decides success or failure of the whole response. A
//! secondary outcome is attached under `dog_age_prediction` either as its
//! payload or as an embedded error, and never changes the status.

use crate::prediction::{PredictionError, Source};
use serde::Serialize;

/// The body of a failed response
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        ErrorBody {
            error: error.into(),
        }
    }

    /// The failure of a primary source, fatal to the response
    pub fn primary_failure(err: &PredictionError) -> Self {
        Self::new(format!("{} prediction failed: {}", err.origin(), err))
    }
}

/// A secondary source's failure, embedded as data
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbeddedError {
    pub source: Source,
    pub error: String,
}

/// A secondary outcome as it appears inside a successful composite
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SecondaryOutcome<S> {
    Payload(S),
    Error(EmbeddedError),
}

impl<S> From<Result<S, PredictionError>> for SecondaryOutcome<S> {
    fn from(outcome: Result<S, PredictionError>) -> Self {
        match outcome {
            Ok(payload) => SecondaryOutcome::Payload(payload),
            Err(err) => SecondaryOutcome::Error(EmbeddedError {
                source: err.origin(),
                error: err.message().to_string(),
            }),
        }
    }
}

/// A successful primary payload with its fields at the top level
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Composite<P, S> {
    #[serde(flatten)]
    pub primary: P,

    #[serde(
        rename = "dog_age_prediction",
        skip_serializing_if = "Option::is_none"
    )]
    pub secondary: Option<SecondaryOutcome<S>>,
}

/// What the caller receives for one prediction request
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CompositeResult<P, S = ()> {
    Success(Composite<P, S>),
    Failure(ErrorBody),
}

impl<P, S> CompositeResult<P, S> {
    pub fn is_success(&self) -> bool {
        matches!(self, CompositeResult::Success(_))
    }
}

/// Combine a primary outcome with an optional secondary one. A failed primary
/// drops the secondary outcome entirely
pub fn assemble<P, S>(
    primary: Result<P, PredictionError>,
    secondary: Option<Result<S, PredictionError>>,
) -> CompositeResult<P, S> {
    match primary {
        Ok(primary) => CompositeResult::Success(Composite {
            primary,
            secondary: secondary.map(SecondaryOutcome::from),
        }),
        Err(err) => CompositeResult::Failure(ErrorBody::primary_failure(&err)),
    }
}
