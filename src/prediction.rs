//! The request-scoped data model shared by the adapters, the orchestrator and
//! the HTTP layer. Nothing in here outlives a single request.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An uploaded image. Can only be constructed once the declared content type
/// has passed the `image/` gate
#[derive(Clone)]
pub struct ImagePayload {
    bytes: Vec<u8>,
    content_type: String,
}

impl ImagePayload {
    pub fn new(bytes: Vec<u8>, content_type: impl Into<String>) -> Result<Self, ValidationError> {
        let content_type = content_type.into();
        if !content_type.starts_with("image/") {
            return Err(ValidationError::NotAnImage { content_type });
        }
        Ok(ImagePayload {
            bytes,
            content_type,
        })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }
}

impl fmt::Debug for ImagePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ImagePayload {{ bytes: <{} bytes>, content_type: {:?} }}",
            self.bytes.len(),
            self.content_type
        )
    }
}

/// A request rejected before any classifier is called
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    NotAnImage { content_type: String },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::NotAnImage { .. } => write!(f, "uploaded file is not an image"),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Which set of classifiers a request activates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredictionRequestKind {
    /// Breed classifier (primary) plus dog age classifier (secondary)
    BreedWithAge,

    /// Dog/cat classifier only
    AnimalType,
}

/// The identity of an external classification service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Breed,
    AnimalType,
    Age,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Source::Breed => "breed",
            Source::AnimalType => "animal type",
            Source::Age => "age",
        };
        write!(f, "{name}")
    }
}

/// How an adapter call went wrong
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Connection, DNS or I/O failure talking to the service
    Transport,

    /// The call did not finish within the adapter's time budget
    Timeout,

    /// The service answered with a non-2xx status
    Status(u16),

    /// The response body did not have the expected shape
    Shape,

    /// The service reported an error inside a success envelope
    Application,
}

/// A failed prediction from one source. Adapters convert every failure into
/// this type at their boundary
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionError {
    source: Source,
    kind: ErrorKind,
    message: String,
}

impl PredictionError {
    pub fn new(source: Source, kind: ErrorKind, message: impl Into<String>) -> Self {
        PredictionError {
            source,
            kind,
            message: message.into(),
        }
    }

    pub fn transport(source: Source, message: impl Into<String>) -> Self {
        Self::new(source, ErrorKind::Transport, message)
    }

    pub fn shape(source: Source, message: impl Into<String>) -> Self {
        Self::new(source, ErrorKind::Shape, message)
    }

    pub fn application(source: Source, message: impl Into<String>) -> Self {
        Self::new(source, ErrorKind::Application, message)
    }

    pub fn origin(&self) -> Source {
        self.source
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for PredictionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for PredictionError {}

/// One breed label reported by the breed classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreedScore {
    pub name: String,
    pub confidence: f64,
}

/// The breed classifier's result, ordered by descending confidence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreedPrediction {
    pub breeds: Vec<BreedScore>,
}

/// The dog/cat classifier's best guess
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnimalTypePrediction {
    pub animal_type: String,
    pub animal_confidence: f64,
}

/// The age classifier's (already humanized) bracket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgePrediction {
    pub prediction: String,
}
