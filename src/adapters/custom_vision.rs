//! Client for Custom Vision classification projects, and the breed and
//! dog/cat adapters built on it.
//!
//! A published iteration is queried with
//! `POST {endpoint}/customvision/v3.0/Prediction/{project}/classify/iterations/{name}/image`,
//! the raw image as the body and the key in a `Prediction-Key` header.

use super::Classifier;
use crate::config::CustomVisionSettings;
use crate::prediction::{
    AnimalTypePrediction, BreedPrediction, BreedScore, ErrorKind, PredictionError, Source,
};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

/// One tag probability reported by a classification project
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagPrediction {
    pub tag_name: String,
    pub probability: f64,
}

#[derive(Deserialize)]
struct ClassifyResponse {
    predictions: Vec<TagPrediction>,
}

/// A connection to one published Custom Vision classifier
#[derive(Debug, Clone)]
pub struct CustomVisionClient {
    http: reqwest::Client,
    url: String,
    prediction_key: String,
    source: Source,
}

impl CustomVisionClient {
    pub fn new(http: reqwest::Client, settings: &CustomVisionSettings, source: Source) -> Self {
        let url = format!(
            "{}/customvision/v3.0/Prediction/{}/classify/iterations/{}/image",
            settings.endpoint.trim_end_matches('/'),
            settings.project_id,
            settings.published_name
        );
        CustomVisionClient {
            http,
            url,
            prediction_key: settings.prediction_key.clone(),
            source,
        }
    }

    /// Send the image and return every tag the project reported
    pub async fn classify(&self, image: &[u8]) -> Result<Vec<TagPrediction>, PredictionError> {
        let response = self
            .http
            .post(&self.url)
            .header("Prediction-Key", &self.prediction_key)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(image.to_vec())
            .send()
            .await
            .map_err(|e| PredictionError::transport(self.source, e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| PredictionError::transport(self.source, e.to_string()))?;

        if !status.is_success() {
            return Err(PredictionError::new(
                self.source,
                ErrorKind::Status(status.as_u16()),
                format!(
                    "classifier returned HTTP {}: {}",
                    status.as_u16(),
                    describe_error_body(&body)
                ),
            ));
        }

        debug!(source = %self.source, bytes = body.len(), "classifier responded");
        parse_classify_body(self.source, &body)
    }
}

/// Pull a readable message out of an error body, falling back to the raw text
fn describe_error_body(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|json| application_error(&json))
        .unwrap_or_else(|| body.trim().to_string())
}

/// An error reported by the service inside a JSON body: either an `error`
/// field or the `code`/`message` pair Custom Vision uses
fn application_error(json: &Value) -> Option<String> {
    if let Some(err) = json.get("error").filter(|e| !e.is_null()) {
        return Some(match err {
            Value::String(s) => s.clone(),
            Value::Object(obj) => obj
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| err.to_string()),
            other => other.to_string(),
        });
    }
    match (json.get("code"), json.get("message").and_then(Value::as_str)) {
        (Some(code), Some(message)) => Some(format!("{}: {message}", code_text(code))),
        _ => None,
    }
}

fn code_text(code: &Value) -> String {
    match code {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn parse_classify_body(source: Source, body: &str) -> Result<Vec<TagPrediction>, PredictionError> {
    let json: Value = serde_json::from_str(body)
        .map_err(|e| PredictionError::shape(source, format!("response is not JSON: {e}")))?;

    if let Some(message) = application_error(&json) {
        return Err(PredictionError::application(source, message));
    }

    let parsed: ClassifyResponse = serde_json::from_value(json).map_err(|e| {
        PredictionError::shape(source, format!("unexpected response shape: {e}"))
    })?;
    Ok(parsed.predictions)
}

/// Rank tags by descending probability
fn ranked(mut tags: Vec<TagPrediction>) -> Vec<TagPrediction> {
    tags.sort_by(|a, b| b.probability.total_cmp(&a.probability));
    tags
}

/// Adapter for the breed classification project
pub struct BreedClassifier {
    client: CustomVisionClient,
}

impl BreedClassifier {
    pub fn new(http: reqwest::Client, settings: &CustomVisionSettings) -> Self {
        BreedClassifier {
            client: CustomVisionClient::new(http, settings, Source::Breed),
        }
    }
}

#[async_trait]
impl Classifier for BreedClassifier {
    type Payload = BreedPrediction;

    fn source(&self) -> Source {
        Source::Breed
    }

    async fn predict(&self, image: &[u8]) -> Result<BreedPrediction, PredictionError> {
        let tags = self.client.classify(image).await?;
        let breeds = ranked(tags)
            .into_iter()
            .map(|tag| BreedScore {
                name: tag.tag_name,
                confidence: tag.probability,
            })
            .collect();
        Ok(BreedPrediction { breeds })
    }
}

/// Adapter for the dog/cat classification project
pub struct AnimalTypeClassifier {
    client: CustomVisionClient,
}

impl AnimalTypeClassifier {
    pub fn new(http: reqwest::Client, settings: &CustomVisionSettings) -> Self {
        AnimalTypeClassifier {
            client: CustomVisionClient::new(http, settings, Source::AnimalType),
        }
    }
}

#[async_trait]
impl Classifier for AnimalTypeClassifier {
    type Payload = AnimalTypePrediction;

    fn source(&self) -> Source {
        Source::AnimalType
    }

    async fn predict(&self, image: &[u8]) -> Result<AnimalTypePrediction, PredictionError> {
        let tags = self.client.classify(image).await?;
        let top = ranked(tags).into_iter().next().ok_or_else(|| {
            PredictionError::shape(Source::AnimalType, "classifier returned no predictions")
        })?;
        Ok(AnimalTypePrediction {
            animal_type: top.tag_name,
            animal_confidence: top.probability,
        })
    }
}
