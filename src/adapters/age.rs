//! Adapter for the dog age app, a Gradio-style inference endpoint.
//!
//! The app wants a file rather than raw bytes, so each call stages the image
//! in a temporary file, uploads it, queues a call of `api_name` on it and
//! reads the result from the call's event stream:
//!
//! 1. `POST {base}/upload` (multipart, field `files`) -> `["<server path>"]`
//! 2. `POST {base}/call{api_name}` with the file reference -> `{"event_id": ...}`
//! 3. `GET {base}/call{api_name}/{event_id}` -> `event: complete` / `data: [output]`

use super::Classifier;
use crate::config::AgeSettings;
use crate::prediction::{AgePrediction, ErrorKind, PredictionError, Source};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde_json::{json, Value};
use std::path::PathBuf;
use tempfile::NamedTempFile;
use tracing::debug;

/// Human-readable brackets for the labels the age model knows
const AGE_BRACKETS: [(&str, &str); 3] = [
    ("young", "0–2 years"),
    ("adult", "2–5 years"),
    ("senior", "6+ years"),
];

/// Map a model label to its bracket. Labels outside the table, including
/// other spellings of known ones, are returned unchanged
pub fn humanize_age_label(label: &str) -> String {
    AGE_BRACKETS
        .iter()
        .find(|(known, _)| *known == label)
        .map(|(_, bracket)| bracket.to_string())
        .unwrap_or_else(|| label.to_string())
}

pub struct AgeClassifier {
    http: reqwest::Client,
    base_url: String,
    api_name: String,
    token: Option<String>,
    scratch_dir: PathBuf,
}

impl AgeClassifier {
    pub fn new(http: reqwest::Client, settings: &AgeSettings) -> Self {
        let api_name = if settings.api_name.starts_with('/') {
            settings.api_name.clone()
        } else {
            format!("/{}", settings.api_name)
        };
        AgeClassifier {
            http,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_name,
            token: settings.token.clone(),
            scratch_dir: settings
                .scratch_dir
                .clone()
                .unwrap_or_else(std::env::temp_dir),
        }
    }

    /// Write the image to a temp file that is removed when the guard drops,
    /// whichever way the call ends
    async fn stage(&self, bytes: &[u8]) -> Result<NamedTempFile, PredictionError> {
        let ext = image::guess_format(bytes)
            .ok()
            .and_then(|format| format.extensions_str().first().copied())
            .unwrap_or("img");
        let file = tempfile::Builder::new()
            .prefix("dog-age-")
            .suffix(&format!(".{ext}"))
            .tempfile_in(&self.scratch_dir)
            .map_err(|e| io_error("could not create upload file", e))?;
        tokio::fs::write(file.path(), bytes)
            .await
            .map_err(|e| io_error("could not write upload file", e))?;
        Ok(file)
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn upload(&self, file: &NamedTempFile) -> Result<String, PredictionError> {
        let file_name = file
            .path()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload.img".into());
        let handle = tokio::fs::File::open(file.path())
            .await
            .map_err(|e| io_error("could not reopen upload file", e))?;
        let len = handle
            .metadata()
            .await
            .map_err(|e| io_error("could not stat upload file", e))?
            .len();

        let part = Part::stream_with_length(handle, len).file_name(file_name);
        let form = Form::new().part("files", part);
        let url = format!("{}/upload", self.base_url);
        let json = send(self.request(self.http.post(url).multipart(form))).await?;

        json.as_array()
            .and_then(|paths| paths.first())
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| shape_error(format!("upload returned no file path: {json}")))
    }

    async fn call(&self, path: &str) -> Result<Value, PredictionError> {
        let url = format!("{}/call{}", self.base_url, self.api_name);
        let body = json!({
            "data": [{ "path": path, "meta": { "_type": "gradio.FileData" } }]
        });
        let queued = send(self.request(self.http.post(&url).json(&body))).await?;
        let event_id = queued
            .get("event_id")
            .and_then(Value::as_str)
            .ok_or_else(|| shape_error(format!("call was not queued: {queued}")))?;
        debug!(event_id, "age prediction queued");

        let response = self
            .request(self.http.get(format!("{url}/{event_id}")))
            .send()
            .await
            .map_err(transport_error)?;
        let status = response.status();
        let text = response.text().await.map_err(transport_error)?;
        if !status.is_success() {
            return Err(status_error(status, &text));
        }
        parse_event_stream(&text)
    }
}

#[async_trait]
impl Classifier for AgeClassifier {
    type Payload = AgePrediction;

    fn source(&self) -> Source {
        Source::Age
    }

    async fn predict(&self, image: &[u8]) -> Result<AgePrediction, PredictionError> {
        let staged = self.stage(image).await?;
        let remote_path = self.upload(&staged).await?;
        let output = self.call(&remote_path).await?;
        drop(staged);

        let label = output_label(&output)?;
        Ok(AgePrediction {
            prediction: humanize_age_label(&label),
        })
    }
}

async fn send(builder: reqwest::RequestBuilder) -> Result<Value, PredictionError> {
    let response = builder.send().await.map_err(transport_error)?;
    let status = response.status();
    let text = response.text().await.map_err(transport_error)?;
    if !status.is_success() {
        return Err(status_error(status, &text));
    }
    serde_json::from_str(&text).map_err(|e| shape_error(format!("response is not JSON: {e}")))
}

/// Find the result of a finished call in a server-sent event stream. An
/// event's `data:` lines are joined with newlines before it is dispatched
fn parse_event_stream(body: &str) -> Result<Value, PredictionError> {
    let mut event: Option<&str> = None;
    let mut data: Vec<&str> = Vec::new();
    for line in body.lines().chain(std::iter::once("")) {
        if line.trim().is_empty() {
            if let Some(result) = dispatch_event(event.take(), &data.join("\n")) {
                return result;
            }
            data.clear();
        } else if let Some(name) = line.strip_prefix("event:") {
            event = Some(name.trim());
        } else if let Some(value) = line.strip_prefix("data:") {
            data.push(value.strip_prefix(' ').unwrap_or(value));
        }
    }
    Err(shape_error("event stream ended without a result"))
}

/// The outcome carried by a finished event, or `None` to keep reading
fn dispatch_event(event: Option<&str>, data: &str) -> Option<Result<Value, PredictionError>> {
    let data = data.trim();
    match event? {
        "complete" => Some(
            serde_json::from_str(data).map_err(|e| shape_error(format!("result is not JSON: {e}"))),
        ),
        "error" => {
            let message = match serde_json::from_str::<Value>(data) {
                Ok(Value::String(s)) => s,
                Ok(Value::Null) => "age app reported an error".to_string(),
                _ if data.is_empty() => "age app reported an error".to_string(),
                _ => data.to_string(),
            };
            Some(Err(PredictionError::application(Source::Age, message)))
        }
        _ => None,
    }
}

/// The label in `[output]`, where output is a bare label or `{"label": ...}`
fn output_label(data: &Value) -> Result<String, PredictionError> {
    let output = data
        .as_array()
        .and_then(|items| items.first())
        .ok_or_else(|| shape_error(format!("result has no outputs: {data}")))?;

    if let Some(err) = output.get("error").filter(|e| !e.is_null()) {
        let message = err.as_str().map(str::to_string).unwrap_or_else(|| err.to_string());
        return Err(PredictionError::application(Source::Age, message));
    }

    match output {
        Value::String(label) => Ok(label.clone()),
        Value::Object(obj) => obj
            .get("label")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| shape_error(format!("output has no label: {output}"))),
        other => Err(shape_error(format!("unexpected output: {other}"))),
    }
}

fn transport_error(err: reqwest::Error) -> PredictionError {
    PredictionError::transport(Source::Age, err.to_string())
}

fn io_error(context: &str, err: std::io::Error) -> PredictionError {
    PredictionError::transport(Source::Age, format!("{context}: {err}"))
}

fn shape_error(message: impl Into<String>) -> PredictionError {
    PredictionError::shape(Source::Age, message)
}

fn status_error(status: reqwest::StatusCode, body: &str) -> PredictionError {
    PredictionError::new(
        Source::Age,
        ErrorKind::Status(status.as_u16()),
        format!("age app returned HTTP {}: {}", status.as_u16(), body.trim()),
    )
}
