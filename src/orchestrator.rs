//! The orchestrator owns one long-lived adapter per external classifier and
//! runs the per-request flows: breed (primary) with dog age (secondary), or
//! the dog/cat classifier alone.

use crate::adapters::{
    AgeClassifier, AnimalTypeClassifier, BreedClassifier, CallPolicy, Classifier, Guarded,
};
use crate::assembler::{self, CompositeResult};
use crate::config::Settings;
use crate::prediction::{
    AgePrediction, AnimalTypePrediction, BreedPrediction, ImagePayload, PredictionRequestKind,
};
use anyhow::{Context, Result};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub type BreedSource = Arc<dyn Classifier<Payload = BreedPrediction>>;
pub type AnimalTypeSource = Arc<dyn Classifier<Payload = AnimalTypePrediction>>;
pub type AgeSource = Arc<dyn Classifier<Payload = AgePrediction>>;

/// The response for either kind of prediction request
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PredictionResponse {
    BreedWithAge(CompositeResult<BreedPrediction, AgePrediction>),
    AnimalType(CompositeResult<AnimalTypePrediction>),
}

impl PredictionResponse {
    pub fn is_success(&self) -> bool {
        match self {
            PredictionResponse::BreedWithAge(result) => result.is_success(),
            PredictionResponse::AnimalType(result) => result.is_success(),
        }
    }
}

pub struct Orchestrator {
    breed: BreedSource,
    animal_type: AnimalTypeSource,
    age: AgeSource,
}

impl Orchestrator {
    pub fn new(breed: BreedSource, animal_type: AnimalTypeSource, age: AgeSource) -> Self {
        Orchestrator {
            breed,
            animal_type,
            age,
        }
    }

    /// Build the real adapters, sharing one HTTP connection pool between them
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(settings.policy.connect_timeout_secs))
            .build()
            .context("failed to build HTTP client")?;
        let policy = CallPolicy::from(&settings.policy);

        info!(
            breed = %settings.breed.endpoint,
            animal_type = %settings.animal_type.endpoint,
            age = %settings.age.base_url,
            timeout = ?policy.timeout,
            retries = policy.transport_retries,
            "configured classifiers"
        );

        Ok(Orchestrator::new(
            Arc::new(Guarded::new(
                BreedClassifier::new(http.clone(), &settings.breed),
                policy,
            )),
            Arc::new(Guarded::new(
                AnimalTypeClassifier::new(http.clone(), &settings.animal_type),
                policy,
            )),
            Arc::new(Guarded::new(AgeClassifier::new(http, &settings.age), policy)),
        ))
    }

    pub async fn predict(
        &self,
        kind: PredictionRequestKind,
        image: &ImagePayload,
    ) -> PredictionResponse {
        debug!(
            ?kind,
            content_type = image.content_type(),
            bytes = image.bytes().len(),
            "running prediction"
        );
        match kind {
            PredictionRequestKind::BreedWithAge => {
                PredictionResponse::BreedWithAge(self.breed_with_age(image).await)
            }
            PredictionRequestKind::AnimalType => {
                PredictionResponse::AnimalType(self.animal_type(image).await)
            }
        }
    }

    /// Breed and age run concurrently. Only the breed outcome decides whether
    /// the request succeeds
    pub async fn breed_with_age(
        &self,
        image: &ImagePayload,
    ) -> CompositeResult<BreedPrediction, AgePrediction> {
        let (age, breed) = tokio::join!(
            self.age.predict(image.bytes()),
            self.breed.predict(image.bytes())
        );
        assembler::assemble(breed, Some(age))
    }

    pub async fn animal_type(&self, image: &ImagePayload) -> CompositeResult<AnimalTypePrediction> {
        assembler::assemble(self.animal_type.predict(image.bytes()).await, None)
    }
}
