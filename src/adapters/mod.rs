//! Adapters normalize one external classification service each into the same
//! `predict(bytes) -> Result<Payload, PredictionError>` contract. Protocol
//! details live in the submodules; the time budget, transport retry and the
//! failure log entry are applied uniformly by `Guarded`.

pub mod age;
pub mod custom_vision;

use crate::config::PolicySettings;
use crate::prediction::{ErrorKind, PredictionError, Source};
use async_trait::async_trait;
use rand::Rng;
use std::time::Duration;
use tracing::{debug, error};

pub use age::AgeClassifier;
pub use custom_vision::{AnimalTypeClassifier, BreedClassifier, CustomVisionClient};

/// A remote image classifier behind the uniform prediction contract
#[async_trait]
pub trait Classifier: Send + Sync {
    type Payload: Send;

    /// The service this adapter talks to
    fn source(&self) -> Source;

    /// Classify an image. Never panics or propagates anything but a
    /// `PredictionError`
    async fn predict(&self, image: &[u8]) -> Result<Self::Payload, PredictionError>;
}

/// Limits applied to every call of a single adapter
#[derive(Debug, Clone, Copy)]
pub struct CallPolicy {
    /// Upper bound on the whole call, retries included
    pub timeout: Duration,

    /// Extra attempts after a transport failure. Zero disables retrying
    pub transport_retries: u32,

    /// Base delay between attempts, doubled on each retry
    pub retry_backoff: Duration,
}

impl Default for CallPolicy {
    fn default() -> Self {
        CallPolicy {
            timeout: Duration::from_secs(20),
            transport_retries: 0,
            retry_backoff: Duration::from_millis(200),
        }
    }
}

impl From<&PolicySettings> for CallPolicy {
    fn from(settings: &PolicySettings) -> Self {
        CallPolicy {
            timeout: Duration::from_secs(settings.adapter_timeout_secs),
            transport_retries: settings.transport_retries,
            retry_backoff: Duration::from_millis(settings.retry_backoff_ms),
        }
    }
}

/// Wraps an adapter with a time budget, bounded transport retry and a single
/// error log entry per failed call
pub struct Guarded<C> {
    inner: C,
    policy: CallPolicy,
}

impl<C: Classifier> Guarded<C> {
    pub fn new(inner: C, policy: CallPolicy) -> Self {
        Guarded { inner, policy }
    }

    async fn attempts(&self, image: &[u8]) -> Result<C::Payload, PredictionError> {
        let mut attempt = 0;
        loop {
            match self.inner.predict(image).await {
                Err(err)
                    if err.kind() == ErrorKind::Transport
                        && attempt < self.policy.transport_retries =>
                {
                    let delay = backoff_delay(self.policy.retry_backoff, attempt);
                    attempt += 1;
                    debug!(
                        source = %self.inner.source(),
                        attempt,
                        "retrying after transport failure in {delay:?}: {err}"
                    );
                    tokio::time::sleep(delay).await;
                }
                outcome => return outcome,
            }
        }
    }
}

/// Exponential backoff with up to 50% random jitter on top
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let exp = base.saturating_mul(1u32 << attempt.min(10));
    let max_jitter = exp.as_millis() as u64 / 2;
    let jitter = rand::thread_rng().gen_range(0, max_jitter + 1);
    exp + Duration::from_millis(jitter)
}

#[async_trait]
impl<C: Classifier> Classifier for Guarded<C> {
    type Payload = C::Payload;

    fn source(&self) -> Source {
        self.inner.source()
    }

    async fn predict(&self, image: &[u8]) -> Result<Self::Payload, PredictionError> {
        let source = self.inner.source();
        let outcome = match tokio::time::timeout(self.policy.timeout, self.attempts(image)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(PredictionError::new(
                source,
                ErrorKind::Timeout,
                format!(
                    "{source} classifier did not answer within {:?}",
                    self.policy.timeout
                ),
            )),
        };

        if let Err(err) = &outcome {
            error!(source = %source, kind = ?err.kind(), "prediction failed: {err}");
        }
        outcome
    }
}
