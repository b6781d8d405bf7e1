//! The user-facing JSON web server. Each route takes a multipart image upload,
//! checks it is an image and hands it to the orchestrator.

use super::protocol;
use super::WebError;
use crate::orchestrator::Orchestrator;
use crate::prediction::PredictionRequestKind;
use actix_multipart::Multipart;
use actix_web::{post, web, HttpResponse};
use tracing::{info, warn};

type Result<T> = std::result::Result<T, WebError>;

/// Shared, read-only state behind every route
pub struct AppState {
    pub orchestrator: Orchestrator,
    pub max_upload_bytes: usize,
}

/// Register the prediction routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(predict_breeds).service(predict_animal_type);
}

/// Breed prediction with the dog age attached
#[post("/predict_breeds/")]
pub async fn predict_breeds(payload: Multipart, state: web::Data<AppState>) -> Result<HttpResponse> {
    serve(PredictionRequestKind::BreedWithAge, payload, &state).await
}

/// Dog or cat
#[post("/predict_animal_type/")]
pub async fn predict_animal_type(
    payload: Multipart,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    serve(PredictionRequestKind::AnimalType, payload, &state).await
}

async fn serve(
    kind: PredictionRequestKind,
    payload: Multipart,
    state: &AppState,
) -> Result<HttpResponse> {
    let image = protocol::read_image(payload, state.max_upload_bytes).await?;
    let response = state.orchestrator.predict(kind, &image).await;

    if response.is_success() {
        info!(?kind, "finished serving prediction request");
        Ok(HttpResponse::Ok().json(response))
    } else {
        warn!(?kind, "prediction request failed");
        Ok(HttpResponse::InternalServerError().json(response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::testing::Fake;
    use crate::prediction::{
        AgePrediction, AnimalTypePrediction, BreedPrediction, BreedScore, ErrorKind, Source,
    };
    use actix_web::http::{header, StatusCode};
    use actix_web::{test, App};
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const BOUNDARY: &str = "----petclassifierboundary";

    struct Calls {
        breed: Arc<AtomicUsize>,
        animal: Arc<AtomicUsize>,
        age: Arc<AtomicUsize>,
    }

    impl Calls {
        fn total(&self) -> usize {
            [&self.breed, &self.animal, &self.age]
                .iter()
                .map(|c| c.load(Ordering::SeqCst))
                .sum()
        }
    }

    fn labrador() -> BreedPrediction {
        BreedPrediction {
            breeds: vec![
                BreedScore {
                    name: "Labrador".into(),
                    confidence: 0.92,
                },
                BreedScore {
                    name: "Golden Retriever".into(),
                    confidence: 0.05,
                },
            ],
        }
    }

    fn state(
        breed: Fake<BreedPrediction>,
        animal: Fake<AnimalTypePrediction>,
        age: Fake<AgePrediction>,
    ) -> (web::Data<AppState>, Calls) {
        let calls = Calls {
            breed: breed.calls.clone(),
            animal: animal.calls.clone(),
            age: age.calls.clone(),
        };
        let state = AppState {
            orchestrator: Orchestrator::new(Arc::new(breed), Arc::new(animal), Arc::new(age)),
            max_upload_bytes: 1024,
        };
        (web::Data::new(state), calls)
    }

    fn healthy() -> (web::Data<AppState>, Calls) {
        state(
            Fake::ok(Source::Breed, labrador()),
            Fake::ok(
                Source::AnimalType,
                AnimalTypePrediction {
                    animal_type: "dog".into(),
                    animal_confidence: 0.87,
                },
            ),
            Fake::ok(
                Source::Age,
                AgePrediction {
                    prediction: "2–5 years".into(),
                },
            ),
        )
    }

    fn multipart(field: &str, content_type: &str, data: &[u8]) -> Vec<u8> {
        let mut body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"pet.jpg\"\r\nContent-Type: {content_type}\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn upload(uri: &str, body: Vec<u8>) -> test::TestRequest {
        test::TestRequest::post()
            .uri(uri)
            .insert_header((
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            ))
            .set_payload(body)
    }

    macro_rules! app {
        ($state:expr) => {
            test::init_service(App::new().app_data($state).configure(configure)).await
        };
    }

    #[actix_web::test]
    async fn breeds_with_age() {
        let (state, calls) = healthy();
        let app = app!(state);
        let resp = test::call_service(
            &app,
            upload("/predict_breeds/", multipart("file", "image/jpeg", b"jpeg")).to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(
            body,
            json!({
                "breeds": [
                    { "name": "Labrador", "confidence": 0.92 },
                    { "name": "Golden Retriever", "confidence": 0.05 }
                ],
                "dog_age_prediction": { "prediction": "2–5 years" }
            })
        );
        assert_eq!(calls.animal.load(Ordering::SeqCst), 0);
    }

    #[actix_web::test]
    async fn animal_type() {
        let (state, _) = healthy();
        let app = app!(state);
        let resp = test::call_service(
            &app,
            upload("/predict_animal_type/", multipart("file", "image/png", b"png")).to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body, json!({ "animal_type": "dog", "animal_confidence": 0.87 }));
    }

    #[actix_web::test]
    async fn non_images_are_rejected_before_any_classifier() {
        let (state, calls) = healthy();
        let app = app!(state);
        for uri in ["/predict_breeds/", "/predict_animal_type/"] {
            for _ in 0..2 {
                let req = upload(uri, multipart("file", "text/plain", b"hi")).to_request();
                let resp = test::call_service(&app, req).await;
                assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
                let body: Value = test::read_body_json(resp).await;
                assert_eq!(body, json!({ "error": "uploaded file is not an image" }));
            }
        }
        assert_eq!(calls.total(), 0);
    }

    #[actix_web::test]
    async fn breed_failure_is_a_server_error() {
        let (state, _) = state(
            Fake::failing(Source::Breed, ErrorKind::Transport, "connection refused"),
            Fake::ok(
                Source::AnimalType,
                AnimalTypePrediction {
                    animal_type: "cat".into(),
                    animal_confidence: 0.99,
                },
            ),
            Fake::ok(
                Source::Age,
                AgePrediction {
                    prediction: "puppy".into(),
                },
            ),
        );
        let app = app!(state);
        let resp = test::call_service(
            &app,
            upload("/predict_breeds/", multipart("file", "image/jpeg", b"jpeg")).to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(
            body,
            json!({ "error": "breed prediction failed: connection refused" })
        );
    }

    #[actix_web::test]
    async fn age_failure_keeps_success_status() {
        let (state, _) = state(
            Fake::ok(Source::Breed, labrador()),
            Fake::failing(Source::AnimalType, ErrorKind::Shape, "unused"),
            Fake::failing(Source::Age, ErrorKind::Timeout, "age classifier did not answer"),
        );
        let app = app!(state);
        let resp = test::call_service(
            &app,
            upload("/predict_breeds/", multipart("file", "image/jpeg", b"jpeg")).to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["breeds"][0]["name"], "Labrador");
        assert_eq!(
            body["dog_age_prediction"]["error"],
            "age classifier did not answer"
        );
    }

    #[actix_web::test]
    async fn animal_type_failure_is_a_server_error() {
        let (state, _) = state(
            Fake::ok(Source::Breed, labrador()),
            Fake::failing(Source::AnimalType, ErrorKind::Status(401), "access denied"),
            Fake::ok(
                Source::Age,
                AgePrediction {
                    prediction: "adult".into(),
                },
            ),
        );
        let app = app!(state);
        let resp = test::call_service(
            &app,
            upload("/predict_animal_type/", multipart("file", "image/jpeg", b"jpeg")).to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(
            body,
            json!({ "error": "animal type prediction failed: access denied" })
        );
    }

    #[actix_web::test]
    async fn missing_file_field() {
        let (state, calls) = healthy();
        let app = app!(state);
        let resp = test::call_service(
            &app,
            upload("/predict_breeds/", multipart("picture", "image/jpeg", b"jpeg")).to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body, json!({ "error": "missing `file` field in upload" }));
        assert_eq!(calls.total(), 0);
    }

    #[actix_web::test]
    async fn content_type_prefix_is_case_sensitive() {
        let (state, calls) = healthy();
        let app = app!(state);
        for content_type in ["IMAGE/PNG", "Image/jpeg"] {
            let req = upload("/predict_breeds/", multipart("file", content_type, b"png")).to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{content_type}");
        }
        assert_eq!(calls.total(), 0);
    }

    #[actix_web::test]
    async fn oversized_upload() {
        let (state, calls) = healthy();
        let app = app!(state);
        let resp = test::call_service(
            &app,
            upload("/predict_breeds/", multipart("file", "image/jpeg", &[7u8; 4096])).to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(calls.total(), 0);
    }
}
