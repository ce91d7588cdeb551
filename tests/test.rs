use std::{
    io::Cursor,
    path::Path,
    sync::{Arc, Mutex},
};

use actix_web::{App, http::StatusCode, http::header, test, web};
use futures::future::BoxFuture;
use image::DynamicImage;
use lettre::Message;
use serde_json::Value;

use pothole_reporter::{
    AlertService, AppState, ArtifactStore, MailTransport, ObjectModel, PotholeDetector,
    RawPrediction, ResponsePayload, UploadedImage,
    config::constants,
    detector::{load_labels, qualifying_predictions},
    error::{AlertError, DetectionError},
    handle_detection_request,
    routes::configure_api,
};

const BOUNDARY: &str = "----pothole-test-boundary";
const RECIPIENT: &str = "appbaches@gmail.com";

/// Model stub that replays fixed predictions through the same threshold
/// filter the Darknet backend uses.
struct ScriptedModel {
    predictions: Vec<RawPrediction>,
}

impl ObjectModel for ScriptedModel {
    fn predict(
        &self,
        _image: DynamicImage,
        confidence_threshold: f32,
    ) -> Result<Vec<RawPrediction>, DetectionError> {
        Ok(qualifying_predictions(
            self.predictions
                .iter()
                .map(|p| (p.class_index, p.confidence)),
            confidence_threshold,
        ))
    }
}

#[derive(Default)]
struct RecordingTransport {
    sent: Mutex<Vec<Message>>,
}

impl RecordingTransport {
    fn formatted(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|m| String::from_utf8_lossy(&m.formatted()).into_owned())
            .collect()
    }
}

impl MailTransport for RecordingTransport {
    fn send(&self, message: Message) -> BoxFuture<'_, Result<(), AlertError>> {
        self.sent.lock().unwrap().push(message);
        Box::pin(async { Ok::<(), AlertError>(()) })
    }
}

struct FailingTransport;

impl MailTransport for FailingTransport {
    fn send(&self, _message: Message) -> BoxFuture<'_, Result<(), AlertError>> {
        Box::pin(async {
            Err::<(), AlertError>(AlertError::SendFailed {
                reason: "535 5.7.8 Username and Password not accepted".to_string(),
            })
        })
    }
}

fn prediction(class_index: usize, confidence: f32) -> RawPrediction {
    RawPrediction {
        class_index,
        confidence,
    }
}

fn detector(labels: &[&str], predictions: Vec<RawPrediction>) -> PotholeDetector {
    PotholeDetector::new(
        Box::new(ScriptedModel { predictions }),
        labels.iter().map(|l| l.to_string()).collect(),
    )
}

fn state(
    upload_dir: &Path,
    detector: PotholeDetector,
    transport: Arc<dyn MailTransport>,
) -> AppState {
    AppState::new(
        ArtifactStore::new(upload_dir),
        detector,
        AlertService::new(
            transport,
            "reportes@example.com".to_string(),
            RECIPIENT.to_string(),
        ),
        constants::SIMULATED_LOCATION.to_string(),
    )
}

fn jpeg_bytes() -> Vec<u8> {
    let img = image::RgbImage::from_pixel(8, 8, image::Rgb([90, 90, 90]));
    let mut buffer = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut buffer), image::ImageFormat::Jpeg)
        .unwrap();
    buffer
}

fn upload(filename: &str, bytes: Vec<u8>) -> UploadedImage {
    UploadedImage {
        filename: filename.to_string(),
        bytes,
    }
}

fn multipart_body(field: &str, filename: Option<&str>, content: &[u8]) -> Vec<u8> {
    let disposition = match filename {
        Some(name) => format!("form-data; name=\"{}\"; filename=\"{}\"", field, name),
        None => format!("form-data; name=\"{}\"", field),
    };
    let mut body = format!(
        "--{}\r\nContent-Disposition: {}\r\nContent-Type: image/jpeg\r\n\r\n",
        BOUNDARY, disposition
    )
    .into_bytes();
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

fn detect_request(body: Vec<u8>) -> test::TestRequest {
    test::TestRequest::post()
        .uri("/api/detect-bache")
        .insert_header((
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        ))
        .set_payload(body)
}

fn assert_timestamp(value: &Value) {
    let text = value.as_str().expect("fecha_hora should be a string");
    assert!(
        chrono::NaiveDateTime::parse_from_str(text, constants::TIMESTAMP_FORMAT).is_ok(),
        "unexpected timestamp format: {}",
        text
    );
}

#[actix_web::test]
async fn test_pothole_upload_reports_detection() {
    let dir = tempfile::tempdir().unwrap();
    let transport = Arc::new(RecordingTransport::default());
    let state = state(
        dir.path(),
        detector(&["bache_profundo"], vec![prediction(0, 0.81)]),
        transport.clone(),
    );
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state))
            .configure(configure_api),
    )
    .await;

    let resp = test::call_service(
        &app,
        detect_request(multipart_body("file", Some("pothole_01.jpg"), &jpeg_bytes())).to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["tipo"], "bache_profundo");
    assert_eq!(body["ubicacion"], "Lat: 19.4326, Lon: -99.1332");
    assert_timestamp(&body["fecha_hora"]);
    assert!(body.get("error").is_none());

    let sent = transport.formatted();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].contains("Subject: Reporte: Bache detectado"));
    assert!(sent[0].contains("To: appbaches@gmail.com"));
    assert!(sent[0].contains("Content-Type: image/jpeg"));
}

#[actix_web::test]
async fn test_upload_without_image_extension_is_decoded() {
    let dir = tempfile::tempdir().unwrap();
    let transport = Arc::new(RecordingTransport::default());
    let state = state(
        dir.path(),
        detector(&["bache_profundo"], vec![prediction(0, 0.81)]),
        transport.clone(),
    );
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state))
            .configure(configure_api),
    )
    .await;

    // Browsers send pasted or captured images as "blob".
    let resp = test::call_service(
        &app,
        detect_request(multipart_body("file", Some("blob"), &jpeg_bytes())).to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["tipo"], "bache_profundo");
    assert_eq!(transport.formatted().len(), 1);
}

#[actix_web::test]
async fn test_clean_road_reports_no_detection() {
    let dir = tempfile::tempdir().unwrap();
    let transport = Arc::new(RecordingTransport::default());
    let state = state(dir.path(), detector(&["bache"], vec![]), transport.clone());
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state))
            .configure(configure_api),
    )
    .await;

    let resp = test::call_service(
        &app,
        detect_request(multipart_body("file", Some("clean_road.jpg"), &jpeg_bytes())).to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["tipo"], "No detectado");

    let sent = transport.formatted();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].contains("Subject: Reporte: Sin baches detectados"));
}

#[actix_web::test]
async fn test_threshold_is_inclusive_at_point_seven() {
    let dir = tempfile::tempdir().unwrap();
    let transport = Arc::new(RecordingTransport::default());
    let state = state(
        dir.path(),
        detector(
            &["grieta", "bache"],
            vec![prediction(0, 0.69), prediction(1, 0.70)],
        ),
        transport.clone(),
    );

    let (status, payload) =
        handle_detection_request(&state, upload("threshold.jpg", jpeg_bytes())).await;
    assert_eq!(status, StatusCode::OK);
    match payload {
        ResponsePayload::Detection { tipo, .. } => assert_eq!(tipo, "bache"),
        other => panic!("unexpected payload: {:?}", other),
    }
}

#[actix_web::test]
async fn test_below_threshold_only_is_no_detection() {
    let dir = tempfile::tempdir().unwrap();
    let transport = Arc::new(RecordingTransport::default());
    let state = state(
        dir.path(),
        detector(&["bache"], vec![prediction(0, 0.69)]),
        transport.clone(),
    );

    let (_, payload) = handle_detection_request(&state, upload("faint.jpg", jpeg_bytes())).await;
    match payload {
        ResponsePayload::Detection { tipo, .. } => assert_eq!(tipo, "No detectado"),
        other => panic!("unexpected payload: {:?}", other),
    }
    assert!(transport.formatted()[0].contains("Subject: Reporte: Sin baches detectados"));
}

#[actix_web::test]
async fn test_labels_joined_in_detection_order() {
    let dir = tempfile::tempdir().unwrap();
    let transport = Arc::new(RecordingTransport::default());
    let state = state(
        dir.path(),
        detector(
            &["bache", "grieta"],
            vec![prediction(1, 0.9), prediction(0, 0.75), prediction(1, 0.8)],
        ),
        transport,
    );

    let (_, payload) = handle_detection_request(&state, upload("many.jpg", jpeg_bytes())).await;
    match payload {
        ResponsePayload::Detection { tipo, .. } => assert_eq!(tipo, "grieta, bache, grieta"),
        other => panic!("unexpected payload: {:?}", other),
    }
}

#[actix_web::test]
async fn test_notification_failure_does_not_change_response() {
    let dir = tempfile::tempdir().unwrap();
    let model = || detector(&["bache_profundo"], vec![prediction(0, 0.81)]);

    let ok_state = state(dir.path(), model(), Arc::new(RecordingTransport::default()));
    let failing_state = state(dir.path(), model(), Arc::new(FailingTransport));

    let (ok_status, ok_payload) =
        handle_detection_request(&ok_state, upload("pothole_01.jpg", jpeg_bytes())).await;
    let (failing_status, failing_payload) =
        handle_detection_request(&failing_state, upload("pothole_01.jpg", jpeg_bytes())).await;

    assert_eq!(ok_status, StatusCode::OK);
    assert_eq!(failing_status, ok_status);
    match (ok_payload, failing_payload) {
        (
            ResponsePayload::Detection {
                tipo: a_tipo,
                ubicacion: a_ubicacion,
                ..
            },
            ResponsePayload::Detection {
                tipo: b_tipo,
                ubicacion: b_ubicacion,
                ..
            },
        ) => {
            assert_eq!(a_tipo, b_tipo);
            assert_eq!(a_ubicacion, b_ubicacion);
        }
        other => panic!("unexpected payloads: {:?}", other),
    }
}

#[actix_web::test]
async fn test_storage_failure_is_server_error() {
    let dir = tempfile::tempdir().unwrap();
    // A regular file where the upload directory should be.
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, b"not a directory").unwrap();

    let transport = Arc::new(RecordingTransport::default());
    let state = state(
        &blocker.join("uploads"),
        detector(&["bache"], vec![prediction(0, 0.9)]),
        transport.clone(),
    );
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state))
            .configure(configure_api),
    )
    .await;

    let resp = test::call_service(
        &app,
        detect_request(multipart_body("file", Some("pothole_01.jpg"), &jpeg_bytes())).to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let body: Value = test::read_body_json(resp).await;
    assert!(body["error"].is_string());
    assert!(body.get("tipo").is_none());
    assert!(!body["error"].as_str().unwrap().contains("blocker"));
    assert!(transport.formatted().is_empty());
}

#[actix_web::test]
async fn test_corrupt_image_is_generic_server_error() {
    let dir = tempfile::tempdir().unwrap();
    let transport = Arc::new(RecordingTransport::default());
    let state = state(
        dir.path(),
        detector(&["bache"], vec![prediction(0, 0.9)]),
        transport.clone(),
    );

    let (status, payload) =
        handle_detection_request(&state, upload("broken.jpg", b"definitely not a jpeg".to_vec()))
            .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    match payload {
        ResponsePayload::Error { error } => {
            assert!(!error.contains("broken.jpg"));
            assert!(!error.contains(&dir.path().display().to_string()));
        }
        other => panic!("unexpected payload: {:?}", other),
    }
    assert!(transport.formatted().is_empty());
}

#[actix_web::test]
async fn test_request_without_file_is_bad_request() {
    let dir = tempfile::tempdir().unwrap();
    let state = state(
        dir.path(),
        detector(&["bache"], vec![]),
        Arc::new(RecordingTransport::default()),
    );
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state))
            .configure(configure_api),
    )
    .await;

    let resp = test::call_service(
        &app,
        detect_request(multipart_body("note", None, b"hola")).to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let body: Value = test::read_body_json(resp).await;
    assert!(body["error"].is_string());
}

#[actix_web::test]
async fn test_oversized_upload_is_bad_request() {
    let dir = tempfile::tempdir().unwrap();
    let transport = Arc::new(RecordingTransport::default());
    let jpeg = jpeg_bytes();
    let state = state(
        dir.path(),
        detector(&["bache"], vec![prediction(0, 0.9)]),
        transport.clone(),
    )
    .with_max_upload_bytes(jpeg.len() - 1);
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state))
            .configure(configure_api),
    )
    .await;

    let resp = test::call_service(
        &app,
        detect_request(multipart_body("file", Some("pothole_01.jpg"), &jpeg)).to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "La imagen excede el tamaño máximo permitido.");
    assert!(transport.formatted().is_empty());
    assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
}

#[actix_web::test]
async fn test_upload_at_size_limit_is_accepted() {
    let dir = tempfile::tempdir().unwrap();
    let jpeg = jpeg_bytes();
    let state = state(
        dir.path(),
        detector(&["bache"], vec![prediction(0, 0.9)]),
        Arc::new(RecordingTransport::default()),
    )
    .with_max_upload_bytes(jpeg.len());
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state))
            .configure(configure_api),
    )
    .await;

    let resp = test::call_service(
        &app,
        detect_request(multipart_body("file", Some("pothole_01.jpg"), &jpeg)).to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[actix_web::test]
async fn test_index_page_served() {
    let dir = tempfile::tempdir().unwrap();
    let state = state(
        dir.path(),
        detector(&["bache"], vec![]),
        Arc::new(RecordingTransport::default()),
    );
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state))
            .configure(configure_api),
    )
    .await;

    let resp = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = test::read_body(resp).await;
    assert!(String::from_utf8_lossy(&body).contains("/api/detect-bache"));
}

#[actix_web::test]
async fn test_same_filename_never_collides() {
    let dir = tempfile::tempdir().unwrap();
    let store = ArtifactStore::new(dir.path().join("uploads"));

    let (first, second) = futures::join!(
        store.store("pothole_01.jpg", b"first"),
        store.store("pothole_01.jpg", b"second"),
    );
    let first = first.unwrap();
    let second = second.unwrap();

    assert_ne!(first, second);
    assert_eq!(std::fs::read(&first).unwrap(), b"first");
    assert_eq!(std::fs::read(&second).unwrap(), b"second");
}

#[::core::prelude::v1::test]
fn test_detector_maps_unknown_class_index() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("road.jpg");
    std::fs::write(&path, jpeg_bytes()).unwrap();

    let detector = detector(&["bache"], vec![prediction(0, 0.95), prediction(7, 0.8)]);
    let result = detector
        .detect(&path, constants::CONFIDENCE_THRESHOLD)
        .unwrap();
    assert_eq!(result.labels(), vec!["bache", "unknown"]);
    assert_eq!(result.max_confidence(), Some(0.95));
}

#[::core::prelude::v1::test]
fn test_detector_sniffs_format_instead_of_extension() {
    let dir = tempfile::tempdir().unwrap();
    let detector = detector(&["bache"], vec![prediction(0, 0.9)]);

    for name in ["blob", "photo.jfif", "photo.png"] {
        let path = dir.path().join(name);
        std::fs::write(&path, jpeg_bytes()).unwrap();

        let result = detector
            .detect(&path, constants::CONFIDENCE_THRESHOLD)
            .unwrap();
        assert_eq!(result.labels(), vec!["bache"], "file name {}", name);
    }
}

#[::core::prelude::v1::test]
fn test_detector_rejects_undecodable_image() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("road.jpg");
    std::fs::write(&path, b"garbage").unwrap();

    let err = detector(&["bache"], vec![])
        .detect(&path, constants::CONFIDENCE_THRESHOLD)
        .unwrap_err();
    assert!(matches!(err, DetectionError::InvalidImage { .. }));
}

#[::core::prelude::v1::test]
fn test_load_labels_skips_blank_lines() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("labels.txt");
    std::fs::write(&path, "bache\n\n  grieta \n").unwrap();

    assert_eq!(load_labels(&path).unwrap(), vec!["bache", "grieta"]);

    std::fs::write(&path, "\n\n").unwrap();
    assert!(matches!(
        load_labels(&path),
        Err(DetectionError::LabelsLoadFailed { .. })
    ));
}
