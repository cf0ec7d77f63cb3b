// src/handlers.rs
use crate::{AppState, errors::SkinReportError, services::intake::Document};
use actix_multipart::Multipart;
use actix_web::{Error, HttpResponse, web};
use base64::{Engine as _, engine::general_purpose};
use futures_util::TryStreamExt;
use log::info;
use serde::Deserialize;
use std::path::Path;
use uuid::Uuid;

const MAX_ACTUAL_AGE: u32 = 120;
const MAX_AGE_FIELD_BYTES: usize = 16;

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .route("/reports", web::post().to(upload_report))
            .route("/reports/base64", web::post().to(submit_base64))
            .route("/reports/local", web::post().to(submit_local))
            .route("/reports/{report_id}", web::get().to(get_report)),
    );
}

/// JSON bodies carry base64 documents, so the limit follows the document ceiling.
pub fn json_config(max_document_bytes: usize) -> web::JsonConfig {
    web::JsonConfig::default().limit(max_document_bytes / 3 * 4 + 64 * 1024)
}

fn validate_age(age: Option<u32>) -> Result<Option<u32>, SkinReportError> {
    match age {
        Some(a) if a == 0 || a > MAX_ACTUAL_AGE => Err(SkinReportError::Validation(format!(
            "actualAge must be between 1 and {}",
            MAX_ACTUAL_AGE
        ))),
        other => Ok(other),
    }
}

async fn build_report(
    data: &AppState,
    document: Document,
    actual_age: Option<u32>,
) -> Result<HttpResponse, Error> {
    info!(
        "Document {} received: '{}' ({:?}, {} page(s))",
        document.id, document.filename, document.kind, document.page_count
    );
    let report = data.pipeline.run(&document, actual_age).await?;
    Ok(HttpResponse::Ok().json(&report))
}

pub async fn upload_report(
    mut payload: Multipart,
    data: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let max_bytes = data.pipeline.config().max_document_bytes;
    let mut upload: Option<(String, Vec<u8>)> = None;
    let mut actual_age = None;

    while let Some(mut field) = payload.try_next().await? {
        let name = field.name().to_string();
        match name.as_str() {
            "file" => {
                let filename = field
                    .content_disposition()
                    .get_filename()
                    .unwrap_or("document")
                    .to_string();

                let mut bytes = Vec::new();
                while let Some(chunk) = field.try_next().await? {
                    if bytes.len() + chunk.len() > max_bytes {
                        return Err(SkinReportError::TooLarge {
                            size: bytes.len() + chunk.len(),
                            limit: max_bytes,
                        }
                        .into());
                    }
                    bytes.extend_from_slice(&chunk);
                }
                upload = Some((filename, bytes));
            }
            "actual_age" => {
                let mut raw = Vec::new();
                while let Some(chunk) = field.try_next().await? {
                    if raw.len() + chunk.len() > MAX_AGE_FIELD_BYTES {
                        return Err(SkinReportError::Validation(format!(
                            "actual_age exceeds {} bytes",
                            MAX_AGE_FIELD_BYTES
                        ))
                        .into());
                    }
                    raw.extend_from_slice(&chunk);
                }
                let text = String::from_utf8_lossy(&raw);
                let text = text.trim();
                if !text.is_empty() {
                    let age = text.parse::<u32>().map_err(|_| {
                        SkinReportError::Validation(format!("actual_age '{}' is not a number", text))
                    })?;
                    actual_age = Some(age);
                }
            }
            _ => while field.try_next().await?.is_some() {},
        }
    }

    let (filename, bytes) = upload
        .ok_or_else(|| SkinReportError::Validation("Missing 'file' field".to_string()))?;
    let actual_age = validate_age(actual_age)?;
    let document = Document::from_bytes(&filename, bytes, max_bytes)?;

    build_report(&data, document, actual_age).await
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Base64Submission {
    pub filename: String,
    pub data: String,
    #[serde(default)]
    pub actual_age: Option<u32>,
}

pub async fn submit_base64(
    data: web::Data<AppState>,
    body: web::Json<Base64Submission>,
) -> Result<HttpResponse, Error> {
    let submission = body.into_inner();
    let max_bytes = data.pipeline.config().max_document_bytes;

    // Accept bare base64 or a data URL.
    let encoded = match submission.data.split_once(";base64,") {
        Some((_, rest)) => rest,
        None => submission.data.as_str(),
    };
    let bytes = general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|e| SkinReportError::Validation(format!("data is not valid base64: {}", e)))?;

    let actual_age = validate_age(submission.actual_age)?;
    let document = Document::from_bytes(&submission.filename, bytes, max_bytes)?;

    build_report(&data, document, actual_age).await
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalSubmission {
    pub path: String,
    #[serde(default)]
    pub actual_age: Option<u32>,
}

pub async fn submit_local(
    data: web::Data<AppState>,
    body: web::Json<LocalSubmission>,
) -> Result<HttpResponse, Error> {
    let root = data
        .local_intake_root
        .as_ref()
        .ok_or_else(|| SkinReportError::NotFound("Local intake is disabled".to_string()))?;
    let submission = body.into_inner();

    let path = resolve_local_path(root, &submission.path)?;
    let actual_age = validate_age(submission.actual_age)?;
    let document = Document::from_path(&path, data.pipeline.config().max_document_bytes)?;

    build_report(&data, document, actual_age).await
}

/// Canonical path of `requested` under `root`; anything outside the root is refused.
fn resolve_local_path(root: &Path, requested: &str) -> Result<std::path::PathBuf, SkinReportError> {
    let root = root.canonicalize().map_err(|e| {
        SkinReportError::Config(format!("Intake root {} unavailable: {}", root.display(), e))
    })?;
    let candidate = root
        .join(requested)
        .canonicalize()
        .map_err(|_| SkinReportError::Validation(format!("Cannot read '{}'", requested)))?;

    if !candidate.starts_with(&root) {
        return Err(SkinReportError::Validation(format!(
            "'{}' is outside the intake root",
            requested
        )));
    }
    Ok(candidate)
}

pub async fn get_report(
    path: web::Path<Uuid>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let report_id = path.into_inner();
    let report = data.pipeline.fetch(&report_id).await?;
    Ok(HttpResponse::Ok().json(&report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::models::Report;
    use crate::services::cache::MemoryCache;
    use crate::services::extractor::tests::page_json;
    use crate::services::image_processor::tests::solid_png;
    use crate::services::llm_service::MockInferenceClient;
    use crate::services::pipeline::ReportPipeline;
    use actix_web::{App, http::StatusCode, http::header, test};
    use serde_json::{Value, json};
    use std::path::PathBuf;
    use std::sync::Arc;

    fn answering_client() -> MockInferenceClient {
        let mut client = MockInferenceClient::new();
        client.expect_name().return_const("mock");
        client
            .expect_complete()
            .returning(|_| Ok(page_json("standard", "Sun spots", "\"spot_count\": 3")));
        client
    }

    fn state(client: MockInferenceClient, max_bytes: usize, root: Option<PathBuf>) -> AppState {
        let config = PipelineConfig {
            max_document_bytes: max_bytes,
            ..PipelineConfig::default()
        };
        AppState {
            pipeline: Arc::new(ReportPipeline::new(
                Arc::new(client),
                Arc::new(MemoryCache::new()),
                config,
            )),
            local_intake_root: root,
        }
    }

    macro_rules! app {
        ($state:expr) => {
            test::init_service(
                App::new()
                    .app_data(web::Data::new($state))
                    .app_data(json_config(1 << 20))
                    .configure(routes),
            )
            .await
        };
    }

    fn multipart_body(boundary: &str, file: &[u8], age: Option<&str>) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"scan.png\"\r\n\
                 Content-Type: image/png\r\n\r\n",
                b = boundary
            )
            .as_bytes(),
        );
        body.extend_from_slice(file);
        body.extend_from_slice(b"\r\n");
        if let Some(age) = age {
            body.extend_from_slice(
                format!(
                    "--{b}\r\nContent-Disposition: form-data; name=\"actual_age\"\r\n\r\n{age}\r\n",
                    b = boundary,
                    age = age
                )
                .as_bytes(),
            );
        }
        body.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());
        body
    }

    #[actix_web::test]
    async fn multipart_upload_produces_a_report() {
        let app = app!(state(answering_client(), 1 << 20, None));
        let png = solid_png(8, 8, [200, 150, 140]);

        let req = test::TestRequest::post()
            .uri("/api/v1/reports")
            .insert_header((header::CONTENT_TYPE, "multipart/form-data; boundary=XYZ"))
            .set_payload(multipart_body("XYZ", &png, Some("41")))
            .to_request();
        let report: Report = test::call_and_read_body_json(&app, req).await;

        assert_eq!(report.document_name, "scan.png");
        assert_eq!(report.page_count, 1);
        assert_eq!(report.age_analysis.actual_age, Some(41));
        assert!(report.complete);

        let req = test::TestRequest::get()
            .uri(&format!("/api/v1/reports/{}", report.id))
            .to_request();
        let fetched: Report = test::call_and_read_body_json(&app, req).await;
        assert_eq!(fetched.id, report.id);
    }

    #[actix_web::test]
    async fn oversized_upload_is_rejected_with_413() {
        let png = solid_png(32, 32, [10, 20, 30]);
        let app = app!(state(MockInferenceClient::new(), png.len() / 2, None));

        let req = test::TestRequest::post()
            .uri("/api/v1/reports")
            .insert_header((header::CONTENT_TYPE, "multipart/form-data; boundary=XYZ"))
            .set_payload(multipart_body("XYZ", &png, None))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["kind"], "TooLarge");
    }

    #[actix_web::test]
    async fn oversized_age_field_is_rejected() {
        let app = app!(state(MockInferenceClient::new(), 1 << 20, None));
        let png = solid_png(8, 8, [200, 150, 140]);
        let age = "4".repeat(4096);

        let req = test::TestRequest::post()
            .uri("/api/v1/reports")
            .insert_header((header::CONTENT_TYPE, "multipart/form-data; boundary=XYZ"))
            .set_payload(multipart_body("XYZ", &png, Some(&age)))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["kind"], "Validation");
        assert!(body["message"].as_str().unwrap().contains("exceeds 16 bytes"));
    }

    #[actix_web::test]
    async fn base64_and_multipart_share_one_representation() {
        let app = app!(state(answering_client(), 1 << 20, None));
        let png = solid_png(8, 8, [200, 150, 140]);
        let expected = Document::from_bytes("scan.png", png.clone(), 1 << 20).unwrap();

        let req = test::TestRequest::post()
            .uri("/api/v1/reports/base64")
            .set_json(json!({
                "filename": "scan.png",
                "data": general_purpose::STANDARD.encode(&png),
                "actualAge": 30
            }))
            .to_request();
        let report: Report = test::call_and_read_body_json(&app, req).await;
        assert_eq!(report.fingerprint, expected.fingerprint);
        assert_eq!(report.document_name, expected.filename);
    }

    #[actix_web::test]
    async fn bad_submissions_map_to_client_errors() {
        let app = app!(state(MockInferenceClient::new(), 1 << 20, None));

        let cases = [
            (json!({ "filename": "a.pdf", "data": "***" }), "Validation"),
            (
                json!({ "filename": "a.pdf", "data": general_purpose::STANDARD.encode(b"plain text") }),
                "InvalidFormat",
            ),
            (
                json!({ "filename": "a.png", "data": "", "actualAge": 500 }),
                "Validation",
            ),
        ];
        for (body, kind) in cases {
            let req = test::TestRequest::post()
                .uri("/api/v1/reports/base64")
                .set_json(body)
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
            let body: Value = test::read_body_json(resp).await;
            assert_eq!(body["kind"], kind);
        }
    }

    #[actix_web::test]
    async fn unknown_report_is_404() {
        let app = app!(state(MockInferenceClient::new(), 1 << 20, None));
        let req = test::TestRequest::get()
            .uri(&format!("/api/v1/reports/{}", Uuid::new_v4()))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn local_intake_is_confined_to_its_root() {
        let disabled = app!(state(MockInferenceClient::new(), 1 << 20, None));
        let req = test::TestRequest::post()
            .uri("/api/v1/reports/local")
            .set_json(json!({ "path": "scan.png" }))
            .to_request();
        assert_eq!(
            test::call_service(&disabled, req).await.status(),
            StatusCode::NOT_FOUND
        );

        let outer = tempfile::tempdir().unwrap();
        let root = outer.path().join("intake");
        std::fs::create_dir(&root).unwrap();
        std::fs::write(root.join("scan.png"), solid_png(8, 8, [200, 150, 140])).unwrap();
        std::fs::write(outer.path().join("secret.png"), solid_png(8, 8, [1, 2, 3])).unwrap();

        let app = app!(state(answering_client(), 1 << 20, Some(root)));

        let req = test::TestRequest::post()
            .uri("/api/v1/reports/local")
            .set_json(json!({ "path": "scan.png", "actualAge": 52 }))
            .to_request();
        let report: Report = test::call_and_read_body_json(&app, req).await;
        assert_eq!(report.document_name, "scan.png");

        let req = test::TestRequest::post()
            .uri("/api/v1/reports/local")
            .set_json(json!({ "path": "../secret.png" }))
            .to_request();
        assert_eq!(
            test::call_service(&app, req).await.status(),
            StatusCode::BAD_REQUEST
        );
    }
}
