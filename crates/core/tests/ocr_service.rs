use labeler_core::document::to_pretty_json;
use labeler_core::ocr::{OcrError, OcrService, OcrSettings, OcrStatus};
use labeler_core::pipeline::recognize_folder;
use labeler_core::poll::PollError;
use providers::{OcrProvider, OcrRequest, ProviderError, Submission};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use storage::{MemoryStorage, StorageProvider};

/// Scripted provider that records what it was asked.
#[derive(Default)]
struct FakeProvider {
    submission: Mutex<Option<Submission>>,
    checks: Mutex<VecDeque<Value>>,
    submits: AtomicUsize,
    check_calls: AtomicUsize,
    requests: Mutex<Vec<OcrRequest>>,
}

impl FakeProvider {
    fn completing(body: Value) -> Self {
        Self {
            submission: Mutex::new(Some(Submission::Completed(body))),
            ..Default::default()
        }
    }

    fn pending(checks: Vec<Value>) -> Self {
        Self {
            submission: Mutex::new(Some(Submission::Pending {
                operation_location: "https://ocr/operations/1".into(),
            })),
            checks: Mutex::new(checks.into()),
            ..Default::default()
        }
    }

    fn submits(&self) -> usize {
        self.submits.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl OcrProvider for FakeProvider {
    async fn submit(&self, request: OcrRequest) -> Result<Submission, ProviderError> {
        self.submits.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request);
        self.submission
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| ProviderError::RequestFailed("connection refused".into()))
    }

    async fn check(&self, operation_location: &str) -> Result<Value, ProviderError> {
        assert_eq!(operation_location, "https://ocr/operations/1");
        self.check_calls.fetch_add(1, Ordering::SeqCst);
        let mut checks = self.checks.lock().unwrap();
        Ok(if checks.len() > 1 {
            checks.pop_front().unwrap()
        } else {
            checks.front().cloned().unwrap_or_else(|| json!({"status": "running"}))
        })
    }
}

fn settings() -> OcrSettings {
    OcrSettings {
        api_uri_base: "https://ocr.local".into(),
        ..OcrSettings::default()
    }
}

fn layout_result() -> Value {
    json!({
        "status": "succeeded",
        "analyzeResult": {
            "version": "2.1.0",
            "readResults": [{
                "page": 1, "angle": 0.0, "width": 8.5, "height": 11.0, "unit": "inch",
                "lines": [{"boundingBox": [1.0, 1.0, 2.0, 1.0, 2.0, 2.0, 1.0, 2.0], "text": "Invoice"}]
            }],
            "pageResults": [{"page": 1, "tables": []}]
        }
    })
}

fn region_result() -> Value {
    json!({
        "code": 200,
        "msg": "success",
        "width": 800.0,
        "height": 600.0,
        "results": [
            {"text_region": [[1.0, 2.0], [3.0, 2.0], [3.0, 4.0], [1.0, 4.0]], "text": "Total", "confidence": 0.9}
        ]
    })
}

fn service(storage: &Arc<MemoryStorage>, provider: &Arc<FakeProvider>) -> OcrService {
    OcrService::new(storage.clone(), provider.clone(), settings())
}

#[tokio::test]
async fn cache_hit_never_calls_the_service() {
    let cached = to_pretty_json(&layout_result()).unwrap();
    let storage = Arc::new(
        MemoryStorage::with_objects([
            ("docs/a.png", "png".to_string()),
            ("docs/a.png.ocr.json", cached),
        ])
        .await,
    );
    let provider = Arc::new(FakeProvider::completing(region_result()));
    let seen = Mutex::new(Vec::new());
    let on_status = |s: OcrStatus| seen.lock().unwrap().push(s);

    let doc = service(&storage, &provider)
        .get_recognized_text("file:docs/a.png", "docs/a.png", None, Some(&on_status), false)
        .await
        .unwrap();

    assert_eq!(doc.text(), "Invoice");
    assert_eq!(provider.submits(), 0);
    assert_eq!(storage.write_count(), 0);
    assert_eq!(
        *seen.lock().unwrap(),
        vec![OcrStatus::LoadingFromCache, OcrStatus::Done]
    );
}

#[tokio::test]
async fn missing_cache_runs_ocr_once_and_writes_back() {
    let storage = Arc::new(MemoryStorage::with_objects([("docs/a.png", "png".to_string())]).await);
    let provider = Arc::new(FakeProvider::completing(region_result()));
    let seen = Mutex::new(Vec::new());
    let on_status = |s: OcrStatus| seen.lock().unwrap().push(s);

    let doc = service(&storage, &provider)
        .get_recognized_text(
            "http://minio:9000/datasets/docs/a.png",
            "docs/a.png",
            Some("image/png"),
            Some(&on_status),
            false,
        )
        .await
        .unwrap();

    assert_eq!(provider.submits(), 1);
    assert_eq!(storage.write_count(), 1);
    assert_eq!(doc.text(), "Total");
    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            OcrStatus::LoadingFromCache,
            OcrStatus::RunningOcr,
            OcrStatus::Done
        ]
    );

    let saved = storage.read_text("docs/a.png.ocr.json").await.unwrap();
    assert!(saved.starts_with("{\n    \""));
    let saved: Value = serde_json::from_str(&saved).unwrap();
    assert_eq!(
        saved["analyzeResult"]["readResults"][0]["lines"][0]["boundingBox"],
        json!([1.0, 2.0, 3.0, 2.0, 3.0, 4.0, 1.0, 4.0])
    );
    assert_eq!(saved["msg"], "success");

    match &provider.requests.lock().unwrap()[0] {
        OcrRequest::Url { url } => assert_eq!(url, "http://minio:9000/datasets/docs/a.png"),
        other => panic!("unexpected request {other:?}"),
    };
}

#[tokio::test]
async fn minimal_read_results_count_as_a_cache_hit() {
    let storage = Arc::new(
        MemoryStorage::with_objects([
            ("a.png", "png".to_string()),
            (
                "a.png.ocr.json",
                r#"{"analyzeResult":{"readResults":[{"page":1,"lines":[]}]}}"#.to_string(),
            ),
        ])
        .await,
    );
    let provider = Arc::new(FakeProvider::completing(region_result()));

    let doc = service(&storage, &provider)
        .get_recognized_text("file:a.png", "a.png", None, None, false)
        .await
        .unwrap();

    assert_eq!(doc.line_count(), 0);
    assert_eq!(provider.submits(), 0);
    assert_eq!(storage.write_count(), 0);
}

#[tokio::test]
async fn invalid_cache_is_replaced() {
    let storage = Arc::new(
        MemoryStorage::with_objects([
            ("a.pdf", "pdf".to_string()),
            ("a.pdf.ocr.json", r#"{"analyzeResult": {}}"#.to_string()),
        ])
        .await,
    );
    let provider = Arc::new(FakeProvider::completing(region_result()));

    service(&storage, &provider)
        .get_recognized_text("file:a.pdf", "a.pdf", None, None, false)
        .await
        .unwrap();

    assert_eq!(provider.submits(), 1);
    assert_eq!(storage.write_count(), 1);
}

#[tokio::test]
async fn rewrite_ignores_a_valid_cache() {
    let cached = to_pretty_json(&layout_result()).unwrap();
    let storage = Arc::new(
        MemoryStorage::with_objects([
            ("a.png", "png".to_string()),
            ("a.png.ocr.json", cached),
        ])
        .await,
    );
    let provider = Arc::new(FakeProvider::completing(region_result()));

    let doc = service(&storage, &provider)
        .get_recognized_text("file:a.png", "a.png", None, None, true)
        .await
        .unwrap();

    assert_eq!(provider.submits(), 1);
    assert_eq!(doc.text(), "Total");
}

#[tokio::test]
async fn local_files_are_sent_as_bytes() {
    let png = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];
    let storage = Arc::new(MemoryStorage::with_objects([("scans/my doc.png", png.clone())]).await);
    let provider = Arc::new(FakeProvider::completing(region_result()));

    service(&storage, &provider)
        .get_recognized_text("file:scans/my%20doc.png", "scans/my%20doc.png", None, None, false)
        .await
        .unwrap();

    match &provider.requests.lock().unwrap()[0] {
        OcrRequest::Bytes { data, mime_type } => {
            assert_eq!(data.as_ref(), png.as_slice());
            assert_eq!(mime_type, "image/png");
        }
        other => panic!("unexpected request {other:?}"),
    }
    assert!(storage
        .is_file_exists("scans/my doc.png.ocr.json")
        .await
        .unwrap());
}

#[tokio::test]
async fn unsuccessful_answer_reports_failure() {
    let storage = Arc::new(MemoryStorage::new());
    let provider = Arc::new(FakeProvider::completing(
        json!({"code": 500, "msg": "image too small", "results": []}),
    ));
    let seen = Mutex::new(Vec::new());
    let on_status = |s: OcrStatus| seen.lock().unwrap().push(s);

    let err = service(&storage, &provider)
        .get_recognized_text("http://host/a.png", "a.png", None, Some(&on_status), false)
        .await
        .unwrap_err();

    assert!(matches!(err, OcrError::Unsuccessful(msg) if msg == "image too small"));
    assert_eq!(storage.write_count(), 0);
    assert_eq!(seen.lock().unwrap().last(), Some(&OcrStatus::Failed));
}

#[tokio::test]
async fn provider_error_reports_failure() {
    let storage = Arc::new(MemoryStorage::new());
    let provider = Arc::new(FakeProvider::default());

    let err = service(&storage, &provider)
        .get_recognized_text("http://host/a.png", "a.png", None, None, false)
        .await
        .unwrap_err();
    assert!(matches!(err, OcrError::Provider(ProviderError::RequestFailed(_))));
}

#[tokio::test(start_paused = true)]
async fn asynchronous_job_is_polled_until_it_succeeds() {
    let storage = Arc::new(MemoryStorage::new());
    let provider = Arc::new(FakeProvider::pending(vec![
        json!({"status": "notStarted"}),
        json!({"status": "running"}),
        layout_result(),
    ]));
    let started = tokio::time::Instant::now();

    let doc = service(&storage, &provider)
        .get_recognized_text("http://host/a.png", "a.png", None, None, false)
        .await
        .unwrap();

    assert_eq!(doc.text(), "Invoice");
    assert_eq!(provider.check_calls.load(Ordering::SeqCst), 3);
    assert_eq!(started.elapsed(), Duration::from_millis(3000));
    let saved: Value =
        serde_json::from_str(&storage.read_text("a.png.ocr.json").await.unwrap()).unwrap();
    assert_eq!(saved["status"], "succeeded");
}

#[tokio::test(start_paused = true)]
async fn asynchronous_job_times_out() {
    let storage = Arc::new(MemoryStorage::new());
    let provider = Arc::new(FakeProvider::pending(vec![json!({"status": "running"})]));
    let svc = OcrService::new(
        storage.clone(),
        provider.clone(),
        OcrSettings {
            timeout: Duration::from_secs(6),
            poll_interval: Duration::from_secs(2),
            ..settings()
        },
    );

    let err = svc
        .get_recognized_text("http://host/a.png", "a.png", None, None, false)
        .await
        .unwrap_err();
    assert!(matches!(err, OcrError::Poll(PollError::TimedOut(_))));
    assert_eq!(storage.write_count(), 0);
}

#[tokio::test]
async fn failed_job_is_not_polled_again() {
    let storage = Arc::new(MemoryStorage::new());
    let provider = Arc::new(FakeProvider::pending(vec![
        json!({"status": "failed", "error": {"code": "InvalidImage"}}),
    ]));

    let err = service(&storage, &provider)
        .get_recognized_text("http://host/a.png", "a.png", None, None, false)
        .await
        .unwrap_err();
    assert!(matches!(err, OcrError::Poll(PollError::Failed(_))));
    assert_eq!(provider.check_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn missing_arguments_are_rejected() {
    let storage = Arc::new(MemoryStorage::new());
    let provider = Arc::new(FakeProvider::completing(region_result()));

    let err = service(&storage, &provider)
        .get_recognized_text("", "a.png", None, None, false)
        .await
        .unwrap_err();
    assert!(matches!(err, OcrError::MissingArgument("file_path")));

    let no_base = OcrService::new(storage.clone(), provider.clone(), OcrSettings::default());
    let err = no_base
        .get_recognized_text("file:a.png", "a.png", None, None, false)
        .await
        .unwrap_err();
    assert!(matches!(err, OcrError::MissingArgument("api_uri_base")));
    assert_eq!(provider.submits(), 0);
}

#[tokio::test]
async fn folder_recognition_reports_each_asset() {
    let cached = to_pretty_json(&layout_result()).unwrap();
    let storage = Arc::new(
        MemoryStorage::with_objects([
            ("batch/a.png", "png".to_string()),
            ("batch/a.png.ocr.json", cached),
            ("batch/b.jpg", "jpg".to_string()),
            ("batch/readme.txt", "text".to_string()),
        ])
        .await,
    );
    let provider = Arc::new(FakeProvider::completing(region_result()));
    let svc = service(&storage, &provider);

    let outcomes = recognize_folder(&svc, storage.as_ref(), Some("batch/"), false, 2)
        .await
        .unwrap();

    assert_eq!(outcomes.len(), 2);
    assert!(outcomes.iter().all(|o| o.ok));
    assert_eq!(outcomes[0].asset, "batch/a.png");
    assert_eq!(outcomes[1].lines, 1);
    assert_eq!(provider.submits(), 1);
}

#[tokio::test]
async fn polled_body_is_saved_verbatim() {
    let served = json!({
        "status": "succeeded",
        "analyzeResult": {
            "readResults": [{
                "page": 1, "angle": 0, "width": 1240, "height": 1754, "unit": "pixel",
                "lines": [{"boundingBox": [10, 20, 110, 20, 110, 40, 10, 40], "text": "Invoice"}]
            }]
        }
    });
    let storage = Arc::new(MemoryStorage::new());
    let provider = Arc::new(FakeProvider::pending(vec![served.clone()]));

    let doc = service(&storage, &provider)
        .get_recognized_text("http://host/a.png", "a.png", None, None, false)
        .await
        .unwrap();

    let saved: Value =
        serde_json::from_str(&storage.read_text("a.png.ocr.json").await.unwrap()).unwrap();
    assert_eq!(saved, served);
    assert_eq!(doc.text(), "Invoice");
}

#[tokio::test]
async fn sparse_polled_body_is_saved_and_returned() {
    let served = json!({
        "status": "succeeded",
        "analyzeResult": {"readResults": [{"page": 1, "lines": []}]}
    });
    let storage = Arc::new(MemoryStorage::new());
    let provider = Arc::new(FakeProvider::pending(vec![served.clone()]));

    let doc = service(&storage, &provider)
        .get_recognized_text("http://host/a.png", "a.png", None, None, false)
        .await
        .unwrap();

    assert_eq!(doc.line_count(), 0);
    assert_eq!(storage.write_count(), 1);
    let saved: Value =
        serde_json::from_str(&storage.read_text("a.png.ocr.json").await.unwrap()).unwrap();
    assert_eq!(saved, served);
}
