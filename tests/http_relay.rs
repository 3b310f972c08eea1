mod support;

use std::time::Duration;

use relay_bridge::{ClassifierRelay, FeedbackPayload, FeedbackRelay, RelayError, ReportType};
use sentinel_cli::{HttpRelay, HttpRelayConfig};
use support::{spawn_backend, Backend, API_KEY};

fn relay(base_url: String, api_key: Option<&str>) -> HttpRelay {
    HttpRelay::new(HttpRelayConfig {
        base_url,
        api_key: api_key.map(str::to_string),
        timeout: Duration::from_secs(5),
    })
    .unwrap()
}

#[tokio::test]
async fn batch_results_follow_input_order() {
    let backend = spawn_backend(Backend::default()).await;
    let relay = relay(backend.base_url(), Some(API_KEY));

    let texts = vec!["Lovely weather today.".to_string(), "You are scum.".to_string()];
    let response = relay.classify_batch(&texts).await.unwrap();
    let results = response.checked(2).unwrap();

    assert_eq!(results[0].label, "NOT_HATE");
    assert_eq!(results[1].label, "HATE");
    assert_eq!(results[1].score, 0.91);
    assert_eq!(backend.recorded.lock().batches, vec![texts]);
}

#[tokio::test]
async fn single_prediction_uses_predict_endpoint() {
    let backend = spawn_backend(Backend::default()).await;
    let relay = relay(format!("{}/", backend.base_url()), Some(API_KEY));

    let verdict = relay.classify_single("Take out the trash.").await.unwrap();
    assert_eq!(verdict.label, "HATE");
    assert!(backend.recorded.lock().batches.is_empty());
}

#[tokio::test]
async fn missing_api_key_is_rejected_with_server_message() {
    let backend = spawn_backend(Backend::default()).await;
    let relay = relay(backend.base_url(), None);

    let err = relay.classify_single("hello there").await.unwrap_err();
    assert_eq!(
        err,
        RelayError::Rejected {
            status: 401,
            message: "missing or invalid api key".into(),
        }
    );
}

#[tokio::test]
async fn feedback_reports_are_posted_as_snake_case() {
    let backend = spawn_backend(Backend::default()).await;
    let relay = relay(backend.base_url(), Some(API_KEY));

    relay
        .submit_feedback(&FeedbackPayload {
            text: "You are scum.".into(),
            report_type: ReportType::NotHate,
        })
        .await
        .unwrap();

    let reports = backend.recorded.lock().reports.clone();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0]["report_type"], "not_hate");
    assert_eq!(reports[0]["text"], "You are scum.");
}

#[tokio::test]
async fn failing_report_endpoint_surfaces_status() {
    let backend = spawn_backend(Backend {
        reject_reports: true,
        ..Backend::default()
    })
    .await;
    let relay = relay(backend.base_url(), Some(API_KEY));

    let err = relay
        .submit_feedback(&FeedbackPayload {
            text: "x".into(),
            report_type: ReportType::Flag,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, RelayError::Rejected { status: 500, .. }));
}

#[tokio::test]
async fn unreachable_host_is_a_transport_error() {
    let relay = HttpRelay::new(HttpRelayConfig {
        base_url: "http://127.0.0.1:9".into(),
        api_key: None,
        timeout: Duration::from_millis(500),
    })
    .unwrap();
    let err = relay.classify_single("hello").await.unwrap_err();
    assert!(matches!(err, RelayError::Transport(_)));
}
