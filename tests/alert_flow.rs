//! Alert Delivery Flow Tests
//!
//! End-to-end tests of the reconciliation loop against a mock Alertmanager:
//! 1. Matching events post exactly one alert with the expected label set
//! 2. Transient gateway failures retry with backoff and reset on success
//! 3. The retry budget abandons a persistently failing key
//! 4. Keys whose event was deleted complete without any delivery

use std::sync::Arc;
use std::time::Duration;

use event_alerter::controller::queue::{BackoffPolicy, WorkQueue};
use event_alerter::controller::run_worker;
use event_alerter::controller::store::EventStore;
use event_alerter::handlers::alertmanager::{Alert, AlertManager};
use event_alerter::FilterConfig;
use k8s_openapi::api::core::v1::{Event, EventSource, ObjectReference};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use tokio::task::JoinHandle;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn pod_failed_event() -> Event {
    Event {
        metadata: ObjectMeta {
            namespace: Some("ns1".to_string()),
            name: Some("pod-a.17b0".to_string()),
            ..ObjectMeta::default()
        },
        involved_object: ObjectReference {
            kind: Some("Pod".to_string()),
            namespace: Some("ns1".to_string()),
            name: Some("pod-a".to_string()),
            ..ObjectReference::default()
        },
        reason: Some("Failed".to_string()),
        message: Some("container exited with code 1".to_string()),
        type_: Some("Warning".to_string()),
        source: Some(EventSource {
            component: Some("kubelet".to_string()),
            host: Some("node-1".to_string()),
        }),
        ..Event::default()
    }
}

/// Millisecond-scale backoff so retry tests finish quickly.
fn fast_backoff() -> BackoffPolicy {
    BackoffPolicy {
        base: Duration::from_millis(1),
        max: Duration::from_millis(5),
        factor: 2.0,
    }
}

struct Harness {
    server: MockServer,
    store: Arc<EventStore>,
    queue: Arc<WorkQueue>,
    worker: JoinHandle<()>,
}

impl Harness {
    async fn start(config: FilterConfig) -> Self {
        let server = MockServer::start().await;
        let handler = Arc::new(
            AlertManager::new(&server.uri(), &config, Duration::from_secs(5)).unwrap(),
        );
        let store = Arc::new(EventStore::new());
        let queue = Arc::new(WorkQueue::new(fast_backoff()));
        let worker = tokio::spawn(run_worker(
            0,
            Arc::clone(&store),
            Arc::clone(&queue),
            handler,
        ));
        Self {
            server,
            store,
            queue,
            worker,
        }
    }

    async fn request_count(&self) -> usize {
        self.server.received_requests().await.unwrap_or_default().len()
    }

    /// Poll until `condition` holds, panicking after two seconds.
    async fn wait_until<F, Fut>(&self, what: &str, mut condition: F)
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        for _ in 0..400 {
            if condition().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("timed out waiting for {what}");
    }

    async fn stop(self) {
        self.queue.shut_down();
        self.worker.await.unwrap();
    }
}

#[tokio::test]
async fn test_matching_event_posts_one_alert() {
    let harness = Harness::start(FilterConfig {
        reasons: vec!["Failed".to_string()],
        ..FilterConfig::default()
    })
    .await;

    Mock::given(method("POST"))
        .and(path("/api/v1/alerts"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&harness.server)
        .await;

    harness.store.upsert("ns1/pod-a.17b0", pod_failed_event());
    harness.queue.add("ns1/pod-a.17b0");

    harness
        .wait_until("alert delivery", || async { harness.request_count().await == 1 })
        .await;

    let requests = harness.server.received_requests().await.unwrap();
    let alerts: Vec<Alert> = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].labels["alertname"], "Pod Failed");
    assert_eq!(alerts[0].labels["namespace"], "ns1");
    assert_eq!(alerts[0].labels["kind"], "Pod");
    assert_eq!(alerts[0].labels["level"], "Warning");
    assert_eq!(alerts[0].labels["client"], "event-alerter");

    assert_eq!(harness.queue.requeues("ns1/pod-a.17b0"), 0);
    harness.stop().await;
}

#[tokio::test]
async fn test_retries_then_succeeds_and_resets_counter() {
    let harness = Harness::start(FilterConfig::default()).await;

    // Gateway rejects three deliveries, then recovers.
    Mock::given(method("POST"))
        .and(path("/api/v1/alerts"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(3)
        .mount(&harness.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/alerts"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&harness.server)
        .await;

    harness.store.upsert("ns1/pod-a.17b0", pod_failed_event());
    harness.queue.add("ns1/pod-a.17b0");

    harness
        .wait_until("three retries and a success", || async {
            harness.request_count().await == 4
        })
        .await;
    harness
        .wait_until("retry counter reset", || async {
            harness.queue.requeues("ns1/pod-a.17b0") == 0
        })
        .await;

    harness.stop().await;
}

#[tokio::test]
async fn test_abandons_key_after_retry_budget() {
    let harness = Harness::start(FilterConfig::default()).await;

    Mock::given(method("POST"))
        .and(path("/api/v1/alerts"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&harness.server)
        .await;

    harness.store.upsert("ns1/pod-a.17b0", pod_failed_event());
    harness.queue.add("ns1/pod-a.17b0");

    // Initial attempt plus five rate-limited retries, then the key is dropped.
    harness
        .wait_until("retry budget exhaustion", || async {
            harness.request_count().await == 6
        })
        .await;
    harness
        .wait_until("key abandoned", || async {
            harness.queue.requeues("ns1/pod-a.17b0") == 0 && harness.queue.is_empty()
        })
        .await;

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(
        harness.request_count().await,
        6,
        "an abandoned key must not recur without a fresh notification"
    );

    harness.stop().await;
}

#[tokio::test]
async fn test_deleted_event_completes_without_delivery() {
    let harness = Harness::start(FilterConfig::default()).await;

    Mock::given(method("POST"))
        .and(path("/api/v1/alerts"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&harness.server)
        .await;

    // Key queued but the event is gone from the cache: a completed no-op.
    harness.queue.add("ns1/pod-a.17b0");

    harness
        .wait_until("queue drained", || async { harness.queue.is_empty() })
        .await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(harness.request_count().await, 0);
    assert_eq!(harness.queue.requeues("ns1/pod-a.17b0"), 0);
    harness.stop().await;
}

#[tokio::test]
async fn test_filtered_event_completes_without_delivery() {
    // All three dimensions configured, none matching the event.
    let harness = Harness::start(FilterConfig {
        kinds: vec!["Node".to_string()],
        types: vec!["Normal".to_string()],
        reasons: vec!["Started".to_string()],
    })
    .await;

    Mock::given(method("POST"))
        .and(path("/api/v1/alerts"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&harness.server)
        .await;

    harness.store.upsert("ns1/pod-a.17b0", pod_failed_event());
    harness.queue.add("ns1/pod-a.17b0");

    harness
        .wait_until("queue drained", || async { harness.queue.is_empty() })
        .await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(harness.request_count().await, 0);
    harness.stop().await;
}
