//! End-to-end runs against the mock targets on an ephemeral port.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use service_loadtest::client::{login, RetryPolicy, ServiceClient};
use service_loadtest::config::{Credentials, HarnessConfig, ServiceConfig};
use service_loadtest::dashboard::OutputMode;
use service_loadtest::load_generator::{self, LoadPlan};
use service_loadtest::metrics::{MetricsAggregator, Snapshot};
use service_loadtest::mock::{self, MockState};
use service_loadtest::scenarios::Registry;
use service_loadtest::HarnessError;

async fn spawn_mock() -> String {
    spawn_mock_for(&Credentials::default()).await
}

async fn spawn_mock_for(credentials: &Credentials) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = Arc::new(MockState::seeded(credentials));
    tokio::spawn(mock::serve(listener, state, std::future::pending()));
    format!("http://{addr}")
}

fn quick_config(services: Vec<ServiceConfig>) -> HarnessConfig {
    let mut cfg = HarnessConfig::default();
    cfg.run.users = 4;
    cfg.run.duration_secs = 1;
    cfg.run.wait_min_ms = 10;
    cfg.run.wait_max_ms = 30;
    cfg.metrics.output = OutputMode::None;
    cfg.metrics.render_every = 0;
    cfg.metrics.sample_interval_ms = 200;
    cfg.retry.initial_delay_ms = 0;
    cfg.retry.max_delay_ms = 0;
    cfg.services = services;
    cfg
}

fn service(name: &str, host: &str, behavior: Option<&str>) -> ServiceConfig {
    ServiceConfig {
        name: name.into(),
        host: host.into(),
        behavior: behavior.map(Into::into),
        weight: 1,
        auth_host: None,
    }
}

async fn run(cfg: HarnessConfig) -> Snapshot {
    cfg.validate().unwrap();
    let plan = LoadPlan::from_config(&cfg, &Registry::builtin()).unwrap();
    let aggregator = Arc::new(MetricsAggregator::from_config(&cfg.metrics));

    aggregator.start();
    load_generator::run(Arc::new(AtomicBool::new(true)), aggregator.clone(), plan)
        .await
        .unwrap();
    aggregator.stop().await;
    assert!(!aggregator.is_running());
    aggregator.snapshot()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn user_and_email_services_run_clean() {
    let host = spawn_mock().await;
    let cfg = quick_config(vec![
        service("user", &host, None),
        service("email", &host, None),
    ]);

    let snapshot = run(cfg).await;

    assert!(snapshot.overall.total > 0);
    assert!(snapshot.overall.failed <= snapshot.overall.total);
    assert!(snapshot.duration_secs.unwrap() >= 1.0);

    for name in ["login", "email_service_login"] {
        let ep = &snapshot.endpoints[name];
        assert_eq!(ep.failed, 0, "{name}");
        assert_eq!(ep.status_counts.get(&200), Some(&ep.total), "{name}");
    }
    for name in ["get_profile", "workflow_success", "workflow_error"] {
        if let Some(ep) = snapshot.endpoints.get(name) {
            assert_eq!(ep.failed, 0, "{name} should succeed with a token");
        }
    }

    let per_endpoint: u64 = snapshot.endpoints.values().map(|e| e.total).sum();
    assert_eq!(per_endpoint, snapshot.overall.total);
    assert_eq!(snapshot.run_latency.count, snapshot.overall.total);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn error_simulation_counts_expected_statuses_as_success() {
    let host = spawn_mock().await;
    let cfg = quick_config(vec![service("errors", &host, Some("error_simulation"))]);

    let snapshot = run(cfg).await;

    assert!(snapshot.overall.total > 0);
    assert_eq!(snapshot.overall.failed, 0);
    if let Some(ep) = snapshot.endpoints.get("/auth/login") {
        assert!(ep.status_counts.keys().all(|s| [200, 400, 401].contains(s)));
    }
    if let Some(ep) = snapshot.endpoints.get("/email/grafananotif") {
        assert!(ep.status_counts.keys().all(|s| [200, 400].contains(s)));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn error_simulation_logs_in_with_configured_credentials() {
    let ops = Credentials {
        email: "ops@corp.example.com".into(),
        password: "Ops-Password-1".into(),
    };
    let host = spawn_mock_for(&ops).await;
    let mut cfg = quick_config(vec![service("errors", &host, Some("error_simulation"))]);
    cfg.run.duration_secs = 2;
    cfg.credentials = ops;

    let snapshot = run(cfg).await;

    let ep = &snapshot.endpoints["/auth/login"];
    assert_eq!(ep.failed, 0, "statuses: {:?}", ep.status_counts);
    assert!(
        ep.status_counts.get(&200).copied().unwrap_or(0) > 0,
        "expected some successful logins: {:?}",
        ep.status_counts
    );
}

#[tokio::test]
async fn mock_responses_name_the_matched_route() {
    let host = spawn_mock().await;
    let resp = reqwest::get(format!("{host}/users/profile")).await.unwrap();
    assert_eq!(resp.status().as_u16(), 401);
    let timing = resp.headers()["server-timing"].to_str().unwrap().to_owned();
    assert!(timing.starts_with("mock;desc=\"/users/profile\";dur="), "{timing}");

    let resp = reqwest::get(format!("{host}/nowhere")).await.unwrap();
    assert_eq!(resp.status().as_u16(), 404);
}

#[tokio::test]
async fn login_gives_up_after_max_attempts() {
    let host = spawn_mock().await;
    let cfg = quick_config(Vec::new());
    let aggregator = Arc::new(MetricsAggregator::from_config(&cfg.metrics));
    let client = ServiceClient::new(&host, ServiceClient::build_http().unwrap(), aggregator.clone());

    let wrong = Credentials {
        email: "nobody@example.com".into(),
        password: "nope".into(),
    };
    let err = login(&client, &wrong, "login", &RetryPolicy::immediate(3))
        .await
        .unwrap_err();
    assert!(matches!(err, HarnessError::AuthFailed { attempts: 3, .. }), "{err}");

    let snapshot = aggregator.snapshot();
    let ep = &snapshot.endpoints["login"];
    assert_eq!((ep.total, ep.failed), (3, 3));
    assert_eq!(ep.status_counts.get(&401), Some(&3));
    assert_eq!(ep.success_rate, 0.0);

    let token = login(&client, &Credentials::default(), "login", &RetryPolicy::immediate(3))
        .await
        .unwrap();
    assert!(!token.as_str().is_empty());
}

#[tokio::test]
async fn unknown_behavior_is_fatal_before_any_request() {
    let cfg = quick_config(vec![service("sms", "http://127.0.0.1:9", None)]);
    assert!(matches!(
        LoadPlan::from_config(&cfg, &Registry::builtin()),
        Err(HarnessError::UnknownBehavior(name)) if name == "sms"
    ));
}
