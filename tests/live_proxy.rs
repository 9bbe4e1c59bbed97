//! Scenarios against the machine's real proxy.
//!
//! These need a proxy configured through `HTTP_PROXY`/`HTTPS_PROXY` that
//! demands the credential from `PROXY_HARNESS_USERNAME` and
//! `PROXY_HARNESS_PASSWORD` (`1`/`1` unless set). Run them with
//! `cargo test --test live_proxy -- --ignored`.

mod support;
use std::time::Duration;

use http::StatusCode;
use proxy_auth_harness::{HarnessConfig, PackageSource, ProxyHarness};

fn harness(config: &HarnessConfig) -> ProxyHarness {
    support::init_logger();
    ProxyHarness::from_config(config).timeout(Duration::from_secs(30))
}

#[tokio::test]
#[ignore = "requires an authenticating system proxy"]
async fn unauthenticated_http_is_challenged() {
    let config = HarnessConfig::from_env();
    let outcome = harness(&config)
        .request_without_credentials(&config.http_url)
        .await;

    assert_eq!(outcome.status(), Some(StatusCode::PROXY_AUTHENTICATION_REQUIRED));
}

#[tokio::test]
#[ignore = "requires an authenticating system proxy"]
async fn http_scenario() {
    let config = HarnessConfig::from_env();
    harness(&config)
        .run_scenario(&config.http_url, &config.credential)
        .await
        .unwrap();
}

#[tokio::test]
#[ignore = "requires an authenticating system proxy"]
async fn https_scenario() {
    let config = HarnessConfig::from_env();
    harness(&config)
        .run_scenario(&config.https_url, &config.credential)
        .await
        .unwrap();
}

#[tokio::test]
#[ignore = "requires an authenticating system proxy"]
async fn registry_scenario() {
    let config = HarnessConfig::from_env();
    let report = harness(&config)
        .run_registry_scenario(
            PackageSource::new(config.registry_index.clone()),
            &config.package_id,
            &config.credential,
        )
        .await
        .unwrap();

    assert!(!report.metadata.is_empty());
}
