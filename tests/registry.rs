mod support;
use std::time::Duration;

use http::{HeaderMap, StatusCode, Uri};
use proxy_auth_harness::{
    Client, PackageSource, Phase, Proxy, ProxyCredential, ProxyHarness, SourceRepository,
    StaticProxyCredentials,
};
use serde_json::{json, Value};
use support::proxy::{self, AuthProxy};

const INDEX: &str = "https://registry.test/v3/index.json";
const REGISTRATION: &str = "https://registry.test/v3/registration";

fn entry(version: &str) -> Value {
    json!({"catalogEntry": {"id": "Xamarin.Forms", "version": version}})
}

fn registry(uri: &Uri, _: &HeaderMap) -> http::Response<support::server::Body> {
    let page_url = format!("{REGISTRATION}/xamarin.forms/page/2.5.0/3.0.0.json");

    let body = match uri.path() {
        "/v3/index.json" => json!({
            "version": "3.0.0",
            "resources": [
                {"@id": "https://registry.test/v3/query", "@type": "SearchQueryService"},
                {"@id": REGISTRATION, "@type": "RegistrationsBaseUrl/3.0.0-rc"},
            ]
        }),
        "/v3/registration/xamarin.forms/index.json" => {
            let mut first = entry("1.0.0");
            first["catalogEntry"]["authors"] = json!("Xamarin Inc.");
            let mut unlisted = entry("1.1.0");
            unlisted["catalogEntry"]["listed"] = json!(false);

            json!({
                "count": 2,
                "items": [
                    {
                        "@id": format!("{REGISTRATION}/xamarin.forms/index.json#page/1"),
                        "items": [first, unlisted, entry("2.4.0-pre1")],
                    },
                    {"@id": page_url},
                ]
            })
        }
        "/v3/registration/xamarin.forms/page/2.5.0/3.0.0.json" => {
            let mut described = entry("2.5.0");
            described["catalogEntry"]["description"] = json!("Build native UIs");
            let mut latest = entry("3.0.0");
            latest["catalogEntry"]["authors"] = json!(["Microsoft", "Xamarin"]);

            json!({"items": [described, latest]})
        }
        "/v3/registration/withdrawn.package/index.json" => json!({"count": 0, "items": []}),
        _ => return proxy::text(StatusCode::NOT_FOUND, "not found"),
    };
    proxy::json(body.to_string())
}

fn fixture() -> AuthProxy {
    support::init_logger();
    proxy::authenticating("1", "1", registry)
}

fn client(proxy: &AuthProxy) -> proxy_auth_harness::ClientBuilder {
    Client::builder()
        .proxy(Proxy::all(&proxy.uri()).unwrap())
        .danger_accept_invalid_certs(true)
        .timeout(Duration::from_secs(10))
}

fn credential() -> ProxyCredential {
    ProxyCredential::new("1", "1")
}

#[tokio::test]
async fn metadata_without_provider_fails_on_proxy_auth() {
    let proxy = fixture();
    let client = client(&proxy).build().unwrap();
    let repository = SourceRepository::new(PackageSource::new(INDEX), client);

    let err = repository
        .metadata("Xamarin.Forms", false, false)
        .await
        .unwrap_err();

    assert!(err.is_proxy_auth());
    assert_eq!(err.proxy_status(), Some(StatusCode::PROXY_AUTHENTICATION_REQUIRED));
}

#[tokio::test]
async fn metadata_with_provider_lists_stable_listed_versions() {
    let proxy = fixture();
    let client = client(&proxy)
        .credential_provider(StaticProxyCredentials::new(credential()))
        .build()
        .unwrap();
    let repository = SourceRepository::new(PackageSource::new(INDEX), client);

    let metadata = repository
        .metadata("Xamarin.Forms", false, false)
        .await
        .unwrap();

    let versions: Vec<_> = metadata.iter().map(|m| m.version.as_str()).collect();
    assert_eq!(versions, ["1.0.0", "2.5.0", "3.0.0"]);
    assert_eq!(metadata[0].authors.as_deref(), Some("Xamarin Inc."));
    assert_eq!(metadata[1].description.as_deref(), Some("Build native UIs"));
    assert_eq!(metadata[2].authors.as_deref(), Some("Microsoft, Xamarin"));
}

#[tokio::test]
async fn metadata_includes_prerelease_and_unlisted_when_asked() {
    let proxy = fixture();
    let client = client(&proxy)
        .credential_provider(StaticProxyCredentials::new(credential()))
        .build()
        .unwrap();
    let repository = SourceRepository::new(PackageSource::new(INDEX), client);

    let metadata = repository
        .metadata("Xamarin.Forms", true, true)
        .await
        .unwrap();

    assert_eq!(metadata.len(), 5);
    assert!(metadata.iter().any(|m| m.is_prerelease()));
    assert!(metadata.iter().any(|m| !m.listed));
}

#[tokio::test]
async fn unknown_package_is_a_status_error() {
    let proxy = fixture();
    let client = client(&proxy)
        .credential_provider(StaticProxyCredentials::new(credential()))
        .build()
        .unwrap();
    let repository = SourceRepository::new(PackageSource::new(INDEX), client);

    let err = repository
        .metadata("No.Such.Package", false, false)
        .await
        .unwrap_err();

    assert!(err.is_status());
    assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
    assert!(!err.is_proxy_auth());
}

#[tokio::test]
async fn only_v3_sources_are_queried() {
    let proxy = fixture();
    let source = PackageSource::new(INDEX).with_protocol_version(2);
    let repository = SourceRepository::new(source, client(&proxy).build().unwrap());

    let err = repository
        .metadata("Xamarin.Forms", false, false)
        .await
        .unwrap_err();

    assert!(err.is_builder());
    assert!(proxy.seen().is_empty());
}

#[tokio::test]
async fn registry_scenario_passes() {
    let proxy = fixture();
    let harness = ProxyHarness::new(Proxy::all(&proxy.uri()).unwrap());

    let report = harness
        .run_registry_scenario(PackageSource::new(INDEX), "Xamarin.Forms", &credential())
        .await
        .unwrap();

    assert!(report.unauthenticated.is_proxy_auth());
    assert!(!report.metadata.is_empty());
}

#[tokio::test]
async fn registry_scenario_reports_rejected_credential() {
    let proxy = fixture();
    let harness = ProxyHarness::new(Proxy::all(&proxy.uri()).unwrap());

    let err = harness
        .run_registry_scenario(
            PackageSource::new(INDEX),
            "Xamarin.Forms",
            &ProxyCredential::new("nobody", "wrong"),
        )
        .await
        .unwrap_err();

    assert!(err.is_unexpected_outcome());
    assert_eq!(err.phase(), Some(Phase::Authenticated));
}

#[tokio::test]
async fn registry_scenario_requires_some_metadata() {
    let proxy = fixture();
    let harness = ProxyHarness::new(Proxy::all(&proxy.uri()).unwrap());

    let err = harness
        .run_registry_scenario(PackageSource::new(INDEX), "Withdrawn.Package", &credential())
        .await
        .unwrap_err();

    assert!(err.is_unexpected_outcome());
    assert_eq!(err.phase(), Some(Phase::Authenticated));
    assert!(err.to_string().contains("0 metadata entries"), "{err}");
}
