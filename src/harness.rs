//! Two-phase proxy authentication scenarios.
//!
//! A scenario sends a request through an authenticating proxy twice: first
//! with no credentials, expecting to be challenged, then with the proxy
//! credential attached, expecting `200 OK`. The phases run strictly one
//! after the other, each on its own freshly built client.

use std::time::Duration;

use http::Uri;

use crate::{
    client::Client,
    config::HarnessConfig,
    credential::{ProxyCredential, StaticProxyCredentials},
    error::Error,
    outcome::{Expectation, Phase, TestOutcome},
    proxy::Proxy,
    registry::{PackageMetadata, PackageSource, SourceRepository},
    tls::TlsConfig,
};

/// Drives proxy authentication scenarios.
#[derive(Clone, Debug)]
pub struct ProxyHarness {
    proxy: Proxy,
    tls: TlsConfig,
    timeout: Option<Duration>,
}

/// Both outcomes of a passed scenario.
#[derive(Debug)]
pub struct ScenarioReport {
    /// The challenged first attempt.
    pub unauthenticated: TestOutcome,
    /// The successful retry.
    pub authenticated: TestOutcome,
}

/// Both results of a passed registry scenario.
#[derive(Debug)]
pub struct RegistryReport {
    /// The failure seen without a credential provider.
    pub unauthenticated: Error,
    /// The metadata fetched with a credential provider installed.
    pub metadata: Vec<PackageMetadata>,
}

impl ProxyHarness {
    /// A harness routing through `proxy`, with certificate checks disabled.
    pub fn new(proxy: Proxy) -> ProxyHarness {
        ProxyHarness {
            proxy,
            tls: TlsConfig::permissive(),
            timeout: None,
        }
    }

    /// A harness routing through the system proxy.
    pub fn system() -> ProxyHarness {
        ProxyHarness::new(Proxy::system())
    }

    /// A harness routing through the system proxy, with TLS set up as
    /// `config` asks.
    pub fn from_config(config: &HarnessConfig) -> ProxyHarness {
        let tls = if config.accept_invalid_certs {
            TlsConfig::permissive()
        } else {
            TlsConfig::default()
        };
        ProxyHarness::system().tls(tls)
    }

    /// Use these TLS settings for every client the harness builds.
    pub fn tls(mut self, tls: TlsConfig) -> ProxyHarness {
        self.tls = tls;
        self
    }

    /// Bound each attempt by `timeout`.
    pub fn timeout(mut self, timeout: Duration) -> ProxyHarness {
        self.timeout = Some(timeout);
        self
    }

    /// The proxy rules scenarios run through.
    pub fn proxy(&self) -> &Proxy {
        &self.proxy
    }

    fn client(&self, proxy: Proxy) -> crate::ClientBuilder {
        let builder = Client::builder().proxy(proxy).tls(self.tls.clone());
        match self.timeout {
            Some(timeout) => builder.timeout(timeout),
            None => builder,
        }
    }

    async fn get(&self, proxy: Proxy, url: &str, phase: Phase) -> TestOutcome {
        let result = match self.client(proxy).build() {
            Ok(client) => client.get(url).await,
            Err(err) => Err(err),
        };
        TestOutcome::capture(phase, result)
    }

    /// `GET url` through the proxy with no credentials attached.
    ///
    /// Any credential in the proxy configuration, attached or parsed from
    /// the proxy URI, is stripped first.
    pub async fn request_without_credentials(&self, url: &str) -> TestOutcome {
        let proxy = self.proxy.clone().without_credentials();
        self.get(proxy, url, Phase::Unauthenticated).await
    }

    /// `GET url` through the proxy with `credential` attached to the proxy
    /// configuration.
    pub async fn request_with_credentials(
        &self,
        url: &str,
        credential: &ProxyCredential,
    ) -> TestOutcome {
        let proxy = self.proxy.clone().with_credentials(credential.clone());
        self.get(proxy, url, Phase::Authenticated).await
    }

    /// Run both phases against `url` and verify each.
    ///
    /// The unauthenticated phase must be challenged (a `407` response for
    /// plain destinations, a rejected tunnel for encrypted ones); the
    /// authenticated phase must answer `200 OK`.
    pub async fn run_scenario(
        &self,
        url: &str,
        credential: &ProxyCredential,
    ) -> crate::Result<ScenarioReport> {
        let uri = url.parse::<Uri>().map_err(Error::builder)?;

        let unauthenticated = self.request_without_credentials(url).await;
        Expectation::for_phase(Phase::Unauthenticated, &uri).verify(&unauthenticated)?;

        let authenticated = self.request_with_credentials(url, credential).await;
        Expectation::for_phase(Phase::Authenticated, &uri).verify(&authenticated)?;

        log::info!("proxy authentication scenario passed for {url}");
        Ok(ScenarioReport {
            unauthenticated,
            authenticated,
        })
    }

    /// Fetch package metadata twice: once with no credential provider,
    /// which must fail on the proxy challenge, then with a provider that
    /// answers proxy challenges with `credential`, which must succeed with
    /// at least one listed, stable version.
    pub async fn run_registry_scenario(
        &self,
        source: PackageSource,
        package_id: &str,
        credential: &ProxyCredential,
    ) -> crate::Result<RegistryReport> {
        let proxy = self.proxy.clone().without_credentials();

        let client = self.client(proxy.clone()).build()?;
        let repository = SourceRepository::new(source.clone(), client);
        let unauthenticated = match repository.metadata(package_id, false, false).await {
            Err(err) if err.is_proxy_auth() => err,
            Err(err) => {
                return Err(Error::unexpected_outcome(
                    Phase::Unauthenticated,
                    "proxy authentication failure".into(),
                    format!("error ({err})"),
                ))
            }
            Ok(metadata) => {
                return Err(Error::unexpected_outcome(
                    Phase::Unauthenticated,
                    "proxy authentication failure".into(),
                    format!("{} metadata entries", metadata.len()),
                ))
            }
        };

        let client = self
            .client(proxy)
            .credential_provider(StaticProxyCredentials::new(credential.clone()))
            .build()?;
        let repository = SourceRepository::new(source, client);
        let metadata = repository
            .metadata(package_id, false, false)
            .await
            .map_err(|err| {
                Error::unexpected_outcome(
                    Phase::Authenticated,
                    "package metadata".into(),
                    format!("error ({err})"),
                )
            })?;

        if metadata.is_empty() {
            return Err(Error::unexpected_outcome(
                Phase::Authenticated,
                "package metadata".into(),
                "0 metadata entries".into(),
            ));
        }

        log::info!(
            "registry scenario passed for {package_id}: {} versions",
            metadata.len()
        );
        Ok(RegistryReport {
            unauthenticated,
            metadata,
        })
    }
}
