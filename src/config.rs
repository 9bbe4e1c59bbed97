//! Scenario configuration.
//!
//! Defaults match a debugging proxy left at its stock settings, which
//! accepts the credential `1`/`1`. Every value can be overridden from the
//! environment so the same scenarios can run against other fixtures.

use crate::credential::ProxyCredential;

const DEFAULT_USERNAME: &str = "1";
const DEFAULT_PASSWORD: &str = "1";
const DEFAULT_HTTP_URL: &str = "http://www.nuget.org/api/v2";
const DEFAULT_HTTPS_URL: &str = "https://www.nuget.org/api/v2";
const DEFAULT_REGISTRY_INDEX: &str = "https://api.nuget.org/v3/index.json";
const DEFAULT_PACKAGE_ID: &str = "Xamarin.Forms";

/// Values the scenarios run with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HarnessConfig {
    /// The credential the proxy accepts.
    pub credential: ProxyCredential,
    /// A plain destination reachable only through the proxy.
    pub http_url: String,
    /// An encrypted destination reachable only through the proxy.
    pub https_url: String,
    /// The registry service index.
    pub registry_index: String,
    /// The package whose metadata the registry scenario fetches.
    pub package_id: String,
    /// Skip certificate checks, as needed behind an intercepting proxy.
    pub accept_invalid_certs: bool,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        HarnessConfig {
            credential: ProxyCredential::new(DEFAULT_USERNAME, DEFAULT_PASSWORD),
            http_url: DEFAULT_HTTP_URL.to_owned(),
            https_url: DEFAULT_HTTPS_URL.to_owned(),
            registry_index: DEFAULT_REGISTRY_INDEX.to_owned(),
            package_id: DEFAULT_PACKAGE_ID.to_owned(),
            accept_invalid_certs: true,
        }
    }
}

impl HarnessConfig {
    /// Defaults, overridden by any `PROXY_HARNESS_*` variables that are set.
    ///
    /// | variable | field |
    /// |---|---|
    /// | `PROXY_HARNESS_USERNAME` / `PROXY_HARNESS_PASSWORD` | `credential` |
    /// | `PROXY_HARNESS_HTTP_URL` | `http_url` |
    /// | `PROXY_HARNESS_HTTPS_URL` | `https_url` |
    /// | `PROXY_HARNESS_REGISTRY_INDEX` | `registry_index` |
    /// | `PROXY_HARNESS_PACKAGE_ID` | `package_id` |
    /// | `PROXY_HARNESS_STRICT_TLS` (`1`/`true`) | `accept_invalid_certs = false` |
    pub fn from_env() -> HarnessConfig {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> HarnessConfig
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = HarnessConfig::default();
        let var = |name: &str, default: String| lookup(name).unwrap_or(default);

        let username = var("PROXY_HARNESS_USERNAME", DEFAULT_USERNAME.to_owned());
        let password = var("PROXY_HARNESS_PASSWORD", DEFAULT_PASSWORD.to_owned());
        let strict_tls = lookup("PROXY_HARNESS_STRICT_TLS")
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        HarnessConfig {
            credential: ProxyCredential::new(username, password),
            http_url: var("PROXY_HARNESS_HTTP_URL", defaults.http_url),
            https_url: var("PROXY_HARNESS_HTTPS_URL", defaults.https_url),
            registry_index: var("PROXY_HARNESS_REGISTRY_INDEX", defaults.registry_index),
            package_id: var("PROXY_HARNESS_PACKAGE_ID", defaults.package_id),
            accept_invalid_certs: !strict_tls,
        }
    }
}
