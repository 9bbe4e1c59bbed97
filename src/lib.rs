#![deny(missing_docs)]
#![deny(missing_debug_implementations)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! # proxy-auth-harness
//!
//! Checks that HTTP traffic authenticates correctly against a proxy that
//! demands credentials, for plain and encrypted destinations alike, and
//! that a package-registry client does the same through its credential
//! provider.
//!
//! Every scenario has two phases:
//!
//! 1. a request with no credentials, which the proxy must challenge: a
//!    `407 Proxy Authentication Required` response for `http://`
//!    destinations, or a rejected CONNECT tunnel (surfacing as a transport
//!    error) for `https://` ones;
//! 2. the same request with the proxy credential attached, which must
//!    answer `200 OK`.
//!
//! ## Running a scenario
//!
//! ```rust,no_run
//! # async fn run() -> Result<(), proxy_auth_harness::Error> {
//! use proxy_auth_harness::{ProxyCredential, ProxyHarness};
//!
//! let harness = ProxyHarness::system();
//! let credential = ProxyCredential::new("1", "1");
//!
//! let report = harness
//!     .run_scenario("http://www.nuget.org/api/v2", &credential)
//!     .await?;
//! assert_eq!(report.authenticated.status(), Some(http::StatusCode::OK));
//! # Ok(())
//! # }
//! ```
//!
//! ## Proxies
//!
//! By default the system proxy is read from `HTTP_PROXY`, `HTTPS_PROXY`,
//! `ALL_PROXY` and `NO_PROXY`. See [`Proxy`] for explicit configuration.
//!
//! ## Credential providers
//!
//! A [`Client`] can carry a [`CredentialProvider`], asked on demand when a
//! request is challenged. Providers answer per [`ChallengeKind`]; the stock
//! [`StaticProxyCredentials`] answers proxy challenges only.
//!
//! ## TLS
//!
//! Certificate checks are set per client with a [`TlsConfig`]. Harnesses
//! default to [`TlsConfig::permissive()`], because intercepting proxies
//! re-sign encrypted traffic with their own root.

pub use http::StatusCode;

pub use self::client::{Client, ClientBuilder, Request, Response};
pub use self::config::HarnessConfig;
pub use self::credential::{
    Challenge, ChallengeKind, CredentialProvider, NoCredentials, ProxyCredential,
    StaticProxyCredentials,
};
pub use self::error::{Error, Result};
pub use self::harness::{ProxyHarness, RegistryReport, ScenarioReport};
pub use self::outcome::{Expectation, Phase, TestOutcome};
pub use self::proxy::{Intercept, Proxy};
pub use self::registry::{PackageMetadata, PackageSource, SourceRepository};
pub use self::tls::TlsConfig;
pub use self::tunnel::TunnelError;

mod client;
mod config;
mod credential;
mod error;
mod ext;
mod harness;
mod outcome;
pub mod proxy;
mod registry;
mod tls;
mod tunnel;
mod util;
