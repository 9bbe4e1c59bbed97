//! TLS configuration
//!
//! Certificate checks are configured per client through a [`TlsConfig`]
//! value rather than through any process-wide switch, so a permissive test
//! client cannot weaken the checks of another client in the same process.

use boring::ssl::{SslConnector, SslMethod, SslVerifyMode};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_boring::SslStream;

use crate::error::Error;

/// ALPN wire format for `http/1.1`, the only protocol the client speaks.
const ALPN_HTTP1: &[u8] = b"\x08http/1.1";

/// TLS settings applied to every encrypted connection of one client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TlsConfig {
    cert_verification: bool,
    verify_hostname: bool,
}

impl Default for TlsConfig {
    fn default() -> Self {
        TlsConfig {
            cert_verification: true,
            verify_hostname: true,
        }
    }
}

impl TlsConfig {
    /// A configuration that accepts any certificate for any host.
    ///
    /// Debugging proxies re-sign traffic with their own root, so tests that
    /// run through one need this. Never use it outside of tests.
    pub fn permissive() -> TlsConfig {
        TlsConfig {
            cert_verification: false,
            verify_hostname: false,
        }
    }

    /// Controls the use of certificate validation.
    pub fn cert_verification(mut self, enable: bool) -> TlsConfig {
        self.cert_verification = enable;
        self
    }

    /// Controls the use of hostname verification.
    pub fn verify_hostname(mut self, enable: bool) -> TlsConfig {
        self.verify_hostname = enable;
        self
    }

    /// Returns true if certificates are validated.
    pub fn is_cert_verification(&self) -> bool {
        self.cert_verification
    }

    /// Build a connector carrying these settings.
    pub(crate) fn build_connector(&self) -> crate::Result<TlsConnector> {
        let mut builder = SslConnector::builder(SslMethod::tls_client()).map_err(Error::tls)?;

        if self.cert_verification {
            builder.set_default_verify_paths().map_err(Error::tls)?;
            builder.set_verify(SslVerifyMode::PEER);
        } else {
            log::warn!("tls certificate verification is disabled");
            builder.set_verify(SslVerifyMode::NONE);
        }

        builder.set_alpn_protos(ALPN_HTTP1).map_err(Error::tls)?;

        Ok(TlsConnector {
            inner: builder.build(),
            verify_hostname: self.verify_hostname,
        })
    }
}

/// Performs client handshakes with the settings of a [`TlsConfig`].
#[derive(Clone)]
pub(crate) struct TlsConnector {
    inner: SslConnector,
    verify_hostname: bool,
}

impl std::fmt::Debug for TlsConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsConnector")
            .field("verify_hostname", &self.verify_hostname)
            .finish()
    }
}

impl TlsConnector {
    /// Run a client handshake for `host` over `conn`.
    pub(crate) async fn connect<S>(&self, host: &str, conn: S) -> crate::Result<SslStream<S>>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + Sync + std::fmt::Debug + 'static,
    {
        let mut conf = self.inner.configure().map_err(Error::tls)?;
        conf.set_verify_hostname(self.verify_hostname);

        // IPv6 literals arrive bracketed from the URI
        let host = host.trim_start_matches('[').trim_end_matches(']');

        tokio_boring::connect(conf, host, conn).await.map_err(Error::tls)
    }
}
