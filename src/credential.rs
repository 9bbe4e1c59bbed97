//! Credentials and the on-demand credential provider capability.
//!
//! A client that meets a challenge (a `407` from a proxy, a rejected CONNECT
//! tunnel, or a `401` from an origin) asks its installed
//! [`CredentialProvider`] for credentials. The provider has one method per
//! kind of challenge, so implementations only answer what they care about
//! and decline everything else by default.

use std::fmt;

use futures_util::future::{self, BoxFuture, FutureExt};
use http::{header::HeaderValue, Uri};

use crate::util::basic_auth;

/// A username and password pair used to authenticate with Basic auth.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ProxyCredential {
    username: String,
    password: String,
}

impl ProxyCredential {
    /// Create a credential from a username and password.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> ProxyCredential {
        ProxyCredential {
            username: username.into(),
            password: password.into(),
        }
    }

    /// The username.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// The password.
    pub fn password(&self) -> &str {
        &self.password
    }

    /// Renders the credential as a sensitive `Basic` authorization value.
    pub fn basic_auth(&self) -> HeaderValue {
        basic_auth(&self.username, Some(&self.password))
    }
}

impl fmt::Debug for ProxyCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyCredential")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// What kind of party issued a challenge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChallengeKind {
    /// A proxy answered `407 Proxy Authentication Required`, either as a
    /// response status or by rejecting a CONNECT tunnel.
    Proxy,
    /// The origin answered `401 Unauthorized`.
    Origin,
}

/// A challenge met while sending a request.
#[derive(Clone, Debug)]
pub struct Challenge {
    kind: ChallengeKind,
    uri: Uri,
    proxy: Option<Uri>,
    authenticate: Option<HeaderValue>,
}

impl Challenge {
    pub(crate) fn new(
        kind: ChallengeKind,
        uri: Uri,
        proxy: Option<Uri>,
        authenticate: Option<HeaderValue>,
    ) -> Challenge {
        Challenge {
            kind,
            uri,
            proxy,
            authenticate,
        }
    }

    /// The kind of challenge.
    pub fn kind(&self) -> ChallengeKind {
        self.kind
    }

    /// The URI of the request that was challenged.
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// The proxy the request went through, if any.
    pub fn proxy(&self) -> Option<&Uri> {
        self.proxy.as_ref()
    }

    /// The raw `Proxy-Authenticate` or `WWW-Authenticate` value, if the
    /// challenger sent one.
    pub fn authenticate(&self) -> Option<&HeaderValue> {
        self.authenticate.as_ref()
    }
}

/// Supplies credentials on demand when a request is challenged.
///
/// Each method corresponds to one [`ChallengeKind`] and declines (resolves
/// to `None`) unless overridden.
pub trait CredentialProvider: fmt::Debug + Send + Sync {
    /// Credentials for a proxy challenge.
    fn proxy_credentials<'a>(
        &'a self,
        challenge: &'a Challenge,
    ) -> BoxFuture<'a, Option<ProxyCredential>> {
        let _ = challenge;
        future::ready(None).boxed()
    }

    /// Credentials for an origin challenge.
    fn origin_credentials<'a>(
        &'a self,
        challenge: &'a Challenge,
    ) -> BoxFuture<'a, Option<ProxyCredential>> {
        let _ = challenge;
        future::ready(None).boxed()
    }
}

/// Dispatch a challenge to the provider method for its kind.
pub(crate) fn resolve<'a>(
    provider: &'a dyn CredentialProvider,
    challenge: &'a Challenge,
) -> BoxFuture<'a, Option<ProxyCredential>> {
    match challenge.kind() {
        ChallengeKind::Proxy => provider.proxy_credentials(challenge),
        ChallengeKind::Origin => provider.origin_credentials(challenge),
    }
}

/// A provider that answers proxy challenges with a fixed credential and
/// declines origin challenges.
#[derive(Clone, Debug)]
pub struct StaticProxyCredentials {
    credential: ProxyCredential,
}

impl StaticProxyCredentials {
    /// Answer every proxy challenge with `credential`.
    pub fn new(credential: ProxyCredential) -> StaticProxyCredentials {
        StaticProxyCredentials { credential }
    }
}

impl CredentialProvider for StaticProxyCredentials {
    fn proxy_credentials<'a>(
        &'a self,
        challenge: &'a Challenge,
    ) -> BoxFuture<'a, Option<ProxyCredential>> {
        log::debug!(
            "supplying proxy credentials for {} via {:?}",
            challenge.uri(),
            challenge.proxy()
        );
        future::ready(Some(self.credential.clone())).boxed()
    }
}

/// A provider that declines every challenge.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoCredentials;

impl CredentialProvider for NoCredentials {}
