use std::{error::Error as StdError, fmt, io};

use http::{StatusCode, Uri};

use crate::{outcome::Phase, tunnel::TunnelError};

/// A `Result` alias where the `Err` case is `proxy_auth_harness::Error`.
pub type Result<T> = std::result::Result<T, Error>;

/// A boxed error type that can be used for dynamic error handling.
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// The Errors that may occur while driving a request through a proxy, or
/// while verifying the outcome of a scenario.
///
/// Note: Errors may include the full URI used to make the request. If the URI
/// contains sensitive information, strip it with
/// [`without_uri`](Error::without_uri).
pub struct Error {
    inner: Box<Inner>,
}

struct Inner {
    kind: Kind,
    source: Option<BoxError>,
    uri: Option<Uri>,
}

impl Error {
    pub(crate) fn new<E>(kind: Kind, source: Option<E>) -> Error
    where
        E: Into<BoxError>,
    {
        Error {
            inner: Box::new(Inner {
                kind,
                source: source.map(Into::into),
                uri: None,
            }),
        }
    }

    pub(crate) fn builder<E: Into<BoxError>>(e: E) -> Error {
        Error::new(Kind::Builder, Some(e))
    }

    pub(crate) fn request<E: Into<BoxError>>(e: E) -> Error {
        Error::new(Kind::Request, Some(e))
    }

    pub(crate) fn tls<E: Into<BoxError>>(e: E) -> Error {
        Error::new(Kind::Tls, Some(e))
    }

    pub(crate) fn tunnel(e: TunnelError) -> Error {
        Error::new(Kind::Tunnel, Some(e))
    }

    pub(crate) fn body<E: Into<BoxError>>(e: E) -> Error {
        Error::new(Kind::Body, Some(e))
    }

    pub(crate) fn decode<E: Into<BoxError>>(e: E) -> Error {
        Error::new(Kind::Decode, Some(e))
    }

    pub(crate) fn timeout() -> Error {
        Error::new(Kind::Timeout, Some(TimedOut))
    }

    pub(crate) fn status_code(uri: Uri, status: StatusCode) -> Error {
        Error::new(Kind::Status(status), None::<Error>).with_uri(uri)
    }

    pub(crate) fn unexpected_outcome(phase: Phase, expected: String, actual: String) -> Error {
        Error::new(
            Kind::UnexpectedOutcome(phase),
            Some(UnexpectedOutcome { expected, actual }),
        )
    }

    pub(crate) fn uri_bad_scheme(uri: Uri) -> Error {
        Error::new(Kind::Builder, Some(BadScheme)).with_uri(uri)
    }
}

impl Error {
    /// Returns a possible URI related to this error.
    pub fn uri(&self) -> Option<&Uri> {
        self.inner.uri.as_ref()
    }

    /// Add a uri related to this error (overwriting any existing)
    pub fn with_uri(mut self, uri: Uri) -> Self {
        self.inner.uri = Some(uri);
        self
    }

    /// Strip the related uri from this error (if, for example, it contains
    /// sensitive information)
    pub fn without_uri(mut self) -> Self {
        self.inner.uri = None;
        self
    }

    /// Returns true if the error is from a type Builder.
    pub fn is_builder(&self) -> bool {
        matches!(self.inner.kind, Kind::Builder)
    }

    /// Returns true if the error is related to sending the request.
    pub fn is_request(&self) -> bool {
        matches!(self.inner.kind, Kind::Request)
    }

    /// Returns true if the error is related to TLS.
    pub fn is_tls(&self) -> bool {
        matches!(self.inner.kind, Kind::Tls)
    }

    /// Returns true if the error happened while establishing a CONNECT tunnel.
    pub fn is_tunnel(&self) -> bool {
        matches!(self.inner.kind, Kind::Tunnel)
    }

    /// Returns true if the error is related to the response body.
    pub fn is_body(&self) -> bool {
        matches!(self.inner.kind, Kind::Body)
    }

    /// Returns true if the error is related to decoding the response's body.
    pub fn is_decode(&self) -> bool {
        matches!(self.inner.kind, Kind::Decode)
    }

    /// Returns true if the request did not complete within the configured timeout.
    pub fn is_timeout(&self) -> bool {
        if matches!(self.inner.kind, Kind::Timeout) {
            return true;
        }

        let mut source = self.source();
        while let Some(err) = source {
            if err.is::<TimedOut>() {
                return true;
            }
            if let Some(io) = err.downcast_ref::<io::Error>() {
                if io.kind() == io::ErrorKind::TimedOut {
                    return true;
                }
            }
            source = err.source();
        }

        false
    }

    /// Returns true if the error is from `Response::error_for_status`.
    pub fn is_status(&self) -> bool {
        matches!(self.inner.kind, Kind::Status(_))
    }

    /// Returns true if a scenario observed something other than what the
    /// current phase expected.
    pub fn is_unexpected_outcome(&self) -> bool {
        matches!(self.inner.kind, Kind::UnexpectedOutcome(_))
    }

    /// Returns the phase that failed verification, if this is an
    /// unexpected-outcome error.
    pub fn phase(&self) -> Option<Phase> {
        match self.inner.kind {
            Kind::UnexpectedOutcome(phase) => Some(phase),
            _ => None,
        }
    }

    /// Returns the status code, if the error was generated from a response.
    pub fn status(&self) -> Option<StatusCode> {
        match self.inner.kind {
            Kind::Status(code) => Some(code),
            _ => None,
        }
    }

    /// Returns true if this error, or anything in its cause chain, is a
    /// proxy authentication failure.
    ///
    /// On plain connections this is a `407` status error; on tunnelled
    /// connections it is the CONNECT rejection wrapped by the transport.
    pub fn is_proxy_auth(&self) -> bool {
        self.proxy_status() == Some(StatusCode::PROXY_AUTHENTICATION_REQUIRED)
            || self.tunnel_error().map_or(false, TunnelError::is_proxy_auth)
    }

    /// Returns the status the proxy answered with, looking through the
    /// cause chain.
    ///
    /// That is any status a rejected CONNECT tunnel carried, or a `407`
    /// status error. Other status errors came from the origin and are not
    /// reported here; see [`status`](Error::status).
    pub fn proxy_status(&self) -> Option<StatusCode> {
        if let Some(status) = self.status().filter(is_proxy_challenge) {
            return Some(status);
        }

        let mut source = self.source();
        while let Some(err) = source {
            if let Some(tunnel) = err.downcast_ref::<TunnelError>() {
                if let Some(status) = tunnel.status() {
                    return Some(status);
                }
            }
            if let Some(status) = err
                .downcast_ref::<Error>()
                .and_then(Error::status)
                .filter(is_proxy_challenge)
            {
                return Some(status);
            }
            source = err.source();
        }

        None
    }

    /// Returns the tunnel failure in the cause chain, if any.
    pub fn tunnel_error(&self) -> Option<&TunnelError> {
        let mut source = self.source();
        while let Some(err) = source {
            if let Some(tunnel) = err.downcast_ref::<TunnelError>() {
                return Some(tunnel);
            }
            source = err.source();
        }
        None
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut builder = f.debug_struct("proxy_auth_harness::Error");

        builder.field("kind", &self.inner.kind);

        if let Some(ref uri) = self.inner.uri {
            builder.field("uri", uri);
        }

        if let Some(ref source) = self.inner.source {
            builder.field("source", source);
        }

        builder.finish()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.inner.kind {
            Kind::Builder => f.write_str("builder error")?,
            Kind::Request => f.write_str("error sending request")?,
            Kind::Tls => f.write_str("tls error")?,
            Kind::Tunnel => f.write_str("error establishing proxy tunnel")?,
            Kind::Body => f.write_str("response body error")?,
            Kind::Decode => f.write_str("error decoding response body")?,
            Kind::Timeout => f.write_str("request timed out")?,
            Kind::UnexpectedOutcome(phase) => write!(f, "unexpected outcome in {phase} phase")?,
            Kind::Status(ref code) => {
                let prefix = if code.is_client_error() {
                    "HTTP status client error"
                } else if code.is_server_error() {
                    "HTTP status server error"
                } else {
                    "HTTP status"
                };
                write!(f, "{prefix} ({code})")?;
            }
        };

        if let Some(uri) = &self.inner.uri {
            write!(f, " for uri ({uri})")?;
        }

        if let Some(e) = &self.inner.source {
            write!(f, ": {e}")?;
        }

        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.inner.source.as_ref().map(|e| &**e as _)
    }
}

fn is_proxy_challenge(status: &StatusCode) -> bool {
    *status == StatusCode::PROXY_AUTHENTICATION_REQUIRED
}

#[derive(Debug)]
pub(crate) enum Kind {
    Builder,
    Request,
    Tls,
    Tunnel,
    Status(StatusCode),
    Body,
    Decode,
    Timeout,
    UnexpectedOutcome(Phase),
}

#[derive(Debug)]
pub(crate) struct TimedOut;

impl fmt::Display for TimedOut {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("operation timed out")
    }
}

impl StdError for TimedOut {}

#[derive(Debug)]
pub(crate) struct BadScheme;

impl fmt::Display for BadScheme {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("URI scheme is not allowed")
    }
}

impl StdError for BadScheme {}

#[derive(Debug)]
struct UnexpectedOutcome {
    expected: String,
    actual: String,
}

impl fmt::Display for UnexpectedOutcome {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "expected {}, got {}", self.expected, self.actual)
    }
}

impl StdError for UnexpectedOutcome {}
