//! Captured request outcomes and what each phase expects of them.

use std::fmt;

use http::{StatusCode, Uri};

use crate::{client::Response, error::Error, ext::UriExt};

/// Which half of a two-phase scenario an attempt belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Phase {
    /// The first attempt, sent with no credentials at all.
    Unauthenticated,
    /// The retry, sent with the proxy credential attached.
    Authenticated,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Unauthenticated => "unauthenticated",
            Phase::Authenticated => "authenticated",
        })
    }
}

/// The captured result of one request attempt.
#[derive(Debug)]
pub enum TestOutcome {
    /// A response arrived, whatever its status.
    Response {
        /// The phase the attempt was made in.
        phase: Phase,
        /// The response.
        response: Response,
    },
    /// The request failed before any response was visible.
    TransportError {
        /// The phase the attempt was made in.
        phase: Phase,
        /// The failure.
        error: Error,
    },
}

impl TestOutcome {
    pub(crate) fn capture(phase: Phase, result: crate::Result<Response>) -> TestOutcome {
        match result {
            Ok(response) => TestOutcome::Response { phase, response },
            Err(error) => TestOutcome::TransportError { phase, error },
        }
    }

    /// The phase this outcome was captured in.
    pub fn phase(&self) -> Phase {
        match self {
            TestOutcome::Response { phase, .. } | TestOutcome::TransportError { phase, .. } => {
                *phase
            }
        }
    }

    /// The response status, if a response arrived.
    pub fn status(&self) -> Option<StatusCode> {
        self.response().map(Response::status)
    }

    /// The response, if one arrived.
    pub fn response(&self) -> Option<&Response> {
        match self {
            TestOutcome::Response { response, .. } => Some(response),
            TestOutcome::TransportError { .. } => None,
        }
    }

    /// The transport error, if the attempt failed.
    pub fn error(&self) -> Option<&Error> {
        match self {
            TestOutcome::TransportError { error, .. } => Some(error),
            TestOutcome::Response { .. } => None,
        }
    }

    /// Returns true if the proxy asked for credentials, either through a
    /// `407` response or by rejecting the tunnel.
    pub fn is_proxy_auth_required(&self) -> bool {
        match self {
            TestOutcome::Response { response, .. } => {
                response.status() == StatusCode::PROXY_AUTHENTICATION_REQUIRED
            }
            TestOutcome::TransportError { error, .. } => error.is_proxy_auth(),
        }
    }

    fn describe(&self) -> String {
        match self {
            TestOutcome::Response { response, .. } => format!("status {}", response.status()),
            TestOutcome::TransportError { error, .. } => format!("transport error ({error})"),
        }
    }
}

/// What a phase must observe for the scenario to pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Expectation {
    /// A response with exactly this status and no transport error.
    Status(StatusCode),
    /// A transport error caused by the proxy rejecting the tunnel with `407`.
    TunnelAuthFailure,
}

impl Expectation {
    /// The expectation for `phase` when requesting `uri` through an
    /// authenticating proxy.
    ///
    /// Plain destinations see the proxy's `407` as a response. Encrypted ones
    /// only see the CONNECT rejection, wrapped in a transport error.
    pub fn for_phase(phase: Phase, uri: &Uri) -> Expectation {
        match phase {
            Phase::Authenticated => Expectation::Status(StatusCode::OK),
            Phase::Unauthenticated if uri.is_https() => Expectation::TunnelAuthFailure,
            Phase::Unauthenticated => {
                Expectation::Status(StatusCode::PROXY_AUTHENTICATION_REQUIRED)
            }
        }
    }

    /// Check an outcome against this expectation.
    pub fn verify(&self, outcome: &TestOutcome) -> crate::Result<()> {
        let ok = match (self, outcome) {
            (Expectation::Status(expected), TestOutcome::Response { response, .. }) => {
                response.status() == *expected
            }
            (Expectation::TunnelAuthFailure, TestOutcome::TransportError { error, .. }) => {
                if error.is_proxy_auth() && error.proxy_status().is_none() {
                    log::warn!("proxy auth failure without a status: {error}");
                }
                error.is_proxy_auth()
                    && error.proxy_status() == Some(StatusCode::PROXY_AUTHENTICATION_REQUIRED)
            }
            _ => false,
        };

        if ok {
            log::debug!("{} phase observed {}", outcome.phase(), self);
            return Ok(());
        }

        Err(Error::unexpected_outcome(
            outcome.phase(),
            self.to_string(),
            outcome.describe(),
        ))
    }
}

impl fmt::Display for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expectation::Status(status) => write!(f, "status {status}"),
            Expectation::TunnelAuthFailure => {
                f.write_str("transport error caused by a 407 tunnel rejection")
            }
        }
    }
}
