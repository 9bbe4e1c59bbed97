//! Extension utilities.

use http::uri::{PathAndQuery, Scheme, Uri};

/// Extension trait for `Uri` helpers.
pub(crate) trait UriExt {
    /// Returns true if the URI scheme is HTTP.
    fn is_http(&self) -> bool;

    /// Returns true if the URI scheme is HTTPS.
    fn is_https(&self) -> bool;

    /// Returns the port of the URI, or the default port for the scheme if none is specified.
    fn port_or_default(&self) -> u16;

    /// Returns the value for a `Host` header: the host, plus the port when it
    /// is not the scheme's default.
    fn host_header(&self) -> Option<String>;

    /// Returns the origin-form request target (`/path?query`).
    fn origin_form(&self) -> PathAndQuery;
}

// ===== impl UriExt =====

impl UriExt for Uri {
    #[inline]
    fn is_http(&self) -> bool {
        self.scheme() == Some(&Scheme::HTTP)
    }

    #[inline]
    fn is_https(&self) -> bool {
        self.scheme() == Some(&Scheme::HTTPS)
    }

    fn port_or_default(&self) -> u16 {
        match Uri::port(self) {
            Some(p) => p.as_u16(),
            None if self.is_https() => 443u16,
            _ => 80u16,
        }
    }

    fn host_header(&self) -> Option<String> {
        let host = self.host()?;
        let default_port = if self.is_https() { 443 } else { 80 };
        match self.port_u16() {
            Some(port) if port != default_port => Some(format!("{host}:{port}")),
            _ => Some(host.to_owned()),
        }
    }

    fn origin_form(&self) -> PathAndQuery {
        self.path_and_query()
            .cloned()
            .unwrap_or_else(|| PathAndQuery::from_static("/"))
    }
}
