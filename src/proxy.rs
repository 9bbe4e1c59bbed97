//! Proxy configuration
//!
//! A [`Proxy`] decides whether a destination is sent through a proxy, and if
//! so, which one and with what credentials. It is usually built from the
//! environment with [`Proxy::system()`], which is the closest thing a Unix
//! process has to a "system proxy". It can also be configured explicitly
//! through [`Proxy::builder()`].
//!
//! Credentials come from two places: `user:pass@` userinfo in the proxy URI,
//! and a credential attached with [`Proxy::with_credentials`]. The attached
//! credential wins.

use std::net::IpAddr;

use http::{
    header::HeaderValue,
    uri::{Authority, Scheme},
    Uri,
};
use ipnet::IpNet;
use percent_encoding::percent_decode_str;

use crate::{credential::ProxyCredential, error::Error, ext::UriExt};

/// Rules for which requests go through which proxy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Proxy {
    http: Option<Intercept>,
    https: Option<Intercept>,
    no: NoProxy,
    credential: Option<ProxyCredential>,
}

/// A matched proxy.
///
/// This is returned by [`Proxy::intercept`] if a proxy should be used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Intercept {
    uri: Uri,
    credential: Option<ProxyCredential>,
}

/// A builder to create a [`Proxy`].
///
/// Construct with [`Proxy::builder()`].
#[derive(Debug, Default)]
pub struct Builder {
    is_cgi: bool,
    all: String,
    http: String,
    https: String,
    no: String,
}

/// A filter for proxied destinations.
///
/// This type is based off the `NO_PROXY` rules used by curl.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct NoProxy {
    ips: IpMatcher,
    domains: DomainMatcher,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct DomainMatcher(Vec<String>);

#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct IpMatcher(Vec<Ip>);

#[derive(Clone, Debug, PartialEq, Eq)]
enum Ip {
    Address(IpAddr),
    Network(IpNet),
}

// ===== impl Proxy =====

impl Proxy {
    /// Create a proxy configuration from the environment.
    ///
    /// Reads `ALL_PROXY`, `HTTP_PROXY`, `HTTPS_PROXY` and `NO_PROXY` (upper
    /// case first, then lower case). When running as a CGI script
    /// (`REQUEST_METHOD` is set) no proxy is used, since `HTTP_PROXY` can be
    /// injected through the `Proxy:` request header.
    pub fn system() -> Proxy {
        Builder::from_env().build()
    }

    /// Start a builder to configure a proxy.
    pub fn builder() -> Builder {
        Builder::default()
    }

    /// A configuration that never proxies.
    pub fn none() -> Proxy {
        Proxy::default()
    }

    /// Send all traffic, plain and encrypted, to the proxy at `uri`.
    pub fn all(uri: &str) -> crate::Result<Proxy> {
        let intercept = parse_proxy_uri(uri)
            .ok_or_else(|| Error::builder(format!("invalid proxy uri: {uri:?}")))?;
        Ok(Proxy {
            http: Some(intercept.clone()),
            https: Some(intercept),
            ..Proxy::default()
        })
    }

    /// Attach a credential to every proxy in this configuration.
    pub fn with_credentials(mut self, credential: ProxyCredential) -> Proxy {
        self.set_credentials(credential);
        self
    }

    /// Attach a credential to every proxy in this configuration, replacing
    /// any previous one.
    pub fn set_credentials(&mut self, credential: ProxyCredential) {
        self.credential = Some(credential);
    }

    /// Strip every credential, both attached and parsed from userinfo.
    pub fn without_credentials(mut self) -> Proxy {
        self.credential = None;
        for intercept in [&mut self.http, &mut self.https].into_iter().flatten() {
            intercept.credential = None;
        }
        self
    }

    /// Returns true if no destination would ever be proxied.
    pub fn is_empty(&self) -> bool {
        self.http.is_none() && self.https.is_none()
    }

    /// Check if the destination should be intercepted by a proxy.
    pub fn intercept(&self, dst: &Uri) -> Option<Intercept> {
        if self.no.contains(dst.host()?) {
            return None;
        }

        let intercept = if dst.is_http() {
            self.http.clone()
        } else if dst.is_https() {
            self.https.clone()
        } else {
            None
        }?;

        Some(match self.credential {
            Some(ref credential) => Intercept {
                credential: Some(credential.clone()),
                ..intercept
            },
            None => intercept,
        })
    }
}

// ===== impl Intercept =====

impl Intercept {
    /// The URI of the proxy to connect to.
    #[inline]
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// The credential to present to the proxy, if any.
    #[inline]
    pub fn credential(&self) -> Option<&ProxyCredential> {
        self.credential.as_ref()
    }

    /// The `Proxy-Authorization` value to present, if any.
    pub(crate) fn basic_auth(&self) -> Option<HeaderValue> {
        self.credential.as_ref().map(ProxyCredential::basic_auth)
    }

    pub(crate) fn set_credential(&mut self, credential: ProxyCredential) {
        self.credential = Some(credential);
    }
}

// ===== impl Builder =====

impl Builder {
    fn from_env() -> Self {
        Builder {
            is_cgi: std::env::var_os("REQUEST_METHOD").is_some(),
            all: get_first_env(&["ALL_PROXY", "all_proxy"]),
            http: get_first_env(&["HTTP_PROXY", "http_proxy"]),
            https: get_first_env(&["HTTPS_PROXY", "https_proxy"]),
            no: get_first_env(&["NO_PROXY", "no_proxy"]),
        }
    }

    /// Set the target proxy for all destinations.
    pub fn all(mut self, val: impl Into<String>) -> Self {
        self.all = val.into();
        self
    }

    /// Set the target proxy for HTTP destinations.
    pub fn http(mut self, val: impl Into<String>) -> Self {
        self.http = val.into();
        self
    }

    /// Set the target proxy for HTTPS destinations.
    pub fn https(mut self, val: impl Into<String>) -> Self {
        self.https = val.into();
        self
    }

    /// Set the "no" proxy filter.
    ///
    /// The rules are as follows:
    /// * Entries are expected to be comma-separated (whitespace between entries is ignored)
    /// * IP addresses (both IPv4 and IPv6) are allowed, as are optional subnet masks (by adding
    ///   /size, for example "`192.168.1.0/24`").
    /// * An entry "`*`" matches all hostnames (this is the only wildcard allowed)
    /// * Any other entry is considered a domain name (and may contain a leading dot, for example
    ///   `google.com` and `.google.com` are equivalent) and would match both that domain AND all
    ///   subdomains.
    pub fn no(mut self, val: impl Into<String>) -> Self {
        self.no = val.into();
        self
    }

    /// Construct a [`Proxy`] using the configured values.
    pub fn build(self) -> Proxy {
        if self.is_cgi {
            if !self.http.is_empty() {
                log::warn!("HTTP_PROXY environment variable ignored in CGI");
            }
            return Proxy::none();
        }

        let all = parse_proxy_uri(&self.all);
        let http = parse_proxy_uri(&self.http);
        let https = parse_proxy_uri(&self.https);

        Proxy {
            http: http.or_else(|| all.clone()),
            https: https.or(all),
            no: NoProxy::from_string(&self.no),
            credential: None,
        }
    }
}

fn get_first_env(names: &[&str]) -> String {
    for name in names {
        if let Ok(val) = std::env::var(name) {
            return val;
        }
    }

    String::new()
}

fn parse_proxy_uri(val: &str) -> Option<Intercept> {
    let val = val.trim();
    if val.is_empty() {
        return None;
    }

    // bare `host:port` values are accepted, as curl does
    let uri = match val.parse::<Uri>() {
        Ok(uri) if uri.scheme().is_some() => uri,
        _ => format!("http://{val}").parse::<Uri>().ok()?,
    };

    let scheme = match uri.scheme() {
        // the proxy hop itself is always plain tcp
        Some(s) if s == &Scheme::HTTP => s.clone(),
        _ => {
            log::debug!("ignoring proxy with unsupported scheme: {val:?}");
            return None;
        }
    };

    let authority = uri.authority()?;
    let mut credential = None;
    let host_port = match authority.as_str().rsplit_once('@') {
        Some((userinfo, host_port)) => {
            let (user, pass) = match userinfo.split_once(':') {
                Some((user, pass)) => (user, pass),
                None => (userinfo, ""),
            };

            let user = percent_decode_str(user).decode_utf8_lossy();
            let pass = percent_decode_str(pass).decode_utf8_lossy();
            credential = Some(ProxyCredential::new(user, pass));
            host_port.parse::<Authority>().ok()?
        }
        None => authority.clone(),
    };

    // removing any path, but we MUST specify one or the builder errors
    let uri = Uri::builder()
        .scheme(scheme)
        .authority(host_port)
        .path_and_query("/")
        .build()
        .ok()?;

    Some(Intercept { uri, credential })
}

impl NoProxy {
    /// Returns a new no-proxy configuration based on a `no_proxy` string.
    fn from_string(no_proxy_list: &str) -> Self {
        let mut ips = Vec::new();
        let mut domains = Vec::new();
        let parts = no_proxy_list.split(',').map(str::trim);
        for part in parts {
            match part.parse::<IpNet>() {
                // If we can parse an IP net or address, then use it, otherwise, assume it is a
                // domain
                Ok(ip) => ips.push(Ip::Network(ip)),
                Err(_) => match part.parse::<IpAddr>() {
                    Ok(addr) => ips.push(Ip::Address(addr)),
                    Err(_) => {
                        if !part.is_empty() {
                            domains.push(part.to_owned())
                        }
                    }
                },
            }
        }
        NoProxy {
            ips: IpMatcher(ips),
            domains: DomainMatcher(domains),
        }
    }

    /// Return true if this matches the host (domain or IP).
    fn contains(&self, host: &str) -> bool {
        // According to RFC3986, raw IPv6 hosts will be wrapped in []. So we need to strip those off
        // the end in order to parse correctly
        let host = if host.starts_with('[') {
            let x: &[_] = &['[', ']'];
            host.trim_matches(x)
        } else {
            host
        };
        match host.parse::<IpAddr>() {
            // If we can parse an IP addr, then use it, otherwise, assume it is a domain
            Ok(ip) => self.ips.contains(ip),
            Err(_) => self.domains.contains(host),
        }
    }
}

impl IpMatcher {
    fn contains(&self, addr: IpAddr) -> bool {
        self.0.iter().any(|ip| match ip {
            Ip::Address(address) => &addr == address,
            Ip::Network(net) => net.contains(&addr),
        })
    }
}

impl DomainMatcher {
    // The following links may be useful to understand the origin of these rules:
    // * https://curl.se/libcurl/c/CURLOPT_NOPROXY.html
    // * https://github.com/curl/curl/issues/1208
    fn contains(&self, domain: &str) -> bool {
        let domain_len = domain.len();
        for d in &self.0 {
            if d == domain || d.strip_prefix('.') == Some(domain) {
                return true;
            } else if domain.ends_with(d.as_str()) {
                if d.starts_with('.') {
                    // a leading dot on d means domain is a subdomain of d
                    return true;
                } else if domain.as_bytes().get(domain_len - d.len() - 1) == Some(&b'.') {
                    // the character before the match is a dot, so this is a subdomain of d
                    return true;
                }
            } else if d == "*" {
                return true;
            }
        }
        false
    }
}
