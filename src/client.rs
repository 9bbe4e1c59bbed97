//! A small HTTP/1.1 client that knows how to talk through a proxy.
//!
//! Every request opens a fresh connection. Plain destinations behind a proxy
//! are requested in absolute form from the proxy itself; encrypted ones go
//! through a CONNECT tunnel followed by a TLS handshake with the origin.

use std::{fmt, sync::Arc, time::Duration};

use bytes::Bytes;
use http::{
    header::{
        HeaderMap, HeaderValue, AUTHORIZATION, HOST, PROXY_AUTHENTICATE, PROXY_AUTHORIZATION,
        USER_AGENT, WWW_AUTHENTICATE,
    },
    Method, StatusCode, Uri, Version,
};
use http_body_util::{BodyExt, Empty};
use hyper_util::rt::TokioIo;
use serde::de::DeserializeOwned;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpStream,
};

use crate::{
    credential::{self, Challenge, ChallengeKind, CredentialProvider, ProxyCredential},
    error::Error,
    ext::UriExt,
    proxy::{Intercept, Proxy},
    tls::{TlsConfig, TlsConnector},
    tunnel::tunnel,
};

static DEFAULT_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// An asynchronous client to make requests through a proxy.
///
/// The `Client` holds its proxy rules, its TLS settings and an optional
/// [`CredentialProvider`]. It is cheap to clone.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientRef>,
}

/// A `ClientBuilder` can be used to create a `Client` with custom configuration.
#[must_use]
pub struct ClientBuilder {
    config: Config,
}

struct Config {
    proxy: Option<Proxy>,
    tls: TlsConfig,
    provider: Option<Arc<dyn CredentialProvider>>,
    user_agent: Option<HeaderValue>,
    timeout: Option<Duration>,
    error: Option<Error>,
}

struct ClientRef {
    proxy: Proxy,
    tls: TlsConnector,
    provider: Option<Arc<dyn CredentialProvider>>,
    user_agent: HeaderValue,
    timeout: Option<Duration>,
}

/// A request which can be executed with `Client::execute()`.
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
}

/// A fully received response.
pub struct Response {
    status: StatusCode,
    version: Version,
    headers: HeaderMap,
    uri: Uri,
    body: Bytes,
}

// ===== impl ClientBuilder =====

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientBuilder {
    /// Constructs a new `ClientBuilder`.
    ///
    /// Unless overridden, the client uses [`Proxy::system()`] and strict TLS.
    pub fn new() -> ClientBuilder {
        ClientBuilder {
            config: Config {
                proxy: None,
                tls: TlsConfig::default(),
                provider: None,
                user_agent: None,
                timeout: None,
                error: None,
            },
        }
    }

    /// Returns a `Client` that uses this `ClientBuilder` configuration.
    pub fn build(self) -> crate::Result<Client> {
        let config = self.config;

        if let Some(err) = config.error {
            return Err(err);
        }

        let proxy = config.proxy.unwrap_or_else(Proxy::system);
        log::debug!("building client, proxy configured: {}", !proxy.is_empty());

        Ok(Client {
            inner: Arc::new(ClientRef {
                proxy,
                tls: config.tls.build_connector()?,
                provider: config.provider,
                user_agent: config
                    .user_agent
                    .unwrap_or_else(|| HeaderValue::from_static(DEFAULT_USER_AGENT)),
                timeout: config.timeout,
            }),
        })
    }

    /// Sets the `User-Agent` header sent with every request and CONNECT.
    pub fn user_agent<V>(mut self, value: V) -> ClientBuilder
    where
        V: TryInto<HeaderValue>,
        V::Error: Into<http::Error>,
    {
        match value.try_into() {
            Ok(value) => {
                self.config.user_agent = Some(value);
            }
            Err(e) => {
                self.config.error = Some(Error::builder(e.into()));
            }
        };
        self
    }

    /// Use these proxy rules instead of the system ones.
    pub fn proxy(mut self, proxy: Proxy) -> ClientBuilder {
        self.config.proxy = Some(proxy);
        self
    }

    /// Clear all proxies, so `Client` will connect directly.
    pub fn no_proxy(mut self) -> ClientBuilder {
        self.config.proxy = Some(Proxy::none());
        self
    }

    /// Use these TLS settings for every encrypted connection.
    pub fn tls(mut self, tls: TlsConfig) -> ClientBuilder {
        self.config.tls = tls;
        self
    }

    /// Controls the use of certificate validation.
    ///
    /// # Warning
    ///
    /// You should think very carefully before using this method. If
    /// invalid certificates are trusted, *any* certificate for *any* site
    /// will be trusted for use.
    pub fn danger_accept_invalid_certs(mut self, accept_invalid_certs: bool) -> ClientBuilder {
        self.config.tls = if accept_invalid_certs {
            TlsConfig::permissive()
        } else {
            TlsConfig::default()
        };
        self
    }

    /// Install a provider that is asked for credentials when a request is
    /// challenged.
    pub fn credential_provider<P>(mut self, provider: P) -> ClientBuilder
    where
        P: CredentialProvider + 'static,
    {
        self.config.provider = Some(Arc::new(provider));
        self
    }

    /// Set a timeout for each request attempt, from connecting until the
    /// body has been read.
    pub fn timeout(mut self, timeout: Duration) -> ClientBuilder {
        self.config.timeout = Some(timeout);
        self
    }
}

impl fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("proxy", &self.config.proxy)
            .field("tls", &self.config.tls)
            .field("provider", &self.config.provider)
            .field("timeout", &self.config.timeout)
            .finish()
    }
}

// ===== impl Client =====

impl Client {
    /// Creates a `ClientBuilder` to configure a `Client`.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// The proxy rules this client routes through.
    pub fn proxy(&self) -> &Proxy {
        &self.inner.proxy
    }

    /// Convenience method to make a `GET` request to a URL.
    pub async fn get(&self, url: &str) -> crate::Result<Response> {
        self.execute(Request::new(Method::GET, url)?).await
    }

    /// Executes a `Request`.
    ///
    /// When a [`CredentialProvider`] is installed and the request is
    /// challenged, the provider is asked once per challenge kind and the
    /// request is resent with whatever it supplies. Without a provider, a
    /// challenge is returned to the caller as is: a `407`/`401` response, or
    /// a tunnel error for encrypted destinations.
    pub async fn execute(&self, request: Request) -> crate::Result<Response> {
        let mut proxy_credential: Option<ProxyCredential> = None;
        let mut origin_credential: Option<ProxyCredential> = None;
        let mut asked = Vec::with_capacity(2);

        loop {
            let intercept = self.inner.proxy.intercept(&request.uri).map(|mut intercept| {
                if let Some(ref credential) = proxy_credential {
                    intercept.set_credential(credential.clone());
                }
                intercept
            });

            let result = self
                .attempt(&request, intercept.as_ref(), origin_credential.as_ref())
                .await;

            let Some(ref provider) = self.inner.provider else {
                return result;
            };

            let challenge = match challenge_of(&result, &request.uri, intercept.as_ref()) {
                Some(challenge) if !asked.contains(&challenge.kind()) => challenge,
                _ => return result,
            };
            asked.push(challenge.kind());

            log::debug!("{:?} challenge for {}", challenge.kind(), request.uri);
            match credential::resolve(provider.as_ref(), &challenge).await {
                Some(credential) => match challenge.kind() {
                    ChallengeKind::Proxy => proxy_credential = Some(credential),
                    ChallengeKind::Origin => origin_credential = Some(credential),
                },
                None => {
                    log::debug!("credential provider declined {:?} challenge", challenge.kind());
                    return result;
                }
            }
        }
    }

    async fn attempt(
        &self,
        request: &Request,
        intercept: Option<&Intercept>,
        origin_credential: Option<&ProxyCredential>,
    ) -> crate::Result<Response> {
        let fut = self.send(request, intercept, origin_credential);
        match self.inner.timeout {
            Some(timeout) => tokio::time::timeout(timeout, fut)
                .await
                .map_err(|_| Error::timeout().with_uri(request.uri.clone()))?,
            None => fut.await,
        }
    }

    async fn send(
        &self,
        request: &Request,
        intercept: Option<&Intercept>,
        origin_credential: Option<&ProxyCredential>,
    ) -> crate::Result<Response> {
        let uri = &request.uri;
        let host = uri
            .host()
            .ok_or_else(|| Error::builder("missing destination host").with_uri(uri.clone()))?;

        // a fresh request every attempt, so credentials never leak backwards
        let mut headers = request.headers.clone();
        headers.insert(USER_AGENT, self.inner.user_agent.clone());
        if let Some(host) = uri.host_header() {
            let value = HeaderValue::from_str(&host).map_err(Error::builder)?;
            headers.insert(HOST, value);
        }
        if let Some(credential) = origin_credential {
            headers.insert(AUTHORIZATION, credential.basic_auth());
        }

        match intercept {
            Some(proxy) if uri.is_http() => {
                log::trace!("forwarding {uri} via proxy {}", proxy.uri());
                if let Some(auth) = proxy.basic_auth() {
                    headers.insert(PROXY_AUTHORIZATION, auth);
                }
                let conn = connect_tcp(proxy.uri()).await?;
                send_http1(conn, &request.method, uri.clone(), headers, uri).await
            }
            Some(proxy) => {
                log::trace!("tunnelling to {uri} via proxy {}", proxy.uri());
                let mut connect_headers = HeaderMap::new();
                connect_headers.insert(USER_AGENT, self.inner.user_agent.clone());
                if let Some(auth) = proxy.basic_auth() {
                    connect_headers.insert(PROXY_AUTHORIZATION, auth);
                }

                let conn = connect_tcp(proxy.uri()).await?;
                let conn = tunnel(conn, host, uri.port_or_default(), &connect_headers)
                    .await
                    .map_err(|e| Error::tunnel(e).with_uri(uri.clone()))?;
                let tls = self.inner.tls.connect(host, conn).await?;
                send_http1(tls, &request.method, origin_uri(uri)?, headers, uri).await
            }
            None => {
                log::trace!("connecting directly to {uri}");
                let conn = connect_tcp(uri).await?;
                if uri.is_https() {
                    let tls = self.inner.tls.connect(host, conn).await?;
                    send_http1(tls, &request.method, origin_uri(uri)?, headers, uri).await
                } else {
                    send_http1(conn, &request.method, origin_uri(uri)?, headers, uri).await
                }
            }
        }
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Client")
            .field("proxy", &self.inner.proxy)
            .field("tls", &self.inner.tls)
            .field("provider", &self.inner.provider)
            .field("user_agent", &self.inner.user_agent)
            .field("timeout", &self.inner.timeout)
            .finish()
    }
}

/// Work out whether an attempt was challenged, and by whom.
fn challenge_of(
    result: &crate::Result<Response>,
    uri: &Uri,
    intercept: Option<&Intercept>,
) -> Option<Challenge> {
    let proxy = intercept.map(|i| i.uri().clone());
    match result {
        Ok(res) if res.status() == StatusCode::PROXY_AUTHENTICATION_REQUIRED => Some(Challenge::new(
            ChallengeKind::Proxy,
            uri.clone(),
            proxy,
            res.headers().get(PROXY_AUTHENTICATE).cloned(),
        )),
        Ok(res) if res.status() == StatusCode::UNAUTHORIZED => Some(Challenge::new(
            ChallengeKind::Origin,
            uri.clone(),
            proxy,
            res.headers().get(WWW_AUTHENTICATE).cloned(),
        )),
        Err(err) => err
            .tunnel_error()
            .filter(|tunnel| tunnel.is_proxy_auth())
            .map(|tunnel| {
                Challenge::new(
                    ChallengeKind::Proxy,
                    uri.clone(),
                    proxy,
                    tunnel.challenge().cloned(),
                )
            }),
        Ok(_) => None,
    }
}

fn origin_uri(uri: &Uri) -> crate::Result<Uri> {
    Uri::builder()
        .path_and_query(uri.origin_form())
        .build()
        .map_err(Error::builder)
}

async fn connect_tcp(uri: &Uri) -> crate::Result<TcpStream> {
    let host = uri
        .host()
        .ok_or_else(|| Error::builder("missing host").with_uri(uri.clone()))?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    let port = uri.port_or_default();

    let stream = TcpStream::connect((host, port))
        .await
        .map_err(|e| Error::request(e).with_uri(uri.clone()))?;
    stream
        .set_nodelay(true)
        .map_err(|e| Error::request(e).with_uri(uri.clone()))?;
    Ok(stream)
}

async fn send_http1<S>(
    io: S,
    method: &Method,
    target: Uri,
    headers: HeaderMap,
    uri: &Uri,
) -> crate::Result<Response>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let mut req = http::Request::new(Empty::<Bytes>::new());
    *req.method_mut() = method.clone();
    *req.uri_mut() = target;
    *req.headers_mut() = headers;

    let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(io))
        .await
        .map_err(|e| Error::request(e).with_uri(uri.clone()))?;

    tokio::spawn(async move {
        if let Err(err) = conn.await {
            log::debug!("connection error: {err}");
        }
    });

    let res = sender
        .send_request(req)
        .await
        .map_err(|e| Error::request(e).with_uri(uri.clone()))?;

    let (parts, body) = res.into_parts();
    let body = body
        .collect()
        .await
        .map_err(|e| Error::body(e).with_uri(uri.clone()))?
        .to_bytes();

    log::debug!("{} {} -> {}", method, uri, parts.status);

    Ok(Response {
        status: parts.status,
        version: parts.version,
        headers: parts.headers,
        uri: uri.clone(),
        body,
    })
}

// ===== impl Request =====

impl Request {
    /// Constructs a new request for an `http` or `https` URL.
    pub fn new(method: Method, url: &str) -> crate::Result<Request> {
        let url = url::Url::parse(url).map_err(Error::builder)?;
        let uri = url.as_str().parse::<Uri>().map_err(Error::builder)?;

        if !(uri.is_http() || uri.is_https()) {
            return Err(Error::uri_bad_scheme(uri));
        }

        Ok(Request {
            method,
            uri,
            headers: HeaderMap::new(),
        })
    }

    /// Get the method.
    #[inline]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Get the uri.
    #[inline]
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Get the headers.
    #[inline]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Get a mutable reference to the headers.
    #[inline]
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }
}

// ===== impl Response =====

impl Response {
    /// Get the `StatusCode` of this `Response`.
    #[inline]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Get the HTTP `Version` of this `Response`.
    #[inline]
    pub fn version(&self) -> Version {
        self.version
    }

    /// Get the `Headers` of this `Response`.
    #[inline]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Get the `Uri` this `Response` was requested from.
    #[inline]
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Get the full response body as `Bytes`.
    pub fn bytes(&self) -> Bytes {
        self.body.clone()
    }

    /// Get the response text, replacing invalid UTF-8.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Try to deserialize the response body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> crate::Result<T> {
        serde_json::from_slice(&self.body).map_err(|e| Error::decode(e).with_uri(self.uri.clone()))
    }

    /// Turn a response into an error if the server returned an error.
    pub fn error_for_status(self) -> crate::Result<Self> {
        if self.status.is_client_error() || self.status.is_server_error() {
            Err(Error::status_code(self.uri, self.status))
        } else {
            Ok(self)
        }
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Response")
            .field("uri", &self.uri)
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish()
    }
}
