use std::{
    convert::Infallible,
    sync::{Arc, Mutex},
};

use bytes::Bytes;
use http::{header, HeaderMap, HeaderValue, Method, Request, Response, StatusCode, Uri};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper_util::rt::TokioIo;

use super::server::{self, Body, Server};
use super::tls;

pub const REALM: &str = "Basic realm=\"fixture proxy\"";

/// A request as the proxy saw it.
#[derive(Clone, Debug)]
pub struct Seen {
    pub method: Method,
    pub target: String,
    pub headers: HeaderMap,
    pub tunnelled: bool,
}

impl Seen {
    pub fn proxy_authorization(&self) -> Option<&HeaderValue> {
        self.headers.get(header::PROXY_AUTHORIZATION)
    }

    pub fn authorization(&self) -> Option<&HeaderValue> {
        self.headers.get(header::AUTHORIZATION)
    }
}

/// A forward proxy that demands Basic credentials before it forwards
/// anything. It plays every origin itself: absolute-form requests are
/// answered directly, CONNECT tunnels are terminated with a self-signed
/// certificate and served over TLS.
pub struct AuthProxy {
    server: Server,
    seen: Arc<Mutex<Vec<Seen>>>,
}

impl AuthProxy {
    pub fn uri(&self) -> String {
        format!("http://{}", self.server.addr())
    }

    pub fn seen(&self) -> Vec<Seen> {
        self.seen.lock().unwrap().clone()
    }

    /// Everything that reached the proxy itself, i.e. not from inside a tunnel.
    pub fn proxied(&self) -> Vec<Seen> {
        self.seen().into_iter().filter(|s| !s.tunnelled).collect()
    }

    /// Everything an origin received through a tunnel.
    pub fn tunnelled(&self) -> Vec<Seen> {
        self.seen().into_iter().filter(|s| s.tunnelled).collect()
    }
}

pub fn text(status: StatusCode, body: &'static str) -> Response<Body> {
    Response::builder()
        .status(status)
        .body(Full::new(Bytes::from_static(body.as_bytes())))
        .unwrap()
}

pub fn json(body: String) -> Response<Body> {
    Response::builder()
        .header(header::CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(body)))
        .unwrap()
}

fn challenge() -> Response<Body> {
    Response::builder()
        .status(StatusCode::PROXY_AUTHENTICATION_REQUIRED)
        .header(header::PROXY_AUTHENTICATE, REALM)
        .body(Full::new(Bytes::new()))
        .unwrap()
}

/// The absolute URI a tunnelled request was made for, with the default
/// port left out as a client would write it.
fn tunnelled_uri(authority: &str, path: &Uri) -> Uri {
    let authority = authority.strip_suffix(":443").unwrap_or(authority);
    format!("https://{authority}{path}").parse().unwrap()
}

/// Start a proxy accepting only `username`/`password`, answering origin
/// requests with `origin`, which receives the absolute destination URI and
/// the request headers.
pub fn authenticating<F>(username: &str, password: &str, origin: F) -> AuthProxy
where
    F: Fn(&Uri, &HeaderMap) -> Response<Body> + Clone + Send + Sync + 'static,
{
    let expected = HeaderValue::from_str(&basic(username, password)).unwrap();
    let acceptor = Arc::new(tls::self_signed_acceptor("fixture-origin"));
    let seen = Arc::new(Mutex::new(Vec::new()));

    let log = seen.clone();
    let server = server::http(move |req: Request<Incoming>| {
        let expected = expected.clone();
        let acceptor = acceptor.clone();
        let origin = origin.clone();
        let log = log.clone();
        async move {
            log.lock().unwrap().push(Seen {
                method: req.method().clone(),
                target: req.uri().to_string(),
                headers: req.headers().clone(),
                tunnelled: false,
            });

            if req.headers().get(header::PROXY_AUTHORIZATION) != Some(&expected) {
                return challenge();
            }

            if req.method() != Method::CONNECT {
                return origin(req.uri(), req.headers());
            }

            let authority = req.uri().authority().map(|a| a.to_string()).unwrap_or_default();
            tokio::spawn(async move {
                let upgraded = match hyper::upgrade::on(req).await {
                    Ok(upgraded) => upgraded,
                    Err(_) => return,
                };
                let tls = match tokio_boring::accept(&acceptor, TokioIo::new(upgraded)).await {
                    Ok(tls) => tls,
                    // the client refused our certificate
                    Err(_) => return,
                };

                let svc = hyper::service::service_fn(move |req: Request<Incoming>| {
                    let uri = tunnelled_uri(&authority, req.uri());
                    log.lock().unwrap().push(Seen {
                        method: req.method().clone(),
                        target: uri.to_string(),
                        headers: req.headers().clone(),
                        tunnelled: true,
                    });
                    let res = origin(&uri, req.headers());
                    async move { Ok::<_, Infallible>(res) }
                });
                let _ = hyper::server::conn::http1::Builder::new()
                    .serve_connection(TokioIo::new(tls), svc)
                    .await;
            });

            Response::new(Full::new(Bytes::new()))
        }
    });

    AuthProxy { server, seen }
}

/// `200 OK` with a short body for every destination.
pub fn ok_origin(_: &Uri, _: &HeaderMap) -> Response<Body> {
    text(StatusCode::OK, "origin says hello")
}

/// An origin that wants its own Basic credentials, independent of the
/// proxy's.
pub fn protected_origin(
    username: &str,
    password: &str,
) -> impl Fn(&Uri, &HeaderMap) -> Response<Body> + Clone + Send + Sync + 'static {
    let expected = HeaderValue::from_str(&basic(username, password)).unwrap();
    move |_: &Uri, headers: &HeaderMap| {
        if headers.get(header::AUTHORIZATION) == Some(&expected) {
            return text(StatusCode::OK, "welcome");
        }
        Response::builder()
            .status(StatusCode::UNAUTHORIZED)
            .header(header::WWW_AUTHENTICATE, "Basic realm=\"fixture origin\"")
            .body(Full::new(Bytes::new()))
            .unwrap()
    }
}

pub fn basic(username: &str, password: &str) -> String {
    use base64::Engine;
    let encoded =
        base64::engine::general_purpose::STANDARD.encode(format!("{username}:{password}"));
    format!("Basic {encoded}")
}
