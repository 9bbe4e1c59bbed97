//! HTTP CONNECT tunnels.
//!
//! Encrypted destinations are reached through a proxy by first asking it to
//! open a raw TCP tunnel. A proxy that wants credentials rejects the CONNECT
//! with `407` before any origin response exists, so the rejection is reported
//! as a [`TunnelError`] rather than as a response.

use std::{error::Error as StdError, fmt, io};

use http::{
    header::{HeaderMap, HeaderValue, PROXY_AUTHENTICATE},
    StatusCode,
};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Failure to establish a CONNECT tunnel.
#[derive(Debug)]
#[non_exhaustive]
pub enum TunnelError {
    /// An IO error talking to the proxy.
    Io(io::Error),
    /// The proxy answered `407 Proxy Authentication Required`.
    ProxyAuthRequired {
        /// The `Proxy-Authenticate` challenge sent with the rejection.
        challenge: Option<HeaderValue>,
    },
    /// The proxy response headers did not fit in the read buffer.
    ProxyHeadersTooLong,
    /// The proxy closed the connection before answering.
    TunnelUnexpectedEof,
    /// The proxy answered with a non-success status.
    Unsuccessful(StatusCode),
    /// The proxy answer was not a valid HTTP response.
    Malformed(httparse::Error),
    /// The proxy sent this many bytes past its CONNECT response, before the
    /// client had said anything through the tunnel.
    UnexpectedData(usize),
}

impl TunnelError {
    /// The status the proxy answered with, when it answered at all.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            TunnelError::ProxyAuthRequired { .. } => {
                Some(StatusCode::PROXY_AUTHENTICATION_REQUIRED)
            }
            TunnelError::Unsuccessful(status) => Some(*status),
            _ => None,
        }
    }

    /// Returns true if the proxy rejected the tunnel for lack of credentials.
    pub fn is_proxy_auth(&self) -> bool {
        matches!(self, TunnelError::ProxyAuthRequired { .. })
    }

    /// The `Proxy-Authenticate` challenge, if the proxy sent one.
    pub fn challenge(&self) -> Option<&HeaderValue> {
        match self {
            TunnelError::ProxyAuthRequired { challenge } => challenge.as_ref(),
            _ => None,
        }
    }
}

/// Ask the proxy on `conn` to open a tunnel to `host:port`.
///
/// `headers` are sent with the CONNECT request, typically
/// `Proxy-Authorization` and `User-Agent`.
pub(crate) async fn tunnel<T>(
    mut conn: T,
    host: &str,
    port: u16,
    headers: &HeaderMap,
) -> Result<T, TunnelError>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = format!(
        "\
         CONNECT {host}:{port} HTTP/1.1\r\n\
         Host: {host}:{port}\r\n\
         "
    )
    .into_bytes();

    for (name, value) in headers {
        buf.extend_from_slice(name.as_str().as_bytes());
        buf.extend_from_slice(b": ");
        buf.extend_from_slice(value.as_bytes());
        buf.extend_from_slice(b"\r\n");
    }

    // headers end
    buf.extend_from_slice(b"\r\n");

    log::trace!("sending CONNECT {host}:{port}");
    conn.write_all(&buf).await.map_err(TunnelError::Io)?;
    conn.flush().await.map_err(TunnelError::Io)?;

    let mut buf = [0; 8192];
    let mut pos = 0;

    loop {
        let n = conn.read(&mut buf[pos..]).await.map_err(TunnelError::Io)?;

        if n == 0 {
            return Err(TunnelError::TunnelUnexpectedEof);
        }
        pos += n;

        let mut parsed = [httparse::EMPTY_HEADER; 64];
        let mut res = httparse::Response::new(&mut parsed);
        match res.parse(&buf[..pos]).map_err(TunnelError::Malformed)? {
            httparse::Status::Complete(len) => {
                let status = res
                    .code
                    .and_then(|code| StatusCode::from_u16(code).ok())
                    .ok_or(TunnelError::Malformed(httparse::Error::Status))?;

                if status.is_success() {
                    // nothing may precede our ClientHello
                    if len < pos {
                        return Err(TunnelError::UnexpectedData(pos - len));
                    }
                    log::debug!("tunnel to {host}:{port} established");
                    return Ok(conn);
                }

                if status == StatusCode::PROXY_AUTHENTICATION_REQUIRED {
                    let challenge = res
                        .headers
                        .iter()
                        .find(|h| h.name.eq_ignore_ascii_case(PROXY_AUTHENTICATE.as_str()))
                        .and_then(|h| HeaderValue::from_bytes(h.value).ok());
                    log::debug!("proxy requires authentication for {host}:{port}");
                    return Err(TunnelError::ProxyAuthRequired { challenge });
                }

                return Err(TunnelError::Unsuccessful(status));
            }
            httparse::Status::Partial => {
                if pos == buf.len() {
                    return Err(TunnelError::ProxyHeadersTooLong);
                }
                // read more
            }
        }
    }
}

impl fmt::Display for TunnelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("tunnel error: ")?;

        match self {
            TunnelError::ProxyAuthRequired { .. } => f.write_str("proxy authorization required"),
            TunnelError::ProxyHeadersTooLong => f.write_str("proxy response headers too long"),
            TunnelError::TunnelUnexpectedEof => f.write_str("unexpected end of file"),
            TunnelError::Unsuccessful(status) => write!(f, "unsuccessful ({status})"),
            TunnelError::Malformed(_) => f.write_str("malformed proxy response"),
            TunnelError::UnexpectedData(len) => {
                write!(f, "{len} unexpected bytes after the proxy response")
            }
            TunnelError::Io(_) => f.write_str("io error establishing tunnel"),
        }
    }
}

impl StdError for TunnelError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            TunnelError::Io(e) => Some(e),
            TunnelError::Malformed(e) => Some(e),
            _ => None,
        }
    }
}
