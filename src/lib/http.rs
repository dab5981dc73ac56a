//! HTTP transport and the mapping of responses onto the error taxonomy.

use std::io::{Read, Write};
use std::time::{Duration, Instant};

use crate::error::Error;
use crate::plan::{Auth, Request};
use crate::sanitize::redact;

/// Bodies are copied in chunks of this size.
pub const CHUNK_SIZE: usize = 64 * 1024;

pub const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Header carrying a REST API private token.
pub const PRIVATE_TOKEN_HEADER: &str = "PRIVATE-TOKEN";

/// A received response whose body has not yet been read.
pub struct Response {
    pub status: u16,
    pub body: Box<dyn Read + Send>,
}

impl std::fmt::Debug for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

/// Issues a single GET.
///
/// Implementations return `Err` only when no response was received; every status code, including
/// errors, is returned as a [`Response`].
pub trait Transport: Send + Sync {
    fn get(&self, request: &Request, timeout: Option<Duration>) -> Result<Response, Error>;
}

/// The production transport.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, Error> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(USER_AGENT)
            // No overall timeout by default; each request carries its own.
            .timeout(None::<Duration>)
            .build()
            .map_err(|e| Error::transport("<client>", e))?;
        Ok(Self { client })
    }
}

impl Transport for ReqwestTransport {
    fn get(&self, request: &Request, timeout: Option<Duration>) -> Result<Response, Error> {
        let mut builder = self.client.get(&request.url);
        builder = match &request.auth {
            Auth::None => builder,
            Auth::PrivateToken(token) => builder.header(PRIVATE_TOKEN_HEADER, token),
            Auth::Bearer(token) => builder.bearer_auth(token),
            Auth::Basic { user, password } => builder.basic_auth(user, password.as_deref()),
        };
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let response = builder
            .send()
            .map_err(|e| Error::transport(&request.url, describe(e)))?;
        Ok(Response {
            status: response.status().as_u16(),
            body: Box::new(response),
        })
    }
}

fn describe(err: reqwest::Error) -> String {
    if err.is_timeout() {
        return "request timed out".to_string();
    }
    let err = err.without_url();
    let mut message = err.to_string();
    let mut cause = std::error::Error::source(&err);
    while let Some(inner) = cause {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        cause = inner.source();
    }
    redact(&message).into_owned()
}

/// The time left until `deadline`, or a transport error when it has already passed.
pub fn remaining(deadline: Option<Instant>, url: &str) -> Result<Option<Duration>, Error> {
    match deadline {
        None => Ok(None),
        Some(deadline) => match deadline.checked_duration_since(Instant::now()) {
            Some(left) if !left.is_zero() => Ok(Some(left)),
            _ => Err(Error::transport(url, "deadline expired before the request was sent")),
        },
    }
}

/// Send `request` and turn non-success statuses into typed errors.
pub fn send(
    transport: &dyn Transport,
    request: &Request,
    deadline: Option<Instant>,
) -> Result<Response, Error> {
    let timeout = remaining(deadline, &request.url)?;
    tracing::debug!(url = %redact(&request.url), auth = request.auth.scheme(), "GET");
    let response = transport.get(request, timeout)?;
    check_status(response.status, &request.url)?;
    Ok(response)
}

/// Map a status code onto the remote error taxonomy.
pub fn check_status(status: u16, url: &str) -> Result<(), Error> {
    let url = || redact(url).into_owned();
    match status {
        200..=299 => Ok(()),
        404 => Err(Error::ResourceNotFound { url: url() }),
        401 | 403 => Err(Error::Authorization { status, url: url() }),
        _ => Err(Error::RemoteRequest { status, url: url() }),
    }
}

/// Copy `body` to `out` in bounded chunks. Returns the number of bytes copied.
pub fn copy_body<R, W>(body: &mut R, out: &mut W, url: &str) -> Result<u64, Error>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut total = 0u64;
    loop {
        let n = match body.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::transport(url, format!("reading response body: {e}"))),
        };
        out.write_all(&buf[..n])?;
        total += n as u64;
    }
    out.flush()?;
    Ok(total)
}


#[cfg(test)]
mod test_copy {
    use super::*;

    struct FailAfter {
        left: usize,
    }

    impl Read for FailAfter {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.left == 0 {
                return Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset"));
            }
            let n = buf.len().min(self.left);
            buf[..n].fill(b'x');
            self.left -= n;
            Ok(n)
        }
    }

    #[test]
    fn copies_bodies_larger_than_one_chunk() {
        let data = vec![7u8; CHUNK_SIZE * 2 + 17];
        let mut out = Vec::new();
        let n = copy_body(&mut data.as_slice(), &mut out, "https://h/x").unwrap();
        assert_eq!(n as usize, data.len());
        assert_eq!(out, data);
    }

    #[test]
    fn read_failure_is_a_transport_error() {
        let mut out = Vec::new();
        let err = copy_body(&mut FailAfter { left: 10 }, &mut out, "https://h/x").unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(out.len(), 10);
    }
}
