// crates/kinetoscope-stream/src/fetch.rs
//
// Plain-HTTP range fetcher over a raw TcpStream (spec.md §4.D, §6).
//
// `ureq`'s blocking high-level API has no hook for the manual edge cases
// spec.md §4.D requires bit-for-bit: telling a 200 response to a ranged GET
// apart from a genuine 206, rejecting redirects instead of following them,
// treating a short body as a truncation error rather than EOF, and handing
// body bytes to a caller-supplied sink as they arrive instead of buffering
// the whole response. This module hand-rolls them the way
// kinetoscope-core::chunk hand-rolls raw payload slicing — a thin, exact
// parser over the one HTTP shape this device ever speaks, rather than a
// general client.
//
// Connections are reused across requests to the same host/port, the way
// examples/original_source/firmware/http.cc's need_new_connection /
// connect_if_needed keep one persistent socket open rather than reconnect
// per request. A write failure on the cached connection (the peer closed
// it while idle) falls back to one fresh connection.

use std::cell::RefCell;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use kinetoscope_core::KinetoscopeError;

const USER_AGENT: &str = "Kinetoscope/1.0";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const IO_TIMEOUT: Duration = Duration::from_secs(20);
const MAX_HEADER_BYTES: usize = 8192;
const READ_BUF_SIZE: usize = 8192;

/// A plain-HTTP server this device fetches from: host, port, and a base
/// path prepended to every relative URL (spec.md §6: "server and base path
/// configurable").
pub struct HttpSource {
    pub host: String,
    pub port: u16,
    pub base_path: String,
    /// The connection left open by the last successfully-drained response
    /// to this host/port, if any. Host/port never change after
    /// construction, so "matches the last request" is automatic per
    /// instance; `Clone` starts a fresh instance with no cached connection.
    connection: RefCell<Option<TcpStream>>,
}

impl Clone for HttpSource {
    fn clone(&self) -> Self {
        Self::new(self.host.clone(), self.port, self.base_path.clone())
    }
}

impl std::fmt::Debug for HttpSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpSource")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("base_path", &self.base_path)
            .finish()
    }
}

impl HttpSource {
    pub fn new(host: impl Into<String>, port: u16, base_path: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            base_path: base_path.into(),
            connection: RefCell::new(None),
        }
    }

    /// Read the configuration the teacher's `paths.rs` module would read
    /// from the environment, with the console's development defaults.
    pub fn from_env() -> Self {
        let host = std::env::var("KINETOSCOPE_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = std::env::var("KINETOSCOPE_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(80);
        let base_path = std::env::var("KINETOSCOPE_BASE_PATH").unwrap_or_else(|_| String::new());
        Self::new(host, port, base_path)
    }

    fn full_path(&self, relative: &str) -> String {
        format!("/{}/{}", self.base_path.trim_matches('/'), relative.trim_start_matches('/'))
            .replace("//", "/")
    }

    /// Fetch the exact byte range `[first, last]` inclusive (spec.md §6:
    /// `Range: bytes=FIRST-LAST`), handing each body fragment to `sink` as
    /// it arrives. `sink` returns whether to keep reading; a `false` return
    /// aborts the transfer cleanly (spec.md §4.D). Expects a
    /// `206 Partial Content` reply; a `200` response to a ranged request
    /// means the server ignored the `Range` header and is a
    /// `RangeNotSupported` error, not success.
    pub fn fetch_range(
        &self,
        relative_url: &str,
        first: u64,
        last: u64,
        sink: &mut dyn FnMut(&[u8]) -> bool,
    ) -> Result<(), KinetoscopeError> {
        let range_header = format!("Range: bytes={first}-{last}\r\n");
        self.request(relative_url, &range_header, sink, |status| match status {
            206 => Ok(()),
            200 => Err(KinetoscopeError::RangeNotSupported),
            300..=399 => Err(KinetoscopeError::RedirectUnsupported),
            other => Err(KinetoscopeError::HttpStatus(other)),
        })
    }

    /// Fetch the whole resource with no `Range` header (spec.md §6: "unsized
    /// fetches omit the header"). Used for the catalog, whose length isn't
    /// known up front.
    pub fn fetch_whole(
        &self,
        relative_url: &str,
        sink: &mut dyn FnMut(&[u8]) -> bool,
    ) -> Result<(), KinetoscopeError> {
        self.request(relative_url, "", sink, |status| match status {
            200 => Ok(()),
            300..=399 => Err(KinetoscopeError::RedirectUnsupported),
            other => Err(KinetoscopeError::HttpStatus(other)),
        })
    }

    fn request(
        &self,
        relative_url: &str,
        extra_header: &str,
        sink: &mut dyn FnMut(&[u8]) -> bool,
        accept_status: impl Fn(u16) -> Result<(), KinetoscopeError>,
    ) -> Result<(), KinetoscopeError> {
        let path = self.full_path(relative_url);
        let request_text = format!(
            "GET {path} HTTP/1.1\r\n\
             Host: {host}\r\n\
             User-Agent: {USER_AGENT}\r\n\
             {extra_header}\
             Connection: keep-alive\r\n\
             \r\n",
            host = self.host,
        );

        let mut stream = self.take_or_connect()?;
        if stream.write_all(request_text.as_bytes()).is_err() {
            // The cached connection was dead (server closed it while idle).
            // Reconnect once and retry, mirroring connect_if_needed's single
            // fallback path.
            stream = self.connect_fresh()?;
            stream
                .write_all(request_text.as_bytes())
                .map_err(|_| KinetoscopeError::NoLink)?;
        }

        let head = read_head(&mut stream)?;
        accept_status(head.status)?;

        let reusable = stream_body(&mut stream, &head, sink)?;
        if reusable {
            self.store(stream);
        }
        Ok(())
    }

    fn take_or_connect(&self) -> Result<TcpStream, KinetoscopeError> {
        if let Some(stream) = self.connection.borrow_mut().take() {
            return Ok(stream);
        }
        self.connect_fresh()
    }

    fn connect_fresh(&self) -> Result<TcpStream, KinetoscopeError> {
        let addr = format!("{}:{}", self.host, self.port);
        let stream = TcpStream::connect(&addr).map_err(|_| KinetoscopeError::NoLink)?;
        stream.set_read_timeout(Some(IO_TIMEOUT)).ok();
        stream.set_write_timeout(Some(CONNECT_TIMEOUT)).ok();
        Ok(stream)
    }

    fn store(&self, stream: TcpStream) {
        *self.connection.borrow_mut() = Some(stream);
    }
}

struct ResponseHead {
    status: u16,
    content_length: Option<u64>,
    leftover: Vec<u8>,
}

/// Read and parse the status line and headers, returning any body bytes
/// that arrived in the same read as the header terminator (spec.md §4.D:
/// forward leftover body bytes from the header's own read before issuing
/// further reads).
fn read_head(stream: &mut TcpStream) -> Result<ResponseHead, KinetoscopeError> {
    let mut buf = [0u8; 4096];
    let mut acc: Vec<u8> = Vec::new();
    let header_end = loop {
        let n = stream.read(&mut buf).map_err(|_| KinetoscopeError::TruncatedResponse)?;
        if n == 0 {
            return Err(KinetoscopeError::MalformedHeaders);
        }
        acc.extend_from_slice(&buf[..n]);
        if let Some(end) = find_header_end(&acc) {
            break end;
        }
        if acc.len() > MAX_HEADER_BYTES {
            return Err(KinetoscopeError::MalformedHeaders);
        }
    };

    let (status, content_length) = parse_headers(&acc[..header_end])?;
    let leftover = acc[header_end..].to_vec();
    Ok(ResponseHead { status, content_length, leftover })
}

/// Deliver the body to `sink` in fragments, stopping early if `sink`
/// returns `false`. Returns whether the connection is still in a clean
/// state for reuse (false after an aborted or EOF-terminated transfer).
fn stream_body(
    stream: &mut TcpStream,
    head: &ResponseHead,
    sink: &mut dyn FnMut(&[u8]) -> bool,
) -> Result<bool, KinetoscopeError> {
    let mut delivered: u64 = 0;
    let mut buf = [0u8; READ_BUF_SIZE];

    if !head.leftover.is_empty() {
        let chunk = clamp_to_remaining(&head.leftover, head.content_length, delivered);
        if !chunk.is_empty() {
            delivered += chunk.len() as u64;
            if !sink(chunk) {
                return Ok(false);
            }
        }
    }

    loop {
        if let Some(len) = head.content_length {
            if delivered >= len {
                return Ok(true);
            }
        }

        let n = stream.read(&mut buf).map_err(|_| KinetoscopeError::TruncatedResponse)?;
        if n == 0 {
            if head.content_length.is_some() {
                return Err(KinetoscopeError::TruncatedResponse);
            }
            // No Content-Length: the peer closed the connection once the
            // body ended (Connection: close semantics), so it isn't
            // reusable even though nothing actually failed.
            return Ok(false);
        }

        let chunk = clamp_to_remaining(&buf[..n], head.content_length, delivered);
        delivered += chunk.len() as u64;
        if !sink(chunk) {
            return Ok(false);
        }
    }
}

fn clamp_to_remaining(bytes: &[u8], content_length: Option<u64>, delivered: u64) -> &[u8] {
    match content_length {
        Some(len) => {
            let remaining = len.saturating_sub(delivered) as usize;
            if bytes.len() > remaining {
                &bytes[..remaining]
            } else {
                bytes
            }
        }
        None => bytes,
    }
}

/// Split the header block into status code and `Content-Length`, tolerating
/// lines terminated by either `\r\n` or a bare `\n` (spec.md §4.D — some
/// servers, per examples/original_source/firmware/http.cc:140-143, only
/// ever send `\n`).
fn parse_headers(bytes: &[u8]) -> Result<(u16, Option<u64>), KinetoscopeError> {
    let text = std::str::from_utf8(bytes).map_err(|_| KinetoscopeError::MalformedHeaders)?;
    let mut lines = text.split('\n').map(|line| line.trim_end_matches('\r'));

    let status_line = lines.next().ok_or(KinetoscopeError::MalformedHeaders)?;
    let status = parse_status_code(status_line)?;

    let mut content_length = None;
    for line in lines {
        if line.is_empty() {
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("content-length") {
                content_length = Some(
                    value
                        .trim()
                        .parse()
                        .map_err(|_| KinetoscopeError::MalformedHeaders)?,
                );
            }
        }
    }
    Ok((status, content_length))
}

fn parse_status_code(status_line: &str) -> Result<u16, KinetoscopeError> {
    let mut parts = status_line.split_whitespace();
    let _http_version = parts.next().ok_or(KinetoscopeError::MalformedHeaders)?;
    let code = parts.next().ok_or(KinetoscopeError::MalformedHeaders)?;
    code.parse().map_err(|_| KinetoscopeError::MalformedHeaders)
}

/// The end of the header block, tolerating both `\r\n\r\n` and a bare
/// `\n\n` terminator (spec.md §4.D). `\r\n\r\n` never contains a `\n\n`
/// substring, so checking it first is unambiguous.
fn find_header_end(buf: &[u8]) -> Option<usize> {
    if let Some(pos) = find_subslice(buf, b"\r\n\r\n") {
        return Some(pos + 4);
    }
    find_subslice(buf, b"\n\n").map(|pos| pos + 2)
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}
