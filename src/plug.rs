use crate::client::HdfsConfig;
use crate::core::{HdfsError, Result};
use serde::Deserialize;
use std::fmt;
use std::io::{Cursor, Read};
use std::sync::Arc;
#[cfg(all(not(feature = "reqwest"), feature = "curl"))]
use std::time::Duration;

/// Upper bound on how much of an error body is kept for the failure message.
const MAX_MESSAGE_BYTES: u64 = 4096;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Put,
    Post,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Put => "PUT",
            Method::Post => "POST",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One request against one node. `path` is the absolute path plus query.
#[derive(Debug, Clone, Copy)]
pub struct HttpRequest<'a> {
    pub method: Method,
    pub host: &'a str,
    pub port: u16,
    pub path: &'a str,
    pub body: Option<&'a [u8]>,
}

impl HttpRequest<'_> {
    pub fn url(&self) -> String {
        format!("http://{}:{}{}", self.host, self.port, self.path)
    }
}

/// A response whose body may still be streaming from the server.
///
/// The response owns its connection; dropping it closes the connection.
pub struct HttpResponse {
    pub status: u16,
    pub content_length: Option<u64>,
    pub location: Option<String>,
    body: Box<dyn Read + Send>,
}

impl fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .field("content_length", &self.content_length)
            .field("location", &self.location)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RemoteExceptionEnvelope {
    remote_exception: RemoteException,
}

#[derive(Deserialize)]
struct RemoteException {
    message: String,
}

impl HttpResponse {
    pub fn new(
        status: u16,
        content_length: Option<u64>,
        location: Option<String>,
        body: impl Read + Send + 'static,
    ) -> Self {
        Self {
            status,
            content_length,
            location,
            body: Box::new(body),
        }
    }

    pub fn from_bytes(status: u16, location: Option<String>, data: Vec<u8>) -> Self {
        let content_length = Some(data.len() as u64);
        Self::new(status, content_length, location, Cursor::new(data))
    }

    pub fn body(&mut self) -> &mut (dyn Read + Send) {
        self.body.as_mut()
    }

    pub fn into_bytes(mut self) -> Result<Vec<u8>> {
        let mut data = Vec::new();
        self.body
            .read_to_end(&mut data)
            .map_err(HdfsError::from_io)?;
        Ok(data)
    }

    /// Best-effort server message for a failed request.
    ///
    /// WebHDFS reports failures as a `RemoteException` JSON object; anything
    /// else is returned as (truncated) text.
    pub fn message(self) -> String {
        let mut data = Vec::new();
        if self
            .body
            .take(MAX_MESSAGE_BYTES)
            .read_to_end(&mut data)
            .is_err()
        {
            return String::new();
        }

        match serde_json::from_slice::<RemoteExceptionEnvelope>(&data) {
            Ok(envelope) => envelope.remote_exception.message,
            Err(_) => String::from_utf8_lossy(&data).trim().to_string(),
        }
    }
}

/// internal blocking transport trait.
///
/// Implementations must not follow redirects and must not reuse connections
/// between calls.
pub trait BlockingHttp: Send + Sync {
    fn execute(&self, request: &HttpRequest<'_>) -> Result<HttpResponse>;
}

#[cfg(all(not(feature = "reqwest"), not(feature = "curl")))]
compile_error!("Enable either `curl` (default) or `reqwest` feature.");

pub(crate) fn build_default_transport(config: &HdfsConfig) -> Result<Arc<dyn BlockingHttp>> {
    #[cfg(feature = "reqwest")]
    {
        Ok(Arc::new(ReqwestBlockingTransport::new(config)?))
    }
    #[cfg(all(not(feature = "reqwest"), feature = "curl"))]
    {
        Ok(Arc::new(CurlBlockingTransport::new(config)))
    }
}

fn network(e: impl fmt::Display) -> HdfsError {
    HdfsError::Network(e.to_string())
}

#[cfg(feature = "reqwest")]
struct ReqwestBlockingTransport {
    client: reqwest::blocking::Client,
}

#[cfg(feature = "reqwest")]
impl ReqwestBlockingTransport {
    fn new(config: &HdfsConfig) -> Result<Self> {
        // The blocking client applies this to each wait (the response head,
        // then every body read), so long transfers survive while data flows.
        let client = reqwest::blocking::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .redirect(reqwest::redirect::Policy::none())
            .pool_max_idle_per_host(0)
            .build()
            .map_err(network)?;

        Ok(Self { client })
    }
}

#[cfg(feature = "reqwest")]
impl BlockingHttp for ReqwestBlockingTransport {
    fn execute(&self, request: &HttpRequest<'_>) -> Result<HttpResponse> {
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Put => reqwest::Method::PUT,
            Method::Post => reqwest::Method::POST,
            Method::Delete => reqwest::Method::DELETE,
        };

        let mut builder = self.client.request(method, request.url());
        if let Some(body) = request.body {
            builder = builder
                .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
                .body(body.to_vec());
        }

        let response = builder.send().map_err(network)?;

        let status = response.status().as_u16();
        let content_length = response.content_length();
        let location = response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        Ok(HttpResponse::new(status, content_length, location, response))
    }
}

#[cfg(all(not(feature = "reqwest"), feature = "curl"))]
struct CurlBlockingTransport {
    connect_timeout: Duration,
    timeout: Duration,
}

#[cfg(all(not(feature = "reqwest"), feature = "curl"))]
impl CurlBlockingTransport {
    fn new(config: &HdfsConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout,
            timeout: config.timeout,
        }
    }
}

/// Body pieces buffered between the curl worker and the reader.
#[cfg(all(not(feature = "reqwest"), feature = "curl"))]
const CHANNEL_DEPTH: usize = 16;

#[cfg(all(not(feature = "reqwest"), feature = "curl"))]
enum Frame {
    Head {
        status: u16,
        content_length: Option<u64>,
        location: Option<String>,
    },
    Body(Vec<u8>),
    Failed(String),
}

#[cfg(all(not(feature = "reqwest"), feature = "curl"))]
impl BlockingHttp for CurlBlockingTransport {
    fn execute(&self, request: &HttpRequest<'_>) -> Result<HttpResponse> {
        use std::sync::mpsc;

        let mut easy = curl::easy::Easy::new();
        easy.url(&request.url()).map_err(network)?;
        easy.connect_timeout(self.connect_timeout)
            .map_err(network)?;
        // Idle limit: abort once the socket moves less than a byte per
        // second for `timeout`, however long the whole transfer runs.
        easy.low_speed_limit(1).map_err(network)?;
        easy.low_speed_time(self.timeout).map_err(network)?;
        easy.follow_location(false).map_err(network)?;
        easy.forbid_reuse(true).map_err(network)?;

        match (request.method, request.body) {
            (Method::Get, _) => easy.get(true).map_err(network)?,
            (method, Some(body)) => {
                easy.post(true).map_err(network)?;
                easy.post_fields_copy(body).map_err(network)?;
                if method != Method::Post {
                    easy.custom_request(method.as_str()).map_err(network)?;
                }

                let mut headers = curl::easy::List::new();
                headers
                    .append("Content-Type: application/octet-stream")
                    .map_err(network)?;
                headers.append("Expect:").map_err(network)?;
                easy.http_headers(headers).map_err(network)?;
            }
            (method, None) => easy.custom_request(method.as_str()).map_err(network)?,
        }

        let (tx, rx) = mpsc::sync_channel(CHANNEL_DEPTH);
        std::thread::Builder::new()
            .name("webhdfs-curl".into())
            .spawn(move || curl_worker(easy, tx))
            .map_err(network)?;

        match rx.recv() {
            Ok(Frame::Head {
                status,
                content_length,
                location,
            }) => Ok(HttpResponse::new(
                status,
                content_length,
                location,
                ChannelBody {
                    rx,
                    pending: Cursor::new(Vec::new()),
                    done: false,
                },
            )),
            Ok(Frame::Failed(e)) => Err(HdfsError::Network(e)),
            Ok(Frame::Body(_)) | Err(_) => Err(HdfsError::Network(
                "connection closed before response headers".into(),
            )),
        }
    }
}

#[cfg(all(not(feature = "reqwest"), feature = "curl"))]
type HeaderMap = ahash::HashMap<String, String>;

#[cfg(all(not(feature = "reqwest"), feature = "curl"))]
fn head_frame(status: u16, headers: &mut HeaderMap) -> Frame {
    Frame::Head {
        status,
        content_length: headers
            .get("content-length")
            .and_then(|v| v.parse::<u64>().ok()),
        location: headers.remove("location"),
    }
}

/// Runs one transfer on its own thread. The head goes out as soon as the
/// final header block ends, then every body piece as curl delivers it.
#[cfg(all(not(feature = "reqwest"), feature = "curl"))]
fn curl_worker(mut easy: curl::easy::Easy, tx: std::sync::mpsc::SyncSender<Frame>) {
    use ahash::HashMapExt;
    use std::cell::Cell;

    let head_sent = Cell::new(false);
    let mut status = 0u16;
    let mut headers = HeaderMap::new();

    match stream_transfer(&mut easy, &tx, &mut status, &mut headers, &head_sent) {
        Err(e) => {
            let _ = tx.send(Frame::Failed(e.to_string()));
        }
        Ok(()) if !head_sent.get() => {
            let status = easy.response_code().map_or(status, |code| code as u16);
            let _ = tx.send(head_frame(status, &mut headers));
        }
        Ok(()) => {}
    }
}

/// A dropped receiver makes the write callback fail, which aborts the
/// transfer and closes the connection.
#[cfg(all(not(feature = "reqwest"), feature = "curl"))]
fn stream_transfer(
    easy: &mut curl::easy::Easy,
    tx: &std::sync::mpsc::SyncSender<Frame>,
    status: &mut u16,
    headers: &mut HeaderMap,
    head_sent: &std::cell::Cell<bool>,
) -> std::result::Result<(), curl::Error> {
    let mut transfer = easy.transfer();
    transfer.header_function(|header| {
        let Ok(line) = std::str::from_utf8(header) else {
            return true;
        };
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("HTTP/") {
            headers.clear();
            *status = rest
                .split_whitespace()
                .nth(1)
                .and_then(|code| code.parse().ok())
                .unwrap_or(0);
        } else if line.is_empty() {
            if *status >= 200 && !head_sent.get() {
                head_sent.set(true);
                let _ = tx.send(head_frame(*status, &mut *headers));
            }
        } else if let Some((name, value)) = line.split_once(':') {
            headers.insert(name.trim().to_ascii_lowercase(), value.trim().into());
        }
        true
    })?;
    transfer.write_function(|chunk| match tx.send(Frame::Body(chunk.to_vec())) {
        Ok(()) => Ok(chunk.len()),
        Err(_) => Ok(0),
    })?;
    transfer.perform()
}

/// Response body fed by [`curl_worker`]. Ends when the worker hangs up.
#[cfg(all(not(feature = "reqwest"), feature = "curl"))]
struct ChannelBody {
    rx: std::sync::mpsc::Receiver<Frame>,
    pending: Cursor<Vec<u8>>,
    done: bool,
}

#[cfg(all(not(feature = "reqwest"), feature = "curl"))]
impl Read for ChannelBody {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        loop {
            let n = self.pending.read(buf)?;
            if n > 0 || buf.is_empty() || self.done {
                return Ok(n);
            }
            match self.rx.recv() {
                Ok(Frame::Body(data)) => self.pending = Cursor::new(data),
                Ok(Frame::Head { .. }) => {}
                Ok(Frame::Failed(e)) => {
                    self.done = true;
                    return Err(HdfsError::Network(e).into());
                }
                Err(_) => self.done = true,
            }
        }
    }
}
