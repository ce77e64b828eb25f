//! Payload movement: uploads, appends and downloads through a redirect.

use std::fmt;
use std::fs;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use tracing::{debug, warn};

use crate::client::WebHdfsClient;
use crate::core::{HdfsError, Result};
use crate::plug::HttpResponse;
use crate::protocol::Operation;

/// Largest read buffer `download` allocates, whatever the trunk size.
const MAX_READ_BUFFER: u64 = 8 * 1024 * 1024;

pub trait ReadSeek: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReadSeek for T {}

/// What an upload reads from. The variant picks the upload strategy.
pub enum UploadSource {
    /// Finite in-memory buffer.
    Bytes(Vec<u8>),
    /// Seekable reader; its remaining length is found by seeking to the end.
    Seekable(Box<dyn ReadSeek>),
    /// Producer of chunks with no known total size. Always appended chunk by chunk.
    Chunks(Box<dyn Iterator<Item = io::Result<Vec<u8>>> + Send>),
}

impl UploadSource {
    pub fn seekable(reader: impl ReadSeek + 'static) -> Self {
        UploadSource::Seekable(Box::new(reader))
    }

    pub fn chunks<I>(chunks: I) -> Self
    where
        I: IntoIterator<Item = io::Result<Vec<u8>>>,
        I::IntoIter: Send + 'static,
    {
        UploadSource::Chunks(Box::new(chunks.into_iter()))
    }
}

impl fmt::Debug for UploadSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadSource::Bytes(data) => f.debug_tuple("Bytes").field(&data.len()).finish(),
            UploadSource::Seekable(_) => f.write_str("Seekable"),
            UploadSource::Chunks(_) => f.write_str("Chunks"),
        }
    }
}

impl From<Vec<u8>> for UploadSource {
    fn from(data: Vec<u8>) -> Self {
        UploadSource::Bytes(data)
    }
}

impl From<&[u8]> for UploadSource {
    fn from(data: &[u8]) -> Self {
        UploadSource::Bytes(data.to_vec())
    }
}

impl From<fs::File> for UploadSource {
    fn from(file: fs::File) -> Self {
        UploadSource::seekable(file)
    }
}

/// Splits a reader into chunks of at most `size` bytes.
struct ReadChunks<R> {
    reader: R,
    size: u64,
    done: bool,
}

impl<R: Read> Iterator for ReadChunks<R> {
    type Item = io::Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let mut chunk = Vec::new();
        match (&mut self.reader).take(self.size).read_to_end(&mut chunk) {
            Ok(0) => {
                self.done = true;
                None
            }
            Ok(_) => Some(Ok(chunk)),
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// A coordinator OPEN answer that already is the file content.
///
/// Zero-length files come back without a redirect: either a `200`, or a
/// `307` that reports no length and carries no `Location`.
fn served_directly(response: &HttpResponse) -> bool {
    response.location.is_none()
        && (response.status == 200 || matches!(response.content_length, None | Some(0)))
}

impl WebHdfsClient {
    /// Write `data` as the whole content of `path` in one request.
    pub fn create(&self, path: &str, data: &[u8]) -> Result<()> {
        debug!(path, bytes = data.len(), "create file");
        let response = self.call(Operation::Create, path, &[], None)?;
        let target = self.redirect(response)?;
        self.follow(target, Operation::Create, Some(data))?;
        Ok(())
    }

    pub fn append(&self, path: &str, chunk: &[u8]) -> Result<()> {
        debug!(path, bytes = chunk.len(), "append data");
        let response = self.call(Operation::Append, path, &[], None)?;
        let target = self.redirect(response)?;
        self.follow(target, Operation::Append, Some(chunk))?;
        Ok(())
    }

    /// Upload `source` to `path`, replacing any existing file.
    ///
    /// Sources of known size up to the trunk size go up in one request;
    /// everything else is created empty and appended trunk by trunk.
    pub fn upload(&self, path: &str, source: impl Into<UploadSource>) -> Result<u64> {
        self.upload_with_threshold(path, source, self.config.trunk_size)
    }

    pub fn upload_with_threshold(
        &self,
        path: &str,
        source: impl Into<UploadSource>,
        threshold: u64,
    ) -> Result<u64> {
        let trunk = self.config.trunk_size;
        match source.into() {
            UploadSource::Bytes(data) => {
                if data.len() as u64 <= threshold {
                    self.create(path, &data)?;
                    return Ok(data.len() as u64);
                }
                self.create(path, &[])?;
                self.append_chunks(path, data.chunks(trunk as usize).map(Ok))
            }
            UploadSource::Seekable(mut reader) => {
                let start = reader.stream_position()?;
                let end = reader.seek(SeekFrom::End(0))?;
                reader.seek(SeekFrom::Start(start))?;

                if end.saturating_sub(start) <= threshold {
                    let mut data = Vec::new();
                    reader.read_to_end(&mut data)?;
                    self.create(path, &data)?;
                    return Ok(data.len() as u64);
                }
                self.create(path, &[])?;
                self.append_chunks(
                    path,
                    ReadChunks {
                        reader,
                        size: trunk,
                        done: false,
                    },
                )
            }
            UploadSource::Chunks(chunks) => {
                self.create(path, &[])?;
                self.append_chunks(path, chunks)
            }
        }
    }

    /// Append every chunk in order. Stops at the first failure and reports
    /// how much had been committed.
    fn append_chunks<I, C>(&self, path: &str, chunks: I) -> Result<u64>
    where
        I: Iterator<Item = io::Result<C>>,
        C: AsRef<[u8]>,
    {
        let mut committed = 0u64;
        for chunk in chunks {
            let result = chunk
                .map_err(HdfsError::from)
                .and_then(|chunk| {
                    let chunk = chunk.as_ref();
                    if !chunk.is_empty() {
                        self.append(path, chunk)?;
                    }
                    Ok(chunk.len() as u64)
                });

            match result {
                Ok(len) => committed += len,
                Err(source) => {
                    return Err(HdfsError::PartialUpload {
                        committed,
                        source: Box::new(source),
                    });
                }
            }
        }
        Ok(committed)
    }

    fn open_response(&self, path: &str, offset: u64, length: Option<u64>) -> Result<HttpResponse> {
        let mut params = vec![("offset", offset.to_string())];
        if let Some(length) = length {
            params.push(("length", length.to_string()));
        }

        let response = self.call(Operation::Open, path, &params, None)?;
        if served_directly(&response) {
            return Ok(response);
        }

        let target = self.redirect(response)?;
        self.follow(target, Operation::Open, None)
    }

    /// Bytes `[offset, offset + length)` of `path`, or to the end when
    /// `length` is `None`.
    pub fn open_range(&self, path: &str, offset: u64, length: Option<u64>) -> Result<Vec<u8>> {
        debug!(path, offset, ?length, "open file");
        self.open_response(path, offset, length)?.into_bytes()
    }

    /// Stream the whole of `path` into `sink`, trunk by trunk.
    pub fn download<W: Write + ?Sized>(&self, path: &str, sink: &mut W) -> Result<u64> {
        debug!(path, "download file");
        let mut response = self.open_response(path, 0, None)?;

        let mut buf = vec![0u8; self.config.trunk_size.min(MAX_READ_BUFFER) as usize];
        let mut total = 0u64;
        loop {
            let n = match response.body().read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(HdfsError::from_io(e)),
            };
            sink.write_all(&buf[..n])?;
            total += n as u64;
        }
        sink.flush()?;

        if total == 0 {
            warn!(path, "file is empty");
        }
        Ok(total)
    }

    pub fn copy_from_local(&self, local_path: impl AsRef<Path>, remote_path: &str) -> Result<u64> {
        let local_path = local_path.as_ref();
        debug!(local = %local_path.display(), remote = remote_path, "copy to HDFS");
        let file = fs::File::open(local_path)?;
        self.upload(remote_path, file)
    }

    pub fn copy_to_local(&self, remote_path: &str, local_path: impl AsRef<Path>) -> Result<u64> {
        let local_path = local_path.as_ref();
        debug!(remote = remote_path, local = %local_path.display(), "copy to local");
        let mut file = fs::File::create(local_path)?;
        self.download(remote_path, &mut file)
    }
}
