use std::io::{self, Cursor, Read, Seek, SeekFrom};

use tracing::debug;

use crate::client::WebHdfsClient;
use crate::core::{HdfsError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Whence {
    Start,
    Current,
    End,
}

/// A remote file presented as a seekable byte source.
///
/// Files no larger than the block size are fetched whole when opened and
/// served from memory. Larger files are read on demand with one ranged OPEN
/// per read; in that mode only absolute seeks (from the start or the end)
/// are supported.
pub struct RemoteFile {
    client: WebHdfsClient,
    path: String,
    length: u64,
    block_size: u64,
    cursor: u64,
    buffer: Option<Cursor<Vec<u8>>>,
}

impl RemoteFile {
    pub fn open(client: &WebHdfsClient, path: &str) -> Result<Self> {
        Self::with_block_size(client, path, client.config().block_size)
    }

    pub fn with_block_size(client: &WebHdfsClient, path: &str, block_size: u64) -> Result<Self> {
        let block_size = block_size.max(1);
        let length = client.get_size(path)?;

        let buffer = if length <= block_size {
            debug!(path, length, "buffering small file");
            Some(Cursor::new(client.open_range(path, 0, None)?))
        } else {
            debug!(path, length, block_size, "ranged reads");
            None
        };

        Ok(Self {
            client: client.clone(),
            path: path.to_string(),
            length,
            block_size,
            cursor: 0,
            buffer,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Length captured when the file was opened.
    pub fn len(&self) -> u64 {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn is_buffered(&self) -> bool {
        self.buffer.is_some()
    }

    pub fn tell(&self) -> u64 {
        match &self.buffer {
            Some(buffer) => buffer.position(),
            None => self.cursor,
        }
    }

    /// Read up to `n` bytes from the cursor, or everything left for `None`.
    pub fn read_bytes(&mut self, n: Option<usize>) -> Result<Vec<u8>> {
        if let Some(buffer) = self.buffer.as_mut() {
            let mut data = Vec::new();
            match n {
                Some(n) => buffer.take(n as u64).read_to_end(&mut data)?,
                None => buffer.read_to_end(&mut data)?,
            };
            return Ok(data);
        }

        if self.cursor >= self.length || n == Some(0) {
            return Ok(Vec::new());
        }

        let data = self
            .client
            .open_range(&self.path, self.cursor, n.map(|n| n as u64))?;
        self.cursor = match n {
            Some(n) => self.cursor.saturating_add(n as u64).min(self.length),
            None => self.length,
        };
        Ok(data)
    }

    pub fn seek_to(&mut self, offset: i64, whence: Whence) -> Result<u64> {
        let pos = match whence {
            Whence::Start => {
                let offset = u64::try_from(offset).map_err(|_| HdfsError::InvalidSeek(offset))?;
                SeekFrom::Start(offset)
            }
            Whence::Current => SeekFrom::Current(offset),
            Whence::End => SeekFrom::End(offset),
        };
        self.seek_from(pos)
    }

    fn seek_from(&mut self, pos: SeekFrom) -> Result<u64> {
        if let Some(buffer) = self.buffer.as_mut() {
            let (base, delta) = match pos {
                SeekFrom::Start(offset) => {
                    buffer.set_position(offset);
                    return Ok(offset);
                }
                SeekFrom::Current(delta) => (buffer.position(), delta),
                SeekFrom::End(delta) => (buffer.get_ref().len() as u64, delta),
            };
            let target = base
                .checked_add_signed(delta)
                .ok_or(HdfsError::InvalidSeek((base as i64).saturating_add(delta)))?;
            buffer.set_position(target);
            return Ok(target);
        }

        self.cursor = match pos {
            SeekFrom::Start(offset) => offset,
            SeekFrom::End(delta) => self
                .length
                .checked_add_signed(delta)
                .ok_or(HdfsError::InvalidSeek((self.length as i64).saturating_add(delta)))?,
            SeekFrom::Current(_) => {
                return Err(HdfsError::Unsupported(
                    "seek relative to the current position on a ranged remote file".into(),
                ));
            }
        };
        Ok(self.cursor)
    }

    /// Block-sized pieces from the cursor to the end of the file.
    ///
    /// Once exhausted the iterator stays exhausted; seek back to start over
    /// with a new one.
    pub fn chunks(&mut self) -> Chunks<'_> {
        Chunks {
            file: self,
            done: false,
        }
    }
}

/// In ranged mode each read is one OPEN for `buf.len()` bytes and the
/// cursor moves by that much; if the DataNode returns fewer bytes, the
/// missing ones are skipped.
impl Read for RemoteFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if let Some(buffer) = self.buffer.as_mut() {
            return buffer.read(buf);
        }

        let data = self.read_bytes(Some(buf.len()))?;
        let n = data.len().min(buf.len());
        buf[..n].copy_from_slice(&data[..n]);
        Ok(n)
    }
}

impl Seek for RemoteFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        Ok(self.seek_from(pos)?)
    }

    fn stream_position(&mut self) -> io::Result<u64> {
        Ok(self.tell())
    }
}

pub struct Chunks<'a> {
    file: &'a mut RemoteFile,
    done: bool,
}

impl Iterator for Chunks<'_> {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let block = self.file.block_size as usize;
        match self.file.read_bytes(Some(block)) {
            Ok(chunk) if chunk.is_empty() => {
                self.done = true;
                None
            }
            Ok(chunk) => Some(Ok(chunk)),
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

impl std::iter::FusedIterator for Chunks<'_> {}

impl WebHdfsClient {
    pub fn open(&self, path: &str) -> Result<RemoteFile> {
        RemoteFile::open(self, path)
    }
}
