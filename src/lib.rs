//! # webhdfs
//!
//! A small blocking client for HDFS over the WebHDFS REST API. You get
//! filesystem-style calls (mkdir, listdir, upload, download, stat, delete)
//! and a seekable remote file, and none of the cluster's block placement
//! leaks through.
//!
//! ## How WebHDFS moves data
//!
//! Every call goes to the NameNode first. Metadata calls are answered right
//! there. Calls that carry file content (CREATE, APPEND, OPEN) get a `307`
//! pointing at a DataNode, and the client repeats the request against that
//! node. Each request uses its own connection, closed as soon as the
//! response is consumed.
//!
//! ## Basic usage
//!
//! ```no_run
//! use webhdfs::WebHdfsClient;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let fs = WebHdfsClient::new("10.1.1.3", 50070, "feiyuw")?;
//!
//! fs.mkdir("/books/Erlang")?;
//! fs.copy_from_local("Programming Erlang.pdf", "/books/Erlang/Programming_Erlang.pdf")?;
//! println!("{:?}", fs.listdir("/books/Erlang")?);
//!
//! let mut local = std::fs::File::create("xx.pdf")?;
//! fs.download("/books/Erlang/Programming_Erlang.pdf", &mut local)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Reading part of a file
//!
//! [`RemoteFile`] buffers files up to the block size and reads larger ones
//! with ranged OPEN requests. It implements `std::io::Read` and `Seek`.
//!
//! ```no_run
//! use webhdfs::{WebHdfsClient, Whence};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let fs = WebHdfsClient::new("10.1.1.3", 50070, "feiyuw")?;
//! let mut file = fs.open("/logs/big.log")?;
//!
//! file.seek_to(-4096, Whence::End)?;
//! let tail = file.read_bytes(None)?;
//!
//! file.seek_to(0, Whence::Start)?;
//! for chunk in file.chunks() {
//!     let chunk = chunk?;
//!     println!("{} bytes", chunk.len());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## DataNodes on another network
//!
//! The NameNode names DataNodes the way the cluster sees them. If those
//! names don't resolve where you are, map them:
//!
//! ```no_run
//! use webhdfs::WebHdfsClient;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let fs = WebHdfsClient::builder("10.1.1.3", 50070, "feiyuw")
//!     .datanode("data-1", "10.1.1.1")
//!     .datanode("data-2", "10.1.1.2")
//!     .build()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Errors
//!
//! A response with the wrong status is [`HdfsError::Protocol`], carrying the
//! method, URL, status and server message. Nothing is retried. A chunked
//! upload that fails midway reports how many bytes made it in
//! [`HdfsError::PartialUpload`], so you can pick up with
//! [`WebHdfsClient::append`].
//!
//! ## Feature flags
//!
//! - `curl` (default): use libcurl for HTTP
//! - `reqwest`: use reqwest instead of curl (don't enable both)

pub mod client;
pub mod core;
pub mod plug;
pub mod protocol;
pub mod status;
pub mod stream;
pub mod transfer;
pub mod translate;

pub use client::{HdfsConfig, WebHdfsClient, WebHdfsClientBuilder};
pub use crate::core::*;
pub use plug::{BlockingHttp, HttpRequest, HttpResponse, Method};
pub use protocol::{Operation, RedirectTarget};
pub use status::{FileStatus, FileType};
pub use stream::{Chunks, RemoteFile, Whence};
pub use transfer::{ReadSeek, UploadSource};
pub use translate::AddressTranslator;
