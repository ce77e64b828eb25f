use ahash::{HashMap, HashMapExt};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::core::{Result, TRUNK_SIZE};
use crate::plug::{BlockingHttp, HttpResponse, build_default_transport};
use crate::protocol::Operation;
use crate::status::{BooleanResponse, FileStatus, FileStatusResponse, FileStatusesResponse};
use crate::translate::AddressTranslator;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct HdfsConfig {
    pub namenode_host: String,
    pub namenode_port: u16,
    /// Sent as `user.name` on every request.
    pub user: String,
    /// Largest body sent in one request, and the read size for downloads.
    pub trunk_size: u64,
    /// Files up to this size are buffered whole by [`crate::RemoteFile`].
    pub block_size: u64,
    /// Longest a connection may stall; a transfer that keeps moving may run longer.
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub replication: Option<u16>,
    pub buffer_size: Option<u64>,
    /// DataNode host as reported by the NameNode → host reachable from here.
    pub datanodes: HashMap<String, String>,
}

impl Default for HdfsConfig {
    fn default() -> Self {
        Self {
            namenode_host: "localhost".to_string(),
            namenode_port: 50070,
            user: "hdfs".to_string(),
            trunk_size: TRUNK_SIZE,
            block_size: TRUNK_SIZE,
            timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
            replication: None,
            buffer_size: None,
            datanodes: HashMap::new(),
        }
    }
}

/// Blocking WebHDFS client.
///
/// Holds no per-operation state: each call opens its own coordinator and
/// data-node connections and closes them before returning, so one client
/// can be shared freely between threads.
#[derive(Clone)]
pub struct WebHdfsClient {
    pub(crate) transport: Arc<dyn BlockingHttp>,
    pub(crate) config: HdfsConfig,
    pub(crate) translator: AddressTranslator,
}

pub struct WebHdfsClientBuilder {
    config: HdfsConfig,
    transport: Option<Arc<dyn BlockingHttp>>,
}

impl WebHdfsClientBuilder {
    pub fn new(
        namenode_host: impl Into<String>,
        namenode_port: u16,
        user: impl Into<String>,
    ) -> Self {
        Self::from_config(HdfsConfig {
            namenode_host: namenode_host.into(),
            namenode_port,
            user: user.into(),
            ..HdfsConfig::default()
        })
    }

    pub fn from_config(config: HdfsConfig) -> Self {
        Self {
            config,
            transport: None,
        }
    }

    pub fn transport(mut self, transport: Arc<dyn BlockingHttp>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn trunk_size(mut self, trunk_size: u64) -> Self {
        self.config.trunk_size = trunk_size.max(1);
        self
    }

    pub fn block_size(mut self, block_size: u64) -> Self {
        self.config.block_size = block_size.max(1);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    pub fn replication(mut self, replication: u16) -> Self {
        self.config.replication = Some(replication);
        self
    }

    pub fn buffer_size(mut self, buffer_size: u64) -> Self {
        self.config.buffer_size = Some(buffer_size);
        self
    }

    pub fn datanode(mut self, internal: impl Into<String>, external: impl Into<String>) -> Self {
        self.config.datanodes.insert(internal.into(), external.into());
        self
    }

    pub fn build(self) -> Result<WebHdfsClient> {
        let mut config = self.config;
        config.trunk_size = config.trunk_size.max(1);
        config.block_size = config.block_size.max(1);

        let transport = match self.transport {
            Some(transport) => transport,
            None => build_default_transport(&config)?,
        };
        let translator = config
            .datanodes
            .iter()
            .map(|(internal, external)| (internal.as_str(), external.as_str()))
            .collect();

        Ok(WebHdfsClient {
            transport,
            config,
            translator,
        })
    }
}

fn decode<T: DeserializeOwned>(response: HttpResponse) -> Result<T> {
    let data = response.into_bytes()?;
    Ok(serde_json::from_slice(&data)?)
}

/// MKDIRS and DELETE answer `{"boolean": ...}`; an empty body counts as success.
fn decode_boolean(response: HttpResponse) -> Result<bool> {
    let data = response.into_bytes()?;
    if data.iter().all(u8::is_ascii_whitespace) {
        return Ok(true);
    }
    Ok(serde_json::from_slice::<BooleanResponse>(&data)?.boolean)
}

impl WebHdfsClient {
    pub fn new(
        namenode_host: impl Into<String>,
        namenode_port: u16,
        user: impl Into<String>,
    ) -> Result<Self> {
        Self::builder(namenode_host, namenode_port, user).build()
    }

    pub fn builder(
        namenode_host: impl Into<String>,
        namenode_port: u16,
        user: impl Into<String>,
    ) -> WebHdfsClientBuilder {
        WebHdfsClientBuilder::new(namenode_host, namenode_port, user)
    }

    pub fn config(&self) -> &HdfsConfig {
        &self.config
    }

    pub fn mkdir(&self, path: &str) -> Result<bool> {
        debug!(path, "create directory");
        let response = self.call(Operation::Mkdirs, path, &[], None)?;
        decode_boolean(response)
    }

    /// Remove a directory and everything below it.
    pub fn rmdir(&self, path: &str) -> Result<bool> {
        debug!(path, "delete directory");
        let response = self.call(Operation::Delete, path, &[], None)?;
        decode_boolean(response)
    }

    pub fn delete(&self, path: &str) -> Result<bool> {
        debug!(path, recursive = true, "delete file or directory");
        let response = self.call(Operation::Delete, path, &[], None)?;
        decode_boolean(response)
    }

    /// Entries of `path` in the order the NameNode reports them.
    pub fn list_status(&self, path: &str) -> Result<Vec<FileStatus>> {
        debug!(path, "list directory");
        let response = self.call(Operation::ListStatus, path, &[], None)?;
        let listing: FileStatusesResponse = decode(response)?;
        Ok(listing.file_statuses.file_status)
    }

    pub fn listdir(&self, path: &str) -> Result<Vec<String>> {
        Ok(self
            .list_status(path)?
            .into_iter()
            .map(|status| status.path_suffix)
            .collect())
    }

    pub fn get_info(&self, path: &str) -> Result<FileStatus> {
        debug!(path, "get file or directory info");
        let response = self.call(Operation::GetFileStatus, path, &[], None)?;
        let status: FileStatusResponse = decode(response)?;
        Ok(status.file_status)
    }

    pub fn get_size(&self, path: &str) -> Result<u64> {
        Ok(self.get_info(path)?.length)
    }

    pub fn is_file(&self, path: &str) -> Result<bool> {
        Ok(self.get_info(path)?.is_file())
    }

    pub fn is_dir(&self, path: &str) -> Result<bool> {
        Ok(self.get_info(path)?.is_dir())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plug::{HttpRequest, Method};
    use std::sync::Mutex;

    /// Answers every request with the same canned response and records it.
    struct Canned {
        status: u16,
        body: &'static str,
        seen: Mutex<Vec<(Method, String, u16)>>,
    }

    impl Canned {
        fn new(status: u16, body: &'static str) -> Arc<Self> {
            Arc::new(Self {
                status,
                body,
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    impl BlockingHttp for Canned {
        fn execute(&self, request: &HttpRequest<'_>) -> Result<HttpResponse> {
            self.seen
                .lock()
                .unwrap()
                .push((request.method, request.path.to_string(), request.port));
            Ok(HttpResponse::from_bytes(
                self.status,
                None,
                self.body.as_bytes().to_vec(),
            ))
        }
    }

    fn client(transport: Arc<Canned>) -> WebHdfsClient {
        WebHdfsClient::builder("nn", 50070, "feiyuw")
            .transport(transport)
            .build()
            .unwrap()
    }

    #[test]
    fn config_defaults() {
        let config = HdfsConfig::default();
        assert_eq!(config.trunk_size, 1024 * 1024);
        assert_eq!(config.block_size, config.trunk_size);
        assert_eq!(config.timeout, Duration::from_secs(60));
        assert!(config.datanodes.is_empty());
    }

    #[test]
    fn config_deserializes_partially() {
        let config: HdfsConfig = serde_json::from_str(
            r#"{"namenode_host":"10.1.1.3","user":"feiyuw","datanodes":{"data-1":"10.1.1.1"}}"#,
        )
        .unwrap();
        assert_eq!(config.namenode_host, "10.1.1.3");
        assert_eq!(config.namenode_port, 50070);
        assert_eq!(config.datanodes.get("data-1").map(String::as_str), Some("10.1.1.1"));
    }

    #[test]
    fn builder_clamps_sizes_and_collects_datanodes() {
        let client = WebHdfsClient::builder("nn", 1, "u")
            .transport(Canned::new(200, ""))
            .trunk_size(0)
            .block_size(0)
            .datanode("data-1", "10.1.1.1")
            .build()
            .unwrap();
        assert_eq!(client.config().trunk_size, 1);
        assert_eq!(client.config().block_size, 1);
        assert_eq!(client.translator.translate("data-1"), "10.1.1.1");
    }

    #[test]
    fn mkdir_sends_put_mkdirs() {
        let transport = Canned::new(200, r#"{"boolean":true}"#);
        assert!(client(transport.clone()).mkdir("/books/Erlang").unwrap());

        let seen = transport.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, Method::Put);
        assert_eq!(seen[0].1, "/webhdfs/v1/books/Erlang?op=MKDIRS&user.name=feiyuw");
        assert_eq!(seen[0].2, 50070);
    }

    #[test]
    fn delete_is_recursive() {
        let transport = Canned::new(200, r#"{"boolean":false}"#);
        assert!(!client(transport.clone()).delete("/tmp/x").unwrap());

        let seen = transport.seen.lock().unwrap();
        assert_eq!(seen[0].0, Method::Delete);
        assert_eq!(
            seen[0].1,
            "/webhdfs/v1/tmp/x?op=DELETE&user.name=feiyuw&recursive=true"
        );
    }

    #[test]
    fn empty_boolean_body_is_success() {
        assert!(client(Canned::new(200, "")).rmdir("/tmp").unwrap());
    }

    #[test]
    fn status_mismatch_is_protocol_failure() {
        let transport = Canned::new(
            403,
            r#"{"RemoteException":{"exception":"AccessControlException","message":"Permission denied"}}"#,
        );
        let err = client(transport).mkdir("/root").unwrap_err();
        assert_eq!(err.status(), Some(403));
        assert!(err.to_string().contains("Permission denied"));
    }

    #[test]
    fn info_helpers_are_exclusive() {
        let file = client(Canned::new(200, r#"{"FileStatus":{"length":12,"type":"FILE"}}"#));
        assert_eq!(file.get_size("/f").unwrap(), 12);
        assert!(file.is_file("/f").unwrap());
        assert!(!file.is_dir("/f").unwrap());

        let dir = client(Canned::new(200, r#"{"FileStatus":{"length":0,"type":"DIRECTORY"}}"#));
        assert!(dir.is_dir("/d").unwrap());
        assert!(!dir.is_file("/d").unwrap());
    }

    #[test]
    fn relative_path_gets_leading_slash() {
        let transport = Canned::new(200, r#"{"FileStatuses":{"FileStatus":[]}}"#);
        assert!(client(transport.clone()).listdir("data").unwrap().is_empty());
        assert_eq!(
            transport.seen.lock().unwrap()[0].1,
            "/webhdfs/v1/data?op=LISTSTATUS&user.name=feiyuw"
        );
    }
}
