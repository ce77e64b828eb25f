//! The coordinator/redirect half of WebHDFS.
//!
//! Every operation is one request to the NameNode. Data-bearing operations
//! (CREATE, APPEND, OPEN) answer with a `307` whose `Location` names the
//! DataNode that does the actual transfer; the caller then issues a second
//! request there with [`WebHdfsClient::follow`].

use tracing::{debug, error};
use url::{Position, Url};

use crate::client::WebHdfsClient;
use crate::core::{API_ROOT, HdfsError, Result};
use crate::plug::{HttpRequest, HttpResponse, Method};
use crate::translate::AddressTranslator;

const TEMPORARY_REDIRECT: u16 = 307;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    Mkdirs,
    Delete,
    Create,
    Append,
    Open,
    ListStatus,
    GetFileStatus,
}

impl Operation {
    /// Value of the `op` query parameter.
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Mkdirs => "MKDIRS",
            Operation::Delete => "DELETE",
            Operation::Create => "CREATE",
            Operation::Append => "APPEND",
            Operation::Open => "OPEN",
            Operation::ListStatus => "LISTSTATUS",
            Operation::GetFileStatus => "GETFILESTATUS",
        }
    }

    pub fn method(&self) -> Method {
        match self {
            Operation::Mkdirs | Operation::Create => Method::Put,
            Operation::Delete => Method::Delete,
            Operation::Append => Method::Post,
            Operation::Open | Operation::ListStatus | Operation::GetFileStatus => Method::Get,
        }
    }

    /// Statuses the NameNode may answer with on success.
    ///
    /// OPEN of a zero-length file may come back as a plain `200` without a
    /// redirect.
    pub fn expected_statuses(&self) -> &'static [u16] {
        match self {
            Operation::Create | Operation::Append => &[TEMPORARY_REDIRECT],
            Operation::Open => &[TEMPORARY_REDIRECT, 200],
            _ => &[200],
        }
    }

    /// Method and success status for the follow-up request on the DataNode.
    pub fn data_node(&self) -> Option<(Method, u16)> {
        match self {
            Operation::Create => Some((Method::Put, 201)),
            Operation::Append => Some((Method::Post, 200)),
            Operation::Open => Some((Method::Get, 200)),
            _ => None,
        }
    }
}

/// Where a coordinator sent us. Consumed by the one follow-up request it was
/// issued for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RedirectTarget {
    pub host: String,
    pub port: u16,
    /// Absolute path plus query, used verbatim.
    pub path: String,
}

impl RedirectTarget {
    pub fn from_location(location: &str, translator: &AddressTranslator) -> Result<Self> {
        let url = Url::parse(location)
            .map_err(|e| HdfsError::InvalidRedirect(format!("{location}: {e}")))?;

        let host = url
            .host_str()
            .ok_or_else(|| HdfsError::InvalidRedirect(format!("{location}: no host")))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| HdfsError::InvalidRedirect(format!("{location}: no port")))?;

        Ok(Self {
            host: translator.translate(host).to_string(),
            port,
            path: url[Position::BeforePath..Position::AfterQuery].to_string(),
        })
    }
}

impl WebHdfsClient {
    /// Path and query for `op` on `path`, rooted at [`API_ROOT`].
    pub(crate) fn operation_url(
        &self,
        op: Operation,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<String> {
        let mut url = Url::parse("http://namenode/")
            .map_err(|e| HdfsError::InvalidRedirect(e.to_string()))?;

        let sep = if path.starts_with('/') { "" } else { "/" };
        url.set_path(&format!("{API_ROOT}{sep}{path}"));

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("op", op.name());
            query.append_pair("user.name", &self.config.user);
            match op {
                Operation::Create => {
                    query.append_pair("overwrite", "true");
                    if let Some(replication) = self.config.replication {
                        query.append_pair("replication", &replication.to_string());
                    }
                    if let Some(buffer_size) = self.config.buffer_size {
                        query.append_pair("buffersize", &buffer_size.to_string());
                    }
                }
                Operation::Append => {
                    if let Some(buffer_size) = self.config.buffer_size {
                        query.append_pair("buffersize", &buffer_size.to_string());
                    }
                }
                Operation::Delete => {
                    query.append_pair("recursive", "true");
                }
                _ => {}
            }
            for (key, value) in params {
                query.append_pair(key, value);
            }
        }

        Ok(url[Position::BeforePath..Position::AfterQuery].to_string())
    }

    /// Issue `op` against the coordinator and check its status.
    pub fn call(
        &self,
        op: Operation,
        path: &str,
        params: &[(&str, String)],
        body: Option<&[u8]>,
    ) -> Result<HttpResponse> {
        let url = self.operation_url(op, path, params)?;
        debug!(op = op.name(), %url, "coordinator request");

        let request = HttpRequest {
            method: op.method(),
            host: &self.config.namenode_host,
            port: self.config.namenode_port,
            path: &url,
            body,
        };
        self.execute(&request, op.expected_statuses())
    }

    /// Decompose a redirecting coordinator response.
    ///
    /// Takes the response by value so the coordinator connection is closed
    /// before the data node is contacted.
    pub fn redirect(&self, response: HttpResponse) -> Result<RedirectTarget> {
        let location = response.location.as_deref().ok_or_else(|| {
            HdfsError::InvalidRedirect(format!(
                "status {} without a Location header",
                response.status
            ))
        })?;

        let target = RedirectTarget::from_location(location, &self.translator)?;
        debug!(
            host = %target.host,
            port = target.port,
            path = %target.path,
            "send redirect"
        );
        Ok(target)
    }

    /// Complete `op` on the node a coordinator redirected us to.
    pub fn follow(
        &self,
        target: RedirectTarget,
        op: Operation,
        body: Option<&[u8]>,
    ) -> Result<HttpResponse> {
        let (method, expected) = op.data_node().ok_or_else(|| {
            HdfsError::Unsupported(format!("{} does not redirect", op.name()))
        })?;

        let request = HttpRequest {
            method,
            host: &target.host,
            port: target.port,
            path: &target.path,
            body,
        };
        self.execute(&request, &[expected])
    }

    fn execute(&self, request: &HttpRequest<'_>, expected: &[u16]) -> Result<HttpResponse> {
        let response = self.transport.execute(request)?;
        if expected.contains(&response.status) {
            return Ok(response);
        }

        let status = response.status;
        let message = response.message();
        let url = request.url();
        error!(
            %url,
            method = %request.method,
            status,
            %message,
            "unexpected status"
        );
        Err(HdfsError::Protocol {
            method: request.method,
            url,
            status,
            message,
        })
    }
}
