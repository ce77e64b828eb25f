//! In-memory WebHDFS cluster: one NameNode and one DataNode behind the
//! `BlockingHttp` seam, with a request log and failure injection.

#![allow(dead_code)]

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use url::Url;
use webhdfs::{BlockingHttp, HdfsError, HttpRequest, HttpResponse, Method, Result, WebHdfsClient};

pub const NAMENODE_PORT: u16 = 50070;
pub const DATANODE_PORT: u16 = 50075;
/// Name the NameNode uses for its DataNode in `Location` headers.
pub const DATANODE_HOST: &str = "data-1";

/// How an OPEN of a zero-length file is answered.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmptyOpen {
    Ok200,
    RedirectWithoutLocation,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Logged {
    pub method: Method,
    pub host: String,
    pub port: u16,
    pub op: String,
    pub path: String,
    pub body_len: Option<usize>,
}

impl Logged {
    pub fn on_datanode(&self) -> bool {
        self.port == DATANODE_PORT
    }
}

#[derive(Clone, Debug)]
struct Failure {
    op: &'static str,
    datanode: bool,
    status: u16,
    skip: usize,
}

#[derive(Default)]
struct Namespace {
    /// Creation order is listing order.
    order: Vec<String>,
    files: HashMap<String, Vec<u8>>,
    dirs: BTreeSet<String>,
}

impl Namespace {
    fn touch(&mut self, path: &str) {
        if !self.order.iter().any(|p| p == path) {
            self.order.push(path.to_string());
        }
    }

    fn children(&self, dir: &str) -> Vec<&String> {
        let prefix = if dir == "/" { "/".to_string() } else { format!("{dir}/") };
        self.order
            .iter()
            .filter(|p| {
                p.strip_prefix(&prefix)
                    .is_some_and(|rest| !rest.is_empty() && !rest.contains('/'))
            })
            .collect()
    }

    fn status_json(&self, path: &str) -> Option<String> {
        let name = path.rsplit('/').next().unwrap_or_default();
        if let Some(data) = self.files.get(path) {
            Some(format!(
                r#"{{"pathSuffix":"{name}","type":"FILE","length":{},"owner":"tester","replication":3}}"#,
                data.len()
            ))
        } else if self.dirs.contains(path) {
            Some(format!(
                r#"{{"pathSuffix":"{name}","type":"DIRECTORY","length":0,"owner":"tester"}}"#
            ))
        } else {
            None
        }
    }
}

pub struct FakeCluster {
    ns: Mutex<Namespace>,
    log: Mutex<Vec<Logged>>,
    failure: Mutex<Option<Failure>>,
    empty_open: Mutex<EmptyOpen>,
}

fn json(status: u16, body: String) -> HttpResponse {
    HttpResponse::from_bytes(status, None, body.into_bytes())
}

fn not_found(path: &str) -> HttpResponse {
    json(
        404,
        format!(
            r#"{{"RemoteException":{{"exception":"FileNotFoundException","message":"File does not exist: {path}"}}}}"#
        ),
    )
}

impl FakeCluster {
    pub fn new() -> Arc<Self> {
        let mut ns = Namespace::default();
        ns.dirs.insert("/".to_string());
        Arc::new(Self {
            ns: Mutex::new(ns),
            log: Mutex::new(Vec::new()),
            failure: Mutex::new(None),
            empty_open: Mutex::new(EmptyOpen::Ok200),
        })
    }

    pub fn client(self: &Arc<Self>, trunk_size: u64) -> WebHdfsClient {
        WebHdfsClient::builder("namenode", NAMENODE_PORT, "tester")
            .transport(self.clone())
            .trunk_size(trunk_size)
            .block_size(trunk_size)
            .build()
            .expect("client")
    }

    pub fn put_file(&self, path: &str, data: &[u8]) {
        let mut ns = self.ns.lock().unwrap();
        ns.files.insert(path.to_string(), data.to_vec());
        ns.touch(path);
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.ns.lock().unwrap().files.get(path).cloned()
    }

    pub fn set_empty_open(&self, style: EmptyOpen) {
        *self.empty_open.lock().unwrap() = style;
    }

    /// Answer the `skip + 1`-th matching request with `status`.
    pub fn fail(&self, op: &'static str, datanode: bool, status: u16, skip: usize) {
        *self.failure.lock().unwrap() = Some(Failure {
            op,
            datanode,
            status,
            skip,
        });
    }

    pub fn log(&self) -> Vec<Logged> {
        self.log.lock().unwrap().clone()
    }

    pub fn clear_log(&self) {
        self.log.lock().unwrap().clear();
    }

    fn injected(&self, op: &str, datanode: bool) -> Option<u16> {
        let mut failure = self.failure.lock().unwrap();
        let f = failure.as_mut()?;
        if f.op != op || f.datanode != datanode {
            return None;
        }
        if f.skip > 0 {
            f.skip -= 1;
            return None;
        }
        let status = f.status;
        *failure = None;
        Some(status)
    }

    fn namenode(&self, method: Method, op: &str, path: &str, url: &Url) -> HttpResponse {
        let mut ns = self.ns.lock().unwrap();
        let redirect = || {
            let location = format!(
                "http://{DATANODE_HOST}:{DATANODE_PORT}{}?{}",
                url.path(),
                url.query().unwrap_or_default()
            );
            HttpResponse::from_bytes(307, Some(location), Vec::new())
        };

        match (method, op) {
            (Method::Put, "MKDIRS") => {
                let mut current = String::new();
                for part in path.split('/').filter(|p| !p.is_empty()) {
                    current = format!("{current}/{part}");
                    ns.dirs.insert(current.clone());
                    ns.touch(&current);
                }
                json(200, r#"{"boolean":true}"#.into())
            }
            (Method::Delete, "DELETE") => {
                let prefix = format!("{path}/");
                let existed = ns.files.contains_key(path) || ns.dirs.contains(path);
                ns.files.retain(|p, _| p != path && !p.starts_with(&prefix));
                ns.dirs.retain(|p| p != path && !p.starts_with(&prefix));
                ns.order.retain(|p| p != path && !p.starts_with(&prefix));
                json(200, format!(r#"{{"boolean":{existed}}}"#))
            }
            (Method::Put, "CREATE") => redirect(),
            (Method::Post, "APPEND") | (Method::Get, "OPEN") => {
                let Some(data) = ns.files.get(path) else {
                    return not_found(path);
                };
                if op == "OPEN" && data.is_empty() {
                    return match *self.empty_open.lock().unwrap() {
                        EmptyOpen::Ok200 => HttpResponse::from_bytes(200, None, Vec::new()),
                        EmptyOpen::RedirectWithoutLocation => {
                            HttpResponse::new(307, None, None, std::io::empty())
                        }
                    };
                }
                redirect()
            }
            (Method::Get, "LISTSTATUS") => {
                if !ns.dirs.contains(path) {
                    return not_found(path);
                }
                let entries: Vec<String> = ns
                    .children(path)
                    .into_iter()
                    .filter_map(|child| ns.status_json(child))
                    .collect();
                json(
                    200,
                    format!(r#"{{"FileStatuses":{{"FileStatus":[{}]}}}}"#, entries.join(",")),
                )
            }
            (Method::Get, "GETFILESTATUS") => match ns.status_json(path) {
                Some(status) => json(200, format!(r#"{{"FileStatus":{status}}}"#)),
                None => not_found(path),
            },
            _ => json(400, format!("unsupported {method} {op}")),
        }
    }

    fn datanode(&self, request: &HttpRequest<'_>, op: &str, path: &str, url: &Url) -> HttpResponse {
        let mut ns = self.ns.lock().unwrap();
        let param = |key: &str| {
            url.query_pairs()
                .find(|(k, _)| k == key)
                .and_then(|(_, v)| v.parse::<usize>().ok())
        };

        match (request.method, op) {
            (Method::Put, "CREATE") => {
                ns.files
                    .insert(path.to_string(), request.body.unwrap_or_default().to_vec());
                ns.touch(path);
                HttpResponse::from_bytes(201, None, Vec::new())
            }
            (Method::Post, "APPEND") => match ns.files.get_mut(path) {
                Some(data) => {
                    data.extend_from_slice(request.body.unwrap_or_default());
                    HttpResponse::from_bytes(200, None, Vec::new())
                }
                None => not_found(path),
            },
            (Method::Get, "OPEN") => match ns.files.get(path) {
                Some(data) => {
                    let start = param("offset").unwrap_or(0).min(data.len());
                    let end = param("length")
                        .map(|len| start + len)
                        .unwrap_or(data.len())
                        .min(data.len());
                    HttpResponse::from_bytes(200, None, data[start..end].to_vec())
                }
                None => not_found(path),
            },
            _ => json(400, format!("unsupported {} {op}", request.method)),
        }
    }
}

impl BlockingHttp for FakeCluster {
    fn execute(&self, request: &HttpRequest<'_>) -> Result<HttpResponse> {
        let url = Url::parse(&format!("http://{}{}", request.host, request.path))
            .map_err(|e| HdfsError::Network(e.to_string()))?;
        let op = url
            .query_pairs()
            .find(|(k, _)| k == "op")
            .map(|(_, v)| v.into_owned())
            .unwrap_or_default();
        let path = url
            .path()
            .strip_prefix(webhdfs::API_ROOT)
            .unwrap_or("/")
            .to_string();
        let path = if path.is_empty() { "/".to_string() } else { path };

        self.log.lock().unwrap().push(Logged {
            method: request.method,
            host: request.host.to_string(),
            port: request.port,
            op: op.clone(),
            path: request.path.to_string(),
            body_len: request.body.map(<[u8]>::len),
        });

        let datanode = match request.port {
            NAMENODE_PORT => false,
            DATANODE_PORT => true,
            port => return Err(HdfsError::Network(format!("connection refused: port {port}"))),
        };

        if let Some(status) = self.injected(&op, datanode) {
            return Ok(json(status, "injected failure".into()));
        }

        Ok(if datanode {
            self.datanode(request, &op, &path, &url)
        } else {
            self.namenode(request.method, &op, &path, &url)
        })
    }
}
