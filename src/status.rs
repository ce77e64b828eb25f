use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FileType {
    File,
    Directory,
    Symlink,
}

/// Snapshot of one `FileStatus` object as reported by the NameNode.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileStatus {
    #[serde(rename = "type")]
    pub file_type: FileType,
    pub length: u64,
    /// Name relative to the listed directory; empty for GETFILESTATUS.
    #[serde(default)]
    pub path_suffix: String,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub permission: String,
    #[serde(default)]
    pub modification_time: u64,
    #[serde(default)]
    pub access_time: u64,
    #[serde(default)]
    pub block_size: u64,
    #[serde(default)]
    pub replication: u16,
}

impl FileStatus {
    pub fn is_file(&self) -> bool {
        self.file_type == FileType::File
    }

    pub fn is_dir(&self) -> bool {
        self.file_type == FileType::Directory
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct FileStatusResponse {
    #[serde(rename = "FileStatus")]
    pub file_status: FileStatus,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FileStatusesResponse {
    #[serde(rename = "FileStatuses")]
    pub file_statuses: FileStatuses,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FileStatuses {
    #[serde(rename = "FileStatus", default)]
    pub file_status: Vec<FileStatus>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct BooleanResponse {
    pub boolean: bool,
}
