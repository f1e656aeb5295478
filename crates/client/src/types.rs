//! JSON bodies exchanged with the source plugin and the REST API.

use serde::{Deserialize, Deserializer, Serialize};

/// Where and how the source plugin deploys into the target server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetAuth {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub target_artifactory_url: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub target_username: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub target_password: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub target_token: String,
}

/// A single file, addressed by repository, folder path and name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileRepresentation {
    #[serde(default)]
    pub repo: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub name: String,
}

/// Body of `uploadChunk`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadChunk {
    #[serde(flatten)]
    pub target_auth: TargetAuth,
    #[serde(default)]
    pub upload_candidates: Vec<FileRepresentation>,
    #[serde(default)]
    pub check_existence_in_filestore: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NodeIdResponse {
    #[serde(default)]
    pub node_id: String,
}

/// `202 Accepted` body of `uploadChunk`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UploadChunkResponse {
    #[serde(default)]
    pub node_id: String,
    #[serde(default)]
    pub uuid_token: String,
}

/// Body of `getUploadChunksStatus`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UploadChunksStatusBody {
    pub uuid_tokens: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UploadChunksStatusResponse {
    #[serde(default)]
    pub node_id: String,
    #[serde(default)]
    pub chunks_status: Vec<ChunkStatus>,
}

/// Coarse state of an asynchronously processed chunk or properties job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChunkStatusType {
    #[default]
    InProcess,
    Done,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChunkStatus {
    #[serde(default)]
    pub uuid_token: String,
    #[serde(default)]
    pub status: ChunkStatusType,
    #[serde(default)]
    pub files: Vec<FileUploadStatus>,
}

/// Outcome of one file inside a finished chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChunkFileStatus {
    Success,
    Fail,
    #[serde(rename = "SKIPPED_LARGE_PROPERTIES")]
    SkippedLargeProps,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FileUploadStatus {
    #[serde(flatten)]
    pub file: FileRepresentation,
    pub status: ChunkFileStatus,
    #[serde(default, deserialize_with = "string_or_number")]
    pub status_code: String,
    #[serde(default)]
    pub reason: String,
}

/// Body of `handlePropertiesDiff`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HandlePropertiesDiff {
    #[serde(flatten)]
    pub target_auth: TargetAuth,
    pub repo_key: String,
    pub start_milliseconds: String,
    pub end_milliseconds: String,
}

/// Progress of the properties-diff job as seen by one node.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HandlePropertiesDiffResponse {
    #[serde(default)]
    pub node_id: String,
    #[serde(default)]
    pub properties_delivered: u64,
    #[serde(default)]
    pub properties_remained: u64,
    #[serde(default)]
    pub status: ChunkStatusType,
    #[serde(default)]
    pub errors: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    #[default]
    File,
    Folder,
    #[serde(other)]
    Other,
}

/// One row of a metadata query result.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AqlItem {
    #[serde(default)]
    pub repo: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "type")]
    pub item_type: ItemType,
}

impl AqlItem {
    pub fn to_file(&self) -> FileRepresentation {
        FileRepresentation {
            repo: self.repo.clone(),
            path: self.path.clone(),
            name: self.name.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AqlSearchResult {
    #[serde(default)]
    pub results: Vec<AqlItem>,
}

/// Entry of the repository listing endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RepositoryDetails {
    pub key: String,
    #[serde(default, rename = "type")]
    pub repo_type: String,
    #[serde(default, rename = "packageType")]
    pub package_type: String,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Null => Ok(String::new()),
        other => Ok(other.to_string()),
    }
}
