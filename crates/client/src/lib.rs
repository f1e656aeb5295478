//! HTTP clients used by the transfer engine.
//!
//! Two seams are exposed as traits so the engine can be driven by mocks:
//! [`SourcePlugin`] for the five endpoints of the transfer plugin installed
//! on the source server, and [`MetadataService`] for repository listing and
//! metadata (AQL) queries. [`SrcPluginClient`] and [`RestClient`] are the
//! `reqwest` implementations.

pub mod metadata;
pub mod plugin;
pub mod server;
pub mod types;

use std::future::Future;
use std::pin::Pin;

pub use metadata::{MetadataService, RestClient};
pub use plugin::{DEFAULT_PLUGIN_PATH, SourcePlugin, SrcPluginClient};
pub use server::ServerDetails;
pub use types::{
    AqlItem, AqlSearchResult, ChunkFileStatus, ChunkStatus, ChunkStatusType,
    FileRepresentation, FileUploadStatus, HandlePropertiesDiff, HandlePropertiesDiffResponse,
    ItemType, RepositoryDetails, TargetAuth, UploadChunk, UploadChunksStatusBody,
    UploadChunksStatusResponse,
};

/// Boxed future returned by the client traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Errors from the HTTP clients.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server responded {status}: {body}")]
    Api { status: u16, body: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid server configuration: {0}")]
    Config(String),
}
