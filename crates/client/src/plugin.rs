//! Client for the transfer plugin running inside the source server.
//!
//! All endpoints are JSON `POST`s under the plugin execution path. Any
//! status other than the accepted ones is turned into
//! [`ClientError::Api`] carrying the response body.

use reqwest::StatusCode;
use tracing::trace;

use crate::server::ServerDetails;
use crate::types::{
    HandlePropertiesDiff, HandlePropertiesDiffResponse, NodeIdResponse, UploadChunk,
    UploadChunkResponse, UploadChunksStatusBody, UploadChunksStatusResponse,
};
use crate::{BoxFuture, ClientError};

/// Plugin execution path relative to the server URL.
pub const DEFAULT_PLUGIN_PATH: &str = "api/plugins/execute/";

/// The five source plugin operations the transfer depends on.
pub trait SourcePlugin: Send + Sync {
    /// Snapshots the repository's properties before migration starts.
    fn store_properties<'a>(&'a self, repo_key: &'a str) -> BoxFuture<'a, Result<(), ClientError>>;

    /// Announces a clean start; returns the id of the node that answered.
    fn clean_start(&self) -> BoxFuture<'_, Result<String, ClientError>>;

    /// Submits a chunk. `None` means every file was deployed by checksum
    /// and nothing needs tracking; otherwise the token to poll.
    fn upload_chunk<'a>(
        &'a self,
        chunk: &'a UploadChunk,
    ) -> BoxFuture<'a, Result<Option<String>, ClientError>>;

    fn upload_chunks_status<'a>(
        &'a self,
        body: &'a UploadChunksStatusBody,
    ) -> BoxFuture<'a, Result<UploadChunksStatusResponse, ClientError>>;

    /// Starts or polls the properties-diff job. One node answers per call.
    fn handle_properties_diff<'a>(
        &'a self,
        body: &'a HandlePropertiesDiff,
    ) -> BoxFuture<'a, Result<HandlePropertiesDiffResponse, ClientError>>;
}

/// `reqwest` implementation of [`SourcePlugin`].
pub struct SrcPluginClient {
    http: reqwest::Client,
    server: ServerDetails,
    plugin_url: String,
}

impl SrcPluginClient {
    /// Creates a client for the plugin on `server`, mounted at `plugin_path`.
    pub fn new(server: ServerDetails, plugin_path: &str) -> Result<Self, ClientError> {
        let plugin_url = format!("{}{}", server.base_url()?, normalize_path(plugin_path));
        let http = reqwest::Client::builder().build()?;
        Ok(Self {
            http,
            server,
            plugin_url,
        })
    }

    fn endpoint(&self, name: &str) -> String {
        format!("{}{}", self.plugin_url, name)
    }

    /// Sends a POST and returns the status and body when the status is one
    /// of `accepted`.
    async fn post(
        &self,
        url: String,
        body: Option<Vec<u8>>,
        accepted: &[StatusCode],
    ) -> Result<(StatusCode, Vec<u8>), ClientError> {
        trace!(url = %url, "plugin request");
        let mut req = self.server.authorize(self.http.post(&url));
        if let Some(body) = body {
            req = req
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body);
        }
        let resp = req.send().await?;
        let status = resp.status();
        let bytes = resp.bytes().await?.to_vec();
        if !accepted.contains(&status) {
            return Err(api_error(status, &bytes));
        }
        Ok((status, bytes))
    }
}

impl SourcePlugin for SrcPluginClient {
    fn store_properties<'a>(&'a self, repo_key: &'a str) -> BoxFuture<'a, Result<(), ClientError>> {
        Box::pin(async move {
            let url = reqwest::Url::parse_with_params(
                &self.endpoint("storeProperties"),
                &[("repoKey", repo_key)],
            )
            .map_err(|e| ClientError::Config(format!("invalid plugin url: {e}")))?;
            self.post(url.to_string(), None, &[StatusCode::OK]).await?;
            Ok(())
        })
    }

    fn clean_start(&self) -> BoxFuture<'_, Result<String, ClientError>> {
        Box::pin(async move {
            let (_, body) = self
                .post(self.endpoint("cleanStart"), None, &[StatusCode::OK])
                .await?;
            let resp: NodeIdResponse = serde_json::from_slice(&body)?;
            Ok(resp.node_id)
        })
    }

    fn upload_chunk<'a>(
        &'a self,
        chunk: &'a UploadChunk,
    ) -> BoxFuture<'a, Result<Option<String>, ClientError>> {
        Box::pin(async move {
            let content = serde_json::to_vec(chunk)?;
            let (status, body) = self
                .post(
                    self.endpoint("uploadChunk"),
                    Some(content),
                    &[StatusCode::OK, StatusCode::ACCEPTED],
                )
                .await?;
            if status == StatusCode::OK {
                return Ok(None);
            }
            let resp: UploadChunkResponse = serde_json::from_slice(&body)?;
            if resp.uuid_token.is_empty() {
                return Err(ClientError::Api {
                    status: status.as_u16(),
                    body: "accepted chunk without a uuid token".into(),
                });
            }
            trace!(node = %resp.node_id, token = %resp.uuid_token, "chunk accepted");
            Ok(Some(resp.uuid_token))
        })
    }

    fn upload_chunks_status<'a>(
        &'a self,
        body: &'a UploadChunksStatusBody,
    ) -> BoxFuture<'a, Result<UploadChunksStatusResponse, ClientError>> {
        Box::pin(async move {
            let content = serde_json::to_vec(body)?;
            let (_, resp) = self
                .post(
                    self.endpoint("getUploadChunksStatus"),
                    Some(content),
                    &[StatusCode::OK],
                )
                .await?;
            Ok(serde_json::from_slice(&resp)?)
        })
    }

    fn handle_properties_diff<'a>(
        &'a self,
        body: &'a HandlePropertiesDiff,
    ) -> BoxFuture<'a, Result<HandlePropertiesDiffResponse, ClientError>> {
        Box::pin(async move {
            let content = serde_json::to_vec(body)?;
            let (_, resp) = self
                .post(
                    self.endpoint("handlePropertiesDiff"),
                    Some(content),
                    &[StatusCode::OK],
                )
                .await?;
            Ok(serde_json::from_slice(&resp)?)
        })
    }
}

fn normalize_path(path: &str) -> String {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{trimmed}/")
    }
}

/// Builds an [`ClientError::Api`], pretty-printing JSON bodies.
pub(crate) fn api_error(status: StatusCode, body: &[u8]) -> ClientError {
    let body = match serde_json::from_slice::<serde_json::Value>(body) {
        Ok(value) => serde_json::to_string_pretty(&value)
            .unwrap_or_else(|_| String::from_utf8_lossy(body).into_owned()),
        Err(_) => String::from_utf8_lossy(body).into_owned(),
    };
    ClientError::Api {
        status: status.as_u16(),
        body,
    }
}
