//! Repository listing and metadata queries against the REST API.

use tracing::trace;

use crate::plugin::api_error;
use crate::server::ServerDetails;
use crate::types::{AqlSearchResult, RepositoryDetails};
use crate::{BoxFuture, ClientError};

/// Read-only metadata operations on a server.
pub trait MetadataService: Send + Sync {
    /// Runs an AQL query and returns its rows.
    fn search<'a>(&'a self, query: &'a str) -> BoxFuture<'a, Result<AqlSearchResult, ClientError>>;

    /// Lists the local repositories of the server.
    fn local_repositories(&self) -> BoxFuture<'_, Result<Vec<RepositoryDetails>, ClientError>>;
}

/// `reqwest` implementation of [`MetadataService`].
pub struct RestClient {
    http: reqwest::Client,
    server: ServerDetails,
    base_url: String,
}

impl RestClient {
    pub fn new(server: ServerDetails) -> Result<Self, ClientError> {
        let base_url = server.base_url()?;
        let http = reqwest::Client::builder().build()?;
        Ok(Self {
            http,
            server,
            base_url,
        })
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> Result<Vec<u8>, ClientError> {
        let resp = self.server.authorize(req).send().await?;
        let status = resp.status();
        let body = resp.bytes().await?.to_vec();
        if !status.is_success() {
            return Err(api_error(status, &body));
        }
        Ok(body)
    }
}

impl MetadataService for RestClient {
    fn search<'a>(&'a self, query: &'a str) -> BoxFuture<'a, Result<AqlSearchResult, ClientError>> {
        Box::pin(async move {
            trace!(server = %self.server.id, query, "aql");
            let req = self
                .http
                .post(format!("{}api/search/aql", self.base_url))
                .header(reqwest::header::CONTENT_TYPE, "text/plain")
                .body(query.to_string());
            let body = self.send(req).await?;
            Ok(serde_json::from_slice(&body)?)
        })
    }

    fn local_repositories(&self) -> BoxFuture<'_, Result<Vec<RepositoryDetails>, ClientError>> {
        Box::pin(async move {
            let req = self
                .http
                .get(format!("{}api/repositories", self.base_url))
                .query(&[("type", "local")]);
            let body = self.send(req).await?;
            Ok(serde_json::from_slice(&body)?)
        })
    }
}
