//! Mock services shared by the engine tests.

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;

use rtransfer_client::{
    AqlItem, AqlSearchResult, BoxFuture, ChunkFileStatus, ChunkStatus, ChunkStatusType,
    ClientError, FileRepresentation, FileUploadStatus, HandlePropertiesDiff,
    HandlePropertiesDiffResponse, ItemType, MetadataService, RepositoryDetails, SourcePlugin,
    TargetAuth, UploadChunk, UploadChunksStatusBody, UploadChunksStatusResponse,
};
use rtransfer_state::StateStore;

use crate::config::EngineConfig;
use crate::context::{TransferContext, TransferServices};
use crate::events::{EventSink, TransferEvent};

pub(crate) fn file(repo: &str, path: &str, name: &str) -> FileRepresentation {
    FileRepresentation {
        repo: repo.into(),
        path: path.into(),
        name: name.into(),
    }
}

pub(crate) fn item(repo: &str, path: &str, name: &str, item_type: ItemType) -> AqlItem {
    AqlItem {
        repo: repo.into(),
        path: path.into(),
        name: name.into(),
        item_type,
    }
}

pub(crate) fn node_report(node: &str, delivered: u64, remained: u64, done: bool) -> HandlePropertiesDiffResponse {
    HandlePropertiesDiffResponse {
        node_id: node.into(),
        properties_delivered: delivered,
        properties_remained: remained,
        status: if done {
            ChunkStatusType::Done
        } else {
            ChunkStatusType::InProcess
        },
        errors: String::new(),
    }
}

/// Config with millisecond intervals.
pub(crate) fn fast_config() -> EngineConfig {
    EngineConfig {
        threads: 4,
        upload_poll_interval: Duration::from_millis(5),
        properties_poll_interval: Duration::from_millis(5),
        acquire_retry_interval: Duration::from_millis(5),
        retry_wait: Duration::from_millis(5),
        node_probes: 12,
        task_queue_capacity: 64,
        ..Default::default()
    }
}

pub(crate) fn services(source: Arc<MockSource>, meta: Arc<MockMetadata>, target: Arc<MockMetadata>) -> TransferServices {
    TransferServices {
        source,
        source_meta: meta,
        target_meta: target,
        target_auth: TargetAuth {
            target_artifactory_url: "https://target.example.com/".into(),
            target_token: "target-token".into(),
            ..Default::default()
        },
    }
}

pub(crate) fn context(
    dir: &Path,
    config: EngineConfig,
    source: Arc<MockSource>,
    meta: Arc<MockMetadata>,
) -> (TransferContext, mpsc::Receiver<TransferEvent>) {
    let (tx, rx) = mpsc::channel(1024);
    let ctx = TransferContext::new(
        config,
        services(source, Arc::clone(&meta), meta),
        StateStore::new(dir),
        EventSink::new(tx),
    );
    (ctx, rx)
}

/// Scriptable source plugin.
///
/// File names starting with `bad` come back as `FAIL`, names starting with
/// `huge` as `SKIPPED_LARGE_PROPERTIES`.
#[derive(Default)]
pub(crate) struct MockSource {
    nodes: Vec<String>,
    probes: AtomicUsize,
    async_uploads: bool,
    failing_uploads: bool,
    token_seq: AtomicUsize,
    uploads: Mutex<Vec<Vec<FileRepresentation>>>,
    pending: Mutex<HashMap<String, Vec<FileRepresentation>>>,
    status_failures: AtomicU32,
    status_calls: AtomicUsize,
    stored: Mutex<Vec<String>>,
    properties_script: Mutex<VecDeque<HandlePropertiesDiffResponse>>,
    properties_bodies: Mutex<Vec<HandlePropertiesDiff>>,
    properties_seq: AtomicUsize,
}

impl MockSource {
    pub fn new(nodes: &[&str]) -> Self {
        Self {
            nodes: nodes.iter().map(|n| n.to_string()).collect(),
            ..Default::default()
        }
    }

    /// Answer `uploadChunk` with 202 and a token.
    pub fn with_async_uploads(mut self) -> Self {
        self.async_uploads = true;
        self
    }

    pub fn with_failing_uploads(mut self) -> Self {
        self.failing_uploads = true;
        self
    }

    /// Fail the next `n` status requests.
    pub fn with_status_failures(self, n: u32) -> Self {
        self.status_failures.store(n, Ordering::SeqCst);
        self
    }

    /// Answers for `handlePropertiesDiff`, in order. Once exhausted every
    /// node reports done, round-robin.
    pub fn with_properties_script(self, script: Vec<HandlePropertiesDiffResponse>) -> Self {
        if let Ok(mut s) = self.properties_script.lock() {
            s.extend(script);
        }
        self
    }

    pub fn uploaded_chunk_sizes(&self) -> Vec<usize> {
        self.uploads.lock().unwrap().iter().map(Vec::len).collect()
    }

    pub fn uploaded_files(&self) -> Vec<FileRepresentation> {
        self.uploads.lock().unwrap().iter().flatten().cloned().collect()
    }

    pub fn pending_tokens(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn stored_properties(&self) -> Vec<String> {
        self.stored.lock().unwrap().clone()
    }

    pub fn properties_requests(&self) -> Vec<HandlePropertiesDiff> {
        self.properties_bodies.lock().unwrap().clone()
    }

    fn outcome(file: &FileRepresentation) -> FileUploadStatus {
        let (status, code, reason) = if file.name.starts_with("bad") {
            (ChunkFileStatus::Fail, "500", "upload failed")
        } else if file.name.starts_with("huge") {
            (ChunkFileStatus::SkippedLargeProps, "413", "properties too large")
        } else {
            (ChunkFileStatus::Success, "", "")
        };
        FileUploadStatus {
            file: file.clone(),
            status,
            status_code: code.into(),
            reason: reason.into(),
        }
    }
}

impl SourcePlugin for MockSource {
    fn store_properties<'a>(&'a self, repo_key: &'a str) -> BoxFuture<'a, Result<(), ClientError>> {
        Box::pin(async move {
            self.stored.lock().unwrap().push(repo_key.to_string());
            Ok(())
        })
    }

    fn clean_start(&self) -> BoxFuture<'_, Result<String, ClientError>> {
        Box::pin(async move {
            let i = self.probes.fetch_add(1, Ordering::SeqCst);
            if self.nodes.is_empty() {
                return Ok(String::new());
            }
            Ok(self.nodes[i % self.nodes.len()].clone())
        })
    }

    fn upload_chunk<'a>(
        &'a self,
        chunk: &'a UploadChunk,
    ) -> BoxFuture<'a, Result<Option<String>, ClientError>> {
        Box::pin(async move {
            if self.failing_uploads {
                return Err(ClientError::Api {
                    status: 500,
                    body: "plugin unavailable".into(),
                });
            }
            self.uploads
                .lock()
                .unwrap()
                .push(chunk.upload_candidates.clone());
            if !self.async_uploads {
                return Ok(None);
            }
            let token = format!("tok-{}", self.token_seq.fetch_add(1, Ordering::SeqCst) + 1);
            self.pending
                .lock()
                .unwrap()
                .insert(token.clone(), chunk.upload_candidates.clone());
            Ok(Some(token))
        })
    }

    fn upload_chunks_status<'a>(
        &'a self,
        body: &'a UploadChunksStatusBody,
    ) -> BoxFuture<'a, Result<UploadChunksStatusResponse, ClientError>> {
        Box::pin(async move {
            self.status_calls.fetch_add(1, Ordering::SeqCst);
            let remaining = self.status_failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.status_failures.store(remaining - 1, Ordering::SeqCst);
                return Err(ClientError::Api {
                    status: 503,
                    body: "busy".into(),
                });
            }
            let mut pending = self.pending.lock().unwrap();
            let chunks_status = body
                .uuid_tokens
                .iter()
                .filter_map(|token| {
                    pending.remove(token).map(|files| ChunkStatus {
                        uuid_token: token.clone(),
                        status: ChunkStatusType::Done,
                        files: files.iter().map(Self::outcome).collect(),
                    })
                })
                .collect();
            Ok(UploadChunksStatusResponse {
                node_id: self.nodes.first().cloned().unwrap_or_default(),
                chunks_status,
            })
        })
    }

    fn handle_properties_diff<'a>(
        &'a self,
        body: &'a HandlePropertiesDiff,
    ) -> BoxFuture<'a, Result<HandlePropertiesDiffResponse, ClientError>> {
        Box::pin(async move {
            self.properties_bodies.lock().unwrap().push(body.clone());
            if let Some(report) = self.properties_script.lock().unwrap().pop_front() {
                return Ok(report);
            }
            let i = self.properties_seq.fetch_add(1, Ordering::SeqCst);
            let node = self.nodes[i % self.nodes.len()].clone();
            Ok(node_report(&node, 10, 0, true))
        })
    }
}

/// Metadata service answering folder queries by repository and path, and
/// diff queries by repository and lower time bound.
#[derive(Default)]
pub(crate) struct MockMetadata {
    repos: Vec<RepositoryDetails>,
    folders: HashMap<String, Vec<AqlItem>>,
    modified: HashMap<String, Vec<AqlItem>>,
    queries: Mutex<Vec<serde_json::Value>>,
}

impl MockMetadata {
    pub fn new(repos: &[&str]) -> Self {
        Self {
            repos: repos
                .iter()
                .map(|key| RepositoryDetails {
                    key: key.to_string(),
                    repo_type: "LOCAL".into(),
                    package_type: "generic".into(),
                })
                .collect(),
            ..Default::default()
        }
    }

    pub fn with_folder(mut self, repo: &str, path: &str, items: Vec<AqlItem>) -> Self {
        self.folders.insert(format!("{repo}:{path}"), items);
        self
    }

    pub fn with_modified(mut self, repo: &str, from: &str, items: Vec<AqlItem>) -> Self {
        self.modified.insert(format!("{repo}:{from}"), items);
        self
    }

    /// `items.find(...)` criteria of every query received.
    pub fn queries(&self) -> Vec<serde_json::Value> {
        self.queries.lock().unwrap().clone()
    }
}

fn find_criteria(query: &str) -> Option<serde_json::Value> {
    let start = query.find("items.find(")? + "items.find(".len();
    let end = query.rfind(").include(")?;
    serde_json::from_str(&query[start..end]).ok()
}

impl MetadataService for MockMetadata {
    fn search<'a>(&'a self, query: &'a str) -> BoxFuture<'a, Result<AqlSearchResult, ClientError>> {
        Box::pin(async move {
            let Some(criteria) = find_criteria(query) else {
                return Err(ClientError::Api {
                    status: 400,
                    body: format!("unparsable query: {query}"),
                });
            };
            self.queries.lock().unwrap().push(criteria.clone());

            let repo = criteria["repo"].as_str().unwrap_or_default();
            let results = if let Some(from) = criteria["modified"]["$gte"].as_str() {
                self.modified.get(&format!("{repo}:{from}")).cloned()
            } else {
                let path = criteria["path"]["$match"].as_str().unwrap_or_default();
                self.folders.get(&format!("{repo}:{path}")).cloned()
            };
            let results = results.unwrap_or_default();
            Ok(AqlSearchResult { results })
        })
    }

    fn local_repositories(&self) -> BoxFuture<'_, Result<Vec<RepositoryDetails>, ClientError>> {
        Box::pin(async move { Ok(self.repos.clone()) })
    }
}
