//! Migration phase: recursive traversal of a repository.

use std::sync::Arc;

use serde_json::json;
use tracing::trace;

use rtransfer_client::ItemType;

use crate::chunk::ChunkBuilder;
use crate::phase::UploadRun;
use crate::pool::TaskFuture;

/// Path of the repository root in metadata queries.
pub(crate) const ROOT_PATH: &str = ".";

/// Lists the direct children (files and folders) of `path`.
pub(crate) fn folder_contents_query(repo: &str, path: &str) -> String {
    let criteria = json!({
        "repo": repo,
        "path": { "$match": path },
        "name": { "$match": "*" },
        "type": "any",
    });
    format!(r#"items.find({criteria}).include("repo","path","name","type")"#)
}

fn child_path(parent: &str, name: &str) -> String {
    if parent.is_empty() || parent == ROOT_PATH {
        name.to_string()
    } else {
        format!("{parent}/{name}")
    }
}

/// Task handling one folder: uploads its files in chunks and queues a task
/// per subfolder. A subfolder runs inline when the queue is full.
pub(crate) fn folder_task(run: Arc<UploadRun>, path: String) -> TaskFuture {
    Box::pin(async move {
        let query = folder_contents_query(&run.repo, &path);
        let result = run.search.search(&query).await?;
        trace!(repo = %run.repo, path = %path, items = result.results.len(), "folder listed");

        let mut builder = ChunkBuilder::new(run.chunk_size);
        for item in result.results {
            if item.name == ROOT_PATH {
                continue;
            }
            match item.item_type {
                ItemType::Folder => {
                    let child = folder_task(Arc::clone(&run), child_path(&item.path, &item.name));
                    if let Err(child) = run.pool.try_add_task(child) {
                        child.await?;
                    }
                }
                ItemType::File => {
                    if let Some(chunk) = builder.push(item.to_file()) {
                        run.gateway.submit(chunk).await?;
                    }
                }
                ItemType::Other => {}
            }
        }
        if let Some(chunk) = builder.finish() {
            run.gateway.submit(chunk).await?;
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folder_query_shape() {
        let query = folder_contents_query("lib-local", "org/acme");
        assert!(query.starts_with("items.find("));
        assert!(query.ends_with(r#".include("repo","path","name","type")"#));

        let criteria: serde_json::Value =
            serde_json::from_str(&query["items.find(".len()..query.rfind(").include").unwrap()])
                .unwrap();
        assert_eq!(criteria["repo"], "lib-local");
        assert_eq!(criteria["path"]["$match"], "org/acme");
        assert_eq!(criteria["type"], "any");
    }

    #[test]
    fn child_paths_from_root() {
        assert_eq!(child_path(".", "org"), "org");
        assert_eq!(child_path("org", "acme"), "org/acme");
    }
}
