//! Files-diff phase: replays changes inside a diff window, one metadata
//! query per time slice.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tracing::trace;

use rtransfer_client::ItemType;
use rtransfer_state::{TimeRange, format_rfc3339};

use crate::TransferError;
use crate::chunk::ChunkBuilder;
use crate::phase::UploadRun;
use crate::pool::TaskFuture;

/// Splits `range` into consecutive slices of `window`; the last one is cut
/// at the range end.
pub(crate) fn time_slices(range: &TimeRange, window: Duration) -> Result<Vec<TimeRange>, TransferError> {
    let step = chrono::Duration::from_std(window)
        .map_err(|e| TransferError::InvalidConfig(format!("diff window: {e}")))?;
    if step <= chrono::Duration::zero() {
        return Err(TransferError::InvalidConfig(
            "diff window must be longer than zero".into(),
        ));
    }

    let mut slices = Vec::new();
    let mut start = range.started;
    while start < range.ended {
        let end = (start + step).min(range.ended);
        slices.push(TimeRange {
            started: start,
            ended: end,
        });
        start = end;
    }
    Ok(slices)
}

/// Files modified in `[slice.started, slice.ended)`.
pub(crate) fn diff_query(repo: &str, slice: &TimeRange) -> String {
    let criteria = json!({
        "repo": repo,
        "path": { "$match": "*" },
        "name": { "$match": "*" },
        "modified": {
            "$gte": format_rfc3339(slice.started),
            "$lt": format_rfc3339(slice.ended),
        },
        "type": "file",
    });
    format!(r#"items.find({criteria}).include("repo","path","name","type")"#)
}

pub(crate) fn slice_task(run: Arc<UploadRun>, slice: TimeRange) -> TaskFuture {
    Box::pin(async move {
        let result = run.search.search(&diff_query(&run.repo, &slice)).await?;
        trace!(
            repo = %run.repo,
            from = %format_rfc3339(slice.started),
            items = result.results.len(),
            "diff slice listed"
        );

        let mut builder = ChunkBuilder::new(run.chunk_size);
        for item in result.results {
            if item.item_type != ItemType::File {
                continue;
            }
            if let Some(chunk) = builder.push(item.to_file()) {
                run.gateway.submit(chunk).await?;
            }
        }
        if let Some(chunk) = builder.finish() {
            run.gateway.submit(chunk).await?;
        }
        Ok(())
    })
}

/// Queues one task per slice. Stops early once a task has failed.
pub(crate) async fn seed_slices(run: Arc<UploadRun>, slices: Vec<TimeRange>) -> Result<(), TransferError> {
    for slice in slices {
        if run.pool.has_error() {
            break;
        }
        let task = slice_task(Arc::clone(&run), slice);
        run.pool.add_task(task).await?;
    }
    Ok(())
}
