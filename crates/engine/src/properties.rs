//! Properties-diff progress, aggregated over cluster nodes.
//!
//! The source plugin answers each `handlePropertiesDiff` call from a single
//! node, so the job is done only after every node detected at clean start
//! has reported `DONE` at least once.

use std::collections::HashMap;

use tracing::{debug, info, warn};

use rtransfer_client::{ChunkStatusType, HandlePropertiesDiff, HandlePropertiesDiffResponse};
use rtransfer_state::{TimeRange, to_epoch_millis};

use crate::TransferError;
use crate::context::TransferContext;
use crate::events::TransferEvent;
use crate::failures::FailureRecord;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct NodeStatus {
    pub delivered: u64,
    pub total: u64,
    pub done: bool,
    last_errors: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MergeOutcome {
    /// More properties were delivered since the last report.
    Progressed,
    Unchanged,
    /// The node finished earlier; the report was ignored.
    AlreadyDone,
    /// Not one of the nodes detected at clean start.
    UnknownNode,
}

#[derive(Debug, Default)]
pub(crate) struct PropertiesAggregator {
    nodes: HashMap<String, NodeStatus>,
}

impl PropertiesAggregator {
    pub fn new(node_ids: &[String]) -> Self {
        Self {
            nodes: node_ids
                .iter()
                .map(|id| (id.clone(), NodeStatus::default()))
                .collect(),
        }
    }

    pub fn merge(&mut self, report: &HandlePropertiesDiffResponse) -> MergeOutcome {
        let Some(node) = self.nodes.get_mut(&report.node_id) else {
            return MergeOutcome::UnknownNode;
        };
        if node.done {
            return MergeOutcome::AlreadyDone;
        }

        let delivered = report.properties_delivered;
        let progressed = delivered > node.delivered;
        node.delivered = delivered;
        node.total = delivered + report.properties_remained;
        node.done = report.status == ChunkStatusType::Done;

        if progressed {
            MergeOutcome::Progressed
        } else {
            MergeOutcome::Unchanged
        }
    }

    /// Remembers a node's error string. True when it differs from the last
    /// one seen for that node.
    pub fn note_errors(&mut self, node_id: &str, errors: &str) -> bool {
        match self.nodes.get_mut(node_id) {
            Some(node) if node.last_errors != errors => {
                node.last_errors = errors.to_string();
                true
            }
            _ => false,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.nodes.values().all(|n| n.done)
    }

    /// Delivered and total properties over all nodes.
    pub fn totals(&self) -> (u64, u64) {
        self.nodes
            .values()
            .fold((0, 0), |(d, t), n| (d + n.delivered, t + n.total))
    }

    pub fn node(&self, node_id: &str) -> Option<&NodeStatus> {
        self.nodes.get(node_id)
    }
}

/// Starts the properties-diff job for `range` and polls it until every node
/// is done.
pub(crate) async fn poll_properties(
    ctx: &TransferContext,
    repo: &str,
    range: &TimeRange,
) -> Result<(), TransferError> {
    let node_ids = ctx.state.node_ids().await?;
    if node_ids.is_empty() {
        return Err(TransferError::NoNodes);
    }
    let mut aggregator = PropertiesAggregator::new(&node_ids);

    let body = HandlePropertiesDiff {
        target_auth: ctx.services.target_auth.clone(),
        repo_key: repo.to_string(),
        start_milliseconds: to_epoch_millis(range.started).to_string(),
        end_milliseconds: to_epoch_millis(range.ended).to_string(),
    };

    let mut consecutive_failures = 0u32;
    loop {
        let wait = match ctx.services.source.handle_properties_diff(&body).await {
            Ok(report) => {
                consecutive_failures = 0;
                apply_report(ctx, repo, &mut aggregator, &report).await;
                if aggregator.is_complete() {
                    let (delivered, total) = aggregator.totals();
                    info!(repo, delivered, total, "properties diff done on all nodes");
                    return Ok(());
                }
                ctx.config.properties_poll_interval
            }
            Err(e) => {
                consecutive_failures += 1;
                warn!(repo, attempt = consecutive_failures, error = %e, "properties diff request failed");
                if consecutive_failures > ctx.config.retries {
                    return Err(TransferError::Poller {
                        attempts: consecutive_failures,
                        last: e.to_string(),
                    });
                }
                ctx.config.retry_wait
            }
        };
        tokio::time::sleep(wait).await;
    }
}

async fn apply_report(
    ctx: &TransferContext,
    repo: &str,
    aggregator: &mut PropertiesAggregator,
    report: &HandlePropertiesDiffResponse,
) {
    let outcome = aggregator.merge(report);
    match outcome {
        MergeOutcome::UnknownNode => {
            warn!(repo, node = %report.node_id, "report from a node not seen at clean start");
            return;
        }
        MergeOutcome::AlreadyDone => {
            debug!(repo, node = %report.node_id, "node already done");
            return;
        }
        MergeOutcome::Progressed => {
            if let Some(node) = aggregator.node(&report.node_id) {
                ctx.events.emit(TransferEvent::PropertiesProgress {
                    repo: repo.to_string(),
                    node: report.node_id.clone(),
                    delivered: node.delivered,
                    total: node.total,
                });
            }
        }
        MergeOutcome::Unchanged => {}
    }

    if !report.errors.is_empty() && aggregator.note_errors(&report.node_id, &report.errors) {
        warn!(repo, node = %report.node_id, errors = %report.errors, "properties diff errors");
        let record = FailureRecord::properties_error(repo, &report.node_id, &report.errors);
        if let Err(e) = ctx.failures.append(&record).await {
            warn!(error = %e, "failed to record properties error");
        }
    }
}
