//! Cluster node discovery on clean start.

use tracing::{debug, info};

use rtransfer_client::SourcePlugin;

use crate::TransferError;

/// Sends `probes` `cleanStart` requests and collects the distinct node ids
/// that answered, in first-seen order.
///
/// The load balancer in front of the source is expected to spread the
/// probes over every node; the result is taken as the full node set for
/// the rest of the transfer.
pub(crate) async fn detect_nodes(
    source: &dyn SourcePlugin,
    probes: usize,
) -> Result<Vec<String>, TransferError> {
    let mut nodes: Vec<String> = Vec::new();
    for _ in 0..probes {
        let node = source.clean_start().await?;
        if node.is_empty() {
            debug!("clean start answered without a node id");
            continue;
        }
        if !nodes.contains(&node) {
            debug!(node = %node, "detected node");
            nodes.push(node);
        }
    }
    if nodes.is_empty() {
        return Err(TransferError::NoNodes);
    }
    info!(count = nodes.len(), nodes = ?nodes, "node detection complete");
    Ok(nodes)
}
