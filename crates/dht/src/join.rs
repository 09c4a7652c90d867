//! The join protocol.
//!
//! A joining node runs this once at startup, with the bootstrap token
//! held the whole way through so membership changes are serialized:
//!
//! 1. Ask the bootstrap coordinator for a join node, retrying while the
//!    ring is busy.
//! 2. Through the join node, compute the predecessor and the initial
//!    finger table.
//! 3. Notify the neighbours, then propagate this node into every finger
//!    table that should now point at it.
//! 4. Acknowledge with `PostJoin` so the next joiner may proceed.
//!
//! The node starts serving as soon as its own state is computed, before
//! the neighbour updates, so ripple updates that route through the new
//! member can already reach it.

use std::sync::Arc;
use std::time::Duration;

use corelib::{DhtConfig, Error, KeySpace, NodeInfo, Result};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::peer::{BootstrapPeer, NodePeer};
use crate::ring::{NodeService, RingNode};

/// Join the ring described by `config` as node `index`, bind its
/// listener, and leave it serving on a background task.
///
/// Returns after `PostJoin`, so sequential callers observe fully
/// serialized joins.
pub async fn start_ring_node(config: &DhtConfig, index: usize) -> Result<JoinHandle<()>> {
    let endpoint = config.node(index)?;
    let space = config.key_space();
    let info = NodeInfo::new(
        space.node_id(&endpoint.ip, endpoint.port),
        endpoint.ip.clone(),
        endpoint.port,
    );
    let bootstrap_addr = config.super_node.addr();

    let join_node = request_join_node(&bootstrap_addr, &info, config.retry_delay()).await?;
    let listener = TcpListener::bind(info.addr()).await?;

    let node = if join_node.is_sentinel() {
        info!(node = %info, "ring is empty, starting as the first member");
        Arc::new(RingNode::first(info, space, config.caching))
    } else {
        info!(node = %info, join_node = %join_node, "joining through existing member");
        build_joining_node(info, &join_node, space, config.caching).await?
    };

    let service = Arc::new(NodeService::new(Arc::clone(&node)));
    let node_id = node.info().id;
    let handle = tokio::spawn(async move {
        if let Err(err) = rpc::serve(listener, service).await {
            error!(node = node_id, error = %err, "ring node stopped");
        }
    });

    if !join_node.is_sentinel() {
        announce(&node).await?;
    }
    debug!(node = node_id, fingers = %node.pretty_fingers(), "finger table initialized");

    BootstrapPeer::connect(&bootstrap_addr)
        .await?
        .post_join()
        .await?;
    info!(node = node_id, "joined the ring");
    Ok(handle)
}

/// Ask the bootstrap coordinator for a join node, sleeping between
/// `DhtBusy` refusals until admitted.
async fn request_join_node(
    bootstrap_addr: &str,
    info: &NodeInfo,
    retry_delay: Duration,
) -> Result<NodeInfo> {
    let mut bootstrap = BootstrapPeer::connect(bootstrap_addr).await?;
    loop {
        match bootstrap.get_join_node(&info.ip, info.port).await {
            Ok(join_node) => return Ok(join_node),
            Err(Error::DhtBusy) => {
                debug!(node = info.id, "DHT busy, sleeping before retrying join");
                tokio::time::sleep(retry_delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Compute the predecessor and initial finger table through `join_node`.
async fn build_joining_node(
    info: NodeInfo,
    join_node: &NodeInfo,
    space: KeySpace,
    caching: bool,
) -> Result<Arc<RingNode>> {
    let mut join_peer = NodePeer::connect(join_node).await?;
    let predecessor = join_peer.find_predecessor(info.id).await?;
    let m = space.num_bits();
    let mut fingers = Vec::with_capacity(m as usize);
    fingers.push(join_peer.find_successor(info.id).await?);
    for i in 0..m - 1 {
        let start = space.finger_start(info.id, i + 1);
        let current = &fingers[i as usize];
        let next = if space.in_range_open_closed(predecessor.id, info.id, start) {
            // The interval start precedes this node itself.
            info.clone()
        } else if space.in_range_closed_open(info.id, current.id, start) {
            // Still covered by the previous finger.
            current.clone()
        } else {
            join_peer.find_successor(start).await?
        };
        fingers.push(next);
    }
    Ok(Arc::new(RingNode::with_state(
        info,
        space,
        caching,
        predecessor,
        fingers,
    )))
}

/// Tell the neighbours about the new node, then walk every finger
/// interval that should now end at it and update the tables of the
/// affected predecessors.
async fn announce(node: &Arc<RingNode>) -> Result<()> {
    let info = node.info().clone();
    let space = node.space();
    NodePeer::connect(&node.successor())
        .await?
        .update_predecessor(&info)
        .await?;
    NodePeer::connect(&node.predecessor())
        .await?
        .update_successor(&info)
        .await?;
    for i in 0..space.num_bits() {
        // The predecessor of (self - 2^i + 1) may need its i-th finger
        // to become this node.
        let target = space.add(space.sub(info.id, 1u64 << i), 1);
        let to_update = node.find_predecessor(target).await?;
        if to_update != info {
            NodePeer::connect(&to_update)
                .await?
                .update_finger_table(&info, i)
                .await?;
        }
    }
    Ok(())
}
