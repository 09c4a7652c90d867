//! Ring node: routing, data plane, and membership RPCs.
//!
//! Each node owns the keys in `(predecessor, self]` on the identifier
//! ring and keeps `m` finger shortcuts, where `finger[0]` is the
//! successor. Routing never scans the ring linearly: a request hops to
//! the closest preceding finger until it lands on the key's predecessor.
//!
//! Local state is guarded by short critical sections only; no lock is
//! held across an outbound RPC.

use std::sync::Arc;

use async_trait::async_trait;
use corelib::{Error, KeyId, KeySpace, NodeInfo, Result};
use dashmap::DashMap;
use parking_lot::RwLock;
use rpc::Service;
use tracing::{debug, error, info};

use crate::message::{NodeReply, NodeRequest, NodeResponse};
use crate::peer::NodePeer;

pub struct RingNode {
    info: NodeInfo,
    space: KeySpace,
    caching: bool,
    predecessor: RwLock<NodeInfo>,
    /// `fingers[i]` is the first member at or after `self.id + 2^i`;
    /// `fingers[0]` is the successor. Length is always `m`.
    fingers: RwLock<Vec<NodeInfo>>,
    /// Keys this node owns, plus forwarded keys when caching is on.
    table: DashMap<String, String>,
}

impl RingNode {
    /// The sole member of a fresh ring: its own predecessor and every
    /// finger.
    pub fn first(info: NodeInfo, space: KeySpace, caching: bool) -> Self {
        let fingers = vec![info.clone(); space.num_bits() as usize];
        Self::with_state(info.clone(), space, caching, info, fingers)
    }

    /// A node whose predecessor and finger table were computed during
    /// the join protocol.
    pub fn with_state(
        info: NodeInfo,
        space: KeySpace,
        caching: bool,
        predecessor: NodeInfo,
        fingers: Vec<NodeInfo>,
    ) -> Self {
        debug_assert_eq!(fingers.len(), space.num_bits() as usize);
        Self {
            info,
            space,
            caching,
            predecessor: RwLock::new(predecessor),
            fingers: RwLock::new(fingers),
            table: DashMap::new(),
        }
    }

    pub fn info(&self) -> &NodeInfo {
        &self.info
    }

    pub fn space(&self) -> KeySpace {
        self.space
    }

    pub fn predecessor(&self) -> NodeInfo {
        self.predecessor.read().clone()
    }

    pub fn successor(&self) -> NodeInfo {
        self.fingers.read()[0].clone()
    }

    pub fn fingers_snapshot(&self) -> Vec<NodeInfo> {
        self.fingers.read().clone()
    }

    /// Whether this node owns `key`, i.e. `key ∈ (predecessor, self]`.
    fn owns(&self, key: KeyId) -> bool {
        let predecessor = self.predecessor.read();
        self.space
            .in_range_open_closed(predecessor.id, self.info.id, key)
    }

    /// The highest finger strictly between this node and `key`, or the
    /// successor when no finger qualifies.
    fn closest_preceding_finger(&self, key: KeyId) -> NodeInfo {
        let fingers = self.fingers.read();
        for finger in fingers.iter().rev() {
            if key != self.info.id && self.space.in_range_open(self.info.id, key, finger.id) {
                return finger.clone();
            }
        }
        fingers[0].clone()
    }

    /// Like [`closest_preceding_finger`](Self::closest_preceding_finger)
    /// but refuses to route back to this node: a self-forward means the
    /// routing state is corrupt and must not be silently retried.
    fn forward_target(&self, key: KeyId) -> Result<NodeInfo> {
        let target = self.closest_preceding_finger(key);
        if target.id == self.info.id {
            return Err(Error::Invariant(format!(
                "routing {} from node {} would loop back to itself",
                key, self.info.id
            )));
        }
        Ok(target)
    }

    /// The node whose successor interval covers `key`.
    pub async fn find_predecessor(&self, key: KeyId) -> Result<NodeInfo> {
        let successor = self.successor();
        if self
            .space
            .in_range_open_closed(self.info.id, successor.id, key)
        {
            return Ok(self.info.clone());
        }
        let next = self.forward_target(key)?;
        debug!(node = self.info.id, key, next = next.id, "forwarding find_predecessor");
        NodePeer::connect(&next).await?.find_predecessor(key).await
    }

    /// The node that owns `key`.
    pub async fn find_successor(&self, key: KeyId) -> Result<NodeInfo> {
        let predecessor = self.find_predecessor(key).await?;
        if predecessor == self.info {
            return Ok(self.successor());
        }
        NodePeer::connect(&predecessor).await?.get_successor().await
    }

    /// Insert a word, forwarding toward its owner.
    pub async fn put(&self, word: &str, definition: &str) -> Result<()> {
        let word_id = self.space.hash(word);
        debug!(node = self.info.id, word, word_id, "put");
        if self.caching && self.table.contains_key(word) {
            debug!(node = self.info.id, word, "rejecting duplicate from cache");
            return Err(Error::DuplicateWord(word.to_string()));
        }
        if self.owns(word_id) {
            if self.table.contains_key(word) {
                debug!(node = self.info.id, word, "rejecting duplicate at owner");
                return Err(Error::DuplicateWord(word.to_string()));
            }
            info!(node = self.info.id, word, word_id, "stored word");
            self.table
                .insert(word.to_string(), definition.to_string());
            return Ok(());
        }
        if self.caching {
            debug!(node = self.info.id, word, "caching word on the forward path");
            self.table
                .insert(word.to_string(), definition.to_string());
        }
        let next = self.forward_target(word_id)?;
        debug!(node = self.info.id, word, next = next.id, "forwarding put");
        NodePeer::connect(&next).await?.put(word, definition).await
    }

    /// Look a word up, forwarding toward its owner.
    pub async fn get(&self, word: &str) -> Result<String> {
        let word_id = self.space.hash(word);
        debug!(node = self.info.id, word, word_id, "get");
        if let Some(definition) = self.table.get(word) {
            return Ok(definition.value().clone());
        }
        if self.owns(word_id) {
            debug!(node = self.info.id, word, "word missing at owner");
            return Err(Error::WordNotFound(word.to_string()));
        }
        let next = self.forward_target(word_id)?;
        debug!(node = self.info.id, word, next = next.id, "forwarding get");
        NodePeer::connect(&next).await?.get(word).await
    }

    pub fn update_predecessor(&self, node: NodeInfo) {
        let mut predecessor = self.predecessor.write();
        debug!(
            node = self.info.id,
            from = predecessor.id,
            to = node.id,
            "updating predecessor"
        );
        *predecessor = node;
    }

    pub fn update_successor(&self, node: NodeInfo) {
        let mut fingers = self.fingers.write();
        debug!(
            node = self.info.id,
            from = fingers[0].id,
            to = node.id,
            "updating successor"
        );
        fingers[0] = node;
    }

    /// Adopt `new_node` as `fingers[index]` if it falls strictly between
    /// this node and the current entry, then ripple the update to the
    /// predecessor (which may in turn adopt it for the same index).
    pub async fn update_finger_table(&self, new_node: NodeInfo, index: usize) -> Result<()> {
        {
            let mut fingers = self.fingers.write();
            let current = match fingers.get(index) {
                Some(current) => current,
                None => {
                    return Err(Error::Protocol(format!(
                        "finger index {} out of range for m={}",
                        index,
                        fingers.len()
                    )))
                }
            };
            if !self
                .space
                .in_range_open(self.info.id, current.id, new_node.id)
            {
                return Ok(());
            }
            debug!(
                node = self.info.id,
                index,
                from = current.id,
                to = new_node.id,
                "updating finger table entry"
            );
            fingers[index] = new_node.clone();
        }
        debug!(node = self.info.id, fingers = %self.pretty_fingers(), "finger table updated");
        let predecessor = self.predecessor();
        if predecessor != new_node {
            NodePeer::connect(&predecessor)
                .await?
                .update_finger_table(&new_node, index as u32)
                .await?;
        }
        Ok(())
    }

    pub fn store_snapshot(&self) -> Vec<(String, String)> {
        self.table
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// `(start, node_id)` pairs, for logs.
    pub fn pretty_fingers(&self) -> String {
        let fingers = self.fingers.read();
        fingers
            .iter()
            .enumerate()
            .map(|(i, finger)| {
                format!(
                    "({},{})",
                    self.space.finger_start(self.info.id, i as u32),
                    finger.id
                )
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// RPC surface of a ring node.
pub struct NodeService {
    node: Arc<RingNode>,
}

impl NodeService {
    pub fn new(node: Arc<RingNode>) -> Self {
        Self { node }
    }
}

#[async_trait]
impl Service for NodeService {
    type Request = NodeRequest;
    type Response = NodeResponse;

    async fn handle(&self, request: NodeRequest) -> NodeResponse {
        let response = match request {
            NodeRequest::Put { word, definition } => self
                .node
                .put(&word, &definition)
                .await
                .map(|_| NodeReply::Stored),
            NodeRequest::Get { word } => self.node.get(&word).await.map(NodeReply::Definition),
            NodeRequest::FindPredecessor { id } => {
                self.node.find_predecessor(id).await.map(NodeReply::Node)
            }
            NodeRequest::FindSuccessor { id } => {
                self.node.find_successor(id).await.map(NodeReply::Node)
            }
            NodeRequest::GetPredecessor => Ok(NodeReply::Node(self.node.predecessor())),
            NodeRequest::GetSuccessor => Ok(NodeReply::Node(self.node.successor())),
            NodeRequest::UpdatePredecessor { node } => {
                self.node.update_predecessor(node);
                Ok(NodeReply::Updated)
            }
            NodeRequest::UpdateSuccessor { node } => {
                self.node.update_successor(node);
                Ok(NodeReply::Updated)
            }
            NodeRequest::UpdateFingerTable { node, index } => self
                .node
                .update_finger_table(node, index as usize)
                .await
                .map(|_| NodeReply::Updated),
            NodeRequest::FingerTable => Ok(NodeReply::Fingers(self.node.fingers_snapshot())),
            NodeRequest::DumpStore => Ok(NodeReply::Store(self.node.store_snapshot())),
        };
        if let Err(Error::Invariant(reason)) = &response {
            // Fatal to this request only; the node keeps serving.
            error!(node = self.node.info().id, %reason, "invariant violation");
        }
        response
    }
}
