//! Wire messages for the two DHT services.
//!
//! One request enum and one reply enum per service; responses travel as
//! `Result<Reply, Error>` so typed errors cross the wire unchanged.

use corelib::{Error, KeyId, NodeInfo};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BootstrapRequest {
    GetJoinNode { ip: String, port: u16 },
    PostJoin,
    GetNodeForClient,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BootstrapReply {
    /// A member to join through, or the sentinel for an empty ring.
    JoinNode(NodeInfo),
    PostJoined,
    ClientNode(NodeInfo),
}

pub type BootstrapResponse = Result<BootstrapReply, Error>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum NodeRequest {
    Put { word: String, definition: String },
    Get { word: String },
    FindPredecessor { id: KeyId },
    FindSuccessor { id: KeyId },
    GetPredecessor,
    GetSuccessor,
    UpdatePredecessor { node: NodeInfo },
    UpdateSuccessor { node: NodeInfo },
    UpdateFingerTable { node: NodeInfo, index: u32 },
    /// Snapshot of the finger table, for inspection and tests.
    FingerTable,
    /// Snapshot of the local word table, for inspection and tests.
    DumpStore,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum NodeReply {
    Stored,
    Definition(String),
    Node(NodeInfo),
    Updated,
    Fingers(Vec<NodeInfo>),
    Store(Vec<(String, String)>),
}

pub type NodeResponse = Result<NodeReply, Error>;
