//! Typed client wrappers over the framed transport.
//!
//! Each wrapper pairs a request variant with the reply variant it must
//! produce; anything else from the peer is a protocol violation.

use corelib::{Error, KeyId, NodeInfo, Result};
use rpc::Connection;

use crate::message::{
    BootstrapReply, BootstrapRequest, BootstrapResponse, NodeReply, NodeRequest, NodeResponse,
};

/// Connection to the bootstrap coordinator.
pub struct BootstrapPeer {
    conn: Connection<BootstrapRequest, BootstrapResponse>,
}

impl BootstrapPeer {
    pub async fn connect(addr: &str) -> Result<Self> {
        Ok(Self {
            conn: Connection::connect(addr).await?,
        })
    }

    pub async fn get_join_node(&mut self, ip: &str, port: u16) -> Result<NodeInfo> {
        match self
            .conn
            .call(&BootstrapRequest::GetJoinNode {
                ip: ip.to_string(),
                port,
            })
            .await??
        {
            BootstrapReply::JoinNode(node) => Ok(node),
            other => Err(unexpected("JoinNode", &format!("{:?}", other))),
        }
    }

    pub async fn post_join(&mut self) -> Result<()> {
        match self.conn.call(&BootstrapRequest::PostJoin).await?? {
            BootstrapReply::PostJoined => Ok(()),
            other => Err(unexpected("PostJoined", &format!("{:?}", other))),
        }
    }

    pub async fn get_node_for_client(&mut self) -> Result<NodeInfo> {
        match self.conn.call(&BootstrapRequest::GetNodeForClient).await?? {
            BootstrapReply::ClientNode(node) => Ok(node),
            other => Err(unexpected("ClientNode", &format!("{:?}", other))),
        }
    }
}

/// Connection to one ring node.
pub struct NodePeer {
    conn: Connection<NodeRequest, NodeResponse>,
}

impl NodePeer {
    pub async fn connect(node: &NodeInfo) -> Result<Self> {
        Self::connect_addr(&node.addr()).await
    }

    pub async fn connect_addr(addr: &str) -> Result<Self> {
        Ok(Self {
            conn: Connection::connect(addr).await?,
        })
    }

    async fn call(&mut self, request: NodeRequest) -> Result<NodeReply> {
        self.conn.call(&request).await?
    }

    pub async fn put(&mut self, word: &str, definition: &str) -> Result<()> {
        match self
            .call(NodeRequest::Put {
                word: word.to_string(),
                definition: definition.to_string(),
            })
            .await?
        {
            NodeReply::Stored => Ok(()),
            other => Err(unexpected("Stored", &format!("{:?}", other))),
        }
    }

    pub async fn get(&mut self, word: &str) -> Result<String> {
        match self
            .call(NodeRequest::Get {
                word: word.to_string(),
            })
            .await?
        {
            NodeReply::Definition(definition) => Ok(definition),
            other => Err(unexpected("Definition", &format!("{:?}", other))),
        }
    }

    pub async fn find_predecessor(&mut self, id: KeyId) -> Result<NodeInfo> {
        self.node_reply(NodeRequest::FindPredecessor { id }).await
    }

    pub async fn find_successor(&mut self, id: KeyId) -> Result<NodeInfo> {
        self.node_reply(NodeRequest::FindSuccessor { id }).await
    }

    pub async fn get_predecessor(&mut self) -> Result<NodeInfo> {
        self.node_reply(NodeRequest::GetPredecessor).await
    }

    pub async fn get_successor(&mut self) -> Result<NodeInfo> {
        self.node_reply(NodeRequest::GetSuccessor).await
    }

    pub async fn update_predecessor(&mut self, node: &NodeInfo) -> Result<()> {
        self.updated(NodeRequest::UpdatePredecessor { node: node.clone() })
            .await
    }

    pub async fn update_successor(&mut self, node: &NodeInfo) -> Result<()> {
        self.updated(NodeRequest::UpdateSuccessor { node: node.clone() })
            .await
    }

    pub async fn update_finger_table(&mut self, node: &NodeInfo, index: u32) -> Result<()> {
        self.updated(NodeRequest::UpdateFingerTable {
            node: node.clone(),
            index,
        })
        .await
    }

    pub async fn finger_table(&mut self) -> Result<Vec<NodeInfo>> {
        match self.call(NodeRequest::FingerTable).await? {
            NodeReply::Fingers(fingers) => Ok(fingers),
            other => Err(unexpected("Fingers", &format!("{:?}", other))),
        }
    }

    pub async fn dump_store(&mut self) -> Result<Vec<(String, String)>> {
        match self.call(NodeRequest::DumpStore).await? {
            NodeReply::Store(entries) => Ok(entries),
            other => Err(unexpected("Store", &format!("{:?}", other))),
        }
    }

    async fn node_reply(&mut self, request: NodeRequest) -> Result<NodeInfo> {
        match self.call(request).await? {
            NodeReply::Node(node) => Ok(node),
            other => Err(unexpected("Node", &format!("{:?}", other))),
        }
    }

    async fn updated(&mut self, request: NodeRequest) -> Result<()> {
        match self.call(request).await? {
            NodeReply::Updated => Ok(()),
            other => Err(unexpected("Updated", &format!("{:?}", other))),
        }
    }
}

fn unexpected(wanted: &str, got: &str) -> Error {
    Error::Protocol(format!("expected {} reply, got {}", wanted, got))
}
