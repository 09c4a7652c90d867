//! Bootstrap coordinator.
//!
//! A singleton rendezvous point that serializes ring joins. The join
//! "mutex" is a one-slot semaphore rather than an OS mutex because the
//! acquire (`GetJoinNode`) and the release (`PostJoin`) arrive on
//! different connections: the permit is forgotten on acquire and minted
//! back on release, and no ownership is tracked.

use std::sync::Arc;

use async_trait::async_trait;
use corelib::{DhtConfig, Error, KeySpace, NodeInfo, Result};
use parking_lot::Mutex;
use rand::seq::SliceRandom;
use rpc::Service;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::message::{BootstrapReply, BootstrapRequest, BootstrapResponse};

pub struct BootstrapCoordinator {
    space: KeySpace,
    /// Known members; never shrinks. Only the ring's first node is
    /// recorded here; later joiners are handed an existing member and
    /// reached through ring routing.
    members: Mutex<Vec<NodeInfo>>,
    /// Held from a successful `get_join_node` until the matching
    /// `post_join`.
    join_token: Semaphore,
}

impl BootstrapCoordinator {
    pub fn new(space: KeySpace) -> Self {
        Self {
            space,
            members: Mutex::new(Vec::new()),
            join_token: Semaphore::new(1),
        }
    }

    /// Admit a joiner, or refuse with `DhtBusy` while another join is in
    /// flight.
    ///
    /// On success the token stays held until the joiner acknowledges via
    /// [`post_join`](Self::post_join). An empty ring records the joiner
    /// as the first member and replies with the sentinel; otherwise the
    /// reply is a uniformly random existing member and the joiner is not
    /// recorded.
    pub fn get_join_node(&self, ip: &str, port: u16) -> Result<NodeInfo> {
        debug!(%ip, port, "join requested");
        match self.join_token.try_acquire() {
            Ok(permit) => permit.forget(),
            Err(_) => {
                debug!(%ip, port, "join token busy");
                return Err(Error::DhtBusy);
            }
        }
        let mut members = self.members.lock();
        match members.choose(&mut rand::thread_rng()).cloned() {
            Some(member) => Ok(member),
            None => {
                let joiner = NodeInfo::new(self.space.node_id(ip, port), ip, port);
                debug!(joiner = %joiner, "ring is empty, handing out the sentinel");
                members.push(joiner);
                Ok(NodeInfo::sentinel())
            }
        }
    }

    /// Release the join token. The caller is trusted to be the node that
    /// most recently acquired it; no ownership check is enforced.
    pub fn post_join(&self) {
        debug!("join acknowledged, releasing the token");
        self.join_token.add_permits(1);
    }

    /// A uniformly random member for a dictionary client to talk to.
    pub fn node_for_client(&self) -> Result<NodeInfo> {
        self.members
            .lock()
            .choose(&mut rand::thread_rng())
            .cloned()
            .ok_or_else(|| Error::Invariant("the ring has no members yet".into()))
    }
}

#[async_trait]
impl Service for BootstrapCoordinator {
    type Request = BootstrapRequest;
    type Response = BootstrapResponse;

    async fn handle(&self, request: BootstrapRequest) -> BootstrapResponse {
        match request {
            BootstrapRequest::GetJoinNode { ip, port } => {
                self.get_join_node(&ip, port).map(BootstrapReply::JoinNode)
            }
            BootstrapRequest::PostJoin => {
                self.post_join();
                Ok(BootstrapReply::PostJoined)
            }
            BootstrapRequest::GetNodeForClient => {
                self.node_for_client().map(BootstrapReply::ClientNode)
            }
        }
    }
}

/// Bind the bootstrap listener and serve forever on a background task.
///
/// Returns once the listener is bound, so callers can rely on the
/// coordinator being reachable.
pub async fn start_bootstrap(config: &DhtConfig) -> Result<JoinHandle<()>> {
    let addr = config.super_node.addr();
    let listener = TcpListener::bind(&addr).await?;
    info!(%addr, "bootstrap coordinator listening");
    let service = Arc::new(BootstrapCoordinator::new(config.key_space()));
    Ok(tokio::spawn(async move {
        if let Err(err) = rpc::serve(listener, service).await {
            error!(error = %err, "bootstrap coordinator stopped");
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coordinator() -> BootstrapCoordinator {
        BootstrapCoordinator::new(KeySpace::new(5).unwrap())
    }

    #[test]
    fn first_joiner_gets_the_sentinel() {
        let boot = coordinator();
        let reply = boot.get_join_node("127.0.0.1", 9001).unwrap();
        assert!(reply.is_sentinel());
    }

    #[test]
    fn second_join_is_refused_until_post_join() {
        let boot = coordinator();
        boot.get_join_node("127.0.0.1", 9001).unwrap();
        assert_eq!(
            boot.get_join_node("127.0.0.1", 9002),
            Err(Error::DhtBusy),
            "token must be held across the whole join"
        );
        boot.post_join();
        let reply = boot.get_join_node("127.0.0.1", 9002).unwrap();
        assert!(!reply.is_sentinel(), "second joiner must get a member");
    }

    #[test]
    fn only_the_first_member_is_recorded() {
        let boot = coordinator();
        boot.get_join_node("127.0.0.1", 9001).unwrap();
        boot.post_join();
        let space = KeySpace::new(5).unwrap();
        // Later joiners are pointed at an existing member...
        let reply = boot.get_join_node("127.0.0.1", 9002).unwrap();
        assert_eq!(reply.id, space.node_id("127.0.0.1", 9001));
        boot.post_join();
        // ...and are not themselves recorded.
        let reply = boot.get_join_node("127.0.0.1", 9003).unwrap();
        assert_eq!(reply.id, space.node_id("127.0.0.1", 9001));
    }

    #[test]
    fn client_lookup_needs_members() {
        let boot = coordinator();
        assert!(boot.node_for_client().is_err());
        boot.get_join_node("127.0.0.1", 9001).unwrap();
        boot.post_join();
        assert!(boot.node_for_client().is_ok());
    }
}
