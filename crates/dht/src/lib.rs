//! Chord-style distributed hash table serving a word→definition
//! dictionary.
//!
//! Three roles cooperate:
//! - The **bootstrap coordinator** serializes ring joins behind a
//!   one-slot token and hands members out to joiners and clients.
//! - **Ring nodes** route by identifier over finger tables and own the
//!   slice of keys between their predecessor and themselves.
//! - The **dictionary client** runs a scripted list of put/get/bulk
//!   commands against whatever member the bootstrap coordinator names.

pub mod bootstrap;
pub mod client;
pub mod join;
pub mod message;
pub mod peer;
pub mod ring;

pub use bootstrap::{start_bootstrap, BootstrapCoordinator};
pub use client::run_dict_client;
pub use join::start_ring_node;
pub use peer::{BootstrapPeer, NodePeer};
pub use ring::RingNode;
