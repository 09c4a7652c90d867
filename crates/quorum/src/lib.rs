//! Quorum-replicated file store.
//!
//! A fixed set of file servers holds versioned copies of files; a
//! single coordinator (co-located with one of the servers) routes every
//! read and write through a randomly sampled quorum and serializes
//! per-file access with a pluggable lock. Servers forward client
//! operations to the coordinator, so a client may talk to any server.

pub mod client;
pub mod coordinator;
pub mod lock;
pub mod message;
pub mod peer;
pub mod server;

pub use client::run_file_client;
pub use coordinator::Coordinator;
pub use lock::{FileLock, ReadWriteLock, StandardLock};
pub use message::FileObject;
pub use peer::{CoordinatorPeer, ServerPeer};
pub use server::{start_file_server, FileServer};
