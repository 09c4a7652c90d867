//! Quorum coordinator.
//!
//! All client operations funnel here (servers forward them). Every
//! operation on a file runs under that file's lock; within the lock the
//! coordinator samples a random quorum, aggregates version numbers, and
//! drives the member servers. With `q_write + q_read > N`, a read
//! quorum always intersects the latest write quorum, so the highest
//! reported version is the latest committed content.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use corelib::{Error, LockingScheme, QuorumConfig, Result};
use rand::seq::SliceRandom;
use rpc::Service;
use tracing::{debug, info};

use crate::lock::{new_file_lock, FileLock};
use crate::message::{CoordinatorReply, CoordinatorRequest, CoordinatorResponse, FileObject};
use crate::peer::ServerPeer;

pub struct Coordinator {
    q_write: usize,
    q_read: usize,
    servers: Vec<String>,
    scheme: LockingScheme,
    /// One lock per file ever referenced; entries are never removed.
    /// A tokio mutex because `list_files` holds the table across the
    /// per-file acquires.
    locks: tokio::sync::Mutex<HashMap<String, Arc<dyn FileLock>>>,
}

impl Coordinator {
    pub fn new(config: &QuorumConfig) -> Self {
        Self {
            q_write: config.q_write,
            q_read: config.q_read,
            servers: config.servers.iter().map(|s| s.addr()).collect(),
            scheme: config.locking_scheme,
            locks: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    /// The lock for `file`, created on first reference.
    async fn file_lock(&self, file: &str) -> Arc<dyn FileLock> {
        let mut locks = self.locks.lock().await;
        Arc::clone(
            locks
                .entry(file.to_string())
                .or_insert_with(|| new_file_lock(self.scheme)),
        )
    }

    /// A uniformly random quorum of `size` servers, without replacement.
    fn sample_quorum(&self, size: usize) -> Vec<String> {
        let mut rng = rand::thread_rng();
        self.servers
            .choose_multiple(&mut rng, size)
            .cloned()
            .collect()
    }

    pub async fn write(&self, file: &str, content: &str) -> Result<()> {
        debug!(file, "write requested");
        let lock = self.file_lock(file).await;
        lock.acquire_write().await;
        let result = self.write_locked(file, content).await;
        lock.release_write();
        result
    }

    async fn write_locked(&self, file: &str, content: &str) -> Result<()> {
        let quorum = self.sample_quorum(self.q_write);
        debug!(file, quorum = ?quorum, "formed write quorum");
        let mut version = 0;
        for addr in &quorum {
            let server_version = ServerPeer::connect(addr).await?.get_version(file).await?;
            debug!(file, server = %addr, server_version, "polled version");
            version = version.max(server_version);
        }
        let version = version + 1;
        for addr in &quorum {
            ServerPeer::connect(addr)
                .await?
                .update(file, version, content)
                .await?;
        }
        info!(file, version, "write committed to quorum");
        Ok(())
    }

    pub async fn read(&self, file: &str) -> Result<String> {
        debug!(file, "read requested");
        let lock = self.file_lock(file).await;
        lock.acquire_read().await;
        let result = self.read_locked(file).await;
        lock.release_read();
        result
    }

    async fn read_locked(&self, file: &str) -> Result<String> {
        let quorum = self.sample_quorum(self.q_read);
        debug!(file, quorum = ?quorum, "formed read quorum");
        let mut best: Option<(i64, &String)> = None;
        for addr in &quorum {
            let version = ServerPeer::connect(addr).await?.get_version(file).await?;
            debug!(file, server = %addr, version, "polled version");
            // Strictly greater, so ties keep the earlier selection.
            if version > best.map_or(0, |(v, _)| v) {
                best = Some((version, addr));
            }
        }
        let Some((version, addr)) = best else {
            debug!(file, "no server holds a version above 0");
            return Err(Error::FileNotFound(file.to_string()));
        };
        debug!(file, server = %addr, version, "fetching from highest-version member");
        ServerPeer::connect(addr).await?.fetch(file).await
    }

    /// Union of every member's file list, keeping the maximum version
    /// per name. Atomic with respect to all per-file writes: the whole
    /// operation runs with the lock table held and every known file
    /// lock acquired for read.
    pub async fn list_files(&self) -> Result<Vec<FileObject>> {
        debug!("list requested");
        let locks = self.locks.lock().await;
        let held: Vec<Arc<dyn FileLock>> = locks.values().map(Arc::clone).collect();
        for lock in &held {
            lock.acquire_read().await;
        }
        let result = self.list_locked().await;
        for lock in &held {
            lock.release_read();
        }
        drop(locks);
        result
    }

    async fn list_locked(&self) -> Result<Vec<FileObject>> {
        let quorum = self.sample_quorum(self.q_read);
        debug!(quorum = ?quorum, "formed read quorum");
        let mut versions: HashMap<String, i64> = HashMap::new();
        for addr in &quorum {
            let files = ServerPeer::connect(addr).await?.get_files().await?;
            debug!(server = %addr, files = files.len(), "collected file list");
            for file in files {
                let entry = versions.entry(file.file_name).or_insert(0);
                *entry = (*entry).max(file.version);
            }
        }
        let mut files: Vec<FileObject> = versions
            .into_iter()
            .map(|(file_name, version)| FileObject { file_name, version })
            .collect();
        files.sort_by(|a, b| a.file_name.cmp(&b.file_name));
        Ok(files)
    }
}

#[async_trait]
impl Service for Coordinator {
    type Request = CoordinatorRequest;
    type Response = CoordinatorResponse;

    async fn handle(&self, request: CoordinatorRequest) -> CoordinatorResponse {
        match request {
            CoordinatorRequest::Write { file, content } => self
                .write(&file, &content)
                .await
                .map(|_| CoordinatorReply::Written),
            CoordinatorRequest::Read { file } => {
                self.read(&file).await.map(CoordinatorReply::Content)
            }
            CoordinatorRequest::ListFiles => {
                self.list_files().await.map(CoordinatorReply::Files)
            }
        }
    }
}
