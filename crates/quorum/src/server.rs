//! File server.
//!
//! Holds a local versioned replica of every file the coordinator has
//! ever written to it. Client-facing `write`/`read`/`list_files`
//! requests are forwarded to the coordinator untouched; the
//! coordinator-facing surface (`get_version`, `update`, `fetch`,
//! `get_files`) works against the local replica. Content lives at
//! `<storage_root>/<server_index>/<file_name>`; versions are in-memory
//! only and reset on restart.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use corelib::{Error, QuorumConfig, Result};
use parking_lot::Mutex;
use rpc::Service;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::coordinator::Coordinator;
use crate::message::{FileObject, ServerReply, ServerRequest, ServerResponse};
use crate::peer::CoordinatorPeer;

pub struct FileServer {
    index: usize,
    storage_dir: PathBuf,
    coordinator_addr: String,
    versions: Mutex<HashMap<String, i64>>,
}

impl FileServer {
    pub fn new(index: usize, storage_dir: PathBuf, coordinator_addr: String) -> Self {
        Self {
            index,
            storage_dir,
            coordinator_addr,
            versions: Mutex::new(HashMap::new()),
        }
    }

    pub async fn forward_write(&self, file: &str, content: &str) -> Result<()> {
        debug!(server = self.index, file, "forwarding write to coordinator");
        CoordinatorPeer::connect(&self.coordinator_addr)
            .await?
            .write(file, content)
            .await
    }

    pub async fn forward_read(&self, file: &str) -> Result<String> {
        debug!(server = self.index, file, "forwarding read to coordinator");
        CoordinatorPeer::connect(&self.coordinator_addr)
            .await?
            .read(file)
            .await
    }

    pub async fn forward_list(&self) -> Result<Vec<FileObject>> {
        debug!(server = self.index, "forwarding list to coordinator");
        CoordinatorPeer::connect(&self.coordinator_addr)
            .await?
            .list_files()
            .await
    }

    /// Version of the local replica; 0 means this server has never been
    /// written this file.
    pub fn version(&self, file: &str) -> i64 {
        self.versions.lock().get(file).copied().unwrap_or(0)
    }

    /// Install new content at `version`.
    pub async fn update(&self, file: &str, version: i64, content: &str) -> Result<()> {
        let path = self.replica_path(file)?;
        tokio::fs::write(&path, content).await?;
        let mut versions = self.versions.lock();
        debug!(
            server = self.index,
            file,
            from = versions.get(file).copied().unwrap_or(0),
            to = version,
            "updated replica"
        );
        versions.insert(file.to_string(), version);
        Ok(())
    }

    /// Content of the local replica.
    pub async fn fetch(&self, file: &str) -> Result<String> {
        let path = self.replica_path(file)?;
        if !self.versions.lock().contains_key(file) {
            return Err(Error::FileNotFound(file.to_string()));
        }
        debug!(server = self.index, file, "fetching replica content");
        Ok(tokio::fs::read_to_string(&path).await?)
    }

    /// Snapshot of every `(name, version)` pair this server holds.
    pub fn files(&self) -> Vec<FileObject> {
        self.versions
            .lock()
            .iter()
            .map(|(file_name, &version)| FileObject {
                file_name: file_name.clone(),
                version,
            })
            .collect()
    }

    /// Replica path for `file`, refusing names that would escape the
    /// storage directory.
    fn replica_path(&self, file: &str) -> Result<PathBuf> {
        if file.is_empty() || file.contains('/') || file.contains('\\') || file == "." || file == ".." {
            return Err(Error::Protocol(format!("invalid file name {:?}", file)));
        }
        Ok(self.storage_dir.join(file))
    }
}

#[async_trait]
impl Service for FileServer {
    type Request = ServerRequest;
    type Response = ServerResponse;

    async fn handle(&self, request: ServerRequest) -> ServerResponse {
        match request {
            ServerRequest::Write { file, content } => self
                .forward_write(&file, &content)
                .await
                .map(|_| ServerReply::Written),
            ServerRequest::Read { file } => {
                self.forward_read(&file).await.map(ServerReply::Content)
            }
            ServerRequest::ListFiles => self.forward_list().await.map(ServerReply::Files),
            ServerRequest::GetVersion { file } => Ok(ServerReply::Version(self.version(&file))),
            ServerRequest::Update {
                file,
                version,
                content,
            } => self
                .update(&file, version, &content)
                .await
                .map(|_| ServerReply::Updated),
            ServerRequest::Fetch { file } => self.fetch(&file).await.map(ServerReply::Content),
            ServerRequest::GetFiles => Ok(ServerReply::Files(self.files())),
        }
    }
}

/// Start server `index` from the configuration: create its storage
/// directory, start the co-located coordinator if this entry is marked
/// for it (otherwise wait out the startup delay), and leave the server
/// serving on a background task.
pub async fn start_file_server(config: &QuorumConfig, index: usize) -> Result<JoinHandle<()>> {
    let entry = config.server(index)?;
    let storage_dir = config.storage_dir(index)?;
    std::fs::create_dir_all(&storage_dir)
        .map_err(|e| Error::Config(format!("cannot create {}: {}", storage_dir.display(), e)))?;

    if entry.coordinator {
        start_coordinator(config).await?;
    } else {
        // Give the coordinator host time to come up first.
        tokio::time::sleep(config.startup_delay()).await;
    }

    let addr = entry.addr();
    let listener = TcpListener::bind(&addr).await?;
    info!(server = index, %addr, storage = %storage_dir.display(), "file server listening");
    let service = Arc::new(FileServer::new(
        index,
        storage_dir,
        config.coordinator_addr(),
    ));
    Ok(tokio::spawn(async move {
        if let Err(err) = rpc::serve(listener, service).await {
            error!(server = index, error = %err, "file server stopped");
        }
    }))
}

/// Bind the coordinator listener and serve forever on a background task.
pub async fn start_coordinator(config: &QuorumConfig) -> Result<JoinHandle<()>> {
    let addr = format!("0.0.0.0:{}", config.coordinator_port);
    let listener = TcpListener::bind(&addr).await?;
    info!(%addr, q_write = config.q_write, q_read = config.q_read, "coordinator listening");
    let service = Arc::new(Coordinator::new(config));
    Ok(tokio::spawn(async move {
        if let Err(err) = rpc::serve(listener, service).await {
            error!(error = %err, "coordinator stopped");
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn server(dir: &Path) -> FileServer {
        FileServer::new(0, dir.to_path_buf(), "127.0.0.1:1".into())
    }

    #[tokio::test]
    async fn version_defaults_to_zero_and_tracks_updates() {
        let dir = tempfile::tempdir().unwrap();
        let server = server(dir.path());
        assert_eq!(server.version("x.txt"), 0);
        server.update("x.txt", 3, "hello").await.unwrap();
        assert_eq!(server.version("x.txt"), 3);
        assert_eq!(server.fetch("x.txt").await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn fetch_of_unknown_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let server = server(dir.path());
        assert_eq!(
            server.fetch("nope.txt").await,
            Err(Error::FileNotFound("nope.txt".into()))
        );
    }

    #[tokio::test]
    async fn content_is_persisted_under_the_replica_path() {
        let dir = tempfile::tempdir().unwrap();
        let server = server(dir.path());
        server.update("x.txt", 1, "A").await.unwrap();
        assert_eq!(
            std::fs::read_to_string(dir.path().join("x.txt")).unwrap(),
            "A"
        );
    }

    #[tokio::test]
    async fn path_escapes_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        let server = server(dir.path());
        assert!(server.update("../evil", 1, "A").await.is_err());
        assert!(server.fetch("a/b").await.is_err());
    }

    #[tokio::test]
    async fn files_snapshot_lists_every_replica() {
        let dir = tempfile::tempdir().unwrap();
        let server = server(dir.path());
        server.update("a.txt", 1, "A").await.unwrap();
        server.update("b.txt", 4, "B").await.unwrap();
        let mut files = server.files();
        files.sort_by(|a, b| a.file_name.cmp(&b.file_name));
        assert_eq!(
            files,
            vec![
                FileObject {
                    file_name: "a.txt".into(),
                    version: 1
                },
                FileObject {
                    file_name: "b.txt".into(),
                    version: 4
                },
            ]
        );
    }
}
