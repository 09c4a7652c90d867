//! Typed client wrappers for the file-store services.

use corelib::{Error, Result};
use rpc::Connection;

use crate::message::{
    CoordinatorReply, CoordinatorRequest, CoordinatorResponse, FileObject, ServerReply,
    ServerRequest, ServerResponse,
};

/// Connection to the coordinator.
pub struct CoordinatorPeer {
    conn: Connection<CoordinatorRequest, CoordinatorResponse>,
}

impl CoordinatorPeer {
    pub async fn connect(addr: &str) -> Result<Self> {
        Ok(Self {
            conn: Connection::connect(addr).await?,
        })
    }

    pub async fn write(&mut self, file: &str, content: &str) -> Result<()> {
        match self
            .conn
            .call(&CoordinatorRequest::Write {
                file: file.to_string(),
                content: content.to_string(),
            })
            .await??
        {
            CoordinatorReply::Written => Ok(()),
            other => Err(unexpected("Written", &format!("{:?}", other))),
        }
    }

    pub async fn read(&mut self, file: &str) -> Result<String> {
        match self
            .conn
            .call(&CoordinatorRequest::Read {
                file: file.to_string(),
            })
            .await??
        {
            CoordinatorReply::Content(content) => Ok(content),
            other => Err(unexpected("Content", &format!("{:?}", other))),
        }
    }

    pub async fn list_files(&mut self) -> Result<Vec<FileObject>> {
        match self.conn.call(&CoordinatorRequest::ListFiles).await?? {
            CoordinatorReply::Files(files) => Ok(files),
            other => Err(unexpected("Files", &format!("{:?}", other))),
        }
    }
}

/// Connection to one file server.
pub struct ServerPeer {
    conn: Connection<ServerRequest, ServerResponse>,
}

impl ServerPeer {
    pub async fn connect(addr: &str) -> Result<Self> {
        Ok(Self {
            conn: Connection::connect(addr).await?,
        })
    }

    async fn call(&mut self, request: ServerRequest) -> Result<ServerReply> {
        self.conn.call(&request).await?
    }

    pub async fn write(&mut self, file: &str, content: &str) -> Result<()> {
        match self
            .call(ServerRequest::Write {
                file: file.to_string(),
                content: content.to_string(),
            })
            .await?
        {
            ServerReply::Written => Ok(()),
            other => Err(unexpected("Written", &format!("{:?}", other))),
        }
    }

    pub async fn read(&mut self, file: &str) -> Result<String> {
        match self
            .call(ServerRequest::Read {
                file: file.to_string(),
            })
            .await?
        {
            ServerReply::Content(content) => Ok(content),
            other => Err(unexpected("Content", &format!("{:?}", other))),
        }
    }

    pub async fn list_files(&mut self) -> Result<Vec<FileObject>> {
        match self.call(ServerRequest::ListFiles).await? {
            ServerReply::Files(files) => Ok(files),
            other => Err(unexpected("Files", &format!("{:?}", other))),
        }
    }

    pub async fn get_version(&mut self, file: &str) -> Result<i64> {
        match self
            .call(ServerRequest::GetVersion {
                file: file.to_string(),
            })
            .await?
        {
            ServerReply::Version(version) => Ok(version),
            other => Err(unexpected("Version", &format!("{:?}", other))),
        }
    }

    pub async fn update(&mut self, file: &str, version: i64, content: &str) -> Result<()> {
        match self
            .call(ServerRequest::Update {
                file: file.to_string(),
                version,
                content: content.to_string(),
            })
            .await?
        {
            ServerReply::Updated => Ok(()),
            other => Err(unexpected("Updated", &format!("{:?}", other))),
        }
    }

    pub async fn fetch(&mut self, file: &str) -> Result<String> {
        match self
            .call(ServerRequest::Fetch {
                file: file.to_string(),
            })
            .await?
        {
            ServerReply::Content(content) => Ok(content),
            other => Err(unexpected("Content", &format!("{:?}", other))),
        }
    }

    pub async fn get_files(&mut self) -> Result<Vec<FileObject>> {
        match self.call(ServerRequest::GetFiles).await? {
            ServerReply::Files(files) => Ok(files),
            other => Err(unexpected("Files", &format!("{:?}", other))),
        }
    }
}

fn unexpected(wanted: &str, got: &str) -> Error {
    Error::Protocol(format!("expected {} reply, got {}", wanted, got))
}
