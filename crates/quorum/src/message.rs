//! Wire messages for the coordinator and file-server services.

use corelib::Error;
use serde::{Deserialize, Serialize};

/// A file name paired with its version, as reported by a server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileObject {
    pub file_name: String,
    pub version: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CoordinatorRequest {
    Write { file: String, content: String },
    Read { file: String },
    ListFiles,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CoordinatorReply {
    Written,
    Content(String),
    Files(Vec<FileObject>),
}

pub type CoordinatorResponse = Result<CoordinatorReply, Error>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ServerRequest {
    // Client-facing operations, forwarded to the coordinator.
    Write { file: String, content: String },
    Read { file: String },
    ListFiles,
    // Coordinator-facing operations against the local replica.
    GetVersion { file: String },
    Update { file: String, version: i64, content: String },
    Fetch { file: String },
    GetFiles,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ServerReply {
    Written,
    Content(String),
    Files(Vec<FileObject>),
    Version(i64),
    Updated,
}

pub type ServerResponse = Result<ServerReply, Error>;
