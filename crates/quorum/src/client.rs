//! Scripted file-store client.
//!
//! Reads a command script (one command per line) and issues each
//! operation against a randomly chosen server:
//!
//! ```text
//! write <file> <content...>
//! read <file>
//! list
//! sleep <seconds>
//! ```

use std::time::{Duration, Instant};

use corelib::{Error, QuorumConfig, Result};
use rand::seq::SliceRandom;
use tracing::{info, warn};

use crate::peer::ServerPeer;

/// Run client `index` from the configuration: load its commands file
/// and execute every line.
pub async fn run_file_client(config: &QuorumConfig, index: usize) -> Result<()> {
    let entry = config.client(index)?;
    let script = tokio::fs::read_to_string(&entry.commands_file)
        .await
        .map_err(|e| {
            Error::Config(format!(
                "cannot read {}: {}",
                entry.commands_file.display(),
                e
            ))
        })?;
    let servers: Vec<String> = config.servers.iter().map(|s| s.addr()).collect();

    let started = Instant::now();
    let mut executed = 0usize;
    for line in script.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        run_command(&servers, line).await?;
        executed += 1;
    }
    info!(
        client = index,
        commands = executed,
        elapsed = ?started.elapsed(),
        "finished executing command script"
    );
    Ok(())
}

fn pick_server(servers: &[String]) -> String {
    servers
        .choose(&mut rand::thread_rng())
        .expect("server set validated non-empty at load")
        .clone()
}

async fn run_command(servers: &[String], line: &str) -> Result<()> {
    let mut parts = line.splitn(3, ' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("write"), Some(file), Some(content)) => {
            let server = pick_server(servers);
            ServerPeer::connect(&server).await?.write(file, content).await?;
            info!(file, %server, "wrote file");
            Ok(())
        }
        (Some("read"), Some(file), None) => {
            let server = pick_server(servers);
            match ServerPeer::connect(&server).await?.read(file).await {
                Ok(content) => {
                    info!(file, content, "read file");
                    Ok(())
                }
                Err(Error::FileNotFound(_)) => {
                    warn!(file, "file not found");
                    Ok(())
                }
                Err(err) => Err(err),
            }
        }
        (Some("list"), None, None) => {
            let server = pick_server(servers);
            let files = ServerPeer::connect(&server).await?.list_files().await?;
            let rendered: Vec<String> = files
                .iter()
                .map(|f| format!("{}@{}", f.file_name, f.version))
                .collect();
            info!(files = ?rendered, "listed files");
            Ok(())
        }
        (Some("sleep"), Some(seconds), None) => {
            let seconds: f64 = seconds
                .parse()
                .map_err(|_| Error::Config(format!("bad sleep duration {:?}", seconds)))?;
            info!(seconds, "sleeping");
            tokio::time::sleep(Duration::from_secs_f64(seconds)).await;
            Ok(())
        }
        _ => {
            warn!(line, "unknown command");
            Ok(())
        }
    }
}
