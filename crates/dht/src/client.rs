//! Scripted dictionary client.
//!
//! Executes the `client_commands` list from the configuration against
//! the ring. With `reuse_connection` set, one node is chosen at startup
//! and every command goes to it; otherwise each individual put/get asks
//! the bootstrap coordinator for a fresh node and reconnects.

use std::path::Path;
use std::time::Instant;

use corelib::{DhtConfig, Error, Result};
use tracing::{info, warn};

use crate::peer::{BootstrapPeer, NodePeer};

struct DictSession {
    bootstrap: BootstrapPeer,
    node: NodePeer,
    reuse_connection: bool,
}

impl DictSession {
    async fn open(config: &DhtConfig) -> Result<Self> {
        let mut bootstrap = BootstrapPeer::connect(&config.super_node.addr()).await?;
        let member = bootstrap.get_node_for_client().await?;
        info!(node = %member, "connected to ring node");
        let node = NodePeer::connect(&member).await?;
        Ok(Self {
            bootstrap,
            node,
            reuse_connection: config.reuse_connection,
        })
    }

    /// The connection to issue the next operation on, reconnecting to a
    /// freshly chosen member first unless connections are reused.
    async fn node(&mut self) -> Result<&mut NodePeer> {
        if !self.reuse_connection {
            let member = self.bootstrap.get_node_for_client().await?;
            self.node = NodePeer::connect(&member).await?;
        }
        Ok(&mut self.node)
    }

    async fn put(&mut self, word: &str, definition: &str) -> Result<()> {
        match self.node().await?.put(word, definition).await {
            Ok(()) => {
                info!(word, definition, "inserted word");
                Ok(())
            }
            Err(Error::DuplicateWord(_)) => {
                warn!(word, "word is already in the DHT");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Returns the definition, or `None` (after logging) when the word
    /// is absent.
    async fn get(&mut self, word: &str) -> Result<Option<String>> {
        match self.node().await?.get(word).await {
            Ok(definition) => {
                info!(word, definition, "retrieved definition");
                Ok(Some(definition))
            }
            Err(Error::WordNotFound(_)) => {
                warn!(word, "word has no definition");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }
}

/// Run every command in `config.client_commands`.
pub async fn run_dict_client(config: &DhtConfig) -> Result<()> {
    let started = Instant::now();
    let mut session = DictSession::open(config).await?;
    for command in &config.client_commands {
        run_command(&mut session, command).await?;
    }
    info!(
        commands = config.client_commands.len(),
        elapsed = ?started.elapsed(),
        "finished executing command script"
    );
    Ok(())
}

async fn run_command(session: &mut DictSession, command: &str) -> Result<()> {
    let mut parts = command.splitn(3, ' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("put"), Some(word), Some(definition)) => session.put(word, definition).await,
        (Some("get"), Some(word), None) => session.get(word).await.map(|_| ()),
        (Some("store"), Some(file), None) => store_file(session, Path::new(file)).await,
        (Some("load"), Some(file), output) => {
            load_words(session, Path::new(file), output.map(Path::new)).await
        }
        _ => {
            warn!(command, "unknown command");
            Ok(())
        }
    }
}

/// Bulk-insert a dictionary file of alternating `word` / `Defn: text`
/// lines. Pairs whose definition line has no `:` separator are skipped.
async fn store_file(session: &mut DictSession, file: &Path) -> Result<()> {
    info!(file = %file.display(), "storing dictionary file");
    let contents = tokio::fs::read_to_string(file).await?;
    let lines: Vec<&str> = contents.lines().collect();
    for pair in lines.chunks(2) {
        let [word, definition_line] = pair else {
            continue;
        };
        if word.is_empty() || definition_line.is_empty() {
            continue;
        }
        let Some((_, definition)) = definition_line.split_once(':') else {
            continue;
        };
        session.put(word, definition.trim()).await?;
    }
    info!(file = %file.display(), "finished storing dictionary file");
    Ok(())
}

/// Bulk-look-up a word list (one word per line), optionally writing the
/// results as `word` / ` Defn: text` pairs. Missing words and blank
/// input lines record an empty definition.
async fn load_words(session: &mut DictSession, file: &Path, output: Option<&Path>) -> Result<()> {
    info!(file = %file.display(), "loading definitions for word list");
    let contents = tokio::fs::read_to_string(file).await?;
    let words: Vec<&str> = contents.lines().collect();
    let mut definitions = Vec::with_capacity(words.len());
    for word in &words {
        if word.is_empty() {
            definitions.push(String::new());
            continue;
        }
        let definition = session.get(word).await?.unwrap_or_default();
        definitions.push(definition);
    }
    if let Some(output) = output {
        let mut rendered = String::new();
        for (word, definition) in words.iter().zip(&definitions) {
            rendered.push_str(&format!("{}\n Defn: {}\n", word, definition));
        }
        tokio::fs::write(output, rendered).await?;
        info!(output = %output.display(), "wrote loaded definitions");
    }
    Ok(())
}
