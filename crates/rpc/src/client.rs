//! Client side of the framed protocol.

use std::marker::PhantomData;

use corelib::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::BufStream;
use tokio::net::TcpStream;

use crate::codec::{read_frame, write_frame};

/// One TCP connection speaking `Req`/`Resp` frames.
///
/// Calls are strictly sequential: each request frame is answered by
/// exactly one response frame before the next call starts. That matches
/// how every caller in this system issues RPCs.
pub struct Connection<Req, Resp> {
    stream: BufStream<TcpStream>,
    peer: String,
    _marker: PhantomData<fn(Req) -> Resp>,
}

impl<Req, Resp> Connection<Req, Resp>
where
    Req: Serialize,
    Resp: DeserializeOwned,
{
    /// Connect to `addr` (an `ip:port` string).
    pub async fn connect(addr: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| Error::Transport(format!("connect {}: {}", addr, e)))?;
        Ok(Self {
            stream: BufStream::new(stream),
            peer: addr.to_string(),
            _marker: PhantomData,
        })
    }

    /// The `ip:port` this connection was opened to.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Send one request and wait for its response.
    pub async fn call(&mut self, request: &Req) -> Result<Resp> {
        write_frame(&mut self.stream, request).await?;
        read_frame(&mut self.stream)
            .await?
            .ok_or_else(|| Error::Transport(format!("{} closed mid-call", self.peer)))
    }
}
