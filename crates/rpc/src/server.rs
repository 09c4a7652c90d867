//! Server side of the framed protocol.

use std::sync::Arc;

use async_trait::async_trait;
use corelib::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::BufStream;
use tokio::net::{TcpListener, TcpStream};
use tracing::debug;

use crate::codec::{read_frame, write_frame};

/// A request handler for one RPC service.
///
/// Handlers may block on outbound RPCs, locks, and file I/O; each
/// accepted connection runs on its own task, so one slow request only
/// stalls the connection it arrived on.
#[async_trait]
pub trait Service: Send + Sync + 'static {
    type Request: DeserializeOwned + Send;
    type Response: Serialize + Send + Sync;

    async fn handle(&self, request: Self::Request) -> Self::Response;
}

/// Accept connections forever, spawning one task per connection.
pub async fn serve<S: Service>(listener: TcpListener, service: Arc<S>) -> Result<()> {
    loop {
        let (stream, peer) = listener.accept().await?;
        let service = Arc::clone(&service);
        tokio::spawn(async move {
            if let Err(err) = serve_connection(stream, service).await {
                debug!(%peer, error = %err, "connection ended with error");
            }
        });
    }
}

async fn serve_connection<S: Service>(stream: TcpStream, service: Arc<S>) -> Result<()> {
    let mut stream = BufStream::new(stream);
    // Requests on one connection are processed in order; the peer does
    // not pipeline.
    while let Some(request) = read_frame::<S::Request, _>(&mut stream).await? {
        let response = service.handle(request).await;
        write_frame(&mut stream, &response).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Connection;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize)]
    enum EchoRequest {
        Shout(String),
        Add(u64, u64),
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    enum EchoResponse {
        Text(String),
        Sum(u64),
    }

    struct Echo;

    #[async_trait]
    impl Service for Echo {
        type Request = EchoRequest;
        type Response = EchoResponse;

        async fn handle(&self, request: EchoRequest) -> EchoResponse {
            match request {
                EchoRequest::Shout(s) => EchoResponse::Text(s.to_uppercase()),
                EchoRequest::Add(a, b) => EchoResponse::Sum(a + b),
            }
        }
    }

    #[tokio::test]
    async fn serves_sequential_calls_on_one_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(serve(listener, Arc::new(Echo)));

        let mut conn: Connection<EchoRequest, EchoResponse> =
            Connection::connect(&addr).await.unwrap();
        let first = conn.call(&EchoRequest::Shout("hi".into())).await.unwrap();
        assert_eq!(first, EchoResponse::Text("HI".into()));
        let second = conn.call(&EchoRequest::Add(40, 2)).await.unwrap();
        assert_eq!(second, EchoResponse::Sum(42));
    }

    #[tokio::test]
    async fn serves_concurrent_connections() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(serve(listener, Arc::new(Echo)));

        let mut tasks = Vec::new();
        for i in 0..8u64 {
            let addr = addr.clone();
            tasks.push(tokio::spawn(async move {
                let mut conn: Connection<EchoRequest, EchoResponse> =
                    Connection::connect(&addr).await.unwrap();
                conn.call(&EchoRequest::Add(i, 1)).await.unwrap()
            }));
        }
        for (i, task) in tasks.into_iter().enumerate() {
            assert_eq!(task.await.unwrap(), EchoResponse::Sum(i as u64 + 1));
        }
    }
}
