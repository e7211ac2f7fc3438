//! Mock market-data feed server for integration tests.
//!
//! Provides a WebSocket server that can:
//! - Accept connections (credentials in the query string are ignored)
//! - Record received subscribe frames
//! - Push ticker/heartbeat frames to connected clients
//! - Drop all connections to exercise reconnection

use futures_util::{SinkExt, StreamExt};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::{accept_async, tungstenite::Message};

/// Commands the test can issue to a connected client handler.
enum ClientCommand {
    Text(String),
    Close,
}

/// A mock feed server for testing.
pub struct MockFeedServer {
    addr: SocketAddr,
    shutdown_tx: mpsc::Sender<()>,
    messages: Arc<Mutex<VecDeque<String>>>,
    connections: Arc<Mutex<u32>>,
    clients: Arc<Mutex<Vec<mpsc::Sender<ClientCommand>>>>,
}

impl MockFeedServer {
    /// Start a new mock feed server on an available port.
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let messages: Arc<Mutex<VecDeque<String>>> = Arc::new(Mutex::new(VecDeque::new()));
        let connections: Arc<Mutex<u32>> = Arc::new(Mutex::new(0));
        let clients: Arc<Mutex<Vec<mpsc::Sender<ClientCommand>>>> =
            Arc::new(Mutex::new(Vec::new()));
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let messages_clone = messages.clone();
        let connections_clone = connections.clone();
        let clients_clone = clients.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    Ok((stream, _)) = listener.accept() => {
                        let messages = messages_clone.clone();
                        let connections = connections_clone.clone();
                        let clients = clients_clone.clone();
                        tokio::spawn(handle_connection(stream, messages, connections, clients));
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }
        });

        Self {
            addr,
            shutdown_tx,
            messages,
            connections,
            clients,
        }
    }

    /// Get the server's WebSocket URL.
    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Get the number of connections received.
    pub async fn connection_count(&self) -> u32 {
        *self.connections.lock().await
    }

    /// Get all received messages.
    pub async fn received_messages(&self) -> Vec<String> {
        self.messages.lock().await.iter().cloned().collect()
    }

    /// Forget messages recorded so far.
    pub async fn clear_messages(&self) {
        self.messages.lock().await.clear();
    }

    /// Push a raw text frame to every connected client.
    pub async fn push_text(&self, text: String) {
        for client in self.clients.lock().await.iter() {
            let _ = client.send(ClientCommand::Text(text.clone())).await;
        }
    }

    /// Push a ticker frame to every connected client.
    pub async fn push_ticker(&self, segment: &str, security_id: &str, ltp: &str, ltt: i64) {
        let frame = serde_json::json!({
            "type": "ticker",
            "exchangeSegment": segment,
            "securityId": security_id,
            "ltp": ltp,
            "ltt": ltt,
        });
        self.push_text(frame.to_string()).await;
    }

    /// Close every live connection (server-side drop).
    pub async fn drop_connections(&self) {
        let mut clients = self.clients.lock().await;
        for client in clients.iter() {
            let _ = client.send(ClientCommand::Close).await;
        }
        clients.clear();
    }

    /// Shutdown the server.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

async fn handle_connection(
    stream: TcpStream,
    messages: Arc<Mutex<VecDeque<String>>>,
    connections: Arc<Mutex<u32>>,
    clients: Arc<Mutex<Vec<mpsc::Sender<ClientCommand>>>>,
) {
    {
        let mut count = connections.lock().await;
        *count += 1;
    }

    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            eprintln!("WebSocket handshake failed: {}", e);
            return;
        }
    };

    let (cmd_tx, mut cmd_rx) = mpsc::channel::<ClientCommand>(32);
    clients.lock().await.push(cmd_tx);

    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(ClientCommand::Text(text)) => {
                        if write.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    Some(ClientCommand::Close) | None => {
                        let _ = write.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let mut msgs = messages.lock().await;
                        msgs.push_back(text.to_string());
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = write.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_server_starts() {
        let server = MockFeedServer::start().await;
        assert!(server.url().starts_with("ws://127.0.0.1:"));
        server.shutdown().await;
    }
}
