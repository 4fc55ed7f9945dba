//! Test helpers for end-to-end tests.
//!
//! Provides TestServer and TestClient for driving the relay over real TCP.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use chatrelay::config::ServerConfig;
use chatrelay::{Dispatcher, Registry, RelayServer, ServerInfo, SessionSettings};

/// Default timeout for test operations.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Address reported in join replies during tests.
pub const SERVER_IP: &str = "127.0.0.1";

/// A relay running on an ephemeral port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub registry: Arc<Registry>,
    handle: JoinHandle<()>,
}

impl TestServer {
    /// Start a relay with default settings.
    pub async fn start() -> Self {
        Self::start_with(ServerConfig {
            host: SERVER_IP.to_string(),
            port: 0,
            ..ServerConfig::default()
        })
        .await
    }

    /// Start a relay with the given configuration.
    pub async fn start_with(config: ServerConfig) -> Self {
        let server = RelayServer::bind(&config).await.unwrap();
        let addr = server.local_addr().unwrap();
        let registry = Arc::new(Registry::new());
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&registry),
            ServerInfo::from_config(&config, addr),
        ));
        let settings = SessionSettings::from_config(&config);

        let handle = tokio::spawn(async move {
            let _ = server.serve(dispatcher, settings).await;
        });

        Self {
            addr,
            registry,
            handle,
        }
    }

    /// Port clients see in join replies.
    pub fn port(&self) -> u16 {
        self.addr.port()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Test client speaking the line protocol.
pub struct TestClient {
    stream: TcpStream,
}

impl TestClient {
    /// Connect to the relay.
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        Self { stream }
    }

    /// Send raw text.
    pub async fn send(&mut self, data: &str) {
        self.stream.write_all(data.as_bytes()).await.unwrap();
        self.stream.flush().await.unwrap();
    }

    /// Send a join request.
    pub async fn join(&mut self, room: &str, name: &str) {
        self.send(&format!(
            "JOIN_CHATROOM:{room}\nCLIENT_IP:0\nPORT:0\nCLIENT_NAME:{name}\n"
        ))
        .await;
    }

    /// Send a chat message.
    pub async fn chat(&mut self, room_id: u64, join_id: u64, name: &str, message: &str) {
        self.send(&format!(
            "CHAT:{room_id}\nJOIN_ID:{join_id}\nCLIENT_NAME:{name}\nMESSAGE:{message}\n\n"
        ))
        .await;
    }

    /// Receive exactly `expected.len()` bytes and return them as text.
    ///
    /// Frames are not newline-terminated, so tests read by length.
    pub async fn recv_len(&mut self, len: usize) -> String {
        let mut buf = vec![0u8; len];
        timeout(DEFAULT_TIMEOUT, self.stream.read_exact(&mut buf))
            .await
            .expect("timed out waiting for data")
            .unwrap();
        String::from_utf8(buf).unwrap()
    }

    /// Receive and compare against an exact expected text.
    pub async fn expect(&mut self, expected: &str) {
        let received = self.recv_len(expected.len()).await;
        assert_eq!(received, expected);
    }

    /// Assert that nothing arrives within `wait`.
    pub async fn expect_silence(&mut self, wait: Duration) {
        let mut buf = [0u8; 64];
        match timeout(wait, self.stream.read(&mut buf)).await {
            Err(_) => {}
            Ok(Ok(0)) => panic!("connection closed while expecting silence"),
            Ok(Ok(n)) => panic!(
                "unexpected data: {:?}",
                String::from_utf8_lossy(&buf[..n])
            ),
            Ok(Err(e)) => panic!("read error: {e}"),
        }
    }

    /// Read until the relay closes the connection.
    pub async fn recv_to_end(&mut self) -> String {
        let mut received = String::new();
        timeout(DEFAULT_TIMEOUT, self.stream.read_to_string(&mut received))
            .await
            .expect("timed out waiting for close")
            .unwrap();
        received
    }
}

/// Join reply expected from the test server.
pub fn join_reply(room: &str, port: u16, room_id: u64, join_id: u64) -> String {
    format!(
        "JOINED_CHATROOM:{room}\nSERVER_IP:{SERVER_IP}\nPORT:{port}\nROOM_REF:{room_id}\nJOIN_ID:{join_id}\n"
    )
}

/// Broadcast frame.
pub fn chat(room_id: u64, name: &str, text: &str) -> String {
    format!("CHAT:{room_id}CLIENT_NAME:{name}MESSAGE:{text}")
}
