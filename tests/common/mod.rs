#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use forgecache::config::Config;
use forgecache::server::CacheServer;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// A cache server bound to an ephemeral port with a throwaway root.
pub struct TestServer {
    pub addr: SocketAddr,
    pub server: Arc<CacheServer>,
    root: TempDir,
}

impl TestServer {
    pub async fn start(capacity: usize) -> TestServer {
        let root = TempDir::new().unwrap();
        let server = Arc::new(CacheServer::new(&Config {
            port: 0,
            root: root.path().to_path_buf(),
            capacity,
        }));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accept = Arc::clone(&server);
        tokio::spawn(async move {
            let _ = accept.serve(listener).await;
        });
        TestServer { addr, server, root }
    }

    pub fn root(&self) -> &Path {
        self.root.path()
    }
}

pub enum GetReply {
    Hit {
        variant: u8,
        id: [u8; 32],
        payload: Vec<u8>,
    },
    Miss {
        variant: u8,
        id: [u8; 32],
    },
}

impl GetReply {
    pub fn is_miss(&self) -> bool {
        matches!(self, GetReply::Miss { .. })
    }

    pub fn payload(&self) -> &[u8] {
        match self {
            GetReply::Hit { payload, .. } => payload,
            GetReply::Miss { .. } => panic!("expected a hit"),
        }
    }
}

/// Minimal wire-protocol client for driving the server in tests.
pub struct Client {
    stream: TcpStream,
}

impl Client {
    pub async fn connect(addr: SocketAddr) -> Client {
        let stream = TcpStream::connect(addr).await.unwrap();
        Client { stream }
    }

    /// Connects and completes the handshake with version `fe`.
    pub async fn connect_ready(addr: SocketAddr) -> Client {
        let mut client = Client::connect(addr).await;
        client.handshake(b"fe").await;
        client
    }

    /// Sends a 2-byte version field and returns the 8-character echo.
    pub async fn handshake(&mut self, version: &[u8; 2]) -> String {
        self.stream.write_all(version).await.unwrap();
        let mut echo = [0u8; 8];
        self.stream.read_exact(&mut echo).await.unwrap();
        String::from_utf8(echo.to_vec()).unwrap()
    }

    pub async fn start_trx(&mut self, id: &[u8; 32]) {
        let mut frame = Vec::with_capacity(34);
        frame.extend_from_slice(b"ts");
        frame.extend_from_slice(id);
        self.stream.write_all(&frame).await.unwrap();
    }

    pub async fn end_trx(&mut self) {
        self.stream.write_all(b"te").await.unwrap();
    }

    /// PUT declaration only; the caller controls how much payload follows.
    pub async fn put_header(&mut self, variant: u8, declared: u64) {
        let mut frame = Vec::with_capacity(18);
        frame.push(b'p');
        frame.push(variant);
        frame.extend_from_slice(format!("{declared:016x}").as_bytes());
        self.stream.write_all(&frame).await.unwrap();
    }

    pub async fn put(&mut self, variant: u8, payload: &[u8]) {
        self.put_header(variant, payload.len() as u64).await;
        self.stream.write_all(payload).await.unwrap();
    }

    /// Full upload: transaction start, one PUT, transaction end.
    pub async fn upload(&mut self, id: &[u8; 32], variant: u8, payload: &[u8]) {
        self.start_trx(id).await;
        self.put(variant, payload).await;
        self.end_trx().await;
    }

    pub async fn send_get(&mut self, variant: u8, id: &[u8; 32]) {
        let mut frame = Vec::with_capacity(34);
        frame.push(b'g');
        frame.push(variant);
        frame.extend_from_slice(id);
        self.stream.write_all(&frame).await.unwrap();
    }

    pub async fn read_reply(&mut self) -> GetReply {
        let mut head = [0u8; 2];
        self.stream.read_exact(&mut head).await.unwrap();
        let mut id = [0u8; 32];
        match head[0] {
            b'-' => {
                self.stream.read_exact(&mut id).await.unwrap();
                GetReply::Miss {
                    variant: head[1],
                    id,
                }
            }
            b'+' => {
                let mut size_field = [0u8; 16];
                self.stream.read_exact(&mut size_field).await.unwrap();
                let size =
                    u64::from_str_radix(std::str::from_utf8(&size_field).unwrap(), 16).unwrap();
                self.stream.read_exact(&mut id).await.unwrap();
                let mut payload = vec![0u8; size as usize];
                self.stream.read_exact(&mut payload).await.unwrap();
                GetReply::Hit {
                    variant: head[1],
                    id,
                    payload,
                }
            }
            other => panic!("unexpected reply marker {other:#04x}"),
        }
    }

    pub async fn get(&mut self, variant: u8, id: &[u8; 32]) -> GetReply {
        self.send_get(variant, id).await;
        self.read_reply().await
    }

    pub async fn quit(mut self) {
        self.stream.write_all(b"q").await.unwrap();
    }

    /// Raw bytes, for malformed-input tests.
    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.unwrap();
    }

    pub async fn read_exact(&mut self, buf: &mut [u8]) {
        self.stream.read_exact(buf).await.unwrap();
    }

    /// Blocks until the server closes the connection; false if data or a
    /// reply arrives first.
    pub async fn server_closed(&mut self) -> bool {
        let mut probe = [0u8; 1];
        match self.stream.read(&mut probe).await {
            Ok(0) => true,
            Ok(_) => false,
            Err(_) => true,
        }
    }
}

pub fn test_id(seed: u8) -> [u8; 32] {
    let mut id = [0u8; 32];
    for (i, byte) in id.iter_mut().enumerate() {
        *byte = seed.wrapping_add(i as u8);
    }
    id
}

/// Deterministic pseudo-random payload bytes.
pub fn payload_bytes(seed: u8, len: usize) -> Vec<u8> {
    let mut state = u32::from(seed) | 1;
    (0..len)
        .map(|_| {
            state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            (state >> 24) as u8
        })
        .collect()
}
