//! Connection supervision and the framed command protocol.
//!
//! Each accepted connection is split into two cooperating tasks sharing the
//! socket: the decoder owns the read half, parses the handshake-then-command
//! stream and handles PUTs inline; the encoder owns the write half and
//! serves GET requests handed over on an ordered single-slot channel. The
//! single slot is what bounds outstanding responses per connection - the
//! protocol has no per-response ids, so replies must stay in request order
//! and the decoder blocks once the encoder falls behind by one.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::error::CacheError;
use crate::handle::ArtifactFile;
use crate::id::{AssetId, Variant};
use crate::mcache::MemCache;
use crate::store::ArtifactStore;
use crate::wire;

/// Upper bound on one read/write chunk while streaming payload bytes.
pub const CHUNK_SIZE: usize = 32 * 1024;

/// A fully-parsed GET awaiting service by the connection's encoder.
#[derive(Clone, Copy)]
struct GetRequest {
    variant: Variant,
    id: AssetId,
}

pub struct CacheServer {
    store: ArtifactStore,
    mcache: Arc<MemCache>,
}

impl CacheServer {
    pub fn new(config: &Config) -> CacheServer {
        CacheServer {
            store: ArtifactStore::new(config.root.clone()),
            mcache: Arc::new(MemCache::new(config.capacity)),
        }
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn memory(&self) -> &MemCache {
        &self.mcache
    }

    /// Binds the configured port and serves until the process dies.
    pub async fn listen(self: Arc<Self>, port: u16) -> io::Result<()> {
        let listener = TcpListener::bind(("0.0.0.0", port)).await?;
        info!(port, "listening");
        self.serve(listener).await
    }

    /// Accept loop over an already-bound listener.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> io::Result<()> {
        if self.mcache.enabled() {
            tokio::spawn(Arc::clone(&self.mcache).stat_loop());
        }
        loop {
            match listener.accept().await {
                Ok((socket, peer)) => {
                    let server = Arc::clone(&self);
                    tokio::spawn(async move { server.handle(socket, peer).await });
                }
                Err(err) => {
                    error!(%err, "accept");
                }
            }
        }
    }

    async fn handle(self: Arc<Self>, mut socket: TcpStream, peer: SocketAddr) {
        info!(client = %peer, "connected");
        let _ = socket.set_nodelay(true);

        if let Err(err) = handshake(&mut socket).await {
            error!(client = %peer, %err, "handshake");
            info!(client = %peer, "closed");
            return;
        }

        let (rd, wr) = socket.into_split();
        let (tx, rx) = mpsc::channel(1);
        let mut encoder = tokio::spawn(Arc::clone(&self).encode_loop(wr, rx, peer));

        let decoded = tokio::select! {
            res = self.decode_loop(rd, tx, peer) => Some(res),
            // Encoder died first (write error); dropping the decoder future
            // and returning closes both socket halves.
            _ = &mut encoder => None,
        };
        if let Some(res) = decoded {
            match res {
                Ok(()) => {}
                Err(CacheError::Io(err)) if err.kind() == io::ErrorKind::UnexpectedEof => {}
                Err(err) => error!(client = %peer, %err, "connection failed"),
            }
            // The decoder dropped its queue sender when it finished; let
            // the encoder drain what is still in flight.
            let _ = encoder.await;
        }

        info!(client = %peer, "closed");
    }

    /// Read half: parses commands until quit, EOF, or a protocol error.
    async fn decode_loop(
        &self,
        mut rd: OwnedReadHalf,
        queue: mpsc::Sender<GetRequest>,
        peer: SocketAddr,
    ) -> Result<(), CacheError> {
        let mut trx: Option<AssetId> = None;
        loop {
            let mut op = [0u8; 1];
            match rd.read_exact(&mut op).await {
                Ok(_) => {}
                Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(()),
                Err(err) => return Err(err.into()),
            }
            match op[0] {
                b'q' => return Ok(()),
                b'g' => {
                    let variant = read_variant(&mut rd).await?;
                    let id = wire::read_id(&mut rd).await?;
                    debug!(client = %peer, variant = %(variant.tag() as char), %id, "get");
                    if queue.send(GetRequest { variant, id }).await.is_err() {
                        return Err(CacheError::ChannelClosed);
                    }
                }
                b'p' => {
                    let variant = read_variant(&mut rd).await?;
                    let declared = wire::read_size(&mut rd).await?;
                    let id = trx.ok_or(CacheError::NoTransaction)?;
                    debug!(client = %peer, variant = %(variant.tag() as char), %id, declared, "put");
                    self.receive_put(&mut rd, &id, variant, declared, peer).await?;
                }
                b't' => {
                    let mut sub = [0u8; 1];
                    rd.read_exact(&mut sub).await?;
                    match sub[0] {
                        b's' => {
                            let id = wire::read_id(&mut rd).await?;
                            debug!(client = %peer, %id, "transaction start");
                            trx = Some(id);
                        }
                        b'e' => {
                            debug!(client = %peer, "transaction end");
                            trx = None;
                        }
                        other => return Err(CacheError::BadCommand(other)),
                    }
                }
                other => return Err(CacheError::BadCommand(other)),
            }
        }
    }

    /// Streams one upload into a pending temp file and publishes it.
    async fn receive_put(
        &self,
        rd: &mut OwnedReadHalf,
        id: &AssetId,
        variant: Variant,
        declared: u64,
        peer: SocketAddr,
    ) -> Result<(), CacheError> {
        let mut file =
            ArtifactFile::create(&self.store, &self.mcache, id, variant, declared).await?;
        if let Err(err) = copy_body(rd, &mut file, declared).await {
            error!(client = %peer, %err, received = file.size(), declared, "receive body");
            file.abort().await;
            return Err(err.into());
        }
        file.finish(&self.store, &self.mcache).await?;
        debug!(client = %peer, %id, size = declared, "receive success");
        Ok(())
    }

    /// Write half: serves queued GETs in arrival order until the decoder
    /// drops the queue or a write fails.
    async fn encode_loop(
        self: Arc<Self>,
        mut wr: OwnedWriteHalf,
        mut queue: mpsc::Receiver<GetRequest>,
        peer: SocketAddr,
    ) {
        while let Some(req) = queue.recv().await {
            if let Err(err) = self.send_artifact(&mut wr, req, peer).await {
                error!(client = %peer, %err, "send response");
                return;
            }
        }
    }

    async fn send_artifact(
        &self,
        wr: &mut OwnedWriteHalf,
        req: GetRequest,
        peer: SocketAddr,
    ) -> Result<(), CacheError> {
        let GetRequest { variant, id } = req;
        let Some(mut file) = ArtifactFile::open(&self.store, &self.mcache, &id, variant).await?
        else {
            debug!(client = %peer, variant = %(variant.tag() as char), %id, "cache miss");
            wr.write_all(&wire::miss_header(variant, &id)).await?;
            wr.flush().await?;
            return Ok(());
        };

        let size = file.size();
        wr.write_all(&wire::hit_header(variant, size, &id)).await?;

        if let ArtifactFile::Memory { data, .. } = &file {
            wr.write_all(data).await?;
        } else {
            let mut chunk = vec![0u8; CHUNK_SIZE];
            let mut sent = 0u64;
            while sent < size {
                let want = (size - sent).min(CHUNK_SIZE as u64) as usize;
                let n = file.read(&mut chunk[..want]).await?;
                if n == 0 {
                    error!(client = %peer, sent, size, file = ?file.name(), "send body");
                    return Err(CacheError::Io(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "artifact truncated on disk",
                    )));
                }
                wr.write_all(&chunk[..n]).await?;
                sent += n as u64;
            }
        }
        wr.flush().await?;
        debug!(client = %peer, %id, size, "send success");
        Ok(())
    }
}

/// Reads the client's 2-hex-character version and echoes it back as 8 hex
/// characters, before the socket is split.
async fn handshake(socket: &mut TcpStream) -> Result<(), CacheError> {
    let mut field = [0u8; wire::VERSION_REQUEST_LEN];
    socket.read_exact(&mut field).await?;
    let version = wire::decode_version(&field);
    socket.write_all(&wire::encode_version(version)).await?;
    debug!(version, "handshake");
    Ok(())
}

async fn read_variant(rd: &mut OwnedReadHalf) -> Result<Variant, CacheError> {
    let mut tag = [0u8; 1];
    rd.read_exact(&mut tag).await?;
    Variant::from_tag(tag[0]).ok_or(CacheError::BadVariant(tag[0]))
}

/// Moves exactly `declared` bytes from the socket into the upload handle.
async fn copy_body(
    rd: &mut OwnedReadHalf,
    file: &mut ArtifactFile,
    declared: u64,
) -> io::Result<()> {
    let mut chunk = vec![0u8; CHUNK_SIZE];
    let mut remaining = declared;
    while remaining > 0 {
        let n = remaining.min(CHUNK_SIZE as u64) as usize;
        rd.read_exact(&mut chunk[..n]).await?;
        file.write_all(&chunk[..n]).await?;
        remaining -= n as u64;
    }
    Ok(())
}
