//! The publisher endpoint (`spec.md` §4.2): accepts inbound connections
//! on a fixed port and fans a published message out to every peer that
//! is currently `Ready`, enforcing at most one send pipeline in flight
//! per peer.

use crate::compression::{compress_jpeg, compress_zlib};
use crate::image::decode_image_payload;
use crate::node::Compression;
use crate::wire::encode_header;
use bytes::Bytes;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpListener;
use tokio::runtime::Handle;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, trace, warn};

/// One accepted socket, with the Ready/Busy flag gating the
/// one-in-flight-per-peer rule (`spec.md` §4.2 state table). The socket
/// halves sit behind a [`tokio::sync::Mutex`] rather than a std one
/// since the pipeline holds the guard across `.await` points.
struct Peer {
    addr: SocketAddr,
    io: AsyncMutex<PeerIo>,
    ready: AtomicBool,
}

struct PeerIo {
    reader: OwnedReadHalf,
    writer: OwnedWriteHalf,
}

type PeerTable = Arc<Mutex<HashMap<u64, Arc<Peer>>>>;

/// A publisher endpoint bound to one TCP port.
///
/// Dropping a `Publisher` stops its accept loop and any in-flight send
/// pipelines continue to completion on the I/O executor independently —
/// they hold their own `Arc<Peer>` references.
pub struct Publisher {
    port: u16,
    compression: Compression,
    peers: PeerTable,
    io_handle: Handle,
    accept_task: tokio::task::JoinHandle<()>,
}

impl Publisher {
    /// Binds a listener on `port` and begins accepting connections.
    /// Fails only if the port cannot be bound.
    pub(crate) fn create(
        io_handle: Handle,
        port: u16,
        compression: Compression,
    ) -> crate::error::Result<Self> {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        let std_listener = std::net::TcpListener::bind(addr)
            .map_err(|source| crate::error::TetherError::Bind { port, source })?;
        std_listener
            .set_nonblocking(true)
            .map_err(|source| crate::error::TetherError::Bind { port, source })?;
        let listener = {
            let _guard = io_handle.enter();
            TcpListener::from_std(std_listener)
        }
        .map_err(|source| crate::error::TetherError::Bind { port, source })?;

        // `port` may have been 0 (let the OS choose); report the port it
        // actually bound so callers (and tests) can find it again.
        let bound_port = listener
            .local_addr()
            .map_err(|source| crate::error::TetherError::Bind { port, source })?
            .port();

        let peers: PeerTable = Arc::new(Mutex::new(HashMap::new()));
        let next_id = Arc::new(AtomicU64::new(0));

        let accept_task = io_handle.spawn(accept_loop(listener, peers.clone(), next_id));

        Ok(Self {
            port: bound_port,
            compression,
            peers,
            io_handle,
            accept_task,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Number of currently-connected peers (Ready or mid-pipeline).
    pub fn peer_count(&self) -> usize {
        self.peers.lock().unwrap().len()
    }

    /// Posts the send attempt onto the I/O executor and returns
    /// immediately. Never blocks or fails; per-peer failures tear the
    /// peer down asynchronously (`spec.md` §4.2 public contract).
    pub fn publish(&self, msg_type_id: u32, message: Bytes) {
        let body = match self.apply_compression(message) {
            Some(body) => body,
            None => return,
        };

        let header = Bytes::copy_from_slice(&encode_header(msg_type_id, body.len() as u32));
        let peers: Vec<(u64, Arc<Peer>)> = self
            .peers
            .lock()
            .unwrap()
            .iter()
            .map(|(id, peer)| (*id, peer.clone()))
            .collect();

        for (id, peer) in peers {
            if peer
                .ready
                .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                let header = header.clone();
                let body = body.clone();
                let peers_table = self.peers.clone();
                self.io_handle
                    .spawn(send_pipeline(id, peer, header, body, peers_table));
            }
        }
    }

    fn apply_compression(&self, message: Bytes) -> Option<Bytes> {
        match self.compression {
            Compression::None => Some(message),
            Compression::Zlib => match compress_zlib(&message) {
                Ok(compressed) => Some(compressed),
                Err(err) => {
                    warn!(error = %err, "dropping message: zlib compression failed");
                    None
                }
            },
            Compression::Jpeg => {
                let (width, height, channels, pixels) = match decode_image_payload(&message) {
                    Ok(parts) => parts,
                    Err(err) => {
                        warn!(error = %err, "dropping message: not a valid image payload");
                        return None;
                    }
                };

                match compress_jpeg(width, height, channels, &pixels) {
                    Ok(jpeg) => Some(jpeg),
                    Err(err) => {
                        warn!(error = %err, "dropping message: jpeg compression failed");
                        None
                    }
                }
            }
        }
    }
}

impl Drop for Publisher {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

/// A perpetual accept loop: every completed accept immediately rearms,
/// whether it succeeded or failed. Terminates only when the I/O
/// executor stops (or the task is aborted on `Publisher` drop).
async fn accept_loop(listener: TcpListener, peers: PeerTable, next_id: Arc<AtomicU64>) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                debug!(%addr, "publisher accepted connection");
                let (reader, writer) = stream.into_split();
                let peer = Arc::new(Peer {
                    addr,
                    io: AsyncMutex::new(PeerIo { reader, writer }),
                    ready: AtomicBool::new(true),
                });
                let id = next_id.fetch_add(1, Ordering::Relaxed);
                peers.lock().unwrap().insert(id, peer);
            }
            Err(err) => {
                warn!(error = %err, "publisher accept failed");
            }
        }
    }
}

/// The Sending-Header → Sending-Body → Awaiting-ACK pipeline for one
/// peer. `AsyncWriteExt::write_all`/`AsyncReadExt::read_u8` already
/// tolerate partial I/O internally, so there is no manual chaining of
/// partial writes and reads here (see `DESIGN.md`).
async fn send_pipeline(id: u64, peer: Arc<Peer>, header: Bytes, body: Bytes, peers: PeerTable) {
    let addr = peer.addr;
    let result = write_frame(&peer, &header, &body).await;

    match result {
        Ok(()) => {
            trace!(%addr, "peer acknowledged message, back to ready");
            peer.ready.store(true, Ordering::Release);
        }
        Err(reason) => {
            warn!(%addr, %reason, "peer pipeline failed, removing peer");
            peers.lock().unwrap().remove(&id);
        }
    }
}

async fn write_frame(peer: &Peer, header: &Bytes, body: &Bytes) -> Result<(), String> {
    let mut io = peer.io.lock().await;

    io.writer
        .write_all(header)
        .await
        .map_err(|e| format!("header write failed: {e}"))?;

    io.writer
        .write_all(body)
        .await
        .map_err(|e| format!("body write failed: {e}"))?;

    let control = io
        .reader
        .read_u8()
        .await
        .map_err(|e| format!("ack read failed: {e}"))?;

    if !crate::wire::is_ack(control) {
        return Err(format!("non-ack control byte: {control:#x}"));
    }

    Ok(())
}
