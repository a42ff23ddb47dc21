//! The subscriber endpoint (`spec.md` §4.3): connects to one remote
//! publisher, reconnecting on failure, and coalesces inbound messages to
//! the latest payload per `msg_type_id` before dispatching them onto the
//! main executor.

use crate::node::Compression;
use crate::wire::{decode_header, encode_ack, HEADER_LEN, MAX_MSG_SIZE};
use bytes::Bytes;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tracing::{debug, trace, warn};

/// Constant reconnect backoff (see `DESIGN.md` Open Question 3).
const RECONNECT_BACKOFF: Duration = Duration::from_millis(30);

/// A handler invoked on the main executor with the `msg_type_id` it was
/// dispatched under and the (possibly decompressed) message body.
pub type Handler = Arc<dyn Fn(u32, Bytes) + Send + Sync>;

type HandlerTable = Arc<Mutex<HashMap<u32, Handler>>>;
type CoalesceBuffer = Arc<Mutex<HashMap<u32, Bytes>>>;

/// A subscriber endpoint connected (or reconnecting) to one remote host.
///
/// Dropping a `Subscriber` stops its connect/receive loop.
pub struct Subscriber {
    target: SocketAddr,
    handlers: HandlerTable,
    receive_task: tokio::task::JoinHandle<()>,
}

impl Subscriber {
    /// Starts the connect-and-receive loop against `target`, dispatching
    /// through `default_handler` unless a more specific handler has been
    /// registered for a given `msg_type_id` via [`Subscriber::on`].
    pub(crate) fn create(
        io_handle: Handle,
        target: SocketAddr,
        compression: Compression,
        dispatch: std::sync::mpsc::Sender<Box<dyn FnOnce() + Send>>,
        default_handler: Handler,
    ) -> Self {
        let handlers: HandlerTable = Arc::new(Mutex::new(HashMap::new()));
        let coalesced: CoalesceBuffer = Arc::new(Mutex::new(HashMap::new()));

        let receive_task = io_handle.spawn(connect_loop(
            target,
            compression,
            handlers.clone(),
            coalesced,
            dispatch,
            default_handler,
        ));

        Self {
            target,
            handlers,
            receive_task,
        }
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }

    /// Registers a handler for one `msg_type_id`, overriding whatever the
    /// node-level default handler would have done for that type.
    pub fn on(&self, msg_type_id: u32, handler: impl Fn(u32, Bytes) + Send + Sync + 'static) {
        self.handlers
            .lock()
            .unwrap()
            .insert(msg_type_id, Arc::new(handler));
    }
}

impl Drop for Subscriber {
    fn drop(&mut self) {
        self.receive_task.abort();
    }
}

/// Connects, runs the receive loop until it errors or the peer closes,
/// then waits [`RECONNECT_BACKOFF`] and tries again, forever.
async fn connect_loop(
    target: SocketAddr,
    compression: Compression,
    handlers: HandlerTable,
    coalesced: CoalesceBuffer,
    dispatch: std::sync::mpsc::Sender<Box<dyn FnOnce() + Send>>,
    default_handler: Handler,
) {
    loop {
        match TcpStream::connect(target).await {
            Ok(stream) => {
                debug!(%target, "subscriber connected");
                let reason = receive_loop(
                    stream,
                    compression,
                    &handlers,
                    &coalesced,
                    &dispatch,
                    &default_handler,
                )
                .await;
                warn!(%target, %reason, "subscriber disconnected, will reconnect");
            }
            Err(err) => {
                trace!(%target, error = %err, "subscriber connect failed, will retry");
            }
        }

        tokio::time::sleep(RECONNECT_BACKOFF).await;
    }
}

/// Reads header → body → (optional decompress) → ACK, coalescing each
/// message into the latest-payload-per-type buffer before handing it to
/// the main executor. Returns a human-readable reason once the
/// connection ends.
async fn receive_loop(
    mut stream: TcpStream,
    compression: Compression,
    handlers: &HandlerTable,
    coalesced: &CoalesceBuffer,
    dispatch: &std::sync::mpsc::Sender<Box<dyn FnOnce() + Send>>,
    default_handler: &Handler,
) -> String {
    let peer_addr = stream.peer_addr().ok();

    loop {
        let mut header_buf = [0u8; HEADER_LEN];
        if let Err(err) = stream.read_exact(&mut header_buf).await {
            return format!("header read failed: {err}");
        }

        let (msg_type_id, msg_size) = decode_header(&header_buf);
        if msg_size > MAX_MSG_SIZE {
            if let Some(addr) = peer_addr {
                let violation = crate::error::TetherError::ProtocolViolation {
                    addr,
                    reason: format!("declared message size {msg_size} exceeds {MAX_MSG_SIZE} byte maximum"),
                };
                warn!(%msg_type_id, error = %violation, "closing connection");
            }
            return format!("declared message size {msg_size} exceeds protocol maximum");
        }

        let mut body = vec![0u8; msg_size as usize];
        if let Err(err) = stream.read_exact(&mut body).await {
            return format!("body read failed: {err}");
        }

        let body = match compression {
            Compression::Zlib => match crate::compression::decompress_zlib(&body) {
                Ok(decompressed) => decompressed,
                Err(err) => {
                    warn!(%msg_type_id, error = %err, "dropping message: zlib decompression failed");
                    if let Err(err) = stream.write_u8(encode_ack()).await {
                        return format!("ack write failed: {err}");
                    }
                    continue;
                }
            },
            Compression::Jpeg => {
                // Encode-only: the subscriber receives the JPEG blob verbatim
                // (`spec.md` §4.6 asymmetry). No decode step here.
                Bytes::from(body)
            }
            Compression::None => Bytes::from(body),
        };

        let prev = coalesced.lock().unwrap().insert(msg_type_id, body);
        if prev.is_none() {
            // A pending entry means a dispatch task is already queued or
            // running for this id and will pick up the newest payload
            // when it runs — posting another one here would leave two
            // tasks racing over the same slot (`spec.md` §4.3/§8).
            schedule_dispatch(msg_type_id, coalesced, handlers, dispatch, default_handler);
        }

        if let Err(err) = stream.write_u8(encode_ack()).await {
            return format!("ack write failed: {err}");
        }
    }
}

/// Pulls the latest coalesced payload for `msg_type_id` (if it is still
/// there — a faster-arriving later message may already have replaced or
/// consumed it) and posts a dispatch closure to the main executor.
fn schedule_dispatch(
    msg_type_id: u32,
    coalesced: &CoalesceBuffer,
    handlers: &HandlerTable,
    dispatch: &std::sync::mpsc::Sender<Box<dyn FnOnce() + Send>>,
    default_handler: &Handler,
) {
    let coalesced = coalesced.clone();
    let handlers = handlers.clone();
    let default_handler = default_handler.clone();

    let job: Box<dyn FnOnce() + Send> = Box::new(move || {
        let payload = coalesced.lock().unwrap().remove(&msg_type_id);
        let Some(payload) = payload else {
            return;
        };

        let specific = handlers.lock().unwrap().get(&msg_type_id).cloned();
        match specific {
            Some(handler) => handler(msg_type_id, payload),
            None => default_handler(msg_type_id, payload),
        }
    });

    let _ = dispatch.send(job);
}
