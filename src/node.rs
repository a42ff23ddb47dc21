//! [`Node`], the crate's entry point (`spec.md` §4.4): owns the I/O
//! executor that runs every `Publisher`/`Subscriber` socket, the main
//! executor queue that user handlers are dispatched onto, and the
//! [`Pacer`] used to hold a caller's loop to a target frequency.

use crate::error::Result;
use crate::pacer::Pacer;
use crate::publisher::Publisher;
use crate::subscriber::{Handler, Subscriber};
use bytes::Bytes;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::runtime::{Builder, Handle};
use tokio::sync::oneshot;
use tracing::debug;

/// Which transform, if any, a publisher applies before sending and a
/// subscriber undoes after receiving (`spec.md` §4.6).
///
/// `Jpeg` is encode-only: a subscriber configured with it receives the
/// raw JPEG blob as-is, with no decode step (see `DESIGN.md` Open
/// Question 5 / `spec.md` Non-goals).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Zlib,
    Jpeg,
}

type DispatchJob = Box<dyn FnOnce() + Send>;

/// Owns the background I/O executor and the main-executor dispatch
/// queue. One `Node` is normally created per process.
pub struct Node {
    io_handle: Handle,
    io_thread: Option<JoinHandle<()>>,
    io_shutdown: Option<oneshot::Sender<()>>,
    dispatch_tx: mpsc::Sender<DispatchJob>,
    dispatch_rx: mpsc::Receiver<DispatchJob>,
    pacer: Pacer,
}

impl Node {
    /// Spins up the background I/O executor thread and prepares the main
    /// executor queue. `target_fps` seeds the node's [`Pacer`], used by
    /// [`Node::sleep`].
    pub fn new(target_fps: f64) -> Self {
        let (handle_tx, handle_rx) = mpsc::channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let io_thread = std::thread::Builder::new()
            .name("tether-io".into())
            .spawn(move || {
                let runtime = Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .expect("failed to start tether I/O executor");

                handle_tx
                    .send(runtime.handle().clone())
                    .expect("node dropped before I/O executor started");

                runtime.block_on(async {
                    let _ = shutdown_rx.await;
                });
                debug!("tether I/O executor shutting down");
            })
            .expect("failed to spawn tether I/O thread");

        let io_handle = handle_rx
            .recv()
            .expect("I/O executor thread died during startup");

        let (dispatch_tx, dispatch_rx) = mpsc::channel();

        Self {
            io_handle,
            io_thread: Some(io_thread),
            io_shutdown: Some(shutdown_tx),
            dispatch_tx,
            dispatch_rx,
            pacer: Pacer::new(target_fps),
        }
    }

    /// Binds a [`Publisher`] to `port` on every local interface.
    pub fn advertise(&self, port: u16, compression: Compression) -> Result<Publisher> {
        Publisher::create(self.io_handle.clone(), port, compression)
    }

    /// Connects a [`Subscriber`] to `host:port`, dispatching received
    /// messages through `handler` on the main executor unless overridden
    /// per-type via [`Subscriber::on`].
    pub fn subscribe(
        &self,
        host: &str,
        port: u16,
        compression: Compression,
        handler: impl Fn(u32, Bytes) + Send + Sync + 'static,
    ) -> Result<Subscriber> {
        let target = resolve(host, port)?;
        let handler: Handler = Arc::new(handler);

        Ok(Subscriber::create(
            self.io_handle.clone(),
            target,
            compression,
            self.dispatch_tx.clone(),
            handler,
        ))
    }

    /// Runs the main executor forever, dispatching each message to its
    /// handler as it arrives. Intended for callers with no loop of their
    /// own to drive; blocks the calling thread permanently, since the
    /// `Node` itself keeps the dispatch channel open for its whole
    /// lifetime.
    pub fn run(&self) {
        while let Ok(job) = self.dispatch_rx.recv() {
            job();
        }
    }

    /// Polls at most one ready main-executor task and returns
    /// immediately, running it if one was queued. Intended for callers
    /// that drive their own loop (e.g. alongside [`Node::sleep`]).
    pub fn run_once(&self) {
        if let Ok(job) = self.dispatch_rx.try_recv() {
            job();
        }
    }

    /// Sleeps out the remainder of the node's pacing period. The first
    /// call in a loop only starts the clock and returns immediately.
    pub async fn sleep(&mut self) {
        self.pacer.sleep().await;
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        if let Some(shutdown) = self.io_shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(thread) = self.io_thread.take() {
            let _ = thread.join();
        }
    }
}

fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    (host, port)
        .to_socket_addrs()
        .map_err(|source| crate::error::TetherError::Resolve {
            host: host.to_string(),
            port,
            source,
        })?
        .next()
        .ok_or_else(|| crate::error::TetherError::Resolve {
            host: host.to_string(),
            port,
            source: std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "host resolved to no addresses",
            ),
        })
}
