//! Readiness listener.
//!
//! Binding the listener is this node's announcement that it is ready.
//! Every accepted connection gets one [`ReadinessReply`] carrying the
//! current phase state, then the connection is closed. Nothing a peer
//! sends is ever read.

use std::net::SocketAddr;
use std::sync::Arc;

use sfkit_proto::{BootResult, PhaseState, ReadinessReply, Role};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::net::create_listen_socket;

pub struct ReadinessListener {
    listener: TcpListener,
    role: Role,
    state: watch::Receiver<PhaseState>,
}

impl ReadinessListener {
    /// Bind the readiness port. A bind failure is fatal for the node.
    pub async fn bind(
        bind_addr: &str,
        port: u16,
        role: Role,
        state: watch::Receiver<PhaseState>,
    ) -> BootResult<Self> {
        let listener = create_listen_socket(bind_addr, port).await?;
        Ok(Self {
            listener,
            role,
            state,
        })
    }

    pub fn local_addr(&self) -> BootResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Start the accept loop in the background.
    pub fn spawn(self) -> BootResult<ListenerHandle> {
        let local_addr = self.local_addr()?;
        let shutdown = Arc::new(Notify::new());
        let task = tokio::spawn(accept_loop(self, shutdown.clone()));
        info!("readiness listener on {}", local_addr);
        Ok(ListenerHandle {
            local_addr,
            shutdown,
            task,
        })
    }
}

/// Handle to a running listener.
pub struct ListenerHandle {
    pub local_addr: SocketAddr,
    shutdown: Arc<Notify>,
    task: JoinHandle<()>,
}

impl ListenerHandle {
    /// Stop accepting and wait for the accept loop to exit.
    pub async fn shutdown(self) {
        self.shutdown.notify_one();
        if let Err(e) = self.task.await {
            error!("readiness listener task failed: {}", e);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

async fn accept_loop(listener: ReadinessListener, shutdown: Arc<Notify>) {
    loop {
        tokio::select! {
            result = listener.listener.accept() => {
                match result {
                    Ok((stream, peer)) => {
                        debug!("readiness probe from {}", peer);
                        let reply = ReadinessReply {
                            role: listener.role,
                            state: *listener.state.borrow(),
                        };
                        tokio::spawn(async move {
                            if let Err(e) = answer(stream, &reply).await {
                                debug!("probe from {} dropped early: {}", peer, e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("accept error: {}", e);
                    }
                }
            }
            _ = shutdown.notified() => {
                info!("readiness listener shutting down");
                break;
            }
        }
    }
}

async fn answer(mut stream: TcpStream, reply: &ReadinessReply) -> BootResult<()> {
    let frame = reply.encode()?;
    stream.write_all(&frame).await?;
    stream.shutdown().await?;
    Ok(())
}
