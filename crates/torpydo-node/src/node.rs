//! Node server: accept loop and pool-index heartbeats.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};
use torpydo_core::{defaults, NodeEndpoint};
use torpydo_pool::wire as pool_wire;

use crate::config::NodeSettings;
use crate::error::NodeError;
use crate::session;

/// A torpydo node.
///
/// Knobs are runtime-settable before [`Node::start`].
pub struct Node {
    host: String,
    port: u16,
    pool_index: Option<NodeEndpoint>,
    handshake_step_timeout: Duration,
    relay_buffer_size: usize,
    verbose: bool,
}

impl Node {
    /// Create a node that will listen on `host:port`. The same pair is
    /// announced to the pool index when one is configured.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            pool_index: None,
            handshake_step_timeout: Duration::from_secs(
                defaults::DEFAULT_HANDSHAKE_STEP_TIMEOUT_SECS,
            ),
            relay_buffer_size: defaults::DEFAULT_RELAY_BUFFER_SIZE,
            verbose: false,
        }
    }

    /// Build a node from a parsed config.
    pub fn from_config(settings: &NodeSettings) -> Self {
        let mut node = Self::new(settings.host.clone(), settings.port);
        if let Some(pool) = &settings.pool_index {
            node.set_pool_index(pool.host.clone(), pool.port);
        }
        node.set_handshake_step_timeout(Duration::from_secs(settings.handshake_step_timeout_secs));
        node.set_relay_buffer_size(settings.relay_buffer_size);
        node.set_log(settings.verbose);
        node
    }

    /// Register with (and heartbeat to) the given pool index.
    pub fn set_pool_index(&mut self, host: impl Into<String>, port: u16) {
        self.pool_index = Some(NodeEndpoint::new(host, port));
    }

    /// Toggle verbose (info-level) session logging.
    pub fn set_log(&mut self, flag: bool) {
        self.verbose = flag;
    }

    /// Per-step handshake timeout.
    pub fn set_handshake_step_timeout(&mut self, timeout: Duration) {
        self.handshake_step_timeout = timeout;
    }

    /// Relay buffer size per direction.
    pub fn set_relay_buffer_size(&mut self, bytes: usize) {
        self.relay_buffer_size = bytes;
    }

    /// Bind the listener, returning a handle that exposes the local
    /// address before serving.
    pub async fn bind(self) -> Result<BoundNode, NodeError> {
        let listener = TcpListener::bind((self.host.as_str(), self.port)).await?;
        Ok(BoundNode {
            listener,
            node: self,
        })
    }

    /// Bind and serve until `shutdown` fires.
    pub async fn start(self, shutdown: CancellationToken) -> Result<(), NodeError> {
        self.bind().await?.serve(shutdown).await
    }
}

/// A node whose listener is bound but not yet serving.
pub struct BoundNode {
    listener: TcpListener,
    node: Node,
}

impl BoundNode {
    /// The bound listen address.
    pub fn local_addr(&self) -> Result<SocketAddr, NodeError> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve sessions until `shutdown` fires.
    pub async fn serve(self, shutdown: CancellationToken) -> Result<(), NodeError> {
        let BoundNode { listener, node } = self;
        info!(host = %node.host, port = node.port, "node listening");

        if let Some(index) = node.pool_index.clone() {
            // Announce the actual bound port, which differs from the
            // configured one when binding to port 0.
            let bound_port = listener.local_addr()?.port();
            let announced = NodeEndpoint::new(node.host.clone(), bound_port);
            tokio::spawn(heartbeat_loop(announced, index, shutdown.clone()));
        }

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("node shutting down");
                    return Ok(());
                }

                accepted = listener.accept() => {
                    let (stream, peer) = accepted?;
                    let _ = stream.set_nodelay(true);
                    let step_timeout = node.handshake_step_timeout;
                    let buffer_size = node.relay_buffer_size;
                    let verbose = node.verbose;
                    if verbose {
                        info!(peer = %peer, "new connection");
                    }
                    tokio::spawn(
                        async move {
                            if let Err(e) =
                                session::serve(stream, step_timeout, buffer_size, verbose).await
                            {
                                debug!(error = %e, "session ended with error");
                            }
                        }
                        .instrument(info_span!("session", peer = %peer)),
                    );
                }
            }
        }
    }
}

/// Announce `announced` to the pool index at `index` until shutdown.
///
/// The index dictates the next heartbeat delay; when it is unreachable or
/// replies garbage, retry after a fixed default instead of dying.
async fn heartbeat_loop(
    announced: NodeEndpoint,
    index: NodeEndpoint,
    shutdown: CancellationToken,
) {
    loop {
        let delay = match send_heartbeat(&announced, &index).await {
            Ok(delay_secs) => {
                debug!(index = %index, delay_secs, "heartbeat acknowledged");
                Duration::from_secs_f64(delay_secs)
            }
            Err(e) => {
                warn!(index = %index, error = %e, "heartbeat failed");
                Duration::from_secs(defaults::DEFAULT_HEARTBEAT_RETRY_SECS)
            }
        };
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

async fn send_heartbeat(
    announced: &NodeEndpoint,
    index: &NodeEndpoint,
) -> std::io::Result<f64> {
    let mut stream = TcpStream::connect((index.host.as_str(), index.port)).await?;
    pool_wire::write_heartbeat(&mut stream, announced).await?;
    pool_wire::read_delay(&mut stream).await
}
