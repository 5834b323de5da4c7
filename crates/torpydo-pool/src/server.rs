//! Pool index server: accept loop, request handling, eviction sweep.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};
use torpydo_core::defaults;

use crate::config::IndexSettings;
use crate::error::PoolError;
use crate::registry::Registry;
use crate::wire;

/// The pool index service.
///
/// All knobs are runtime-settable before [`PoolIndex::start`].
pub struct PoolIndex {
    host: String,
    port: u16,
    requested_delay: f64,
    deprecation_delay: Duration,
    gc_cycle: Duration,
    verbose: bool,
}

impl PoolIndex {
    /// Create an index that will listen on `host:port`.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            requested_delay: defaults::DEFAULT_REQUESTED_DELAY_SECS,
            deprecation_delay: Duration::from_secs_f64(defaults::DEFAULT_DEPRECATION_DELAY_SECS),
            gc_cycle: Duration::from_secs_f64(defaults::DEFAULT_GC_CYCLE_SECS),
            verbose: false,
        }
    }

    /// Build an index from a parsed config.
    pub fn from_config(settings: &IndexSettings) -> Self {
        let mut index = Self::new(settings.host.clone(), settings.port);
        index.set_requested_delay(settings.requested_delay_secs);
        index.set_deprecation_delay(settings.deprecation_delay_secs);
        index.set_garbage_collector_cycle(settings.gc_cycle_secs);
        index.set_log(settings.verbose);
        index
    }

    /// Toggle verbose (info-level) membership logging.
    pub fn set_log(&mut self, flag: bool) {
        self.verbose = flag;
    }

    /// Delay (seconds) the index asks nodes to wait between heartbeats.
    pub fn set_requested_delay(&mut self, seconds: f64) {
        self.requested_delay = seconds;
    }

    /// Silence (seconds) after which an entry is evicted.
    pub fn set_deprecation_delay(&mut self, seconds: f64) {
        self.deprecation_delay = Duration::from_secs_f64(seconds);
    }

    /// Period (seconds) of the eviction sweep.
    pub fn set_garbage_collector_cycle(&mut self, seconds: f64) {
        self.gc_cycle = Duration::from_secs_f64(seconds);
    }

    /// Bind the listener, returning a handle that exposes the local
    /// address before serving.
    pub async fn bind(self) -> Result<BoundPoolIndex, PoolError> {
        let listener = TcpListener::bind((self.host.as_str(), self.port)).await?;
        Ok(BoundPoolIndex {
            listener,
            index: self,
        })
    }

    /// Bind and serve until `shutdown` fires.
    pub async fn start(self, shutdown: CancellationToken) -> Result<(), PoolError> {
        self.bind().await?.serve(shutdown).await
    }
}

/// A pool index whose listener is bound but not yet serving.
pub struct BoundPoolIndex {
    listener: TcpListener,
    index: PoolIndex,
}

impl BoundPoolIndex {
    /// The bound listen address.
    pub fn local_addr(&self) -> Result<SocketAddr, PoolError> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve requests until `shutdown` fires.
    pub async fn serve(self, shutdown: CancellationToken) -> Result<(), PoolError> {
        let BoundPoolIndex { listener, index } = self;
        info!(
            host = %index.host,
            port = index.port,
            requested_delay_secs = index.requested_delay,
            "pool index listening"
        );
        if index.gc_cycle > index.deprecation_delay {
            warn!(
                gc_cycle_secs = index.gc_cycle.as_secs_f64(),
                deprecation_delay_secs = index.deprecation_delay.as_secs_f64(),
                "gc cycle is longer than the deprecation delay; eviction will lag"
            );
        }

        let registry = Arc::new(Registry::new());

        tokio::spawn(sweep_loop(
            registry.clone(),
            index.gc_cycle,
            index.deprecation_delay,
            index.verbose,
            shutdown.clone(),
        ));

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("pool index shutting down");
                    return Ok(());
                }

                accepted = listener.accept() => {
                    let (stream, peer) = accepted?;
                    let registry = registry.clone();
                    let requested_delay = index.requested_delay;
                    let verbose = index.verbose;
                    tokio::spawn(
                        async move {
                            let request = tokio::time::timeout(
                                Duration::from_secs(defaults::DEFAULT_POOL_REQUEST_TIMEOUT_SECS),
                                handle_request(stream, registry, requested_delay, verbose),
                            );
                            match request.await {
                                Ok(Ok(())) => {}
                                Ok(Err(e)) => debug!(error = %e, "request failed"),
                                Err(_) => debug!("request timed out"),
                            }
                        }
                        .instrument(info_span!("request", peer = %peer)),
                    );
                }
            }
        }
    }
}

async fn handle_request(
    mut stream: TcpStream,
    registry: Arc<Registry>,
    requested_delay: f64,
    verbose: bool,
) -> std::io::Result<()> {
    let mut cmd = [0u8; 1];
    stream.read_exact(&mut cmd).await?;

    match cmd[0] {
        wire::CMD_LIST => {
            let listing = registry.listing();
            stream.write_all(&listing).await?;
            stream.shutdown().await?;
            debug!(bytes = listing.len(), "listing sent");
        }
        wire::CMD_HEARTBEAT => {
            let endpoint = wire::read_heartbeat_body(&mut stream).await?;
            let added = registry.heartbeat(endpoint.clone(), Instant::now());
            if added {
                if verbose {
                    info!(node = %endpoint, "node registered");
                } else {
                    debug!(node = %endpoint, "node registered");
                }
            } else {
                debug!(node = %endpoint, "heartbeat refreshed");
            }
            wire::write_delay(&mut stream, requested_delay).await?;
        }
        other => {
            debug!(command = other, "unknown command");
        }
    }
    Ok(())
}

async fn sweep_loop(
    registry: Arc<Registry>,
    gc_cycle: Duration,
    deprecation_delay: Duration,
    verbose: bool,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = tokio::time::sleep(gc_cycle) => {}
        }
        let evicted = registry.sweep(Instant::now(), deprecation_delay);
        for endpoint in &evicted {
            if verbose {
                info!(node = %endpoint, "node deprecated");
            } else {
                debug!(node = %endpoint, "node deprecated");
            }
        }
    }
}
