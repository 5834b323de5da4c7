//! One accepted connection: handshake, destination connect, streaming.

use std::time::Duration;

use tokio::net::TcpStream;
use tracing::{debug, info};
use torpydo_core::io::relay_bidirectional;
use torpydo_protocol::{handshake, WireError};

use crate::error::NodeError;

/// Serve a single source connection to completion.
///
/// The session owns both sockets; on any exit path they are dropped
/// together, which closes them and cancels the peer pump.
pub(crate) async fn serve(
    mut source: TcpStream,
    step_timeout: Duration,
    buffer_size: usize,
    verbose: bool,
) -> Result<(), NodeError> {
    let negotiated = handshake::respond(&mut source, step_timeout).await?;
    if verbose {
        info!(
            destination = %negotiated.host,
            port = negotiated.port,
            "destination negotiated"
        );
    } else {
        debug!(
            destination = %negotiated.host,
            port = negotiated.port,
            "destination negotiated"
        );
    }

    let destination =
        match TcpStream::connect((negotiated.host.as_str(), negotiated.port)).await {
            Ok(stream) => stream,
            Err(e) => {
                handshake::write_error(&mut source, WireError::DestinationConnection).await;
                return Err(NodeError::DestinationUnreachable {
                    host: negotiated.host,
                    port: negotiated.port,
                    source: e,
                });
            }
        };
    let _ = destination.set_nodelay(true);
    handshake::write_etb(&mut source).await.map_err(NodeError::Io)?;

    // Forward peels the source's layer; reverse adds it back. Each half
    // owns its own keystream.
    let (mut layer, mut peel) = negotiated.cipher.split();
    let totals = relay_bidirectional(
        source,
        destination,
        buffer_size,
        move |chunk: &mut [u8]| peel.apply(chunk),
        move |chunk: &mut [u8]| layer.apply(chunk),
    )
    .await?;

    if verbose {
        info!(
            forward_bytes = totals.forward,
            reverse_bytes = totals.reverse,
            "session closed"
        );
    } else {
        debug!(
            forward_bytes = totals.forward,
            reverse_bytes = totals.reverse,
            "session closed"
        );
    }
    Ok(())
}
