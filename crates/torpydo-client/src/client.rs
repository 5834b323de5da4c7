//! Client implementation: node cache, path construction, layered I/O.

use std::collections::HashSet;

use rand::rngs::OsRng;
use rand::seq::IteratorRandom;
use rand::RngCore;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;
use torpydo_core::NodeEndpoint;
use torpydo_pool::wire as pool_wire;
use torpydo_protocol::{
    derive_hop_key, HopCipher, WireError, ACK, ETB, HELLO, NONCE_LEN, PUBLIC_KEY_LEN,
};
use x25519_dalek::{EphemeralSecret, PublicKey};

use crate::error::ClientError;

/// A torpydo client.
///
/// A client owns at most one path at a time: the socket to the first hop
/// plus one [`HopCipher`] per completed handshake, ordered first hop
/// first. Outbound data is layered innermost-first (the hop closest to
/// the destination), inbound data is unwound in path order.
pub struct Client {
    known_nodes: HashSet<NodeEndpoint>,
    stream: Option<TcpStream>,
    hops: Vec<HopCipher>,
}

impl Client {
    pub fn new() -> Self {
        Self {
            known_nodes: HashSet::new(),
            stream: None,
            hops: Vec::new(),
        }
    }

    /// Nodes currently known to this client.
    pub fn known_nodes(&self) -> &HashSet<NodeEndpoint> {
        &self.known_nodes
    }

    /// Number of completed hop handshakes on the current path.
    pub fn path_len(&self) -> usize {
        self.hops.len()
    }

    /// Fetch the listing from a pool index and union it into the local
    /// cache. Returns how many previously unknown nodes were added.
    pub async fn sync_nodes_list(&mut self, host: &str, port: u16) -> Result<usize, ClientError> {
        let mut stream = TcpStream::connect((host, port)).await?;
        pool_wire::write_list_request(&mut stream).await?;
        let listing = pool_wire::read_listing(&mut stream).await?;

        let mut added = 0;
        for endpoint in listing {
            if self.known_nodes.insert(endpoint) {
                added += 1;
            }
        }
        debug!(added, total = self.known_nodes.len(), "node list synced");
        Ok(added)
    }

    /// Empty the local node cache.
    pub fn purge_nodes_list(&mut self) {
        self.known_nodes.clear();
    }

    /// Open the raw TCP connection to the first hop. Any previous path is
    /// dropped; hop keys are established by [`Client::next_destination`].
    pub async fn connect(&mut self, host: &str, port: u16) -> Result<(), ClientError> {
        self.close().await?;
        let stream = TcpStream::connect((host, port)).await?;
        let _ = stream.set_nodelay(true);
        self.stream = Some(stream);
        Ok(())
    }

    /// Extend the path to `host:port`: handshake with the node currently
    /// at the end of the tunnel, announcing `host:port` as its
    /// destination. Every handshake byte travels through the layers
    /// already established, so each hop only ever sees a handshake bound
    /// for "its" destination.
    ///
    /// On success the tunnel ends at `host:port` and the path has gained
    /// one hop key.
    pub async fn next_destination(&mut self, host: &str, port: u16) -> Result<(), ClientError> {
        if self.stream.is_none() {
            return Err(ClientError::NotConnected);
        }
        let host_len = u16::try_from(host.len())
            .map_err(|_| ClientError::PathBuild(format!("hostname too long: {} bytes", host.len())))?;

        self.write_layered(HELLO).await?;
        let hello = self.read_exact_layered(HELLO.len()).await?;
        if hello != *HELLO {
            return Err(ClientError::Protocol("bad hello from node"));
        }

        let secret = EphemeralSecret::random_from_rng(OsRng);
        self.write_layered(PublicKey::from(&secret).as_bytes())
            .await?;
        let peer = self.read_exact_layered(PUBLIC_KEY_LEN).await?;
        let mut node_public = [0u8; PUBLIC_KEY_LEN];
        node_public.copy_from_slice(&peer);

        // Fresh shared secret per session; both it and the derived key are
        // zeroised on drop.
        let shared = secret.diffie_hellman(&PublicKey::from(node_public));
        let key = derive_hop_key(shared.as_bytes());

        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);
        self.write_layered(&nonce).await?;
        let mut hop = HopCipher::new(&key, &nonce);

        let ack = self.read_exact_layered(ACK.len()).await?;
        if ack != *ACK {
            return Err(ClientError::Protocol("missing ack after nonce"));
        }

        // Destination announcement: length, hostname, port — all
        // ciphertext under the new hop's send keystream before the outer
        // layers are added.
        let mut announce = Vec::with_capacity(2 + host.len());
        announce.extend_from_slice(&host_len.to_be_bytes());
        announce.extend_from_slice(host.as_bytes());
        hop.apply_send(&mut announce);
        self.write_layered(&announce).await?;

        let ack = self.read_exact_layered(ACK.len()).await?;
        if ack != *ACK {
            return Err(ClientError::Protocol("missing ack after destination host"));
        }

        let mut port_buf = port.to_be_bytes();
        hop.apply_send(&mut port_buf);
        self.write_layered(&port_buf).await?;

        let etb = self.read_exact_layered(ETB.len()).await?;
        if etb != *ETB {
            return Err(ClientError::Protocol("handshake not confirmed"));
        }

        self.hops.push(hop);
        debug!(destination = %host, port, hops = self.hops.len(), "path extended");
        Ok(())
    }

    /// Build a path through `n` distinct random known nodes to the final
    /// destination `host:port`.
    ///
    /// Fails before opening any socket when fewer than `n` nodes are
    /// known. On success the path holds `n` hop keys and the tunnel ends
    /// at the destination.
    pub async fn random_path_to_destination(
        &mut self,
        host: &str,
        port: u16,
        n: usize,
    ) -> Result<(), ClientError> {
        if n == 0 {
            // Zero intermediates: a plain connection to the destination.
            return self.connect(host, port).await;
        }
        if self.known_nodes.len() < n {
            return Err(ClientError::PathBuild(format!(
                "need {n} nodes, know {}",
                self.known_nodes.len()
            )));
        }

        // Uniform sample without replacement; order within the sample is
        // itself random.
        let route: Vec<NodeEndpoint> = self
            .known_nodes
            .iter()
            .cloned()
            .choose_multiple(&mut OsRng, n);

        self.connect(&route[0].host, route[0].port).await?;
        for hop in &route[1..] {
            self.next_destination(&hop.host, hop.port).await?;
        }
        self.next_destination(host, port).await?;
        Ok(())
    }

    /// Send data to the final destination, adding every hop's layer.
    pub async fn send(&mut self, data: &[u8]) -> Result<(), ClientError> {
        self.write_layered(data).await
    }

    /// Receive up to `buffer_size` bytes from the final destination,
    /// peeling every hop's layer. Returns an empty buffer on EOF.
    pub async fn receive(&mut self, buffer_size: usize) -> Result<Vec<u8>, ClientError> {
        let stream = self.stream.as_mut().ok_or(ClientError::NotConnected)?;
        let mut buf = vec![0u8; buffer_size];
        let n = stream.read(&mut buf).await?;
        buf.truncate(n);
        for hop in self.hops.iter_mut() {
            hop.apply_recv(&mut buf);
        }
        Ok(buf)
    }

    /// Receive exactly `n` decrypted bytes. A stream that closes short is
    /// an error.
    pub async fn receive_exactly(&mut self, n: usize) -> Result<Vec<u8>, ClientError> {
        let stream = self.stream.as_mut().ok_or(ClientError::NotConnected)?;
        let mut buf = vec![0u8; n];
        let mut filled = 0;
        while filled < n {
            let got = stream.read(&mut buf[filled..]).await?;
            if got == 0 {
                return Err(ClientError::ClosedMidStream);
            }
            filled += got;
        }
        for hop in self.hops.iter_mut() {
            hop.apply_recv(&mut buf);
        }
        Ok(buf)
    }

    /// Close the first-hop socket. Teardown cascades down the chain as
    /// each node sees its source close.
    pub async fn close(&mut self) -> Result<(), ClientError> {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
        }
        self.hops.clear();
        Ok(())
    }

    /// Write `data` to the first hop with every established layer applied,
    /// innermost (newest hop) first.
    async fn write_layered(&mut self, data: &[u8]) -> Result<(), ClientError> {
        let stream = self.stream.as_mut().ok_or(ClientError::NotConnected)?;
        let mut buf = data.to_vec();
        for hop in self.hops.iter_mut().rev() {
            hop.apply_send(&mut buf);
        }
        stream.write_all(&buf).await?;
        Ok(())
    }

    /// Read exactly `n` bytes from the first hop and peel every
    /// established layer, in path order.
    ///
    /// Used during handshakes: when the node closes early, the final byte
    /// it sent (already peeled) may carry one of the wire error codes, and
    /// that code is surfaced as the failure reason.
    async fn read_exact_layered(&mut self, n: usize) -> Result<Vec<u8>, ClientError> {
        let stream = self.stream.as_mut().ok_or(ClientError::NotConnected)?;
        let mut buf = vec![0u8; n];
        let mut filled = 0;
        while filled < n {
            let got = stream.read(&mut buf[filled..]).await?;
            if got == 0 {
                break;
            }
            filled += got;
        }
        buf.truncate(filled);
        for hop in self.hops.iter_mut() {
            hop.apply_recv(&mut buf);
        }
        if filled == n {
            return Ok(buf);
        }
        match buf.last().and_then(|byte| WireError::from_byte(*byte)) {
            Some(code) => Err(ClientError::NodeReported(code)),
            None => Err(ClientError::Protocol(
                "node closed the connection mid-handshake",
            )),
        }
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}
