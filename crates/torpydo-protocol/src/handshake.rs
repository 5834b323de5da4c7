//! Node-side TPDP handshake responder.
//!
//! Step sequence, exactly and in order:
//!
//! ```text
//! <- hello (16 bytes, literal)        -> hello
//! <- X25519 public key (32)           -> X25519 public key (32)
//! <- AES-CTR nonce (16)               -> ACK
//! <- destination host length (2)†
//! <- destination host (len)†          -> ACK
//! <- destination port (2)†            -> ETB, or error byte
//! ```
//!
//! † ciphertext: decrypted through the receive direction of the freshly
//! negotiated hop cipher before being interpreted.
//!
//! Every read is bounded by `step_timeout`. Expiry writes the timeout
//! error byte and aborts; a malformed step writes the protocol error byte.
//! A peer that closes mid-handshake gets nothing back.

use std::io;
use std::time::Duration;

use rand::rngs::OsRng;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use x25519_dalek::{EphemeralSecret, PublicKey};

use crate::crypto::{derive_hop_key, HopCipher};
use crate::error::HandshakeError;
use crate::wire::{WireError, ACK, ETB, HELLO, NONCE_LEN, PUBLIC_KEY_LEN};

/// Outcome of a successful responder run: the destination the source asked
/// for and the cipher state now shared with it.
pub struct Negotiated {
    /// Per-hop cipher pair. The receive direction has already consumed the
    /// destination announcement (length, hostname, port).
    pub cipher: HopCipher,
    /// Announced destination hostname.
    pub host: String,
    /// Announced destination port.
    pub port: u16,
}

/// Run the node side of the handshake on `stream`.
///
/// On success the stream is positioned just after the second ACK: the
/// caller connects to the negotiated destination and answers with
/// [`write_etb`] on success or [`write_error`] with
/// [`WireError::DestinationConnection`] on failure.
pub async fn respond<S>(stream: &mut S, step_timeout: Duration) -> Result<Negotiated, HandshakeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut hello = [0u8; HELLO.len()];
    read_step(stream, &mut hello, step_timeout).await?;
    if hello != *HELLO {
        write_error(stream, WireError::Protocol).await;
        return Err(HandshakeError::Protocol("bad hello"));
    }
    stream.write_all(HELLO).await?;
    stream.flush().await?;

    let secret = EphemeralSecret::random_from_rng(OsRng);
    let mut peer_public = [0u8; PUBLIC_KEY_LEN];
    read_step(stream, &mut peer_public, step_timeout).await?;
    stream.write_all(PublicKey::from(&secret).as_bytes()).await?;
    stream.flush().await?;

    // Shared secret and derived key are zeroised on drop.
    let shared = secret.diffie_hellman(&PublicKey::from(peer_public));
    let key = derive_hop_key(shared.as_bytes());

    let mut nonce = [0u8; NONCE_LEN];
    read_step(stream, &mut nonce, step_timeout).await?;
    let mut cipher = HopCipher::new(&key, &nonce);

    stream.write_all(ACK).await?;
    stream.flush().await?;

    let mut len_buf = [0u8; 2];
    read_step(stream, &mut len_buf, step_timeout).await?;
    cipher.apply_recv(&mut len_buf);
    let host_len = u16::from_be_bytes(len_buf) as usize;

    let mut host_buf = vec![0u8; host_len];
    read_step(stream, &mut host_buf, step_timeout).await?;
    cipher.apply_recv(&mut host_buf);
    let host = match String::from_utf8(host_buf) {
        Ok(host) => host,
        Err(_) => {
            write_error(stream, WireError::Protocol).await;
            return Err(HandshakeError::Protocol("destination hostname is not utf-8"));
        }
    };

    stream.write_all(ACK).await?;
    stream.flush().await?;

    let mut port_buf = [0u8; 2];
    read_step(stream, &mut port_buf, step_timeout).await?;
    cipher.apply_recv(&mut port_buf);
    let port = u16::from_be_bytes(port_buf);

    Ok(Negotiated { cipher, host, port })
}

/// Send the handshake-complete marker.
pub async fn write_etb<S>(stream: &mut S) -> io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    stream.write_all(ETB).await?;
    stream.flush().await
}

/// Send a single error byte. Write failures are ignored: the session is
/// already being torn down.
pub async fn write_error<S>(stream: &mut S, error: WireError)
where
    S: AsyncWrite + Unpin,
{
    let _ = stream.write_all(&[error.as_byte()]).await;
    let _ = stream.flush().await;
}

async fn read_step<S>(
    stream: &mut S,
    buf: &mut [u8],
    step_timeout: Duration,
) -> Result<(), HandshakeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match timeout(step_timeout, stream.read_exact(buf)).await {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
            // The source is gone; an error byte would reach nobody.
            Err(HandshakeError::ClosedByPeer)
        }
        Ok(Err(e)) => Err(e.into()),
        Err(_) => {
            write_error(stream, WireError::Timeout).await;
            Err(HandshakeError::Timeout)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    /// Drive the source side of a handshake by hand, returning the source
    /// cipher and whatever destination was announced.
    async fn drive_source<S>(stream: &mut S, host: &str, port: u16) -> HopCipher
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        stream.write_all(HELLO).await.unwrap();
        let mut hello = [0u8; 16];
        stream.read_exact(&mut hello).await.unwrap();
        assert_eq!(hello, *HELLO);

        let secret = EphemeralSecret::random_from_rng(OsRng);
        stream
            .write_all(PublicKey::from(&secret).as_bytes())
            .await
            .unwrap();
        let mut node_public = [0u8; PUBLIC_KEY_LEN];
        stream.read_exact(&mut node_public).await.unwrap();

        let shared = secret.diffie_hellman(&PublicKey::from(node_public));
        let key = derive_hop_key(shared.as_bytes());
        let nonce = [7u8; NONCE_LEN];
        stream.write_all(&nonce).await.unwrap();
        let mut cipher = HopCipher::new(&key, &nonce);

        let mut ack = [0u8; 2];
        stream.read_exact(&mut ack).await.unwrap();
        assert_eq!(ack, *ACK);

        let mut announce = Vec::new();
        announce.extend_from_slice(&(host.len() as u16).to_be_bytes());
        announce.extend_from_slice(host.as_bytes());
        cipher.apply_send(&mut announce);
        stream.write_all(&announce).await.unwrap();

        stream.read_exact(&mut ack).await.unwrap();
        assert_eq!(ack, *ACK);

        let mut port_buf = port.to_be_bytes();
        cipher.apply_send(&mut port_buf);
        stream.write_all(&port_buf).await.unwrap();

        cipher
    }

    #[tokio::test]
    async fn negotiates_destination_and_matching_ciphers() {
        let (mut source, mut node) = duplex(1024);

        let respond_task =
            tokio::spawn(
                async move { respond(&mut node, Duration::from_secs(5)).await.unwrap() },
            );

        let mut source_cipher = drive_source(&mut source, "example.com", 443).await;
        let mut negotiated = respond_task.await.unwrap();

        assert_eq!(negotiated.host, "example.com");
        assert_eq!(negotiated.port, 443);

        // The pair must agree on both keystream directions.
        let mut data = *b"post-handshake bytes";
        source_cipher.apply_send(&mut data);
        negotiated.cipher.apply_recv(&mut data);
        assert_eq!(&data, b"post-handshake bytes");

        let mut back = *b"and the reply path";
        negotiated.cipher.apply_send(&mut back);
        source_cipher.apply_recv(&mut back);
        assert_eq!(&back, b"and the reply path");
    }

    #[tokio::test]
    async fn wrong_hello_gets_protocol_error_byte() {
        let (mut source, mut node) = duplex(1024);

        let respond_task =
            tokio::spawn(async move { respond(&mut node, Duration::from_secs(5)).await });

        source.write_all(b"HELLO TPDP/0.1\r\n").await.unwrap();
        let mut byte = [0u8; 1];
        source.read_exact(&mut byte).await.unwrap();
        assert_eq!(byte[0], WireError::Protocol.as_byte());

        assert!(matches!(
            respond_task.await.unwrap(),
            Err(HandshakeError::Protocol(_))
        ));

        // Nothing follows the error byte.
        assert_eq!(source.read(&mut byte).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn stalled_step_gets_timeout_error_byte() {
        let (mut source, mut node) = duplex(1024);

        let respond_task =
            tokio::spawn(async move { respond(&mut node, Duration::from_millis(50)).await });

        // One byte short of a hello, then silence.
        source.write_all(&HELLO[..15]).await.unwrap();

        let mut byte = [0u8; 1];
        source.read_exact(&mut byte).await.unwrap();
        assert_eq!(byte[0], WireError::Timeout.as_byte());
        assert!(matches!(
            respond_task.await.unwrap(),
            Err(HandshakeError::Timeout)
        ));
    }

    #[tokio::test]
    async fn eof_mid_handshake_is_silent() {
        let (mut source, mut node) = duplex(1024);

        let respond_task =
            tokio::spawn(async move { respond(&mut node, Duration::from_secs(5)).await });

        source.write_all(&HELLO[..10]).await.unwrap();
        source.shutdown().await.unwrap();

        assert!(matches!(
            respond_task.await.unwrap(),
            Err(HandshakeError::ClosedByPeer)
        ));

        let mut buf = [0u8; 8];
        assert_eq!(source.read(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn non_utf8_hostname_gets_protocol_error_byte() {
        let (mut source, mut node) = duplex(1024);

        let respond_task =
            tokio::spawn(async move { respond(&mut node, Duration::from_secs(5)).await });

        // Valid steps up to the destination announcement.
        stream_valid_prefix(&mut source, &[0xFF, 0xFE, 0xFD]).await;

        let mut tail = Vec::new();
        source.read_to_end(&mut tail).await.unwrap();
        assert_eq!(tail.last(), Some(&WireError::Protocol.as_byte()));
        assert!(matches!(
            respond_task.await.unwrap(),
            Err(HandshakeError::Protocol(_))
        ));
    }

    /// Complete the clear-text steps and announce `host_bytes` (raw, not
    /// necessarily UTF-8) as the destination hostname.
    async fn stream_valid_prefix<S>(stream: &mut S, host_bytes: &[u8])
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        stream.write_all(HELLO).await.unwrap();
        let mut hello = [0u8; 16];
        stream.read_exact(&mut hello).await.unwrap();

        let secret = EphemeralSecret::random_from_rng(OsRng);
        stream
            .write_all(PublicKey::from(&secret).as_bytes())
            .await
            .unwrap();
        let mut node_public = [0u8; PUBLIC_KEY_LEN];
        stream.read_exact(&mut node_public).await.unwrap();

        let shared = secret.diffie_hellman(&PublicKey::from(node_public));
        let key = derive_hop_key(shared.as_bytes());
        let nonce = [9u8; NONCE_LEN];
        stream.write_all(&nonce).await.unwrap();
        let mut cipher = HopCipher::new(&key, &nonce);

        let mut ack = [0u8; 2];
        stream.read_exact(&mut ack).await.unwrap();

        let mut announce = Vec::new();
        announce.extend_from_slice(&(host_bytes.len() as u16).to_be_bytes());
        announce.extend_from_slice(host_bytes);
        cipher.apply_send(&mut announce);
        stream.write_all(&announce).await.unwrap();
    }
}
