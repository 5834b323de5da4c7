//! Pool index wire protocol: encode and decode.
//!
//! One request per TCP connection, opened by a single command byte:
//!
//! ```text
//! list request:       0x00
//! list reply:         ( host-bytes 0x00 port-be16 )* then EOF
//!
//! heartbeat request:  0x01 host-bytes 0x00 port-be16
//! heartbeat reply:    requested delay, IEEE-754 f64 big-endian (seconds)
//! ```
//!
//! Host fields are bounded at [`MAX_HOST_LEN`] bytes and must be UTF-8;
//! a malformed request closes the connection.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use torpydo_core::NodeEndpoint;

/// Command byte: request the current node listing.
pub const CMD_LIST: u8 = 0x00;
/// Command byte: register/refresh a node.
pub const CMD_HEARTBEAT: u8 = 0x01;
/// Longest accepted host field.
pub const MAX_HOST_LEN: usize = 255;

/// Send a complete heartbeat request for `endpoint`.
pub async fn write_heartbeat<W>(writer: &mut W, endpoint: &NodeEndpoint) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    if endpoint.host.len() > MAX_HOST_LEN || endpoint.host.as_bytes().contains(&0) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "host name not encodable",
        ));
    }
    let mut buf = Vec::with_capacity(1 + endpoint.host.len() + 3);
    buf.push(CMD_HEARTBEAT);
    buf.extend_from_slice(endpoint.host.as_bytes());
    buf.push(0);
    buf.extend_from_slice(&endpoint.port.to_be_bytes());
    writer.write_all(&buf).await?;
    writer.flush().await
}

/// Read a heartbeat reply: the index's requested delay in seconds.
pub async fn read_delay<R>(reader: &mut R) -> io::Result<f64>
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf).await?;
    let delay = f64::from_be_bytes(buf);
    if !delay.is_finite() || delay < 0.0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "requested delay out of range",
        ));
    }
    Ok(delay)
}

/// Send a heartbeat reply.
pub async fn write_delay<W>(writer: &mut W, delay_secs: f64) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&delay_secs.to_be_bytes()).await?;
    writer.flush().await
}

/// Send a list request.
pub async fn write_list_request<W>(writer: &mut W) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&[CMD_LIST]).await?;
    writer.flush().await
}

/// Read the body of a heartbeat request (everything after the command byte).
pub async fn read_heartbeat_body<R>(reader: &mut R) -> io::Result<NodeEndpoint>
where
    R: AsyncRead + Unpin,
{
    let mut host = Vec::with_capacity(32);
    loop {
        let byte = reader.read_u8().await?;
        if byte == 0 {
            break;
        }
        host.push(byte);
        if host.len() > MAX_HOST_LEN {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "host too long"));
        }
    }
    let host = String::from_utf8(host)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "host not utf-8"))?;
    let port = reader.read_u16().await?;
    Ok(NodeEndpoint::new(host, port))
}

/// Read a complete listing reply (until EOF) and decode its entries.
pub async fn read_listing<R>(reader: &mut R) -> io::Result<Vec<NodeEndpoint>>
where
    R: AsyncRead + Unpin,
{
    let mut body = Vec::new();
    reader.read_to_end(&mut body).await?;
    parse_listing(&body)
}

/// Decode a listing body.
pub fn parse_listing(mut body: &[u8]) -> io::Result<Vec<NodeEndpoint>> {
    let mut entries = Vec::new();
    while !body.is_empty() {
        let sep = body
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "unterminated host"))?;
        if sep > MAX_HOST_LEN {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "host too long"));
        }
        let host = std::str::from_utf8(&body[..sep])
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "host not utf-8"))?;
        let rest = &body[sep + 1..];
        if rest.len() < 2 {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "truncated port"));
        }
        let port = u16::from_be_bytes([rest[0], rest[1]]);
        entries.push(NodeEndpoint::new(host, port));
        body = &rest[2..];
    }
    Ok(entries)
}

/// Encode a listing body from the given endpoints.
pub fn encode_listing<'a, I>(endpoints: I) -> Vec<u8>
where
    I: IntoIterator<Item = &'a NodeEndpoint>,
{
    let mut buf = Vec::new();
    for endpoint in endpoints {
        buf.extend_from_slice(endpoint.host.as_bytes());
        buf.push(0);
        buf.extend_from_slice(&endpoint.port.to_be_bytes());
    }
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn heartbeat_roundtrip() {
        let (mut client, mut server) = duplex(256);

        let endpoint = NodeEndpoint::new("127.0.2.1", 6001);
        write_heartbeat(&mut client, &endpoint).await.unwrap();

        let mut cmd = [0u8; 1];
        server.read_exact(&mut cmd).await.unwrap();
        assert_eq!(cmd[0], CMD_HEARTBEAT);
        let decoded = read_heartbeat_body(&mut server).await.unwrap();
        assert_eq!(decoded, endpoint);

        write_delay(&mut server, 2.5).await.unwrap();
        assert_eq!(read_delay(&mut client).await.unwrap(), 2.5);
    }

    #[tokio::test]
    async fn heartbeat_rejects_overlong_host() {
        let (mut client, _server) = duplex(1024);
        let endpoint = NodeEndpoint::new("x".repeat(MAX_HOST_LEN + 1), 1);
        let err = write_heartbeat(&mut client, &endpoint).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn heartbeat_body_rejects_unterminated_host() {
        let (mut client, mut server) = duplex(1024);
        client.write_all(&[b'a'; MAX_HOST_LEN + 1]).await.unwrap();
        let err = read_heartbeat_body(&mut server).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn delay_rejects_non_finite_values() {
        let (mut client, mut server) = duplex(64);
        client
            .write_all(&f64::NAN.to_be_bytes())
            .await
            .unwrap();
        assert!(read_delay(&mut server).await.is_err());

        client.write_all(&(-1.0f64).to_be_bytes()).await.unwrap();
        assert!(read_delay(&mut server).await.is_err());
    }

    #[test]
    fn listing_roundtrip() {
        let entries = vec![
            NodeEndpoint::new("127.0.2.1", 6001),
            NodeEndpoint::new("relay.example", 6002),
        ];
        let body = encode_listing(&entries);
        assert_eq!(parse_listing(&body).unwrap(), entries);
    }

    #[test]
    fn empty_listing_is_empty() {
        assert!(parse_listing(&[]).unwrap().is_empty());
    }

    #[test]
    fn listing_rejects_truncated_port() {
        let mut body = encode_listing(&[NodeEndpoint::new("a", 1)]);
        body.pop();
        assert!(parse_listing(&body).is_err());
    }

    #[test]
    fn listing_rejects_unterminated_host() {
        assert!(parse_listing(b"no-terminator").is_err());
    }
}
