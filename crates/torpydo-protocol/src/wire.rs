//! TPDP/0.1 literal wire constants.
//!
//! All multi-byte integers on the wire are big-endian. Control markers are
//! sent in the clear; everything the source sends after the nonce exchange
//! (destination length, hostname, port, stream data) is ciphertext.

use std::fmt;

/// Protocol version string.
pub const VERSION: &str = "0.1";

/// The 16-byte hello line opening both sides of a handshake.
pub const HELLO: &[u8; 16] = b"Hello TPDP/0.1\r\n";

/// Acknowledgement marker (two ACK control bytes).
pub const ACK: &[u8; 2] = &[0x06, 0x06];

/// Handshake-complete marker (two ETB control bytes).
pub const ETB: &[u8; 2] = &[0x17, 0x17];

/// X25519 public key length.
pub const PUBLIC_KEY_LEN: usize = 32;

/// AES-CTR nonce length — the full 128-bit initial counter block.
pub const NONCE_LEN: usize = 16;

/// Derived symmetric key length (AES-256).
pub const KEY_LEN: usize = 32;

/// HKDF info string, binding derived keys to this protocol version.
pub const HKDF_INFO: &[u8] = b"TPDP/0.1";

/// Single-byte error codes a node sends before closing a failed handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WireError {
    /// A handshake step exceeded its deadline.
    Timeout = 0x00,
    /// The peer deviated from the expected byte sequence.
    Protocol = 0x01,
    /// The nominated destination could not be reached.
    DestinationConnection = 0x02,
}

impl WireError {
    /// Wire encoding of this error.
    pub const fn as_byte(self) -> u8 {
        self as u8
    }

    /// Decode a wire byte, if it is a known error code.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Self::Timeout),
            0x01 => Some(Self::Protocol),
            0x02 => Some(Self::DestinationConnection),
            _ => None,
        }
    }
}

impl fmt::Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireError::Timeout => write!(f, "timeout"),
            WireError::Protocol => write!(f, "protocol"),
            WireError::DestinationConnection => write!(f, "destination connection"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hello_is_sixteen_bytes_and_versioned() {
        assert_eq!(HELLO.len(), 16);
        assert!(std::str::from_utf8(HELLO).unwrap().contains(VERSION));
    }

    #[test]
    fn wire_error_roundtrip() {
        for code in [
            WireError::Timeout,
            WireError::Protocol,
            WireError::DestinationConnection,
        ] {
            assert_eq!(WireError::from_byte(code.as_byte()), Some(code));
        }
        assert_eq!(WireError::from_byte(0x03), None);
        assert_eq!(WireError::from_byte(0xFF), None);
    }
}
