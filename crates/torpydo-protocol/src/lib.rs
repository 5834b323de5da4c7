//! TPDP/0.1 — the TorPyDo Protocol.
//!
//! Wire constants, X25519 → HKDF key derivation, the per-hop AES-256-CTR
//! cipher pair, and the node-side handshake responder. The client-side
//! initiator lives in `torpydo-client`, where the layered tunnel transport
//! it runs over is implemented.

pub mod crypto;
pub mod error;
pub mod handshake;
pub mod wire;

pub use crypto::{derive_hop_key, HopCipher, RecvCipher, SendCipher};
pub use error::HandshakeError;
pub use handshake::{respond, write_error, write_etb, Negotiated};
pub use wire::{WireError, ACK, ETB, HELLO, HKDF_INFO, KEY_LEN, NONCE_LEN, PUBLIC_KEY_LEN};
