//! Key derivation and per-hop cipher state.

use aes::Aes256;
use cipher::{KeyIvInit, StreamCipher};
use ctr::Ctr128BE;
use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::wire::{HKDF_INFO, KEY_LEN, NONCE_LEN};

/// AES-256 in CTR mode with a 128-bit big-endian counter. The 16-byte
/// nonce is the full initial counter block.
type Aes256Ctr = Ctr128BE<Aes256>;

/// Derive the 32-byte session key from an X25519 shared secret.
///
/// HKDF-SHA256, no salt, info pinned to the protocol version so keys from
/// different protocol revisions can never collide.
pub fn derive_hop_key(shared_secret: &[u8; 32]) -> Zeroizing<[u8; KEY_LEN]> {
    let hk = Hkdf::<Sha256>::new(None, shared_secret);
    let mut key = [0u8; KEY_LEN];
    hk.expand(HKDF_INFO, &mut key)
        .expect("32 bytes is a valid HKDF-SHA256 output length");
    Zeroizing::new(key)
}

/// Stateful cipher pair for one hop.
///
/// Both directions start from the same key and nonce with the counter at
/// zero and then advance independently, one with the bytes sent toward the
/// destination and one with the bytes received from it. A single keystream
/// must never serve both directions: the counters would collide.
pub struct HopCipher {
    send: Aes256Ctr,
    recv: Aes256Ctr,
}

impl HopCipher {
    /// Build the cipher pair from a derived key and the source-chosen nonce.
    pub fn new(key: &[u8; KEY_LEN], nonce: &[u8; NONCE_LEN]) -> Self {
        Self {
            send: Aes256Ctr::new(key.into(), nonce.into()),
            recv: Aes256Ctr::new(key.into(), nonce.into()),
        }
    }

    /// Advance the send-direction keystream over `data`, in place.
    pub fn apply_send(&mut self, data: &mut [u8]) {
        self.send.apply_keystream(data);
    }

    /// Advance the receive-direction keystream over `data`, in place.
    pub fn apply_recv(&mut self, data: &mut [u8]) {
        self.recv.apply_keystream(data);
    }

    /// Split into independent direction halves, e.g. to hand each half to
    /// one pump of a forwarding session.
    pub fn split(self) -> (SendCipher, RecvCipher) {
        (SendCipher(self.send), RecvCipher(self.recv))
    }
}

/// Send-direction half of a split [`HopCipher`].
pub struct SendCipher(Aes256Ctr);

impl SendCipher {
    /// Advance the keystream over `data`, in place.
    pub fn apply(&mut self, data: &mut [u8]) {
        self.0.apply_keystream(data);
    }
}

/// Receive-direction half of a split [`HopCipher`].
pub struct RecvCipher(Aes256Ctr);

impl RecvCipher {
    /// Advance the keystream over `data`, in place.
    pub fn apply(&mut self, data: &mut [u8]) {
        self.0.apply_keystream(data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;
    use x25519_dalek::{EphemeralSecret, PublicKey};

    fn hop_pair() -> (HopCipher, HopCipher) {
        // Real ECDH on both ends, as in a handshake.
        let a = EphemeralSecret::random_from_rng(OsRng);
        let b = EphemeralSecret::random_from_rng(OsRng);
        let a_pub = PublicKey::from(&a);
        let b_pub = PublicKey::from(&b);

        let key_a = derive_hop_key(a.diffie_hellman(&b_pub).as_bytes());
        let key_b = derive_hop_key(b.diffie_hellman(&a_pub).as_bytes());
        assert_eq!(*key_a, *key_b);

        let nonce = [0x42u8; NONCE_LEN];
        (HopCipher::new(&key_a, &nonce), HopCipher::new(&key_b, &nonce))
    }

    #[test]
    fn both_ends_derive_the_same_key() {
        hop_pair();
    }

    #[test]
    fn different_exchanges_derive_different_keys() {
        let a = EphemeralSecret::random_from_rng(OsRng);
        let b = EphemeralSecret::random_from_rng(OsRng);
        let c = EphemeralSecret::random_from_rng(OsRng);
        let b_pub = PublicKey::from(&b);
        let c_pub = PublicKey::from(&c);

        let ab = derive_hop_key(a.diffie_hellman(&b_pub).as_bytes());
        let cb = derive_hop_key(c.diffie_hellman(&b_pub).as_bytes());
        assert_ne!(*ab, *cb);
    }

    #[test]
    fn send_and_recv_keystreams_stay_in_step_across_chunking() {
        // Encrypt in 7-byte chunks on one side, decrypt in 13-byte chunks
        // on the other: the counters advance per byte, so boundaries must
        // not matter.
        let (mut source, mut node) = hop_pair();

        let plaintext: Vec<u8> = (0..=255u8).collect();
        let mut wire = plaintext.clone();
        for chunk in wire.chunks_mut(7) {
            source.apply_send(chunk);
        }
        assert_ne!(wire, plaintext);

        for chunk in wire.chunks_mut(13) {
            node.apply_recv(chunk);
        }
        assert_eq!(wire, plaintext);
    }

    #[test]
    fn directions_are_independent() {
        // Interleave traffic in both directions; each direction must
        // decrypt correctly regardless of what the other has processed.
        let (mut source, mut node) = hop_pair();

        let mut out1 = *b"request ";
        source.apply_send(&mut out1);
        let mut back1 = *b"reply";
        node.apply_send(&mut back1);
        let mut out2 = *b"more";
        source.apply_send(&mut out2);

        node.apply_recv(&mut out1);
        assert_eq!(&out1, b"request ");
        node.apply_recv(&mut out2);
        assert_eq!(&out2, b"more");
        source.apply_recv(&mut back1);
        assert_eq!(&back1, b"reply");
    }

    #[test]
    fn split_halves_continue_the_same_keystreams() {
        let (mut source, node) = hop_pair();
        let (mut node_send, mut node_recv) = node.split();

        let mut data = *b"streamed through the split";
        source.apply_send(&mut data);
        node_recv.apply(&mut data);
        assert_eq!(&data, b"streamed through the split");

        let mut back = *b"and back again";
        node_send.apply(&mut back);
        source.apply_recv(&mut back);
        assert_eq!(&back, b"and back again");
    }

    #[test]
    fn three_layer_onion_peels_in_path_order() {
        // Client side: three established hops. Outbound data is layered
        // with the hop closest to the destination first, so hop 1 peels
        // the outermost layer, hop 2 the next, hop 3 the last.
        let (mut c1, mut n1) = hop_pair();
        let (mut c2, mut n2) = hop_pair();
        let (mut c3, mut n3) = hop_pair();

        let mut data = *b"A";
        c3.apply_send(&mut data);
        c2.apply_send(&mut data);
        c1.apply_send(&mut data);

        n1.apply_recv(&mut data);
        assert_ne!(&data, b"A");
        n2.apply_recv(&mut data);
        assert_ne!(&data, b"A");
        n3.apply_recv(&mut data);
        assert_eq!(&data, b"A");

        // Inbound: each node layers its reply cipher; the client unwinds
        // in path order (hop 1 first).
        let mut reply = *b"B";
        n3.apply_send(&mut reply);
        n2.apply_send(&mut reply);
        n1.apply_send(&mut reply);

        c1.apply_recv(&mut reply);
        c2.apply_recv(&mut reply);
        c3.apply_recv(&mut reply);
        assert_eq!(&reply, b"B");
    }

    #[test]
    fn partially_peeled_data_is_not_plaintext() {
        let (mut c1, mut n1) = hop_pair();
        let (mut c2, _n2) = hop_pair();

        let mut data = *b"half-peeled";
        c2.apply_send(&mut data);
        c1.apply_send(&mut data);
        n1.apply_recv(&mut data);
        assert_ne!(&data, b"half-peeled");
    }
}
