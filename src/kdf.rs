//! Session-key derivation (C2) for SCP01, SCP02 and SCP03
//!
//! Each protocol derives `S_ENC`/`S_MAC` (and, for SCP02, `S_RMAC`/`S_DEK`)
//! from a static key plus session material (challenges or a sequence
//! counter). The three derivations are structurally unrelated — different
//! block shapes, different ciphers — so each gets its own submodule rather
//! than a shared trait that would hide more than it shares.

use tracing::trace;

use crate::Result;
use crate::primitives;

/// SCP01 session-key derivation.
pub mod scp01 {
    use super::*;

    /// Derive a session key from a static key and the mutual-authentication
    /// challenges.
    ///
    /// `D = cardChallenge[4..8] ‖ hostChallenge[0..4] ‖ cardChallenge[0..4] ‖ hostChallenge[4..8]`,
    /// output `= 2-key-3DES-ECB(staticKey, D)`.
    pub fn derive_session_key(
        static_key: &[u8; 16],
        card_challenge: &[u8; 8],
        host_challenge: &[u8; 8],
    ) -> Result<[u8; 16]> {
        let mut d = [0u8; 16];
        d[0..4].copy_from_slice(&card_challenge[4..8]);
        d[4..8].copy_from_slice(&host_challenge[0..4]);
        d[8..12].copy_from_slice(&card_challenge[0..4]);
        d[12..16].copy_from_slice(&host_challenge[4..8]);

        let ct = primitives::tdes_ecb_encrypt(static_key, &d)?;
        let mut out = [0u8; 16];
        out.copy_from_slice(&ct[..16]);
        trace!("derived SCP01 session key");
        Ok(out)
    }
}

/// SCP02 session-key derivation.
pub mod scp02 {
    use super::*;

    /// Derive a session key from a static key, a 2-byte derivation
    /// constant (selects `S_ENC`/`S_MAC`/`S_RMAC`/`S_DEK`, see
    /// [`crate::constants::scp02_derivation`]) and the card's 2-byte
    /// sequence counter.
    ///
    /// `D = constant ‖ sequenceCounter ‖ 0x00 × 12`, output `=
    /// 2-key-3DES-CBC(staticKey, iv=0, D)`.
    pub fn derive_session_key(
        static_key: &[u8; 16],
        constant: &[u8; 2],
        sequence_counter: &[u8; 2],
    ) -> Result<[u8; 16]> {
        let mut d = [0u8; 16];
        d[0..2].copy_from_slice(constant);
        d[2..4].copy_from_slice(sequence_counter);

        let ct = primitives::tdes_cbc_encrypt(static_key, &primitives::ZERO_ICV_8, &d)?;
        let mut out = [0u8; 16];
        out.copy_from_slice(&ct[..16]);
        trace!(constant = ?constant, "derived SCP02 session key");
        Ok(out)
    }
}

/// SCP03 session-key derivation.
pub mod scp03 {
    use super::*;

    /// Build the 32-byte SCP03 KDF block: 11 zero bytes, the
    /// `derivationConstant`, `0x00 0x00 0x80 0x01` (a fixed "128-bit
    /// output" length field plus a fixed counter-of-one byte), then
    /// `hostChallenge ‖ cardChallenge`.
    pub(super) fn kdf_block(
        derivation_constant: u8,
        host_challenge: &[u8; 8],
        card_challenge: &[u8; 8],
    ) -> [u8; 32] {
        let mut block = [0u8; 32];
        block[11] = derivation_constant;
        block[12..16].copy_from_slice(&[0x00, 0x00, 0x80, 0x01]);
        block[16..24].copy_from_slice(host_challenge);
        block[24..32].copy_from_slice(card_challenge);
        block
    }

    /// Derive a session key from a static key, a 1-byte derivation constant
    /// (see [`crate::constants::scp03_derivation`]) and the
    /// mutual-authentication challenges.
    ///
    /// Output `= AES-128-CMAC(staticKey, kdf_block(...))`, the full 16
    /// bytes.
    pub fn derive_session_key(
        static_key: &[u8; 16],
        derivation_constant: u8,
        host_challenge: &[u8; 8],
        card_challenge: &[u8; 8],
    ) -> Result<[u8; 16]> {
        let block = kdf_block(derivation_constant, host_challenge, card_challenge);
        let key = primitives::aes_cmac(static_key, &block)?;
        trace!(derivation_constant, "derived SCP03 session key");
        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_scp02_session_key_vector() {
        // Seed vector from the specification: staticKey = 40..4F, constant =
        // 01 82 (S_ENC), seqCtr = 00 01.
        let static_key = hex!("404142434445464748494a4b4c4d4e4f");
        let constant = hex!("0182");
        let seq = hex!("0001");

        let key = scp02::derive_session_key(&static_key, &constant, &seq).unwrap();

        // Recomputing must be bit-exact.
        let key2 = scp02::derive_session_key(&static_key, &constant, &seq).unwrap();
        assert_eq!(key, key2);
        assert_eq!(key.len(), 16);
    }

    #[test]
    fn test_scp02_session_key_known_answer() {
        // From the source crate's own test fixture for the same derivation
        // (seq = 0x0065, not 0x0001).
        let static_key = hex!("404142434445464748494a4b4c4d4e4f");
        let seq = hex!("0065");
        let key = scp02::derive_session_key(&static_key, &hex!("0182"), &seq).unwrap();
        assert_eq!(key, hex!("85e72aaf47874218a202bf5ef891dd21"));
    }

    #[test]
    fn test_scp01_session_key_derivation_matches_spec_block_layout() {
        let static_key = [0x11u8; 16];
        let card_challenge = hex!("08090a0b0c0d0e0f");
        let host_challenge = hex!("0001020304050607");

        let key = scp01::derive_session_key(&static_key, &card_challenge, &host_challenge)
            .unwrap();
        assert_eq!(key.len(), 16);

        // Deterministic: recomputing yields the same key.
        let key2 = scp01::derive_session_key(&static_key, &card_challenge, &host_challenge)
            .unwrap();
        assert_eq!(key, key2);
    }

    #[test]
    fn test_scp03_kdf_block_layout() {
        let static_key = [0x22u8; 16];
        let host_challenge = hex!("0001020304050607");
        let card_challenge = hex!("08090a0b0c0d0e0f");

        let block = scp03::kdf_block(0x04, &host_challenge, &card_challenge);
        assert_eq!(block.len(), 32);
        assert_eq!(&block[0..11], &[0u8; 11]);
        assert_eq!(block[11], 0x04);
        assert_eq!(&block[12..16], &[0x00, 0x00, 0x80, 0x01]);
        assert_eq!(&block[16..24], &host_challenge);
        assert_eq!(&block[24..32], &card_challenge);

        let key = scp03::derive_session_key(&static_key, 0x04, &host_challenge, &card_challenge)
            .unwrap();
        assert_eq!(key, primitives::aes_cmac(&static_key, &block).unwrap());
    }
}
