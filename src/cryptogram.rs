//! Mutual-authentication cryptograms (C3): card/host cryptograms for every
//! protocol, plus SCP03's pseudo-random card challenge.
//!
//! A cryptogram is a short authenticator the card and host exchange to prove
//! each side derived the same session keys from the same challenges. SCP01
//! and SCP02 share one construction (Retail-MAC under the session encryption
//! key); SCP03 builds its own KDF-shaped input and uses AES-CMAC, truncated
//! to 8 bytes.

use tracing::{debug, trace};

use crate::constants::{MAX_INVOKING_AID_LENGTH, scp03_derivation};
use crate::error::{Error, Result};
use crate::primitives;

/// SCP01 card and host cryptograms.
///
/// Both are a Retail-MAC under the session encryption key (`S_ENC`) with a
/// zero ICV over the two challenges concatenated whole; they differ only in
/// operand order.
pub mod scp01 {
    use super::*;

    /// `cardCryptogram = RetailMAC(S_ENC, hostChallenge ‖ cardChallenge)`.
    pub fn card_cryptogram(
        s_enc: &[u8; 16],
        host_challenge: &[u8; 8],
        card_challenge: &[u8; 8],
    ) -> Result<[u8; 8]> {
        let mut msg = [0u8; 16];
        msg[..8].copy_from_slice(host_challenge);
        msg[8..].copy_from_slice(card_challenge);
        let mac = primitives::retail_mac(s_enc, &primitives::ZERO_ICV_8, &msg)?;
        trace!("computed SCP01 card cryptogram");
        Ok(mac)
    }

    /// `hostCryptogram = RetailMAC(S_ENC, cardChallenge ‖ hostChallenge)`.
    pub fn host_cryptogram(
        s_enc: &[u8; 16],
        card_challenge: &[u8; 8],
        host_challenge: &[u8; 8],
    ) -> Result<[u8; 8]> {
        let mut msg = [0u8; 16];
        msg[..8].copy_from_slice(card_challenge);
        msg[8..].copy_from_slice(host_challenge);
        let mac = primitives::retail_mac(s_enc, &primitives::ZERO_ICV_8, &msg)?;
        trace!("computed SCP01 host cryptogram");
        Ok(mac)
    }
}

/// SCP02 card and host cryptograms.
///
/// Also a Retail-MAC under `S_ENC` with a zero ICV, but the card challenge
/// only contributes its last 6 bytes, and the card's 2-byte sequence
/// counter (the card challenge's own first 2 bytes) fills the gap.
pub mod scp02 {
    use super::*;

    /// `cardCryptogram = RetailMAC(S_ENC, hostChallenge ‖ sequenceCounter ‖ cardChallenge[2..8])`.
    pub fn card_cryptogram(
        s_enc: &[u8; 16],
        host_challenge: &[u8; 8],
        sequence_counter: &[u8; 2],
        card_challenge: &[u8; 8],
    ) -> Result<[u8; 8]> {
        let mut msg = [0u8; 16];
        msg[..8].copy_from_slice(host_challenge);
        msg[8..10].copy_from_slice(sequence_counter);
        msg[10..].copy_from_slice(&card_challenge[2..]);
        let mac = primitives::retail_mac(s_enc, &primitives::ZERO_ICV_8, &msg)?;
        trace!("computed SCP02 card cryptogram");
        Ok(mac)
    }

    /// `hostCryptogram = RetailMAC(S_ENC, sequenceCounter ‖ cardChallenge[2..8] ‖ hostChallenge)`.
    pub fn host_cryptogram(
        s_enc: &[u8; 16],
        sequence_counter: &[u8; 2],
        card_challenge: &[u8; 8],
        host_challenge: &[u8; 8],
    ) -> Result<[u8; 8]> {
        let mut msg = [0u8; 16];
        msg[..2].copy_from_slice(sequence_counter);
        msg[2..8].copy_from_slice(&card_challenge[2..]);
        msg[8..].copy_from_slice(host_challenge);
        let mac = primitives::retail_mac(s_enc, &primitives::ZERO_ICV_8, &msg)?;
        trace!("computed SCP02 host cryptogram");
        Ok(mac)
    }
}

/// SCP03 cryptograms and pseudo-random card challenge.
///
/// All three share the same derivation-data shape as the session-key KDF
/// (see [`crate::kdf::scp03`]): 11 zero bytes, a 1-byte constant, a 0x00
/// separator, a 2-byte desired-output-length-in-bits field, a 1-byte
/// counter fixed at `0x01`, then a context that varies by purpose. Only the
/// constant, the length field (cryptograms want 64 bits, session keys want
/// 128) and the context differ.
pub mod scp03 {
    use super::*;

    const OUTPUT_LEN_CRYPTOGRAM_BITS: u16 = 0x0040;

    fn derivation_block(constant: u8, output_len_bits: u16, context: &[u8]) -> Vec<u8> {
        let mut block = Vec::with_capacity(16 + context.len());
        block.extend_from_slice(&[0u8; 11]);
        block.push(constant);
        block.push(0x00);
        block.extend_from_slice(&output_len_bits.to_be_bytes());
        block.push(0x01);
        block.extend_from_slice(context);
        block
    }

    /// `cardCryptogram = truncate8(AES-CMAC(S_MAC, block(0x00, hostChallenge ‖ cardChallenge)))`.
    pub fn card_cryptogram(
        s_mac: &[u8; 16],
        host_challenge: &[u8; 8],
        card_challenge: &[u8; 8],
    ) -> Result<[u8; 8]> {
        let mut context = [0u8; 16];
        context[..8].copy_from_slice(host_challenge);
        context[8..].copy_from_slice(card_challenge);
        cryptogram_mac(s_mac, scp03_derivation::CARD_CRYPTOGRAM, &context)
    }

    /// `hostCryptogram = truncate8(AES-CMAC(S_MAC, block(0x01, hostChallenge ‖ cardChallenge)))`.
    pub fn host_cryptogram(
        s_mac: &[u8; 16],
        host_challenge: &[u8; 8],
        card_challenge: &[u8; 8],
    ) -> Result<[u8; 8]> {
        let mut context = [0u8; 16];
        context[..8].copy_from_slice(host_challenge);
        context[8..].copy_from_slice(card_challenge);
        cryptogram_mac(s_mac, scp03_derivation::HOST_CRYPTOGRAM, &context)
    }

    fn cryptogram_mac(key: &[u8; 16], constant: u8, context: &[u8; 16]) -> Result<[u8; 8]> {
        let block = derivation_block(constant, OUTPUT_LEN_CRYPTOGRAM_BITS, context);
        let tag = primitives::aes_cmac(key, &block)?;
        let mut out = [0u8; 8];
        out.copy_from_slice(&tag[..8]);
        trace!(constant, "computed SCP03 cryptogram");
        Ok(out)
    }

    /// Derive a pseudo-random card challenge in lieu of drawing one from a
    /// hardware RNG: `truncate8(AES-CMAC(S_ENC, block(0x02, sequenceCounter
    /// ‖ invokingAID)))`. `invoking_aid` must be at most
    /// [`MAX_INVOKING_AID_LENGTH`] bytes, as on the wire an AID never
    /// exceeds 16 bytes.
    pub fn pseudo_random_card_challenge(
        s_enc: &[u8; 16],
        sequence_counter: &[u8; 3],
        invoking_aid: &[u8],
    ) -> Result<[u8; 8]> {
        if invoking_aid.len() > MAX_INVOKING_AID_LENGTH {
            return Err(Error::Crypt("invoking AID exceeds 16 bytes"));
        }
        let mut context = Vec::with_capacity(3 + invoking_aid.len());
        context.extend_from_slice(sequence_counter);
        context.extend_from_slice(invoking_aid);
        let block = derivation_block(
            scp03_derivation::CARD_CHALLENGE,
            OUTPUT_LEN_CRYPTOGRAM_BITS,
            &context,
        );
        let tag = primitives::aes_cmac(s_enc, &block)?;
        let mut out = [0u8; 8];
        out.copy_from_slice(&tag[..8]);
        debug!(aid_len = invoking_aid.len(), "derived pseudo-random SCP03 card challenge");
        Ok(out)
    }
}
