//! Cryptographic primitives shared by every Secure Channel Protocol variant.
//!
//! Each function here implements exactly one contract from the GlobalPlatform
//! cryptographic toolbox: a block-cipher mode, a MAC construction, a hash, or
//! a signature. Protocol-specific meaning (which key, which padding rule
//! applies to which protocol) lives one layer up, in [`crate::kdf`],
//! [`crate::cryptogram`] and [`crate::wrapper`].

use aes::Aes128;
use cipher::{
    BlockEncrypt, BlockEncryptMut, KeyInit, KeyIvInit,
    generic_array::GenericArray,
};
use cmac::{Cmac, Mac as CmacTrait};
use des::{Des, TdesEde3};
use pkcs8::DecodePrivateKey;
use rsa::{
    RsaPrivateKey, RsaPublicKey,
    pkcs1v15::SigningKey,
    signature::{SignatureEncoding, Signer},
};
use sha1::{Digest, Sha1};

use crate::error::{Error, Result};

/// All-zero 8-byte Initial Chaining Value used whenever a protocol calls for
/// a "zero ICV" starting point. This is a wire constant, not a default: the
/// source hard-codes it module-wide, and so do we.
pub const ZERO_ICV_8: [u8; 8] = [0u8; 8];

/// All-zero 16-byte chaining value, the SCP03 equivalent of [`ZERO_ICV_8`].
pub const ZERO_ICV_16: [u8; 16] = [0u8; 16];

/// The ISO/IEC 9797-1 padding prefix: `0x80` followed by zero bytes.
const PAD_PREFIX: u8 = 0x80;

/// Pads `data` to a multiple of `block_size` using ISO/IEC 9797-1 method 2
/// (`0x80` then zeros). Unlike [`pad_always`], no padding is appended when
/// `data` is already block-aligned.
fn pad_if_needed(data: &[u8], block_size: usize) -> Vec<u8> {
    let mut out = data.to_vec();
    if out.len() % block_size != 0 {
        out.push(PAD_PREFIX);
        while out.len() % block_size != 0 {
            out.push(0);
        }
    }
    out
}

/// Pads `data` to a multiple of `block_size`, always appending at least one
/// padding block even when `data` is already aligned. This is the SCP02-CBC
/// and Retail-MAC padding rule.
fn pad_always(data: &[u8], block_size: usize) -> Vec<u8> {
    let mut out = data.to_vec();
    out.push(PAD_PREFIX);
    while out.len() % block_size != 0 {
        out.push(0);
    }
    out
}

/// DES-ECB single-key encryption of `msg`, pad-if-needed to 8-byte blocks.
pub fn des_ecb_encrypt(key: &[u8; 8], msg: &[u8]) -> Result<Vec<u8>> {
    let padded = pad_if_needed(msg, 8);
    let cipher = Des::new_from_slice(key).map_err(|_| Error::Crypt("invalid DES key"))?;
    let mut out = padded;
    for block in out.chunks_mut(8) {
        let ga = GenericArray::from_mut_slice(block);
        cipher.encrypt_block(ga);
    }
    Ok(out)
}

/// 2-key-3DES-ECB encryption of `msg` under a 16-byte key, pad-if-needed.
pub fn tdes_ecb_encrypt(key: &[u8; 16], msg: &[u8]) -> Result<Vec<u8>> {
    let padded = pad_if_needed(msg, 8);
    let key24 = resize_key_24(key);
    let cipher = TdesEde3::new(GenericArray::from_slice(&key24));
    let mut out = padded;
    for block in out.chunks_mut(8) {
        let ga = GenericArray::from_mut_slice(block);
        cipher.encrypt_block(ga);
    }
    Ok(out)
}

/// 2-key-3DES-CBC encryption of `msg` under a 16-byte key and 8-byte IV,
/// pad-if-needed.
pub fn tdes_cbc_encrypt(key: &[u8; 16], iv: &[u8; 8], msg: &[u8]) -> Result<Vec<u8>> {
    let padded = pad_if_needed(msg, 8);
    cbc_encrypt_3des(key, iv, &padded)
}

/// SCP02-CBC encryption: 2-key-3DES-CBC with padding *always* appended, even
/// when `msg` is already a multiple of the block size.
pub fn scp02_cbc_encrypt(key: &[u8; 16], msg: &[u8]) -> Result<Vec<u8>> {
    let padded = pad_always(msg, 8);
    cbc_encrypt_3des(key, &ZERO_ICV_8, &padded)
}

fn cbc_encrypt_3des(key: &[u8; 16], iv: &[u8; 8], padded: &[u8]) -> Result<Vec<u8>> {
    let key24 = resize_key_24(key);
    let mut encryptor = cbc::Encryptor::<TdesEde3>::new(
        GenericArray::from_slice(&key24),
        GenericArray::from_slice(iv),
    );
    let mut out = padded.to_vec();
    for block in out.chunks_mut(8) {
        let ga = GenericArray::from_mut_slice(block);
        encryptor.encrypt_block_mut(ga);
    }
    Ok(out)
}

/// Retail-MAC (ISO/IEC 9797-1 algorithm 3): always-pad, single-DES-CBC under
/// the left half-key over every block but the last, 2-key-3DES-CBC over the
/// last block. Returns the final 8-byte ciphertext block.
pub fn retail_mac(key: &[u8; 16], iv: &[u8; 8], msg: &[u8]) -> Result<[u8; 8]> {
    retail_mac_with_halves(&key[..8], key, iv, msg)
}

/// Right-half Retail-MAC variant: the single-DES pass uses the *right* half
/// of the key instead of the left, the final 3DES pass uses the full key,
/// and the chaining value is always the zero ICV.
pub fn retail_mac_right_half(key: &[u8; 16], msg: &[u8]) -> Result<[u8; 8]> {
    retail_mac_with_halves(&key[8..16], key, &ZERO_ICV_8, msg)
}

fn retail_mac_with_halves(
    des_half: &[u8],
    full_key: &[u8; 16],
    iv: &[u8; 8],
    msg: &[u8],
) -> Result<[u8; 8]> {
    let padded = pad_always(msg, 8);
    let des_cipher = Des::new_from_slice(des_half).map_err(|_| Error::Crypt("invalid DES half-key"))?;
    let key24 = resize_key_24(full_key);
    let tdes_cipher = TdesEde3::new(GenericArray::from_slice(&key24));

    let mut chain = *iv;
    let (all_but_last, last) = padded.split_at(padded.len() - 8);

    for block in all_but_last.chunks(8) {
        let mut buf = [0u8; 8];
        for i in 0..8 {
            buf[i] = block[i] ^ chain[i];
        }
        let ga = GenericArray::from_mut_slice(&mut buf);
        des_cipher.encrypt_block(ga);
        chain = buf;
    }

    let mut buf = [0u8; 8];
    for i in 0..8 {
        buf[i] = last[i] ^ chain[i];
    }
    let ga = GenericArray::from_mut_slice(&mut buf);
    tdes_cipher.encrypt_block(ga);
    Ok(buf)
}

/// Plain 3DES-CBC MAC: pad-if-needed, encrypt every block in CBC mode under
/// the full 2-key-3DES key, return the last ciphertext block. Used as the
/// SCP01 command MAC.
pub fn tdes_cbc_mac(key: &[u8; 16], iv: &[u8; 8], msg: &[u8]) -> Result<[u8; 8]> {
    let padded = pad_if_needed(msg, 8);
    let ct = cbc_encrypt_3des(key, iv, &padded)?;
    let mut out = [0u8; 8];
    out.copy_from_slice(&ct[ct.len() - 8..]);
    Ok(out)
}

/// AES-128-CMAC (NIST SP 800-38B) over `msg`.
pub fn aes_cmac(key: &[u8; 16], msg: &[u8]) -> Result<[u8; 16]> {
    let mut mac = <Cmac<Aes128> as CmacTrait>::new_from_slice(key)
        .map_err(|_| Error::Crypt("invalid AES-CMAC key"))?;
    mac.update(msg);
    let tag = mac.finalize().into_bytes();
    let mut out = [0u8; 16];
    out.copy_from_slice(&tag);
    Ok(out)
}

/// AES-128-CMAC with a prepended 16-byte chaining value: the MAC input is
/// `chain ‖ msg`. Returns the full 16-byte tag; callers transmit the first 8
/// bytes and keep the full 16 as the next chain.
pub fn aes_cmac_chained(key: &[u8; 16], chain: &[u8; 16], msg: &[u8]) -> Result<[u8; 16]> {
    let mut input = Vec::with_capacity(16 + msg.len());
    input.extend_from_slice(chain);
    input.extend_from_slice(msg);
    aes_cmac(key, &input)
}

/// SHA-1 of `msg`.
pub fn sha1(msg: &[u8]) -> [u8; 20] {
    let mut hasher = Sha1::new();
    hasher.update(msg);
    hasher.finalize().into()
}

/// Random bytes from a cryptographically secure source.
pub fn random_bytes(n: usize) -> Vec<u8> {
    use rand::RngCore;
    let mut buf = vec![0u8; n];
    rand::thread_rng().fill_bytes(&mut buf);
    buf
}

/// Sign `msg` with RSA-SHA1 PKCS#1 v1.5 using the private key in the PEM
/// file at `path`, decrypted with `passphrase`. Fails with
/// [`Error::InvalidFilename`] if the file cannot be read,
/// [`Error::InvalidPassword`] if the passphrase does not decrypt it, and
/// [`Error::InsufficientBuffer`] if the key is larger than 1024 bits (the
/// fixed 128-byte signature buffer cannot hold the result).
pub fn rsa_sign_pem(path: &std::path::Path, passphrase: &str, msg: &[u8]) -> Result<[u8; 128]> {
    let pem = std::fs::read_to_string(path).map_err(|_| Error::InvalidFilename)?;

    let private_key = if passphrase.is_empty() {
        RsaPrivateKey::from_pkcs8_pem(&pem).map_err(|_| Error::InvalidPassword)?
    } else {
        RsaPrivateKey::from_pkcs8_encrypted_pem(&pem, passphrase.as_bytes())
            .map_err(|_| Error::InvalidPassword)?
    };

    if private_key.size() > 128 {
        return Err(Error::InsufficientBuffer);
    }

    let signing_key = SigningKey::<Sha1>::new(private_key);
    let signature = signing_key.try_sign(msg).map_err(|_| Error::Crypt("RSA signing failed"))?;

    let bytes = signature.to_bytes();
    let mut out = [0u8; 128];
    let start = 128usize.saturating_sub(bytes.len());
    out[start..].copy_from_slice(&bytes);
    Ok(out)
}

/// Read an RSA public key from a PEM file.
pub fn read_rsa_public_key_pem(path: &std::path::Path) -> Result<RsaPublicKey> {
    let pem = std::fs::read_to_string(path).map_err(|_| Error::InvalidFilename)?;
    RsaPublicKey::from_public_key_pem(&pem).map_err(|_| Error::Crypt("invalid RSA public key PEM"))
}

/// Resize a 16-byte 2-key-3DES key to the 24-byte form `RustCrypto`'s
/// `TdesEde3` expects, by repeating the first 8 bytes as the third key.
fn resize_key_24(key: &[u8; 16]) -> [u8; 24] {
    let mut out = [0u8; 24];
    out[..16].copy_from_slice(key);
    out[16..24].copy_from_slice(&key[..8]);
    out
}

/// Encrypts an 8-byte block with single-DES-ECB under `key` (no padding;
/// exactly one block). Used for the ICV-encryption rule in SCP02 i-variants
/// with bit4 set.
pub fn des_ecb_encrypt_block(key: &[u8; 8], block: &[u8; 8]) -> Result<[u8; 8]> {
    let cipher = Des::new_from_slice(key).map_err(|_| Error::Crypt("invalid DES key"))?;
    let mut buf = *block;
    let ga = GenericArray::from_mut_slice(&mut buf);
    cipher.encrypt_block(ga);
    Ok(buf)
}

/// Encrypts a single 8-byte block with 2-key-3DES-ECB under `key` (no
/// padding). Used for the ICV-encryption rule in SCP01 `i15`.
pub fn tdes_ecb_encrypt_block(key: &[u8; 16], block: &[u8; 8]) -> Result<[u8; 8]> {
    let key24 = resize_key_24(key);
    let cipher = TdesEde3::new(GenericArray::from_slice(&key24));
    let mut buf = *block;
    let ga = GenericArray::from_mut_slice(&mut buf);
    cipher.encrypt_block(ga);
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_retail_mac() {
        let key = hex!("5b02e75ad63190aece0622936f11abab");
        let data = hex!("8482010010810b098a8fbb88da");
        let mac = retail_mac(&key, &ZERO_ICV_8, &data).unwrap();
        assert_eq!(mac, hex!("5271d7174a5a166a"));
    }

    #[test]
    fn test_tdes_ecb_resize_key() {
        let key = hex!("404142434445464748494a4b4c4d4e4f");
        assert_eq!(
            resize_key_24(&key),
            hex!("404142434445464748494a4b4c4d4e4f4041424344454647")
        );
    }

    #[test]
    fn test_pad_if_needed_aligned_message_untouched() {
        let data = [0u8; 16];
        assert_eq!(pad_if_needed(&data, 8).len(), 16);
    }

    #[test]
    fn test_pad_if_needed_unaligned_message_padded() {
        let data = [0u8; 10];
        let padded = pad_if_needed(&data, 8);
        assert_eq!(padded.len(), 16);
        assert_eq!(padded[10], 0x80);
    }

    #[test]
    fn test_pad_always_appends_even_when_aligned() {
        let data = [0u8; 16];
        let padded = pad_always(&data, 8);
        assert_eq!(padded.len(), 24);
        assert_eq!(padded[16], 0x80);
    }

    #[test]
    fn test_aes_cmac_deterministic() {
        let key = [0x2bu8; 16];
        let msg = b"some message";
        assert_eq!(aes_cmac(&key, msg).unwrap(), aes_cmac(&key, msg).unwrap());
    }

    #[test]
    fn test_sha1_known_vector() {
        assert_eq!(
            sha1(b"abc"),
            hex!("a9993e364706816aba3e25717850c26c9cd0d89")
        );
    }
}
