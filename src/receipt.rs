//! Confirmation-receipt validation (C5).
//!
//! After a DELETE/INSTALL/LOAD management command the card returns an
//! 8-byte Retail-MAC "receipt" proving it executed the command. Each kind
//! binds a different set of length-prefixed fields after a fixed `0x02`
//! tag and the 16-bit confirmation counter. Comparison against the
//! card-supplied receipt runs through [`subtle::ConstantTimeEq`] so a
//! partial match can't be distinguished from a total mismatch by timing.

use subtle::ConstantTimeEq;
use tracing::{trace, warn};

use crate::error::{Error, Result};
use crate::primitives;

const RECEIPT_TAG: u8 = 0x02;

fn build_validation_data(confirmation_counter: u16, fields: &[&[u8]]) -> Vec<u8> {
    let mut data = vec![
        RECEIPT_TAG,
        (confirmation_counter >> 8) as u8,
        confirmation_counter as u8,
    ];
    for field in fields {
        data.push(field.len() as u8);
        data.extend_from_slice(field);
    }
    data
}

fn check_receipt(receipt_key: &[u8; 16], data: &[u8], receipt: &[u8; 8]) -> Result<()> {
    let computed = primitives::retail_mac(receipt_key, &primitives::ZERO_ICV_8, data)?;
    if bool::from(computed.ct_eq(receipt)) {
        trace!(validation_data_len = data.len(), "receipt validated");
        Ok(())
    } else {
        warn!(validation_data_len = data.len(), "receipt mismatch");
        Err(Error::ValidationFailed)
    }
}

/// Validate a DELETE confirmation receipt:
/// `[0x02, ctrHi, ctrLo, |uid|, uid, |AID|, AID]`.
pub fn validate_delete_receipt(
    receipt_key: &[u8; 16],
    confirmation_counter: u16,
    card_unique_data: &[u8],
    aid: &[u8],
    receipt: &[u8; 8],
) -> Result<()> {
    let data = build_validation_data(confirmation_counter, &[card_unique_data, aid]);
    check_receipt(receipt_key, &data, receipt)
}

/// Validate an INSTALL confirmation receipt:
/// `[0x02, ctrHi, ctrLo, |uid|, uid, |loadAID|, loadAID, |appAID|, appAID]`.
pub fn validate_install_receipt(
    receipt_key: &[u8; 16],
    confirmation_counter: u16,
    card_unique_data: &[u8],
    load_aid: &[u8],
    app_aid: &[u8],
    receipt: &[u8; 8],
) -> Result<()> {
    let data =
        build_validation_data(confirmation_counter, &[card_unique_data, load_aid, app_aid]);
    check_receipt(receipt_key, &data, receipt)
}

/// Validate a LOAD confirmation receipt:
/// `[0x02, ctrHi, ctrLo, |uid|, uid, |loadAID|, loadAID, |sdAID|, sdAID]`.
pub fn validate_load_receipt(
    receipt_key: &[u8; 16],
    confirmation_counter: u16,
    card_unique_data: &[u8],
    load_aid: &[u8],
    sd_aid: &[u8],
    receipt: &[u8; 8],
) -> Result<()> {
    let data =
        build_validation_data(confirmation_counter, &[card_unique_data, load_aid, sd_aid]);
    check_receipt(receipt_key, &data, receipt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    const RECEIPT_KEY: [u8; 16] = hex!("404142434445464748494a4b4c4d4e4f");

    #[test]
    fn test_delete_receipt_accepts_hand_computed_mac() {
        let counter = 0x0001u16;
        let uid = hex!("deadbeef");
        let aid = hex!("a000000003000000");

        let data = build_validation_data(counter, &[&uid, &aid]);
        let receipt = primitives::retail_mac(&RECEIPT_KEY, &primitives::ZERO_ICV_8, &data).unwrap();

        assert!(validate_delete_receipt(&RECEIPT_KEY, counter, &uid, &aid, &receipt).is_ok());
    }

    #[test]
    fn test_delete_receipt_rejects_flipped_bit() {
        let counter = 0x0001u16;
        let uid = hex!("deadbeef");
        let aid = hex!("a000000003000000");

        let data = build_validation_data(counter, &[&uid, &aid]);
        let mut receipt = primitives::retail_mac(&RECEIPT_KEY, &primitives::ZERO_ICV_8, &data).unwrap();
        receipt[0] ^= 0x01;

        assert!(matches!(
            validate_delete_receipt(&RECEIPT_KEY, counter, &uid, &aid, &receipt),
            Err(Error::ValidationFailed)
        ));
    }

    #[test]
    fn test_install_receipt_accepts_hand_computed_mac() {
        let counter = 0x0042u16;
        let uid = hex!("0011223344556677");
        let load_aid = hex!("a000000151000000");
        let app_aid = hex!("a000000151434d00");

        let data = build_validation_data(counter, &[&uid, &load_aid, &app_aid]);
        let receipt = primitives::retail_mac(&RECEIPT_KEY, &primitives::ZERO_ICV_8, &data).unwrap();

        assert!(
            validate_install_receipt(&RECEIPT_KEY, counter, &uid, &load_aid, &app_aid, &receipt)
                .is_ok()
        );
    }

    #[test]
    fn test_load_receipt_accepts_hand_computed_mac() {
        let counter = 0x0099u16;
        let uid = hex!("aabbccddeeff0011");
        let load_aid = hex!("a000000151000000");
        let sd_aid = hex!("a000000003000000");

        let data = build_validation_data(counter, &[&uid, &load_aid, &sd_aid]);
        let receipt = primitives::retail_mac(&RECEIPT_KEY, &primitives::ZERO_ICV_8, &data).unwrap();

        assert!(
            validate_load_receipt(&RECEIPT_KEY, counter, &uid, &load_aid, &sd_aid, &receipt)
                .is_ok()
        );
    }

    #[test]
    fn test_load_receipt_rejects_wrong_counter() {
        let uid = hex!("aabbccddeeff0011");
        let load_aid = hex!("a000000151000000");
        let sd_aid = hex!("a000000003000000");

        let data = build_validation_data(0x0099, &[&uid, &load_aid, &sd_aid]);
        let receipt = primitives::retail_mac(&RECEIPT_KEY, &primitives::ZERO_ICV_8, &data).unwrap();

        assert!(matches!(
            validate_load_receipt(&RECEIPT_KEY, 0x009A, &uid, &load_aid, &sd_aid, &receipt),
            Err(Error::ValidationFailed)
        ));
    }
}
