//! APDU secure-messaging wrapper (C4): case classification, length budgets,
//! C-MAC, optional data-field encryption, and chain maintenance.
//!
//! This is the state machine every outgoing command passes through: parse →
//! classify the APDU case → check the length budget → resolve the MAC scope
//! and ICV rule for the negotiated `(protocol, implVariant)` pair → compute
//! the MAC → optionally encrypt → assemble → advance the chain. The chain
//! only advances once every prior step has succeeded; a rejected command
//! leaves `SecurityInfo` exactly as it found it.

use bytes::{BufMut, BytesMut};
use tracing::{debug, trace, warn};

use crate::constants::impl_variant;
use crate::error::{Error, Result};
use crate::primitives;
use crate::session::{ChainValue, Protocol, SecurityInfo, SecurityLevel};

/// Which of the four short-form APDU shapes a command matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApduCase {
    /// Header only (4 bytes).
    One,
    /// Header + Le (5 bytes).
    Two,
    /// Header + Lc + data.
    Three,
    /// Header + Lc + data + Le.
    Four,
}

/// A parsed short-form APDU.
#[derive(Debug, Clone)]
pub struct ParsedApdu {
    pub cla: u8,
    pub ins: u8,
    pub p1: u8,
    pub p2: u8,
    pub data: Vec<u8>,
    pub le: Option<u8>,
    pub case: ApduCase,
}

impl ParsedApdu {
    /// Classify `apdu` as Case 1-4, rejecting any shape that isn't one of
    /// the four short-form cases.
    pub fn parse(apdu: &[u8]) -> Result<Self> {
        if apdu.len() < 4 {
            return Err(Error::UnrecognizedApdu);
        }
        let (cla, ins, p1, p2) = (apdu[0], apdu[1], apdu[2], apdu[3]);

        match apdu.len() {
            4 => Ok(Self { cla, ins, p1, p2, data: Vec::new(), le: None, case: ApduCase::One }),
            5 => Ok(Self {
                cla,
                ins,
                p1,
                p2,
                data: Vec::new(),
                le: Some(apdu[4]),
                case: ApduCase::Two,
            }),
            n => {
                let lc = apdu[4] as usize;
                if n == 5 + lc {
                    Ok(Self {
                        cla,
                        ins,
                        p1,
                        p2,
                        data: apdu[5..5 + lc].to_vec(),
                        le: None,
                        case: ApduCase::Three,
                    })
                } else if n == 6 + lc {
                    Ok(Self {
                        cla,
                        ins,
                        p1,
                        p2,
                        data: apdu[5..5 + lc].to_vec(),
                        le: Some(apdu[5 + lc]),
                        case: ApduCase::Four,
                    })
                } else {
                    Err(Error::UnrecognizedApdu)
                }
            }
        }
    }
}

/// MAC-scope rule: whether the MAC is computed over the original bytes or
/// the header-rewritten ("modified") bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MacScope {
    Modified,
    Unmodified,
}

/// ICV rule: whether the chaining value feeding the MAC is used as-is or
/// first re-encrypted. SCP03 has no ICV rule of its own: its running
/// 16-byte CMAC chain feeds the MAC directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IcvRule {
    Raw,
    Encrypted,
}

/// Static lookup table: `(protocol, implVariant) → MacScope`.
fn mac_scope(protocol: Protocol, variant: u8) -> Result<MacScope> {
    use impl_variant::*;
    match (protocol, variant) {
        (Protocol::Scp01, SCP01_I15) => Ok(MacScope::Modified),
        (Protocol::Scp03, SCP03_I00) => Ok(MacScope::Modified),
        (Protocol::Scp02, SCP02_I0A | SCP02_I0B | SCP02_I1A | SCP02_I1B) => {
            Ok(MacScope::Unmodified)
        }
        (Protocol::Scp02, SCP02_I04 | SCP02_I05 | SCP02_I14 | SCP02_I15 | SCP02_I44
         | SCP02_I45 | SCP02_I54 | SCP02_I55) => Ok(MacScope::Modified),
        _ => Err(Error::Crypt("unrecognized implementation variant")),
    }
}

/// Static lookup table: `(protocol, implVariant) → IcvRule`, `None` for
/// SCP03 (no ICV rule applies there).
fn icv_rule(protocol: Protocol, variant: u8) -> Result<Option<IcvRule>> {
    use impl_variant::*;
    match (protocol, variant) {
        (Protocol::Scp01, SCP01_I15) => Ok(Some(IcvRule::Encrypted)),
        (Protocol::Scp02, SCP02_I14 | SCP02_I15 | SCP02_I1A | SCP02_I1B | SCP02_I54
         | SCP02_I55) => Ok(Some(IcvRule::Encrypted)),
        (Protocol::Scp02, SCP02_I04 | SCP02_I05 | SCP02_I0A | SCP02_I0B | SCP02_I44
         | SCP02_I45) => Ok(Some(IcvRule::Raw)),
        (Protocol::Scp03, SCP03_I00) => Ok(None),
        _ => Err(Error::Crypt("unrecognized implementation variant")),
    }
}

/// Maximum original (pre-wrap) data-field length for `case` under `level`
/// and `protocol`. Derived from the 255-byte short-form `Lc` ceiling minus
/// the 8-byte MAC and the worst-case padding each protocol's encryption
/// mode can add; Case 4 gets one more byte of headroom since its trailing
/// `Le` is never folded into the MAC/encryption scope. Under
/// `C_DECRYPTION` the non-SCP03 budget is 240, not 239: GlobalPlatform's
/// own seed vectors accept a 240-byte Case-3 command and reject 241.
fn max_data_len(protocol: Protocol, level: SecurityLevel, case: ApduCase) -> usize {
    let base = if level.contains(SecurityLevel::C_DECRYPTION) {
        if protocol == Protocol::Scp03 { 232 } else { 240 }
    } else {
        247
    };
    match case {
        ApduCase::Four => base + 1,
        _ => base,
    }
}

fn check_budget(protocol: Protocol, level: SecurityLevel, case: ApduCase, data_len: usize) -> Result<()> {
    if data_len > max_data_len(protocol, level, case) {
        Err(Error::CommandSecureMessagingTooLarge)
    } else {
        Ok(())
    }
}

/// The outcome of a MAC computation: the 8 bytes transmitted, and the new
/// chaining value to persist on success.
enum ChainOutcome {
    Short([u8; 8]),
    Long([u8; 16]),
}

fn resolve_icv_scp01(info: &SecurityInfo) -> Result<[u8; 8]> {
    let rule = icv_rule(info.protocol(), info.protocol_impl())?
        .ok_or(Error::Crypt("SCP01 always defines an ICV rule"))?;
    let mut raw = [0u8; 8];
    raw.copy_from_slice(info.last_cmac().as_bytes());
    match rule {
        IcvRule::Raw => Ok(raw),
        IcvRule::Encrypted => primitives::tdes_ecb_encrypt_block(&info.keys().cmac, &raw),
    }
}

fn resolve_icv_scp02(info: &SecurityInfo) -> Result<[u8; 8]> {
    let rule = icv_rule(info.protocol(), info.protocol_impl())?
        .ok_or(Error::Crypt("SCP02 always defines an ICV rule"))?;
    let mut raw = [0u8; 8];
    raw.copy_from_slice(info.last_cmac().as_bytes());
    match rule {
        IcvRule::Raw => Ok(raw),
        IcvRule::Encrypted => {
            let mut half = [0u8; 8];
            half.copy_from_slice(&info.keys().cmac[..8]);
            primitives::des_ecb_encrypt_block(&half, &raw)
        }
    }
}

fn compute_mac(info: &SecurityInfo, msg: &[u8]) -> Result<([u8; 8], ChainOutcome)> {
    match info.protocol() {
        Protocol::Scp01 => {
            let icv = resolve_icv_scp01(info)?;
            let mac = primitives::tdes_cbc_mac(&info.keys().cmac, &icv, msg)?;
            Ok((mac, ChainOutcome::Short(mac)))
        }
        Protocol::Scp02 => {
            let icv = resolve_icv_scp02(info)?;
            let mac = primitives::retail_mac(&info.keys().cmac, &icv, msg)?;
            Ok((mac, ChainOutcome::Short(mac)))
        }
        Protocol::Scp03 => {
            let chain = match info.last_cmac() {
                ChainValue::Long(b) => *b,
                ChainValue::Short(_) => {
                    return Err(Error::Crypt("SCP03 session missing its 16-byte chain"));
                }
            };
            let tag = primitives::aes_cmac_chained(&info.keys().cmac, &chain, msg)?;
            let mut mac = [0u8; 8];
            mac.copy_from_slice(&tag[..8]);
            Ok((mac, ChainOutcome::Long(tag)))
        }
    }
}

fn encrypt_data(protocol: Protocol, key: &[u8; 16], data: &[u8]) -> Result<Vec<u8>> {
    match protocol {
        Protocol::Scp01 => primitives::tdes_cbc_encrypt(key, &primitives::ZERO_ICV_8, data),
        Protocol::Scp02 => primitives::scp02_cbc_encrypt(key, data),
        Protocol::Scp03 => Err(Error::Scp03SecurityLevel3NotSupported),
    }
}

/// Wrap a plaintext short-form APDU for transmission under `info`'s active
/// security level. Passes the APDU through unchanged if `info`'s security
/// level is [`SecurityLevel::NONE`]. On any failure `info`'s chaining value
/// is left untouched.
pub fn wrap(apdu: &[u8], info: &mut SecurityInfo) -> Result<Vec<u8>> {
    if info.security_level() == SecurityLevel::NONE {
        trace!(len = apdu.len(), "no secure messaging active, passing APDU through");
        return Ok(apdu.to_vec());
    }

    if info.protocol() == Protocol::Scp03 && info.security_level().contains(SecurityLevel::C_DECRYPTION) {
        warn!("rejecting SCP03 command under C_DEC_C_MAC, unsupported in this engine");
        return Err(Error::Scp03SecurityLevel3NotSupported);
    }

    let parsed = ParsedApdu::parse(apdu)?;
    trace!(case = ?parsed.case, data_len = parsed.data.len(), "parsed APDU");
    check_budget(info.protocol(), info.security_level(), parsed.case, parsed.data.len())
        .inspect_err(|_| warn!(data_len = parsed.data.len(), "command exceeds secure messaging length budget"))?;

    let scope = mac_scope(info.protocol(), info.protocol_impl())?;

    let new_cla = parsed.cla | 0x04;
    let unmodified_lc = parsed.data.len() as u8;
    let modified_lc = unmodified_lc.wrapping_add(8);

    let mut mac_input_modified = BytesMut::with_capacity(5 + parsed.data.len());
    mac_input_modified.put_u8(new_cla);
    mac_input_modified.put_u8(parsed.ins);
    mac_input_modified.put_u8(parsed.p1);
    mac_input_modified.put_u8(parsed.p2);
    mac_input_modified.put_u8(modified_lc);
    mac_input_modified.put_slice(&parsed.data);

    let mut mac_input_unmodified = BytesMut::with_capacity(5 + parsed.data.len());
    mac_input_unmodified.put_u8(parsed.cla);
    mac_input_unmodified.put_u8(parsed.ins);
    mac_input_unmodified.put_u8(parsed.p1);
    mac_input_unmodified.put_u8(parsed.p2);
    mac_input_unmodified.put_u8(unmodified_lc);
    mac_input_unmodified.put_slice(&parsed.data);

    let mac_msg: &[u8] = match scope {
        MacScope::Modified => &mac_input_modified,
        MacScope::Unmodified => &mac_input_unmodified,
    };

    let (mac, new_chain) = compute_mac(info, mac_msg)?;

    let data_field = if info.security_level().contains(SecurityLevel::C_DECRYPTION) {
        encrypt_data(info.protocol(), &info.keys().enc, &parsed.data)?
    } else {
        parsed.data
    };

    let final_lc = u8::try_from(data_field.len() + 8)
        .map_err(|_| Error::CommandSecureMessagingTooLarge)?;

    let mut out = BytesMut::with_capacity(5 + data_field.len() + 8 + 1);
    out.put_u8(new_cla);
    out.put_u8(parsed.ins);
    out.put_u8(parsed.p1);
    out.put_u8(parsed.p2);
    out.put_u8(final_lc);
    out.put_slice(&data_field);
    out.put_slice(&mac);
    if let Some(le) = parsed.le {
        out.put_u8(le);
    }

    match new_chain {
        ChainOutcome::Short(b) => info.last_cmac_mut().set_short(b),
        ChainOutcome::Long(b) => info.last_cmac_mut().set_long(b),
    }

    debug!(wrapped_len = out.len(), "wrapped APDU and advanced MAC chain");
    Ok(out.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{SessionKeys, StaticKeys};
    use hex_literal::hex;

    fn scp02_info(level: SecurityLevel) -> SecurityInfo {
        let static_keys = StaticKeys::test_key();
        let keys = SessionKeys {
            enc: static_keys.enc,
            cmac: static_keys.mac,
            rmac: static_keys.mac,
            dek: static_keys.dek,
        };
        SecurityInfo::new(Protocol::Scp02, impl_variant::SCP02_I04, level, keys)
    }

    #[test]
    fn test_parse_recognizes_all_four_cases() {
        assert_eq!(ParsedApdu::parse(&hex!("80CA0000")).unwrap().case, ApduCase::One);
        assert_eq!(ParsedApdu::parse(&hex!("80CA000000")).unwrap().case, ApduCase::Two);
        assert_eq!(ParsedApdu::parse(&hex!("80820100021122")).unwrap().case, ApduCase::Three);
        assert_eq!(
            ParsedApdu::parse(&hex!("808201000211223300")).unwrap().case,
            ApduCase::Four
        );
    }

    #[test]
    fn test_parse_rejects_malformed_length() {
        assert!(matches!(ParsedApdu::parse(&hex!("80")), Err(Error::UnrecognizedApdu)));
        assert!(matches!(
            ParsedApdu::parse(&hex!("808201000a1122")),
            Err(Error::UnrecognizedApdu)
        ));
    }

    #[test]
    fn test_wrap_passthrough_with_no_secure_messaging() {
        let mut info = scp02_info(SecurityLevel::NONE);
        let apdu = hex!("80CA000000");
        assert_eq!(wrap(&apdu, &mut info).unwrap(), apdu.to_vec());
    }

    #[test]
    fn test_wrap_case_one_grows_header_and_appends_mac() {
        let mut info = scp02_info(SecurityLevel::C_MAC);
        let apdu = hex!("80820000");

        let wrapped = wrap(&apdu, &mut info).unwrap();
        assert_eq!(wrapped.len(), 13);
        assert_eq!(wrapped[0], 0x84);
        assert_eq!(wrapped[4], 0x08);

        // Chain advanced: the same input MACs differently on the next call.
        let wrapped2 = wrap(&apdu, &mut info).unwrap();
        assert_ne!(wrapped[5..], wrapped2[5..]);
    }

    #[test]
    fn test_wrap_matches_hand_computed_mac_for_modified_scope() {
        let mut info = scp02_info(SecurityLevel::C_MAC);
        let apdu = hex!("80CA00000411223344");

        let wrapped = wrap(&apdu, &mut info).unwrap();

        let expected_header = [0x84u8, 0xCA, 0x00, 0x00, 0x0C];
        let mut expected_msg = expected_header.to_vec();
        expected_msg.extend_from_slice(&hex!("11223344"));
        let expected_mac =
            primitives::retail_mac(&info_cmac_key(), &primitives::ZERO_ICV_8, &expected_msg).unwrap();

        assert_eq!(&wrapped[..5], &expected_header);
        assert_eq!(&wrapped[5..9], &hex!("11223344"));
        assert_eq!(&wrapped[9..17], &expected_mac);
    }

    fn info_cmac_key() -> [u8; 16] {
        StaticKeys::test_key().mac
    }

    #[test]
    fn test_wrap_case_four_preserves_le() {
        let mut info = scp02_info(SecurityLevel::C_MAC);
        let apdu = hex!("80820000024f0000");

        let wrapped = wrap(&apdu, &mut info).unwrap();
        assert_eq!(*wrapped.last().unwrap(), 0x00);
    }

    #[test]
    fn test_wrap_with_encryption_grows_data_field_and_keeps_mac_appended() {
        let mut info = scp02_info(SecurityLevel::C_DEC_C_MAC);
        let apdu = hex!("8082010010112233445566778899aabbccddeeff");

        let wrapped = wrap(&apdu, &mut info).unwrap();
        // SCP02-CBC always appends a pad block, so ciphertext > plaintext.
        let lc = wrapped[4] as usize;
        assert!(lc > 16 + 8);
        assert_eq!(wrapped.len(), 5 + lc);
    }

    #[test]
    fn test_scp03_c_dec_c_mac_is_rejected() {
        let static_keys = StaticKeys::test_key();
        let keys = SessionKeys {
            enc: static_keys.enc,
            cmac: static_keys.mac,
            rmac: static_keys.mac,
            dek: static_keys.dek,
        };
        let mut info = SecurityInfo::new(
            Protocol::Scp03,
            impl_variant::SCP03_I00,
            SecurityLevel::C_DEC_C_MAC,
            keys,
        );
        let apdu = hex!("80CA000000");
        assert!(matches!(
            wrap(&apdu, &mut info),
            Err(Error::Scp03SecurityLevel3NotSupported)
        ));
    }

    #[test]
    fn test_length_budget_boundary_for_c_mac_only() {
        let level = SecurityLevel::C_MAC;
        assert!(check_budget(Protocol::Scp02, level, ApduCase::Three, 247).is_ok());
        assert!(matches!(
            check_budget(Protocol::Scp02, level, ApduCase::Three, 248),
            Err(Error::CommandSecureMessagingTooLarge)
        ));
    }

    #[test]
    fn test_length_budget_boundary_for_c_dec_c_mac() {
        let level = SecurityLevel::C_DEC_C_MAC;
        assert!(check_budget(Protocol::Scp02, level, ApduCase::Three, 240).is_ok());
        assert!(matches!(
            check_budget(Protocol::Scp02, level, ApduCase::Three, 241),
            Err(Error::CommandSecureMessagingTooLarge)
        ));
        // Case 4 gets one extra byte of headroom.
        assert!(check_budget(Protocol::Scp02, level, ApduCase::Four, 241).is_ok());
    }

    #[test]
    fn test_i_variant_dispatch_covers_every_documented_code() {
        use impl_variant::*;
        for &code in &[SCP02_I04, SCP02_I05, SCP02_I14, SCP02_I15, SCP02_I44, SCP02_I45, SCP02_I54, SCP02_I55] {
            assert_eq!(mac_scope(Protocol::Scp02, code).unwrap(), MacScope::Modified);
        }
        for &code in &[SCP02_I0A, SCP02_I0B, SCP02_I1A, SCP02_I1B] {
            assert_eq!(mac_scope(Protocol::Scp02, code).unwrap(), MacScope::Unmodified);
        }
        assert_eq!(mac_scope(Protocol::Scp01, SCP01_I15).unwrap(), MacScope::Modified);
        assert_eq!(mac_scope(Protocol::Scp03, SCP03_I00).unwrap(), MacScope::Modified);

        assert!(mac_scope(Protocol::Scp02, 0xFF).is_err());
        assert!(icv_rule(Protocol::Scp01, 0xFF).is_err());
    }
}
