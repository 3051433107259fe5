//! Session state: the `SecurityInfo` handle held across APDUs
//!
//! `SecurityInfo` is the one piece of mutable state this crate keeps: the
//! negotiated protocol, its i-variant, the active security level, the four
//! session keys, and the two MAC-chaining values. A (not specified here)
//! mutual-authentication routine built on [`crate::kdf`] and
//! [`crate::cryptogram`] constructs it; [`crate::wrapper`] and
//! [`crate::receipt`] consume it for the life of the session.

use std::fmt;

use bitflags::bitflags;
use zeroize::Zeroize;

use crate::constants::scp;

/// Secure Channel Protocol version in use for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// SCP01
    Scp01,
    /// SCP02
    Scp02,
    /// SCP03
    Scp03,
}

impl Protocol {
    /// The wire byte GlobalPlatform uses for this protocol version.
    pub const fn wire_byte(self) -> u8 {
        match self {
            Self::Scp01 => scp::SCP01,
            Self::Scp02 => scp::SCP02,
            Self::Scp03 => scp::SCP03,
        }
    }

    /// Parse a protocol version byte as returned in an INITIALIZE UPDATE
    /// response's key information field.
    pub const fn from_wire_byte(byte: u8) -> Option<Self> {
        match byte {
            scp::SCP01 => Some(Self::Scp01),
            scp::SCP02 => Some(Self::Scp02),
            scp::SCP03 => Some(Self::Scp03),
            _ => None,
        }
    }
}

bitflags! {
    /// Active security protections for a session.
    ///
    /// SCP01/02/03 each define their own disjoint wire constants for the
    /// same semantics (`NONE`, `C_MAC`, `C_DEC_C_MAC`, `R_MAC`,
    /// `C_MAC_R_MAC`, `C_DEC_C_MAC_R_MAC`); representing them as one
    /// bit-set keyed on meaning rather than three separate per-protocol
    /// enums means composite levels compose with bitwise-or instead of a
    /// lookup table, and the wrapper only ever has to ask "is this bit
    /// set" rather than "which of fifteen named constants is this".
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SecurityLevel: u8 {
        /// Command MAC (C-MAC) protection.
        const C_MAC = 0x01;
        /// Command data-field encryption (always paired with C-MAC in this
        /// engine; there is no encryption-only level).
        const C_DECRYPTION = 0x02;
        /// Response MAC (R-MAC) protection. SCP02 only.
        const R_MAC = 0x10;
    }
}

impl SecurityLevel {
    /// No secure messaging: APDUs pass through unmodified.
    pub const NONE: Self = Self::empty();
    /// C-MAC and data-field encryption together (there is no C_DECRYPTION
    /// alone in GlobalPlatform's security level encoding).
    pub const C_DEC_C_MAC: Self = Self::C_MAC.union(Self::C_DECRYPTION);
    /// C-MAC plus R-MAC.
    pub const C_MAC_R_MAC: Self = Self::C_MAC.union(Self::R_MAC);
    /// C-MAC, encryption and R-MAC together.
    pub const C_DEC_C_MAC_R_MAC: Self = Self::C_DEC_C_MAC.union(Self::R_MAC);
}

/// MAC-chaining value: 8 bytes for SCP01/SCP02, 16 bytes for SCP03.
#[derive(Debug, Clone, Zeroize)]
#[zeroize(drop)]
pub enum ChainValue {
    /// SCP01/SCP02 `lastCMAC`.
    Short([u8; 8]),
    /// SCP03 `lastCMAC`.
    Long([u8; 16]),
}

impl ChainValue {
    /// The all-zero chaining value for `protocol`, as used at session
    /// establishment.
    pub const fn zero_for(protocol: Protocol) -> Self {
        match protocol {
            Protocol::Scp03 => Self::Long([0u8; 16]),
            _ => Self::Short([0u8; 8]),
        }
    }

    /// Borrow the chaining value as bytes.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Short(b) => b.as_slice(),
            Self::Long(b) => b.as_slice(),
        }
    }

    /// Replace the chaining value with 8 new bytes (SCP01/SCP02).
    pub fn set_short(&mut self, bytes: [u8; 8]) {
        *self = Self::Short(bytes);
    }

    /// Replace the chaining value with 16 new bytes (SCP03).
    pub fn set_long(&mut self, bytes: [u8; 16]) {
        *self = Self::Long(bytes);
    }
}

/// Static (long-term) keys shared with the card, before session derivation.
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct StaticKeys {
    /// Static encryption key.
    pub enc: [u8; 16],
    /// Static MAC key.
    pub mac: [u8; 16],
    /// Static data encryption key (DEK), used to derive `S_DEK` under
    /// SCP02.
    pub dek: [u8; 16],
}

impl StaticKeys {
    /// Construct a key set with distinct ENC/MAC/DEK keys.
    pub const fn new(enc: [u8; 16], mac: [u8; 16], dek: [u8; 16]) -> Self {
        Self { enc, mac, dek }
    }

    /// Construct a key set where ENC, MAC and DEK are all the same key, as
    /// is common for GlobalPlatform's well-known test keys.
    pub const fn from_single_key(key: [u8; 16]) -> Self {
        Self { enc: key, mac: key, dek: key }
    }

    /// The well-known GlobalPlatform test key `40 41 42 ... 4F`, used only
    /// in tests and documentation examples, never as a production default.
    #[cfg(test)]
    pub(crate) const fn test_key() -> Self {
        Self::from_single_key([
            0x40, 0x41, 0x42, 0x43, 0x44, 0x45, 0x46, 0x47, 0x48, 0x49, 0x4A, 0x4B, 0x4C, 0x4D,
            0x4E, 0x4F,
        ])
    }
}

impl fmt::Debug for StaticKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticKeys").finish_non_exhaustive()
    }
}

/// Derived session keys, distinct from [`StaticKeys`] once a session has
/// been established.
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct SessionKeys {
    /// `S_ENC`, the session encryption key.
    pub enc: [u8; 16],
    /// `S_MAC` / C-MAC session key.
    pub cmac: [u8; 16],
    /// `S_RMAC` / R-MAC session key. Meaningful for SCP02 only.
    pub rmac: [u8; 16],
    /// `S_DEK`, the session data-encryption key. Meaningful for SCP02 only.
    pub dek: [u8; 16],
}

impl fmt::Debug for SessionKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionKeys").finish_non_exhaustive()
    }
}

/// The session state handle held across APDUs.
///
/// Constructed by a mutual-authentication routine (out of scope for this
/// crate) once the card cryptogram has been verified via
/// [`crate::cryptogram`]; consumed by [`crate::wrapper`] for each
/// outgoing APDU and by [`crate::receipt`] for incoming receipts/R-MAC.
#[derive(Clone)]
pub struct SecurityInfo {
    protocol: Protocol,
    protocol_impl: u8,
    security_level: SecurityLevel,
    keys: SessionKeys,
    last_cmac: ChainValue,
    last_rmac: Option<[u8; 8]>,
}

impl fmt::Debug for SecurityInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecurityInfo")
            .field("protocol", &self.protocol)
            .field("protocol_impl", &self.protocol_impl)
            .field("security_level", &self.security_level)
            .finish_non_exhaustive()
    }
}

impl SecurityInfo {
    /// Construct a new session handle. `last_cmac` starts at all zeros, as
    /// required at session establishment; `last_rmac` starts unset.
    pub fn new(
        protocol: Protocol,
        protocol_impl: u8,
        security_level: SecurityLevel,
        keys: SessionKeys,
    ) -> Self {
        Self {
            protocol,
            protocol_impl,
            security_level,
            keys,
            last_cmac: ChainValue::zero_for(protocol),
            last_rmac: (protocol == Protocol::Scp02).then_some([0u8; 8]),
        }
    }

    /// The negotiated protocol.
    pub const fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// The negotiated i-variant.
    pub const fn protocol_impl(&self) -> u8 {
        self.protocol_impl
    }

    /// The active security level.
    pub const fn security_level(&self) -> SecurityLevel {
        self.security_level
    }

    /// The session keys.
    pub const fn keys(&self) -> &SessionKeys {
        &self.keys
    }

    /// The current MAC-chaining value.
    pub const fn last_cmac(&self) -> &ChainValue {
        &self.last_cmac
    }

    /// Mutable access to the MAC-chaining value, updated by the wrapper
    /// after every successfully wrapped APDU.
    pub fn last_cmac_mut(&mut self) -> &mut ChainValue {
        &mut self.last_cmac
    }

    /// The current R-MAC chaining value (SCP02 only).
    pub const fn last_rmac(&self) -> Option<&[u8; 8]> {
        self.last_rmac.as_ref()
    }

    /// Replace the R-MAC chaining value after a successful R-MAC check.
    pub fn set_last_rmac(&mut self, rmac: [u8; 8]) {
        self.last_rmac = Some(rmac);
    }
}
