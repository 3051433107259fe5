//! Error types for the Secure Channel Protocol cryptographic engine

use thiserror::Error;

/// Result type for this crate's operations
pub type Result<T> = core::result::Result<T, Error>;

/// Tagged-union error type for the SCP cryptographic engine.
///
/// Every primitive, key-derivation, cryptogram, wrap, receipt or R-MAC
/// operation fails with exactly one of these kinds; there are no partial
/// results and no string-keyed error tables.
#[derive(Debug, Error)]
pub enum Error {
    /// An underlying cryptographic primitive failed (cipher init, MAC, hash,
    /// or signature). Carries a static description, never key material.
    #[error("cryptographic operation failed: {0}")]
    Crypt(&'static str),

    /// A caller-supplied buffer, or a derived quantity such as an RSA
    /// signature, does not fit the fixed-width output the protocol expects.
    #[error("insufficient buffer for result")]
    InsufficientBuffer,

    /// The passphrase supplied for a PEM-encoded private key did not decrypt
    /// it.
    #[error("invalid password for private key")]
    InvalidPassword,

    /// The PEM file path could not be opened or read.
    #[error("invalid or unreadable key file")]
    InvalidFilename,

    /// The input bytes do not match any of the four short-form APDU cases.
    #[error("unrecognized APDU command")]
    UnrecognizedApdu,

    /// The command, once wrapped, would exceed the length budget for the
    /// active security level and protocol.
    #[error("command too large for secure messaging")]
    CommandSecureMessagingTooLarge,

    /// `SCP03` does not support security level 3 (`C_DEC_C_MAC`) in this
    /// implementation.
    #[error("SCP03 security level 3 (C_DEC_C_MAC) is not supported")]
    Scp03SecurityLevel3NotSupported,

    /// A receipt (delete/install/load) did not match its expected Retail-MAC.
    #[error("receipt validation failed")]
    ValidationFailed,

    /// A response R-MAC did not match the computed value.
    #[error("R-MAC validation failed")]
    ValidationRMAC,

    /// Heap allocation failed while assembling a buffer.
    #[error("out of memory")]
    OutOfMemory,
}

impl From<rsa::Error> for Error {
    fn from(_: rsa::Error) -> Self {
        Self::Crypt("RSA operation failed")
    }
}

impl From<pkcs8::Error> for Error {
    fn from(_: pkcs8::Error) -> Self {
        Self::Crypt("PKCS#8 decode failed")
    }
}
