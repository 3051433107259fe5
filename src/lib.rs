//! GlobalPlatform Secure Channel Protocol cryptographic engine
//!
//! This crate implements the cryptographic core shared by SCP01, SCP02 and
//! SCP03: session-key derivation, mutual-authentication cryptograms, APDU
//! secure messaging (C-MAC, optional encryption, chaining), and
//! confirmation-receipt/R-MAC validation. It does not talk to a card: a
//! surrounding transport layer supplies plaintext APDUs and a
//! [`SecurityInfo`] handle, and consumes wrapped APDUs and verification
//! results.

pub mod constants;
pub mod cryptogram;
pub mod error;
pub mod kdf;
pub mod primitives;
pub mod receipt;
pub mod rmac;
pub mod session;
pub mod wrapper;

pub use error::{Error, Result};
pub use session::{ChainValue, Protocol, SecurityInfo, SecurityLevel, SessionKeys, StaticKeys};
pub use wrapper::wrap;
