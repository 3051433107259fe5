//! Response MAC verification (C5, SCP02 only).
//!
//! Under an R-MAC-bearing security level the card appends an 8-byte
//! Retail-MAC to every response, chained from `lastRMAC` the same way
//! `lastCMAC` chains commands. Verification recomputes the MAC over the
//! command that produced the response and the response itself, and on
//! success stores it as the new `lastRMAC`.

use subtle::ConstantTimeEq;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::primitives;
use crate::session::SecurityInfo;

/// Verify the R-MAC trailing a response and advance `info`'s R-MAC chain on
/// success.
///
/// `command_header` is the 4-byte CLA/INS/P1/P2 of the command that
/// produced this response, `lc` its Lc byte, `command_data` its data field.
/// `response_data` excludes the trailing status word and the R-MAC itself.
pub fn check_response(
    info: &mut SecurityInfo,
    command_header: &[u8; 4],
    lc: u8,
    command_data: &[u8],
    response_data: &[u8],
    status_word: [u8; 2],
    received_rmac: &[u8; 8],
) -> Result<()> {
    let last_rmac = info
        .last_rmac()
        .copied()
        .ok_or(Error::Crypt("R-MAC not active for this session"))?;

    let mut r_data =
        Vec::with_capacity(4 + 1 + command_data.len() + 1 + response_data.len() + 2);
    r_data.extend_from_slice(command_header);
    r_data.push(lc);
    r_data.extend_from_slice(command_data);
    r_data.push((response_data.len() % 256) as u8);
    r_data.extend_from_slice(response_data);
    r_data.extend_from_slice(&status_word);

    let mac = primitives::retail_mac(&info.keys().rmac, &last_rmac, &r_data)?;

    if bool::from(mac.ct_eq(received_rmac)) {
        info.set_last_rmac(mac);
        debug!("R-MAC verified, chain advanced");
        Ok(())
    } else {
        warn!("R-MAC mismatch, chain left unchanged");
        Err(Error::ValidationRMAC)
    }
}
