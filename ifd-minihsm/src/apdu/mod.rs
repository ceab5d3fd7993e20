//! APDU (Application Protocol Data Unit) handling
//!
//! Command framing for the virtual reader: raw bytes from the host are
//! parsed into an [`APDU`], handed to the applet, and the applet's
//! [`Response`] is serialized back.
//!
//! # Example
//! ```ignore
//! use ifd_minihsm::apdu::{parse_apdu, Response};
//!
//! // VERIFY with a four byte PIN
//! let raw = &[0x00, 0x20, 0x00, 0x01, 0x04, 0x31, 0x32, 0x33, 0x34];
//! let apdu = parse_apdu(raw).unwrap();
//! assert_eq!(apdu.data, b"1234");
//! ```

mod response;
mod status;

pub use response::Response;
pub use status::SW;

use thiserror::Error;

/// Errors that can occur during APDU parsing
#[derive(Debug, Error, PartialEq, Eq)]
pub enum APDUError {
    #[error("APDU too short: expected at least 4 bytes, got {0}")]
    TooShort(usize),

    #[error("Lc declares {declared} data bytes but the body does not match ({actual} bytes)")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("Invalid extended APDU format")]
    InvalidExtendedFormat,
}

/// A parsed APDU command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct APDU {
    /// Class byte (CLA)
    pub cla: u8,
    /// Instruction byte (INS)
    pub ins: u8,
    /// Parameter 1 (P1)
    pub p1: u8,
    /// Parameter 2 (P2)
    pub p2: u8,
    /// Command data (may be empty)
    pub data: Vec<u8>,
    /// Expected response length (Le), None if not specified
    pub le: Option<u32>,
}

impl APDU {
    /// Create a new APDU with just the header (CLA, INS, P1, P2)
    pub fn new(cla: u8, ins: u8, p1: u8, p2: u8) -> Self {
        Self::with_data(cla, ins, p1, p2, Vec::new())
    }

    /// Create a new APDU with data
    pub fn with_data(cla: u8, ins: u8, p1: u8, p2: u8, data: Vec<u8>) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data,
            le: None,
        }
    }
}

/// Parse raw bytes into an APDU
///
/// Supports both short and extended APDU formats:
/// - Short: CLA INS P1 P2 [Lc Data] [Le]
/// - Extended: CLA INS P1 P2 00 [Lc1 Lc2 Data] [Le1 Le2]
///
/// A body whose size disagrees with the declared Lc is rejected, which the
/// reader reports as `SW::WRONG_LENGTH`.
pub fn parse_apdu(raw: &[u8]) -> Result<APDU, APDUError> {
    if raw.len() < 4 {
        return Err(APDUError::TooShort(raw.len()));
    }

    let mut apdu = APDU::new(raw[0], raw[1], raw[2], raw[3]);
    let body = &raw[4..];

    match body.len() {
        // Case 1
        0 => Ok(apdu),
        // Case 2: Le only, 0 means 256
        1 => {
            apdu.le = Some(short_le(body[0]));
            Ok(apdu)
        }
        _ if body[0] == 0x00 => {
            parse_extended_body(&mut apdu, &body[1..])?;
            Ok(apdu)
        }
        _ => {
            let lc = body[0] as usize;
            let rest = &body[1..];
            if rest.len() == lc {
                apdu.data = rest.to_vec();
            } else if rest.len() == lc + 1 {
                apdu.data = rest[..lc].to_vec();
                apdu.le = Some(short_le(rest[lc]));
            } else {
                return Err(APDUError::LengthMismatch {
                    declared: lc,
                    actual: rest.len(),
                });
            }
            Ok(apdu)
        }
    }
}

fn short_le(byte: u8) -> u32 {
    if byte == 0 { 256 } else { byte as u32 }
}

fn extended_word(hi: u8, lo: u8) -> usize {
    ((hi as usize) << 8) | (lo as usize)
}

/// Parse the part of an extended APDU following the leading 00 marker
fn parse_extended_body(apdu: &mut APDU, rest: &[u8]) -> Result<(), APDUError> {
    if rest.len() < 2 {
        return Err(APDUError::InvalidExtendedFormat);
    }

    let first_word = extended_word(rest[0], rest[1]);

    // Case 2E: Le only, 0 means 65536
    if rest.len() == 2 {
        apdu.le = Some(if first_word == 0 { 65536 } else { first_word as u32 });
        return Ok(());
    }

    let lc = first_word;
    if lc == 0 {
        return Err(APDUError::InvalidExtendedFormat);
    }
    let data = &rest[2..];

    if data.len() == lc {
        apdu.data = data.to_vec();
    } else if data.len() == lc + 2 {
        apdu.data = data[..lc].to_vec();
        let le = extended_word(data[lc], data[lc + 1]);
        apdu.le = Some(if le == 0 { 65536 } else { le as u32 });
    } else {
        return Err(APDUError::LengthMismatch {
            declared: lc,
            actual: data.len(),
        });
    }

    Ok(())
}

/// Instruction bytes understood by the virtual card
pub mod ins {
    pub const SELECT: u8 = 0xA4;
    pub const VERIFY: u8 = 0x20;
    pub const CHANGE_REFERENCE_DATA: u8 = 0x25;
    pub const RESET_RETRY_COUNTER: u8 = 0x2D;
}
