//! TLV (Tag-Length-Value) decoding
//!
//! Command data for CHANGE REFERENCE DATA and RESET RETRY COUNTER is a flat
//! sequence of BER-TLV data objects (ISO 7816-4, clause 6.3). The applet
//! only needs to know where a given tag's value sits, so this module
//! exposes a scan-for-tag lookup over the top level of the buffer.
//!
//! # Example
//! ```ignore
//! use ifd_minihsm::tlv::{find, tags};
//!
//! let data = [0x81, 0x04, b'1', b'2', b'3', b'4'];
//! let field = find(&data, tags::REFERENCE_DATA).unwrap();
//! assert_eq!((field.offset, field.len), (2, 4));
//! ```

mod parser;

pub use parser::{Field, Fields, TLVError};

/// Find the first top-level field carrying `tag`
///
/// Returns `None` if the tag is absent or if the buffer becomes malformed
/// before the tag is reached.
pub fn find(data: &[u8], tag: u32) -> Option<Field> {
    Fields::new(data).find(|f| f.tag == tag)
}

/// Find the first top-level field carrying `tag` and borrow its value
pub fn find_value(data: &[u8], tag: u32) -> Option<&[u8]> {
    find(data, tag).map(|f| f.value(data))
}

/// Tags consumed by the minihsm applet
pub mod tags {
    /// Verification data: current PIN, new PIN on creation, or PUK
    pub const REFERENCE_DATA: u32 = 0x81;
    /// New reference data (replacement PIN)
    pub const NEW_REFERENCE_DATA: u32 = 0x82;
}
