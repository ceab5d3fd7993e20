//! Status Word (SW) constants for APDU responses
//!
//! The subset of ISO 7816-4 status words the minihsm applet and the
//! virtual reader can produce.

/// Status Word constants
pub struct SW;

impl SW {
    pub const SUCCESS: u16 = 0x9000;

    pub const WRONG_LENGTH: u16 = 0x6700;

    pub const COMMAND_NOT_ALLOWED: u16 = 0x6900;
    pub const CONDITIONS_NOT_SATISFIED: u16 = 0x6985;

    pub const WRONG_DATA: u16 = 0x6A80;
    pub const FILE_NOT_FOUND: u16 = 0x6A82;
    pub const INCORRECT_P1_P2: u16 = 0x6A86;

    pub const INS_NOT_SUPPORTED: u16 = 0x6D00;
    pub const UNKNOWN_ERROR: u16 = 0x6F00;

    /// Create a warning with counter (63Cx)
    ///
    /// Carries the remaining tries of a credential in the low nibble.
    #[inline]
    pub fn counter_warning(retries: u8) -> u16 {
        0x63C0 | ((retries & 0x0F) as u16)
    }

    /// "No precise diagnosis" (6Fxx) carrying a lifecycle code in the low byte
    #[inline]
    pub fn unknown_with_state(code: u8) -> u16 {
        Self::UNKNOWN_ERROR | (code as u16)
    }

    /// Check if a status word is a counter warning (63Cx)
    #[inline]
    pub fn is_counter_warning(sw: u16) -> bool {
        (sw & 0xFFF0) == 0x63C0
    }

    /// Extract retry count from counter warning (63Cx)
    #[inline]
    pub fn get_retry_count(sw: u16) -> Option<u8> {
        if Self::is_counter_warning(sw) {
            Some((sw & 0x0F) as u8)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_warning() {
        assert_eq!(SW::counter_warning(10), 0x63CA);
        assert_eq!(SW::counter_warning(3), 0x63C3);
        assert_eq!(SW::counter_warning(0), 0x63C0);
        // Only the low nibble is carried
        assert_eq!(SW::counter_warning(0x1F), 0x63CF);
    }

    #[test]
    fn test_unknown_with_state() {
        assert_eq!(SW::unknown_with_state(0x0C), 0x6F0C);
    }

    #[test]
    fn test_get_retry_count() {
        assert_eq!(SW::get_retry_count(0x63C3), Some(3));
        assert_eq!(SW::get_retry_count(0x63C0), Some(0));
        assert_eq!(SW::get_retry_count(0x9000), None);
        assert_eq!(SW::get_retry_count(0x6300), None);
    }
}
