//! APDU Response handling
//!
//! A Response carries optional data bytes plus SW1/SW2. The minihsm applet
//! only ever answers with a status word.

use super::status::SW;

/// A smartcard response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Response data (without status words)
    pub data: Vec<u8>,
    /// Status word 1 (SW1)
    pub sw1: u8,
    /// Status word 2 (SW2)
    pub sw2: u8,
}

impl Response {
    /// Create a new response with data and status word
    pub fn new(data: Vec<u8>, sw: u16) -> Self {
        Self {
            data,
            sw1: (sw >> 8) as u8,
            sw2: sw as u8,
        }
    }

    /// Create an empty success response (0x9000)
    pub fn ok() -> Self {
        Self::new(Vec::new(), SW::SUCCESS)
    }

    /// Create an error response (no data)
    pub fn error(sw: u16) -> Self {
        Self::new(Vec::new(), sw)
    }

    /// Create a counter warning response (0x63Cx)
    pub fn counter_warning(retries: u8) -> Self {
        Self::error(SW::counter_warning(retries))
    }

    /// Check if the response is 0x9000
    pub fn is_okay(&self) -> bool {
        self.sw() == SW::SUCCESS
    }

    /// Get the combined status word as u16
    pub fn sw(&self) -> u16 {
        ((self.sw1 as u16) << 8) | (self.sw2 as u16)
    }

    /// Convert to raw bytes for transmission (data + SW1 + SW2)
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut result = Vec::with_capacity(self.data.len() + 2);
        result.extend_from_slice(&self.data);
        result.push(self.sw1);
        result.push(self.sw2);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_response() {
        let resp = Response::ok();
        assert!(resp.is_okay());
        assert!(resp.data.is_empty());
        assert_eq!(resp.to_bytes(), vec![0x90, 0x00]);
    }

    #[test]
    fn test_error_response() {
        let resp = Response::error(SW::WRONG_DATA);
        assert!(!resp.is_okay());
        assert_eq!(resp.sw(), 0x6A80);
        assert_eq!(resp.to_bytes(), vec![0x6A, 0x80]);
    }

    #[test]
    fn test_counter_warning() {
        let resp = Response::counter_warning(2);
        assert!(!resp.is_okay());
        assert_eq!(resp.sw(), 0x63C2);
    }

    #[test]
    fn test_data_precedes_status() {
        let resp = Response::new(b"hsm".to_vec(), SW::SUCCESS);
        assert_eq!(resp.to_bytes(), vec![b'h', b's', b'm', 0x90, 0x00]);
    }
}
