//! ATR (Answer To Reset) of the virtual reader's card

/// Build a T=1 ATR carrying the given historical bytes
///
/// At most 15 historical bytes fit the T0 nibble; extra bytes are dropped.
pub fn build_atr(historical_bytes: &[u8]) -> Vec<u8> {
    let hist_len = historical_bytes.len().min(15);
    let mut atr = Vec::with_capacity(hist_len + 4);

    // TS: direct convention
    atr.push(0x3B);
    // T0: TD1 present, K historical bytes
    atr.push(0x80 | hist_len as u8);
    // TD1: T=1, no further interface bytes
    atr.push(0x01);
    atr.extend_from_slice(&historical_bytes[..hist_len]);

    // TCK: XOR of T0 through the last historical byte
    let tck = atr[1..].iter().fold(0u8, |acc, &b| acc ^ b);
    atr.push(tck);

    atr
}

/// ATR advertising the minihsm card
pub fn create_minihsm_atr() -> Vec<u8> {
    let historical = [
        0x80, // Category indicator: compact-TLV, status in last three bytes
        0x4F, 0x08, // Compact-TLV application identifier, 8 bytes
        0xF0, 0x4D, 0x49, 0x4E, 0x49, 0x48, 0x53, 0x4D,
        0x05, // Life cycle: operational
        0x90, 0x00,
    ];

    build_atr(&historical)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::minihsm::applet::MINIHSM_AID;

    #[test]
    fn test_build_atr() {
        let hist = [0x01, 0x02, 0x03, 0x04];
        let atr = build_atr(&hist);

        assert_eq!(atr[0], 0x3B);
        assert_eq!(atr[1] & 0x0F, 4);
        assert_eq!(&atr[3..7], &hist);
        assert_eq!(atr.len(), 8);
    }

    #[test]
    fn test_atr_checksum() {
        let atr = create_minihsm_atr();
        let tck = atr[1..atr.len() - 1].iter().fold(0u8, |acc, &b| acc ^ b);
        assert_eq!(atr[atr.len() - 1], tck);
        assert!(atr.len() <= 33);
    }

    #[test]
    fn test_minihsm_atr_carries_aid() {
        let atr = create_minihsm_atr();
        assert!(atr.windows(MINIHSM_AID.len()).any(|w| w == MINIHSM_AID));
    }

    #[test]
    fn test_historical_bytes_capped() {
        let atr = build_atr(&[0xAA; 20]);
        assert_eq!(atr[1], 0x8F);
        assert_eq!(atr.len(), 3 + 15 + 1);
    }
}
