//! BER-TLV scanner
//!
//! Walks the top level of a BER-TLV encoded buffer without copying and
//! reports where a tag's value lives. Constructed tags are not descended
//! into.

use thiserror::Error;

/// Errors that can occur while walking a TLV buffer
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TLVError {
    #[error("Unexpected end of data while parsing tag")]
    UnexpectedEndTag,

    #[error("Unexpected end of data while parsing length")]
    UnexpectedEndLength,

    #[error("Unexpected end of data while parsing value")]
    UnexpectedEndValue,

    #[error("Invalid length encoding")]
    InvalidLength,

    #[error("Length too large: {0} length bytes")]
    LengthTooLarge(usize),
}

/// Location of a value inside the scanned buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    /// The tag (1-3 bytes encoded as u32)
    pub tag: u32,
    /// Offset of the first value byte
    pub offset: usize,
    /// Number of value bytes
    pub len: usize,
}

impl Field {
    /// Borrow the value bytes out of the buffer this field was found in
    pub fn value<'a>(&self, data: &'a [u8]) -> &'a [u8] {
        &data[self.offset..self.offset + self.len]
    }
}

/// Iterator over the top-level fields of a buffer
///
/// Stops at the first malformed field; everything after it is unreachable.
pub struct Fields<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Fields<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn next_field(&mut self) -> Result<Field, TLVError> {
        let start = self.pos;
        let (tag, tag_len) = parse_tag(&self.data[start..])?;
        let (len, len_len) = parse_length(&self.data[start + tag_len..])?;

        let offset = start + tag_len + len_len;
        let end = offset.checked_add(len).ok_or(TLVError::InvalidLength)?;
        if end > self.data.len() {
            return Err(TLVError::UnexpectedEndValue);
        }

        self.pos = end;
        Ok(Field { tag, offset, len })
    }
}

impl Iterator for Fields<'_> {
    type Item = Field;

    fn next(&mut self) -> Option<Field> {
        if self.pos >= self.data.len() {
            return None;
        }
        match self.next_field() {
            Ok(field) => Some(field),
            Err(e) => {
                log::debug!("TLV scan stopped at offset {}: {}", self.pos, e);
                self.pos = self.data.len();
                None
            }
        }
    }
}

/// Parse a BER tag (1-3 bytes)
fn parse_tag(data: &[u8]) -> Result<(u32, usize), TLVError> {
    let first = *data.first().ok_or(TLVError::UnexpectedEndTag)?;

    // Low 5 bits all set means the tag continues
    if (first & 0x1F) != 0x1F {
        return Ok((first as u32, 1));
    }

    let second = *data.get(1).ok_or(TLVError::UnexpectedEndTag)?;
    if (second & 0x80) == 0 {
        return Ok((((first as u32) << 8) | (second as u32), 2));
    }

    let third = *data.get(2).ok_or(TLVError::UnexpectedEndTag)?;
    let tag = ((first as u32) << 16) | ((second as u32) << 8) | (third as u32);
    Ok((tag, 3))
}

/// Parse a BER length (1-3 bytes)
fn parse_length(data: &[u8]) -> Result<(usize, usize), TLVError> {
    let first = *data.first().ok_or(TLVError::UnexpectedEndLength)?;

    // Short form (0-127)
    if (first & 0x80) == 0 {
        return Ok((first as usize, 1));
    }

    let num_bytes = (first & 0x7F) as usize;
    if num_bytes == 0 {
        // Indefinite length
        return Err(TLVError::InvalidLength);
    }
    if num_bytes > 2 {
        return Err(TLVError::LengthTooLarge(num_bytes));
    }
    if data.len() < 1 + num_bytes {
        return Err(TLVError::UnexpectedEndLength);
    }

    let length = data[1..=num_bytes]
        .iter()
        .fold(0usize, |acc, &b| (acc << 8) | b as usize);
    Ok((length, 1 + num_bytes))
}
