//! Hex encoding for input and output buffers.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HexError {
    #[error("odd number of hex digits")]
    OddLength,

    #[error("invalid hex digit '{0}'")]
    InvalidDigit(char),
}

/// Decode a hex string, with or without a `0x` prefix. The empty string is
/// an empty buffer.
pub fn decode(text: &str) -> Result<Vec<u8>, HexError> {
    let digits = text.strip_prefix("0x").unwrap_or(text);
    let chars: Vec<char> = digits.chars().collect();
    if chars.len() % 2 != 0 {
        return Err(HexError::OddLength);
    }
    let nibble = |c: char| c.to_digit(16).map(|d| d as u8).ok_or(HexError::InvalidDigit(c));

    chars
        .chunks_exact(2)
        .map(|pair| Ok((nibble(pair[0])? << 4) | nibble(pair[1])?))
        .collect()
}

/// Lowercase hex, two digits per byte.
pub fn encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
