//! Conversions between the raw encoding of a program and its values.

use thiserror::Error;

use super::registers::Reg;
use crate::constants::REGISTER_BASE;

/// A raw value was used as a register selector but does not name one of the
/// eight registers
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("invalid register index {0}")]
pub struct InvalidRegisterIndex(pub u16);

/// Encode a value as two little-endian bytes
#[must_use]
pub const fn word_to_bytes(word: u16) -> [u8; 2] {
    word.to_le_bytes()
}

/// Decode two little-endian bytes
#[must_use]
pub const fn bytes_to_word(bytes: [u8; 2]) -> u16 {
    u16::from_le_bytes(bytes)
}

/// Map a raw value in `32768..=32775` to the register it selects
///
/// # Errors
///
/// Fails for any value outside of the register range.
pub fn register_index(value: u16) -> Result<Reg, InvalidRegisterIndex> {
    value
        .checked_sub(REGISTER_BASE)
        .and_then(|index| u8::try_from(index).ok())
        .and_then(Reg::new)
        .ok_or(InvalidRegisterIndex(value))
}
