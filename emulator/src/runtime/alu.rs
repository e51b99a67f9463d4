//! Arithmetic and logic over 15-bit words.
//!
//! Every function takes words and returns a word, reduced modulo 32768.

use crate::constants::{Word, MAX_WORD, MODULUS};

/// Reduce a wide intermediate result back to a word
#[allow(clippy::cast_possible_truncation)]
fn reduce(value: u32) -> Word {
    // Always fits once reduced
    (value % MODULUS) as Word
}

#[must_use]
pub fn add(a: Word, b: Word) -> Word {
    reduce(u32::from(a) + u32::from(b))
}

#[must_use]
pub fn mult(a: Word, b: Word) -> Word {
    reduce(u32::from(a) * u32::from(b))
}

/// Remainder of `a / b`, `None` when dividing by zero
#[must_use]
pub fn modulo(a: Word, b: Word) -> Option<Word> {
    a.checked_rem(b)
}

#[must_use]
pub fn equals(a: Word, b: Word) -> Word {
    Word::from(a == b)
}

#[must_use]
pub fn greater_than(a: Word, b: Word) -> Word {
    Word::from(a > b)
}

#[must_use]
pub fn and(a: Word, b: Word) -> Word {
    a & b
}

#[must_use]
pub fn or(a: Word, b: Word) -> Word {
    a | b
}

/// One's complement over 15 bits, not over the 16 bits of the host type
#[must_use]
pub fn not(a: Word) -> Word {
    MAX_WORD - (a & MAX_WORD)
}
