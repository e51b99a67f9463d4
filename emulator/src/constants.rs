/// A 15-bit architectural value, always in `0..=MAX_WORD` once it went through the machine
pub type Word = u16;

/// An index in memory
pub type Address = u16;

/// Total size of the computer memory, in words
pub const MEMORY_SIZE: usize = 32768;

/// Number of general purpose registers
pub const REGISTER_COUNT: usize = 8;

/// First raw value selecting a register (`r0`)
pub const REGISTER_BASE: u16 = 32768;

/// Every arithmetic result is reduced modulo this value
pub const MODULUS: u32 = 32768;

/// Largest valid [`Word`]
pub const MAX_WORD: Word = 32767;
