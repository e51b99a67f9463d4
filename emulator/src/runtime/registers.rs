use parse_display::Display;

use crate::constants::{Word, MAX_WORD, REGISTER_COUNT};

/// One of the eight general purpose registers
///
/// The index is checked on construction, so holding a [`Reg`] is proof it
/// selects an existing register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display)]
#[display("r{0}")]
pub struct Reg(u8);

impl Reg {
    /// Select the register at the given index, if it exists
    #[must_use]
    pub fn new(index: u8) -> Option<Self> {
        (usize::from(index) < REGISTER_COUNT).then_some(Self(index))
    }

    #[must_use]
    pub fn index(self) -> usize {
        usize::from(self.0)
    }

    /// Iterate over all registers, `r0` first
    pub fn all() -> impl Iterator<Item = Self> {
        (0..).take(REGISTER_COUNT).map(Self)
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Registers {
    cells: [Word; REGISTER_COUNT],
}

impl Registers {
    #[must_use]
    pub fn get(&self, reg: Reg) -> Word {
        self.cells[reg.index()]
    }

    /// Set a register value
    pub fn set(&mut self, reg: Reg, value: Word) {
        debug_assert!(value <= MAX_WORD, "{value} is not a valid word");
        self.cells[reg.index()] = value;
    }
}

impl std::fmt::Display for Registers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, reg) in Reg::all().enumerate() {
            if i > 0 {
                write!(f, " | ")?;
            }
            write!(f, "{reg} = {}", self.get(reg))?;
        }
        Ok(())
    }
}
