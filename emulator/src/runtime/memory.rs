use thiserror::Error;

use crate::constants::{Address, MEMORY_SIZE};

/// Represents errors related to memory manipulations
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum MemoryError {
    /// The given address was out of bounds
    #[error("address {0} is out of range")]
    AddressOutOfRange(Address),

    /// The program image does not fit in memory
    #[error("program image holds {0} words but memory only has {MEMORY_SIZE}")]
    ImageTooLarge(usize),
}

/// Holds the memory cells of the computer.
///
/// Code and data live in the same cells: a write to an address the machine
/// later fetches from changes what gets executed.
///
/// Cells hold raw 16-bit values, since a freshly loaded image is full of
/// register selectors. Everything the machine itself writes is a word.
#[derive(Clone, PartialEq, Eq)]
pub struct Memory {
    inner: Box<[u16]>,
}

impl Default for Memory {
    fn default() -> Self {
        Self {
            inner: vec![0; MEMORY_SIZE].into_boxed_slice(),
        }
    }
}

impl std::fmt::Debug for Memory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Memory {{ {} cells }}", self.inner.len())
    }
}

impl Memory {
    /// Build a memory seeded with a program image, the rest being zeroed
    ///
    /// # Errors
    ///
    /// It fails if the image has more words than there are cells.
    pub fn with_image(image: &[u16]) -> Result<Self, MemoryError> {
        if image.len() > MEMORY_SIZE {
            return Err(MemoryError::ImageTooLarge(image.len()));
        }

        let mut memory = Self::default();
        memory.inner[..image.len()].copy_from_slice(image);
        Ok(memory)
    }

    /// Get the value stored at an address
    ///
    /// # Errors
    ///
    /// It fails if the address is out of bounds.
    pub fn get(&self, address: Address) -> Result<u16, MemoryError> {
        self.inner
            .get(usize::from(address))
            .copied()
            .ok_or(MemoryError::AddressOutOfRange(address))
    }

    /// Overwrite the value stored at an address
    ///
    /// # Errors
    ///
    /// It fails if the address is out of bounds.
    pub fn set(&mut self, address: Address, value: u16) -> Result<(), MemoryError> {
        let cell = self
            .inner
            .get_mut(usize::from(address))
            .ok_or(MemoryError::AddressOutOfRange(address))?;
        *cell = value;
        Ok(())
    }
}
