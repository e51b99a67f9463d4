use thiserror::Error;

use crate::constants::Word;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("stack underflow")]
pub struct StackUnderflow;

/// The machine's operand stack. Only limited by host memory.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Stack {
    inner: Vec<Word>,
}

impl Stack {
    pub fn push(&mut self, value: Word) {
        self.inner.push(value);
    }

    /// Remove the value on top of the stack
    ///
    /// # Errors
    ///
    /// Fails if the stack is empty.
    pub fn pop(&mut self) -> Result<Word, StackUnderflow> {
        self.inner.pop().ok_or(StackUnderflow)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
