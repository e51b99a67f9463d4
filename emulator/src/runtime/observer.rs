//! Instruction-level diagnostics.
//!
//! An [`Observer`] installed on a [`Machine`](super::Machine) is called after
//! every successfully executed instruction. It only ever sees copies of the
//! machine state and cannot change how the program runs.

use tracing::trace;

use super::instructions::Instruction;
use crate::constants::{Address, Word};

/// What happened during one instruction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trace {
    /// Where the instruction was fetched from
    pub address: Address,

    pub instruction: Instruction,

    /// Value operands, resolved through registers before execution
    pub operands: Vec<Word>,

    /// What ended up in the destination, for instructions that have one
    pub result: Option<Word>,
}

pub trait Observer {
    fn executed(&mut self, trace: &Trace);
}

/// Emits a `trace` level event for each instruction
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn executed(&mut self, t: &Trace) {
        trace!(
            address = t.address,
            opcode = %t.instruction.opcode(),
            operands = ?t.operands,
            result = ?t.result,
            "{}",
            t.instruction
        );
    }
}
