use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::constants::{Address, Word};
use crate::terminal::Terminal;

pub mod alu;
pub mod converter;
mod instructions;
mod memory;
mod observer;
mod registers;
mod stack;

pub use self::converter::InvalidRegisterIndex;
pub use self::instructions::{Instruction, Opcode, Target, Value};
pub use self::memory::{Memory, MemoryError};
pub use self::observer::{Observer, Trace, TracingObserver};
pub use self::registers::{Reg, Registers};
pub use self::stack::{Stack, StackUnderflow};

/// Every way a run can go wrong. None of them can be recovered from.
#[derive(Error, Debug)]
pub enum MachineError {
    #[error("invalid opcode {0}")]
    InvalidOpcode(u16),

    #[error("invalid value {0}")]
    InvalidValue(u16),

    #[error(transparent)]
    InvalidRegisterIndex(#[from] InvalidRegisterIndex),

    #[error(transparent)]
    StackUnderflow(#[from] StackUnderflow),

    #[error("arithmetic fault: {0} mod 0")]
    ArithmeticFault(Word),

    #[error(transparent)]
    Memory(#[from] MemoryError),

    #[error("terminal failure: {0}")]
    Terminal(#[from] std::io::Error),

    #[error("the machine is not running")]
    NotRunning,
}

type Result<T> = std::result::Result<T, MachineError>;

/// Why a run ended without error
#[derive(Debug, Clone, Copy, PartialEq, Eq, parse_display::Display)]
pub enum StopReason {
    /// A `halt` instruction was executed
    #[display("halted")]
    Halt,

    /// A `ret` was executed with an empty stack
    #[display("returned with an empty stack")]
    EmptyReturn,

    /// An `in` instruction found no more input
    #[display("end of input")]
    EndOfInput,

    /// The instruction budget given to [`Machine::run_for`] was used up
    #[display("step limit reached")]
    StepLimit,
}

/// Outcome of a single [`Machine::step`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue,
    Stop(StopReason),
}

/// The virtual machine
///
/// It owns all of its state: memory, registers, stack and instruction
/// pointer. Characters go in and out through a [`Terminal`].
pub struct Machine<T> {
    pub registers: Registers,
    pub memory: Memory,
    pub stack: Stack,

    /// Address of the next cell to fetch
    pub pc: Address,

    /// Number of instructions executed so far
    pub cycles: usize,

    running: bool,
    terminal: T,
    observer: Option<Box<dyn Observer>>,
}

impl<T> std::fmt::Debug for Machine<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Machine {{ registers: {:?}, pc: {}, stack: {} values, memory: [...] }}",
            self.registers,
            self.pc,
            self.stack.len()
        )
    }
}

impl<T: Terminal> Machine<T> {
    /// Build a machine with its memory seeded from a program image
    ///
    /// # Errors
    ///
    /// It fails if the image does not fit in memory.
    pub fn new(image: &[u16], terminal: T) -> Result<Self> {
        Ok(Self {
            registers: Registers::default(),
            memory: Memory::with_image(image)?,
            stack: Stack::default(),
            pc: 0,
            cycles: 0,
            running: true,
            terminal,
            observer: None,
        })
    }

    /// Install an observer called after every instruction
    #[must_use]
    pub fn with_observer(mut self, observer: Box<dyn Observer>) -> Self {
        self.observer = Some(observer);
        self
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running
    }

    #[must_use]
    pub fn into_terminal(self) -> T {
        self.terminal
    }

    /// Read the next raw cell and move past it
    fn fetch(&mut self) -> Result<u16> {
        let raw = self.memory.get(self.pc)?;
        self.pc += 1;
        Ok(raw)
    }

    fn fetch_value(&mut self) -> Result<Value> {
        Value::decode(self.fetch()?)
    }

    fn fetch_target(&mut self) -> Result<Target> {
        Target::decode(self.fetch()?)
    }

    fn read(&self, value: Value) -> Word {
        match value {
            Value::Imm(word) => word,
            Value::Reg(reg) => self.registers.get(reg),
        }
    }

    fn write(&mut self, target: Target, value: Word) -> Result<()> {
        match target {
            Target::Reg(reg) => self.registers.set(reg, value),
            Target::Mem(address) => self.memory.set(address, value)?,
        }
        Ok(())
    }

    /// Turn a destination into a memory address, going through the register
    /// it names exactly once
    fn indirect(&self, target: Target) -> Address {
        match target {
            Target::Mem(address) => address,
            Target::Reg(reg) => self.registers.get(reg),
        }
    }

    fn jump(&mut self, address: Address) {
        debug!("Jumping to address {}", address);
        self.pc = address;
    }

    fn decode_instruction(&mut self) -> Result<Instruction> {
        let opcode = Opcode::try_from(self.fetch()?)?;
        Instruction::decode(opcode, self)
    }

    /// What the instruction left in its destination
    fn written(&self, instruction: &Instruction) -> Option<Word> {
        let target = instruction.destination()?;
        let address = match (instruction, target) {
            (Instruction::Wmem(..), target) => self.indirect(target),
            (_, Target::Reg(reg)) => return Some(self.registers.get(reg)),
            (_, Target::Mem(address)) => address,
        };
        self.memory.get(address).ok()
    }

    /// Fetch, decode and execute a single instruction
    ///
    /// # Errors
    ///
    /// Any fatal condition met by the instruction. The machine stops running
    /// afterwards, like it does when the step returns [`Step::Stop`].
    #[tracing::instrument(skip(self), fields(pc = self.pc), level = "trace")]
    pub fn step(&mut self) -> Result<Step> {
        if !self.running {
            return Err(MachineError::NotRunning);
        }

        let address = self.pc;
        let result = self.decode_instruction().and_then(|instruction| {
            let operands = self.observer.is_some().then(|| {
                instruction
                    .values()
                    .into_iter()
                    .map(|value| self.read(value))
                    .collect()
            });

            let step = instruction.execute(self)?;
            self.cycles += 1;

            if let Some(operands) = operands {
                let trace = Trace {
                    address,
                    instruction,
                    operands,
                    result: self.written(&instruction),
                };
                if let Some(observer) = self.observer.as_mut() {
                    observer.executed(&trace);
                }
            }

            Ok(step)
        });

        if !matches!(result, Ok(Step::Continue)) {
            self.running = false;
        }

        result
    }

    /// Run until the program stops
    ///
    /// # Errors
    ///
    /// Any fatal condition met while running. The error is reported to the
    /// terminal before being returned.
    pub fn run(&mut self) -> Result<StopReason> {
        self.run_until(None)
    }

    /// Run until the program stops, or `limit` more instructions were executed
    ///
    /// The machine can be resumed after a [`StopReason::StepLimit`].
    ///
    /// # Errors
    ///
    /// Any fatal condition met while running. The error is reported to the
    /// terminal before being returned.
    pub fn run_for(&mut self, limit: usize) -> Result<StopReason> {
        self.run_until(Some(self.cycles.saturating_add(limit)))
    }

    #[tracing::instrument(skip(self))]
    fn run_until(&mut self, limit: Option<usize>) -> Result<StopReason> {
        let result = loop {
            if limit.is_some_and(|limit| self.cycles >= limit) {
                break Ok(StopReason::StepLimit);
            }

            match self.step() {
                Ok(Step::Continue) => {}
                Ok(Step::Stop(reason)) => break Ok(reason),
                Err(e) => break Err(e),
            }
        };

        if let Err(e) = self.terminal.flush() {
            warn!(error = %e, "Could not flush the terminal");
        }

        match &result {
            Ok(reason) => info!(%reason, cycles = self.cycles, "Machine stopped"),
            Err(e) => {
                error!(error = %e, pc = self.pc, cycles = self.cycles, "Machine faulted");
                if let Err(io) = self.terminal.report(e) {
                    warn!(error = %io, "Could not report the error to the terminal");
                }
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use insta::assert_snapshot;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::constants::MEMORY_SIZE;
    use crate::terminal::Console;

    type TestConsole = Console<&'static [u8], Vec<u8>, Vec<u8>>;

    const R0: u16 = 32768;
    const R1: u16 = 32769;
    const R2: u16 = 32770;

    fn machine(image: &[u16]) -> Machine<TestConsole> {
        machine_with_input(image, "")
    }

    fn machine_with_input(image: &[u16], input: &'static str) -> Machine<TestConsole> {
        Machine::new(image, Console::new(input.as_bytes(), Vec::new(), Vec::new())).unwrap()
    }

    fn reg(index: u8) -> Reg {
        Reg::new(index).unwrap()
    }

    fn output(machine: Machine<TestConsole>) -> (Vec<u8>, String) {
        let (_, output, error) = machine.into_terminal().into_inner();
        (output, String::from_utf8(error).unwrap())
    }

    #[test]
    fn add_and_out_test() {
        let mut machine = machine(&[9, R0, R1, 4, 19, R0, 0]);
        machine.registers.set(reg(1), 0);

        assert_eq!(machine.run().unwrap(), StopReason::Halt);
        assert_eq!(machine.registers.get(reg(0)), 4);
        assert_eq!(machine.cycles, 3);
        assert!(!machine.is_running());

        let (output, error) = output(machine);
        assert_eq!(output, vec![4]);
        assert!(error.is_empty());
    }

    #[test]
    fn noop_test() {
        let mut machine = machine(&[21, 21, 21, 21, 0]);
        assert_eq!(machine.run().unwrap(), StopReason::Halt);
        assert_eq!(machine.pc, 5);

        let (output, error) = output(machine);
        assert!(output.is_empty());
        assert!(error.is_empty());
    }

    #[test]
    fn push_pop_test() {
        // push 5; pop r0; out r0; halt
        let mut machine = machine(&[2, 5, 3, R0, 19, R0, 0]);
        assert_eq!(machine.run().unwrap(), StopReason::Halt);
        assert!(machine.stack.is_empty());
        assert_eq!(output(machine).0, vec![5]);
    }

    #[test]
    fn invalid_opcode_test() {
        let mut machine = machine(&[99, 19, 65]);
        let err = machine.run().unwrap_err();
        assert!(matches!(err, MachineError::InvalidOpcode(99)));
        assert_eq!(machine.cycles, 0);

        let (output, error) = output(machine);
        assert!(output.is_empty());
        assert_eq!(error, "error: invalid opcode 99\n");
    }

    #[test]
    fn self_modifying_test() {
        // wmem 3, 0 overwrites the `out` right after it with a `halt`
        let mut machine = machine(&[16, 3, 0, 19, 65, 0]);
        assert_eq!(machine.run().unwrap(), StopReason::Halt);
        assert_eq!(machine.pc, 4);
        assert_eq!(machine.memory.get(3), Ok(0));
        assert!(output(machine).0.is_empty());
    }

    #[test]
    fn nested_call_test() {
        let mut image = vec![0; 40];
        let mut place = |address: usize, words: &[u16]| {
            image[address..address + words.len()].copy_from_slice(words);
        };
        place(0, &[17, 10, 19, 65, 0]); // call 10; out 'A'; halt
        place(10, &[17, 20, 19, 66, 18]); // call 20; out 'B'; ret
        place(20, &[17, 30, 19, 67, 18]); // call 30; out 'C'; ret
        place(30, &[19, 68, 18]); // out 'D'; ret

        let mut machine = machine(&image);
        assert_eq!(machine.run().unwrap(), StopReason::Halt);
        assert!(machine.stack.is_empty());
        assert_eq!(output(machine).0, b"DCBA");
    }

    #[test]
    fn empty_return_test() {
        let mut machine = machine(&[19, 65, 18, 19, 66]);
        assert_eq!(machine.run().unwrap(), StopReason::EmptyReturn);
        assert_eq!(output(machine).0, b"A");
    }

    #[test]
    fn set_test() {
        // set r2, 1234; set r1, r2; set [100], r1; halt
        let mut machine = machine(&[1, R2, 1234, 1, R1, R2, 1, 100, R1, 0]);
        machine.run().unwrap();
        assert_eq!(machine.registers.get(reg(2)), 1234);
        assert_eq!(machine.registers.get(reg(1)), 1234);
        assert_eq!(machine.memory.get(100), Ok(1234));
    }

    #[test]
    fn arithmetic_test() {
        let image = [
            9, R0, 32758, 15, // add r0, 32758, 15
            10, R1, 16384, 2, // mult r1, 16384, 2
            11, R2, 10, 3, // mod r2, 10, 3
            14, 32771, 0, // not r3, 0
            12, 32772, 12, 10, // and r4, 12, 10
            13, 32773, 12, 10, // or r5, 12, 10
            4, 32774, R2, 1, // eq r6, r2, 1
            5, 32775, R2, 1, // gt r7, r2, 1
            0,
        ];
        let mut machine = machine(&image);
        machine.run().unwrap();

        let values: Vec<_> = Reg::all().map(|r| machine.registers.get(r)).collect();
        assert_eq!(values, vec![5, 0, 1, 32767, 8, 14, 1, 0]);
    }

    #[test]
    fn jumps_test() {
        let image = [
            7, 0, 100, // jt 0, 100: not taken
            8, 1, 100, // jf 1, 100: not taken
            7, 1, 12, // jt 1, 12
            19, 66, 0, // out 'B'; halt
            8, 0, 17, // 12: jf 0, 17
            19, 67, // out 'C'
            6, 21, // 17: jmp 21
            19, 68, // out 'D'
            19, 65, 0, // 21: out 'A'; halt
        ];
        let mut machine = machine(&image);
        assert_eq!(machine.run().unwrap(), StopReason::Halt);
        assert_eq!(output(machine).0, b"A");
    }

    #[test]
    fn rmem_test() {
        let mut image = vec![0; 200];
        image[..7].copy_from_slice(&[15, R0, R1, 15, R2, 100, 0]);
        image[100] = 42;
        image[42] = 7;

        let mut machine = machine(&image);
        machine.registers.set(reg(1), 100);
        machine.run().unwrap();

        // One level only: r1 holds 100, cell 100 holds 42
        assert_eq!(machine.registers.get(reg(0)), 42);
        assert_eq!(machine.registers.get(reg(2)), 42);
    }

    #[test]
    fn rmem_register_selector_test() {
        // Cell 1 holds the raw selector of r0, which is not a word
        let mut machine = machine(&[15, R0, 1, 0]);
        let err = machine.run().unwrap_err();
        assert!(matches!(err, MachineError::InvalidValue(R0)));
    }

    #[test]
    fn wmem_test() {
        let image = [
            16, R1, 9, // wmem r1, 9
            16, 200, R2, // wmem 200, r2
            0,
        ];
        let mut machine = machine(&image);
        machine.registers.set(reg(1), 100);
        machine.registers.set(reg(2), 5);
        machine.run().unwrap();

        assert_eq!(machine.memory.get(100), Ok(9));
        assert_eq!(machine.registers.get(reg(1)), 100);
        assert_eq!(machine.memory.get(200), Ok(5));
    }

    #[test]
    fn input_test() {
        // in r0; out r0; jmp 0
        let mut machine = machine_with_input(&[20, R0, 19, R0, 6, 0], "hi\n");
        assert_eq!(machine.run().unwrap(), StopReason::EndOfInput);
        assert_eq!(output(machine).0, b"hi\n");
    }

    #[test]
    fn partial_output_test() {
        // out 'A'; out 'B'; then an undefined opcode
        let mut machine = machine(&[19, 65, 19, 66, 99]);
        let err = machine.run().unwrap_err();
        assert!(matches!(err, MachineError::InvalidOpcode(99)));
        assert_eq!(machine.cycles, 2);

        let (output, error) = output(machine);
        assert_eq!(output, b"AB");
        assert_eq!(error, "error: invalid opcode 99\n");
    }

    #[test]
    fn errors_test() {
        let cases: [(&[u16], &str); 4] = [
            (&[19, 32776], "invalid value 32776"),
            (&[1, 40000, 1], "invalid register index 40000"),
            (&[3, R0], "stack underflow"),
            (&[11, R0, 5, 0], "arithmetic fault: 5 mod 0"),
        ];

        for (image, message) in cases {
            let mut machine = machine(image);
            let err = machine.run().unwrap_err();
            assert_eq!(err.to_string(), message);
            assert!(!machine.is_running());
            assert_eq!(output(machine).1, format!("error: {message}\n"));
        }
    }

    #[test]
    fn address_out_of_range_test() {
        let mut image = vec![0; MEMORY_SIZE];
        image[0] = 6; // jmp 32767
        image[1] = 32767;
        image[32767] = 21; // noop, then fall off the end of memory

        let mut machine = machine(&image);
        let err = machine.run().unwrap_err();
        assert!(matches!(
            err,
            MachineError::Memory(MemoryError::AddressOutOfRange(32768))
        ));
        assert_snapshot!(err.to_string(), @"address 32768 is out of range");
    }

    #[test]
    fn image_too_large_test() {
        let image = vec![0; MEMORY_SIZE + 1];
        let err = Machine::new(&image, Console::new(&b""[..], Vec::new(), Vec::new())).unwrap_err();
        assert!(matches!(
            err,
            MachineError::Memory(MemoryError::ImageTooLarge(_))
        ));
    }

    #[test]
    fn step_test() {
        let mut machine = machine(&[1, R0, 42, 2, R0, 0]);
        assert_eq!(machine.step().unwrap(), Step::Continue);
        assert_eq!(machine.pc, 3);
        assert_eq!(machine.registers.get(reg(0)), 42);

        assert_eq!(machine.step().unwrap(), Step::Continue);
        assert_eq!(machine.stack.len(), 1);

        assert_eq!(machine.step().unwrap(), Step::Stop(StopReason::Halt));
        assert!(matches!(machine.step(), Err(MachineError::NotRunning)));
    }

    #[test]
    fn run_for_test() {
        // jmp 0, forever
        let mut machine = machine(&[6, 0]);
        assert_eq!(machine.run_for(10).unwrap(), StopReason::StepLimit);
        assert_eq!(machine.cycles, 10);
        assert!(machine.is_running());

        assert_eq!(machine.run_for(5).unwrap(), StopReason::StepLimit);
        assert_eq!(machine.cycles, 15);
    }

    #[derive(Clone, Default)]
    struct Recorder(Rc<RefCell<Vec<Trace>>>);

    impl Observer for Recorder {
        fn executed(&mut self, trace: &Trace) {
            self.0.borrow_mut().push(trace.clone());
        }
    }

    #[test]
    fn observer_test() {
        let recorder = Recorder::default();
        let mut machine = machine(&[9, R0, R1, 4, 16, R0, 7, 19, R0, 0])
            .with_observer(Box::new(recorder.clone()));
        machine.registers.set(reg(1), 96);
        machine.run().unwrap();

        let traces = recorder.0.borrow();
        let summary: Vec<_> = traces
            .iter()
            .map(|t| (t.address, t.instruction.to_string(), t.operands.clone(), t.result))
            .collect();

        assert_eq!(
            summary,
            vec![
                (0, "add  r0, r1, 4".to_owned(), vec![96, 4], Some(100)),
                (4, "wmem r0, 7".to_owned(), vec![7], Some(7)),
                (7, "out  r0".to_owned(), vec![100], None),
                (9, "halt".to_owned(), vec![], None),
            ]
        );
    }
}
