use parse_display::Display;
use tracing::debug;

use super::{
    alu,
    converter::register_index,
    memory::MemoryError,
    registers::Reg,
    Machine, MachineError, Step, StopReason,
};
use crate::constants::{Address, Word, MAX_WORD};
use crate::terminal::Terminal;

type Result<T> = std::result::Result<T, MachineError>;

/// The 22 operations of the architecture, with their encoded value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[display(style = "lowercase")]
#[repr(u16)]
pub enum Opcode {
    Halt = 0,
    Set = 1,
    Push = 2,
    Pop = 3,
    Eq = 4,
    Gt = 5,
    Jmp = 6,
    Jt = 7,
    Jf = 8,
    Add = 9,
    Mult = 10,
    Mod = 11,
    And = 12,
    Or = 13,
    Not = 14,
    Rmem = 15,
    Wmem = 16,
    Call = 17,
    Ret = 18,
    Out = 19,
    In = 20,
    Noop = 21,
}

impl TryFrom<u16> for Opcode {
    type Error = MachineError;

    fn try_from(value: u16) -> Result<Self> {
        use Opcode::*;

        Ok(match value {
            0 => Halt,
            1 => Set,
            2 => Push,
            3 => Pop,
            4 => Eq,
            5 => Gt,
            6 => Jmp,
            7 => Jt,
            8 => Jf,
            9 => Add,
            10 => Mult,
            11 => Mod,
            12 => And,
            13 => Or,
            14 => Not,
            15 => Rmem,
            16 => Wmem,
            17 => Call,
            18 => Ret,
            19 => Out,
            20 => In,
            21 => Noop,
            _ => return Err(MachineError::InvalidOpcode(value)),
        })
    }
}

/// A value operand: read through a register when it names one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Value {
    #[display("{0}")]
    Imm(Word),

    #[display("{0}")]
    Reg(Reg),
}

impl Value {
    /// Classify a raw operand
    ///
    /// # Errors
    ///
    /// Values past the register range are rejected with [`MachineError::InvalidValue`].
    pub fn decode(raw: u16) -> Result<Self> {
        if raw <= MAX_WORD {
            Ok(Self::Imm(raw))
        } else {
            register_index(raw)
                .map(Self::Reg)
                .map_err(|_| MachineError::InvalidValue(raw))
        }
    }
}

/// A destination operand, never dereferenced through the register it names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Target {
    #[display("[{0}]")]
    Mem(Address),

    #[display("{0}")]
    Reg(Reg),
}

impl Target {
    /// Classify a raw operand
    ///
    /// # Errors
    ///
    /// Values past the register range are rejected with [`MachineError::InvalidRegisterIndex`].
    pub fn decode(raw: u16) -> Result<Self> {
        if raw <= MAX_WORD {
            Ok(Self::Mem(raw))
        } else {
            Ok(Self::Reg(register_index(raw)?))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Instruction {
    /// Stop the machine
    #[display("halt")]
    Halt,

    #[display("set  {0}, {1}")]
    Set(Target, Value),

    #[display("push {0}")]
    Push(Value),

    /// Pop the top of the stack, fails on an empty stack
    #[display("pop  {0}")]
    Pop(Target),

    #[display("eq   {0}, {1}, {2}")]
    Eq(Target, Value, Value),

    #[display("gt   {0}, {1}, {2}")]
    Gt(Target, Value, Value),

    #[display("jmp  {0}")]
    Jmp(Value),

    /// Jump to the second operand if the first one is non-zero
    #[display("jt   {0}, {1}")]
    Jt(Value, Value),

    /// Jump to the second operand if the first one is zero
    #[display("jf   {0}, {1}")]
    Jf(Value, Value),

    #[display("add  {0}, {1}, {2}")]
    Add(Target, Value, Value),

    #[display("mult {0}, {1}, {2}")]
    Mult(Target, Value, Value),

    #[display("mod  {0}, {1}, {2}")]
    Mod(Target, Value, Value),

    #[display("and  {0}, {1}, {2}")]
    And(Target, Value, Value),

    #[display("or   {0}, {1}, {2}")]
    Or(Target, Value, Value),

    /// 15-bit bitwise inverse
    #[display("not  {0}, {1}")]
    Not(Target, Value),

    /// Read the memory cell at the address given by the second operand
    #[display("rmem {0}, {1}")]
    Rmem(Target, Value),

    /// Write to memory. If the first operand names a register, its content is
    /// the address written to.
    #[display("wmem {0}, {1}")]
    Wmem(Target, Value),

    /// Push the address of the next instruction and jump
    #[display("call {0}")]
    Call(Value),

    /// Return from a `call`. Halts when the stack is empty.
    #[display("ret")]
    Ret,

    /// Write a character to the terminal
    #[display("out  {0}")]
    Out(Value),

    /// Read a character from the terminal
    #[display("in   {0}")]
    In(Target),

    #[display("noop")]
    Noop,
}

impl Instruction {
    /// Read the operands of an instruction, advancing the instruction pointer past them
    pub(crate) fn decode<T: Terminal>(opcode: Opcode, machine: &mut Machine<T>) -> Result<Self> {
        let instruction = match opcode {
            Opcode::Halt => Self::Halt,
            Opcode::Set => Self::Set(machine.fetch_target()?, machine.fetch_value()?),
            Opcode::Push => Self::Push(machine.fetch_value()?),
            Opcode::Pop => Self::Pop(machine.fetch_target()?),
            Opcode::Eq => Self::Eq(
                machine.fetch_target()?,
                machine.fetch_value()?,
                machine.fetch_value()?,
            ),
            Opcode::Gt => Self::Gt(
                machine.fetch_target()?,
                machine.fetch_value()?,
                machine.fetch_value()?,
            ),
            Opcode::Jmp => Self::Jmp(machine.fetch_value()?),
            Opcode::Jt => Self::Jt(machine.fetch_value()?, machine.fetch_value()?),
            Opcode::Jf => Self::Jf(machine.fetch_value()?, machine.fetch_value()?),
            Opcode::Add => Self::Add(
                machine.fetch_target()?,
                machine.fetch_value()?,
                machine.fetch_value()?,
            ),
            Opcode::Mult => Self::Mult(
                machine.fetch_target()?,
                machine.fetch_value()?,
                machine.fetch_value()?,
            ),
            Opcode::Mod => Self::Mod(
                machine.fetch_target()?,
                machine.fetch_value()?,
                machine.fetch_value()?,
            ),
            Opcode::And => Self::And(
                machine.fetch_target()?,
                machine.fetch_value()?,
                machine.fetch_value()?,
            ),
            Opcode::Or => Self::Or(
                machine.fetch_target()?,
                machine.fetch_value()?,
                machine.fetch_value()?,
            ),
            Opcode::Not => Self::Not(machine.fetch_target()?, machine.fetch_value()?),
            Opcode::Rmem => Self::Rmem(machine.fetch_target()?, machine.fetch_value()?),
            Opcode::Wmem => Self::Wmem(machine.fetch_target()?, machine.fetch_value()?),
            Opcode::Call => Self::Call(machine.fetch_value()?),
            Opcode::Ret => Self::Ret,
            Opcode::Out => Self::Out(machine.fetch_value()?),
            Opcode::In => Self::In(machine.fetch_target()?),
            Opcode::Noop => Self::Noop,
        };

        Ok(instruction)
    }

    #[must_use]
    pub const fn opcode(&self) -> Opcode {
        match self {
            Self::Halt => Opcode::Halt,
            Self::Set(..) => Opcode::Set,
            Self::Push(_) => Opcode::Push,
            Self::Pop(_) => Opcode::Pop,
            Self::Eq(..) => Opcode::Eq,
            Self::Gt(..) => Opcode::Gt,
            Self::Jmp(_) => Opcode::Jmp,
            Self::Jt(..) => Opcode::Jt,
            Self::Jf(..) => Opcode::Jf,
            Self::Add(..) => Opcode::Add,
            Self::Mult(..) => Opcode::Mult,
            Self::Mod(..) => Opcode::Mod,
            Self::And(..) => Opcode::And,
            Self::Or(..) => Opcode::Or,
            Self::Not(..) => Opcode::Not,
            Self::Rmem(..) => Opcode::Rmem,
            Self::Wmem(..) => Opcode::Wmem,
            Self::Call(_) => Opcode::Call,
            Self::Ret => Opcode::Ret,
            Self::Out(_) => Opcode::Out,
            Self::In(_) => Opcode::In,
            Self::Noop => Opcode::Noop,
        }
    }

    /// The value operands of the instruction, in order
    #[must_use]
    pub fn values(&self) -> Vec<Value> {
        match *self {
            Self::Halt | Self::Pop(_) | Self::Ret | Self::In(_) | Self::Noop => Vec::new(),
            Self::Set(_, a)
            | Self::Not(_, a)
            | Self::Rmem(_, a)
            | Self::Wmem(_, a)
            | Self::Push(a)
            | Self::Jmp(a)
            | Self::Call(a)
            | Self::Out(a) => vec![a],
            Self::Jt(a, b)
            | Self::Jf(a, b)
            | Self::Eq(_, a, b)
            | Self::Gt(_, a, b)
            | Self::Add(_, a, b)
            | Self::Mult(_, a, b)
            | Self::Mod(_, a, b)
            | Self::And(_, a, b)
            | Self::Or(_, a, b) => vec![a, b],
        }
    }

    /// The destination operand of the instruction, if it has one
    #[must_use]
    pub const fn destination(&self) -> Option<Target> {
        match *self {
            Self::Set(t, _)
            | Self::Pop(t)
            | Self::Eq(t, _, _)
            | Self::Gt(t, _, _)
            | Self::Add(t, _, _)
            | Self::Mult(t, _, _)
            | Self::Mod(t, _, _)
            | Self::And(t, _, _)
            | Self::Or(t, _, _)
            | Self::Not(t, _)
            | Self::Rmem(t, _)
            | Self::Wmem(t, _)
            | Self::In(t) => Some(t),
            Self::Halt
            | Self::Push(_)
            | Self::Jmp(_)
            | Self::Jt(..)
            | Self::Jf(..)
            | Self::Call(_)
            | Self::Ret
            | Self::Out(_)
            | Self::Noop => None,
        }
    }

    /// Execute the instruction
    pub(crate) fn execute<T: Terminal>(&self, machine: &mut Machine<T>) -> Result<Step> {
        use Instruction::*;

        match *self {
            Halt => return Ok(Step::Stop(StopReason::Halt)),

            Set(dst, val) => {
                let val = machine.read(val);
                machine.write(dst, val)?;
            }

            Push(val) => {
                let val = machine.read(val);
                debug!("push({})", val);
                machine.stack.push(val);
            }

            Pop(dst) => {
                let val = machine.stack.pop()?;
                debug!("pop => {}", val);
                machine.write(dst, val)?;
            }

            Eq(dst, a, b) => binary(machine, dst, a, b, "==", alu::equals)?,
            Gt(dst, a, b) => binary(machine, dst, a, b, ">", alu::greater_than)?,

            Jmp(addr) => {
                let addr = machine.read(addr);
                machine.jump(addr);
            }

            Jt(cond, addr) => {
                if machine.read(cond) != 0 {
                    let addr = machine.read(addr);
                    machine.jump(addr);
                }
            }

            Jf(cond, addr) => {
                if machine.read(cond) == 0 {
                    let addr = machine.read(addr);
                    machine.jump(addr);
                }
            }

            Add(dst, a, b) => binary(machine, dst, a, b, "+", alu::add)?,
            Mult(dst, a, b) => binary(machine, dst, a, b, "*", alu::mult)?,

            Mod(dst, a, b) => {
                let a = machine.read(a);
                let b = machine.read(b);
                let res = alu::modulo(a, b).ok_or(MachineError::ArithmeticFault(a))?;
                debug!("{} % {} = {}", a, b, res);
                machine.write(dst, res)?;
            }

            And(dst, a, b) => binary(machine, dst, a, b, "&", alu::and)?,
            Or(dst, a, b) => binary(machine, dst, a, b, "|", alu::or)?,

            Not(dst, val) => {
                let val = machine.read(val);
                let res = alu::not(val);
                debug!("!{} = {}", val, res);
                machine.write(dst, res)?;
            }

            Rmem(dst, src) => {
                let addr = machine.read(src);
                let raw = machine.memory.get(addr)?;
                // A cell still holding a register selector is not a word
                if raw > MAX_WORD {
                    return Err(MachineError::InvalidValue(raw));
                }
                debug!("[{}] => {}", addr, raw);
                machine.write(dst, raw)?;
            }

            Wmem(dst, val) => {
                let addr = machine.indirect(dst);
                let val = machine.read(val);
                debug!("[{}] <= {}", addr, val);
                machine.memory.set(addr, val)?;
            }

            Call(addr) => {
                let addr = machine.read(addr);
                let ret = machine.pc;
                // A `call` in the very last cells has nowhere to return to
                if ret > MAX_WORD {
                    return Err(MemoryError::AddressOutOfRange(ret).into());
                }
                machine.stack.push(ret);
                debug!("Calling {} (returning to {})", addr, ret);
                machine.jump(addr);
            }

            Ret => {
                let Ok(addr) = machine.stack.pop() else {
                    return Ok(Step::Stop(StopReason::EmptyReturn));
                };
                debug!("Returning to {}", addr);
                machine.jump(addr);
            }

            Out(val) => {
                let val = machine.read(val);
                machine.terminal.write_char(val)?;
            }

            In(dst) => {
                let Some(val) = machine.terminal.read_char()? else {
                    return Ok(Step::Stop(StopReason::EndOfInput));
                };
                machine.write(dst, val)?;
            }

            Noop => {}
        };

        Ok(Step::Continue)
    }
}

/// Execute a binary ALU operation and store its result
fn binary<T: Terminal>(
    machine: &mut Machine<T>,
    dst: Target,
    a: Value,
    b: Value,
    symbol: &str,
    op: fn(Word, Word) -> Word,
) -> Result<()> {
    let a = machine.read(a);
    let b = machine.read(b);
    let res = op(a, b);
    debug!("{} {} {} = {}", a, symbol, b, res);
    machine.write(dst, res)
}
