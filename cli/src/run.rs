use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::process::ExitCode;

use anyhow::Context;
use camino::Utf8PathBuf;
use clap::{Args, ValueHint};
use synacor_emulator::runtime::{MachineError, StopReason, TracingObserver};
use synacor_emulator::{load, Console, Machine};
use tracing::{debug, info};

#[derive(Args, Debug)]
pub struct RunOpt {
    /// Program image to run
    #[arg(value_hint = ValueHint::FilePath)]
    image: Utf8PathBuf,

    /// Feed this file to the program before reading the standard input
    #[arg(short, long, value_hint = ValueHint::FilePath)]
    input: Option<Utf8PathBuf>,

    /// Log every executed instruction. Shows up with `-vvv`
    #[arg(short, long)]
    trace: bool,

    /// Stop after executing this many instructions
    #[arg(long, value_name = "N")]
    max_steps: Option<usize>,
}

impl RunOpt {
    fn input(&self) -> anyhow::Result<Box<dyn BufRead>> {
        let stdin = io::stdin().lock();
        let Some(path) = &self.input else {
            return Ok(Box::new(stdin));
        };

        info!(path = %path, "Feeding input file");
        let file = File::open(path).with_context(|| format!("could not open input {path}"))?;
        Ok(Box::new(BufReader::new(file).chain(stdin)))
    }

    pub fn exec(self) -> anyhow::Result<ExitCode> {
        info!(path = %self.image, "Loading program");
        let image = load(&self.image)?;

        debug!(words = image.len(), "Building machine");
        let console = Console::new(self.input()?, io::stdout(), io::stderr());
        let mut machine = Machine::new(&image, console)?;
        if self.trace {
            machine = machine.with_observer(Box::new(TracingObserver));
        }

        let result = match self.max_steps {
            Some(limit) => machine.run_for(limit),
            None => machine.run(),
        };

        info!(
            registers = %machine.registers,
            stack = machine.stack.len(),
            cycles = machine.cycles,
            "End of program"
        );

        if let Ok(StopReason::StepLimit) = result {
            info!(limit = self.max_steps, "Step limit reached");
        }

        // Machine errors were already reported through the console
        Ok(ExitCode::from(exit_status(&result)))
    }
}

/// Every way of stopping is a success, any machine error is a failure
pub(crate) fn exit_status(result: &Result<StopReason, MachineError>) -> u8 {
    match result {
        Ok(
            StopReason::Halt
            | StopReason::EmptyReturn
            | StopReason::EndOfInput
            | StopReason::StepLimit,
        ) => 0,
        Err(_) => 1,
    }
}
