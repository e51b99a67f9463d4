//! Character I/O between the machine and the outside world.

use std::collections::VecDeque;
use std::io::{self, BufRead, Write};

use crate::constants::Word;
use crate::runtime::MachineError;

/// The machine's only way to talk to the user
pub trait Terminal {
    /// Emit the character with the given code, for `out`
    ///
    /// # Errors
    ///
    /// Fails if the underlying sink fails.
    fn write_char(&mut self, code: Word) -> io::Result<()>;

    /// Get the next character code, for `in`
    ///
    /// Returns `None` once the input is exhausted.
    ///
    /// # Errors
    ///
    /// Fails if the underlying source fails.
    fn read_char(&mut self) -> io::Result<Option<Word>>;

    /// Describe a fatal machine error to the user
    ///
    /// # Errors
    ///
    /// Fails if the underlying error sink fails.
    fn report(&mut self, error: &MachineError) -> io::Result<()>;

    /// Push out anything buffered
    ///
    /// # Errors
    ///
    /// Fails if the underlying sink fails.
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<T: Terminal + ?Sized> Terminal for &mut T {
    fn write_char(&mut self, code: Word) -> io::Result<()> {
        (**self).write_char(code)
    }

    fn read_char(&mut self) -> io::Result<Option<Word>> {
        (**self).read_char()
    }

    fn report(&mut self, error: &MachineError) -> io::Result<()> {
        (**self).report(error)
    }

    fn flush(&mut self) -> io::Result<()> {
        (**self).flush()
    }
}

/// A [`Terminal`] over an input stream and two output streams
///
/// Input is consumed one full line at a time, then handed out one character
/// per `read_char`.
pub struct Console<R, W, E> {
    input: R,
    output: W,
    error: E,
    line: VecDeque<u8>,
}

impl<R, W, E> Console<R, W, E> {
    #[must_use]
    pub fn new(input: R, output: W, error: E) -> Self {
        Self {
            input,
            output,
            error,
            line: VecDeque::new(),
        }
    }

    #[must_use]
    pub fn output(&self) -> &W {
        &self.output
    }

    #[must_use]
    pub fn into_inner(self) -> (R, W, E) {
        (self.input, self.output, self.error)
    }
}

impl<R: BufRead, W: Write, E: Write> Terminal for Console<R, W, E> {
    /// Codes past 127 are written as their UTF-8 encoding, not as a single byte
    fn write_char(&mut self, code: Word) -> io::Result<()> {
        let c = char::from_u32(code.into()).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("{code} is not a character"),
            )
        })?;

        let mut buf = [0; 4];
        self.output.write_all(c.encode_utf8(&mut buf).as_bytes())?;
        if c == '\n' {
            self.output.flush()?;
        }
        Ok(())
    }

    fn read_char(&mut self) -> io::Result<Option<Word>> {
        if self.line.is_empty() {
            // The program is probably waiting on a prompt it just wrote
            self.output.flush()?;

            let mut buf = Vec::new();
            if self.input.read_until(b'\n', &mut buf)? == 0 {
                return Ok(None);
            }
            self.line.extend(buf);
        }

        Ok(self.line.pop_front().map(Word::from))
    }

    fn report(&mut self, error: &MachineError) -> io::Result<()> {
        writeln!(self.error, "error: {error}")?;
        self.error.flush()
    }

    fn flush(&mut self) -> io::Result<()> {
        self.output.flush()?;
        self.error.flush()
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    use super::*;

    fn console(input: &str) -> Console<&[u8], Vec<u8>, Vec<u8>> {
        Console::new(input.as_bytes(), Vec::new(), Vec::new())
    }

    #[test]
    fn write_test() {
        let mut console = console("");
        for c in "Hello\n".chars() {
            console.write_char(c as Word).unwrap();
        }
        console.write_char(4).unwrap();
        console.write_char(0xE9).unwrap();

        assert_eq!(console.output().as_slice(), "Hello\n\x04é".as_bytes());
    }

    #[test]
    fn read_lines_test() {
        let mut console = console(indoc! {"
            go north
            look
        "});

        let mut read = String::new();
        while let Some(code) = console.read_char().unwrap() {
            read.push(char::from_u32(code.into()).unwrap());
        }

        assert_eq!(read, "go north\nlook\n");
        // Stays exhausted
        assert_eq!(console.read_char().unwrap(), None);
    }

    #[test]
    fn read_partial_line_test() {
        let mut console = console("ab");
        assert_eq!(console.read_char().unwrap(), Some(Word::from(b'a')));
        assert_eq!(console.read_char().unwrap(), Some(Word::from(b'b')));
        assert_eq!(console.read_char().unwrap(), None);
    }

    #[test]
    fn report_test() {
        let mut console = console("");
        console.report(&MachineError::InvalidOpcode(99)).unwrap();

        let (_, output, error) = console.into_inner();
        assert!(output.is_empty());
        assert_eq!(String::from_utf8(error).unwrap(), "error: invalid opcode 99\n");
    }
}
