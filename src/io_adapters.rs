use crate::terminal::{RawTerminal, TerminalError};
use std::cell::RefCell;
use std::fmt;
use std::io::{IsTerminal, Result as IoResult, Write};
use std::rc::Rc;

const RED: &str = "\x1b[91m";
const RESET: &str = "\x1b[0m";

/// Foreground colours for section headings on the output stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Colour {
    Purple,
    Green,
    Blue,
}

impl Colour {
    fn code(self) -> &'static str {
        match self {
            Colour::Purple => "\x1b[95m",
            Colour::Green => "\x1b[92m",
            Colour::Blue => "\x1b[94m",
        }
    }
}

/// Shared byte sink standing in for a terminal stream.
///
/// Clones append to the same buffer, so one clone can be boxed into a
/// [`Console`] while another is kept to read back what was printed.
#[derive(Clone, Default)]
pub struct MemWriter {
    buf: Rc<RefCell<Vec<u8>>>,
}

impl MemWriter {
    /// An empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// A writer plus a handle onto the buffer it fills.
    pub fn with_handle() -> (Self, Rc<RefCell<Vec<u8>>>) {
        let writer = Self::default();
        let buf = Rc::clone(&writer.buf);
        (writer, buf)
    }
}

impl Write for MemWriter {
    fn write(&mut self, bytes: &[u8]) -> IoResult<usize> {
        self.buf.borrow_mut().extend_from_slice(bytes);
        Ok(bytes.len())
    }

    fn flush(&mut self) -> IoResult<()> {
        Ok(())
    }
}

/// Handles to the bytes written through a [`Console::captured`] console.
pub struct Captured {
    out: Rc<RefCell<Vec<u8>>>,
    err: Rc<RefCell<Vec<u8>>>,
}

impl Captured {
    /// Everything printed to the output stream so far.
    pub fn stdout(&self) -> String {
        String::from_utf8_lossy(&self.out.borrow()).into_owned()
    }

    /// Everything printed to the error stream so far.
    pub fn stderr(&self) -> String {
        String::from_utf8_lossy(&self.err.borrow()).into_owned()
    }

    /// Forgets both captured streams.
    pub fn clear(&self) {
        self.out.borrow_mut().clear();
        self.err.borrow_mut().clear();
    }
}

/// The shell's output and error streams, plus the raw terminal if any.
///
/// Everything the interpreter and line editor print goes through here, with
/// explicit `\r\n` line endings since raw mode disables output processing.
pub struct Console {
    out: Box<dyn Write>,
    err: Box<dyn Write>,
    terminal: Option<RawTerminal>,
    out_colour: bool,
    err_colour: bool,
}

impl Console {
    /// Plain console over the given streams.
    pub fn new(out: Box<dyn Write>, err: Box<dyn Write>, terminal: Option<RawTerminal>) -> Self {
        Self {
            out,
            err,
            terminal,
            out_colour: false,
            err_colour: false,
        }
    }

    /// Process stdout/stderr. Each stream is coloured when it is a terminal.
    pub fn stdio(terminal: Option<RawTerminal>) -> Self {
        Self {
            out_colour: std::io::stdout().is_terminal(),
            err_colour: std::io::stderr().is_terminal(),
            ..Self::new(
                Box::new(std::io::stdout()),
                Box::new(std::io::stderr()),
                terminal,
            )
        }
    }

    /// Console writing into memory; no terminal.
    pub fn captured() -> (Self, Captured) {
        let (out, out_rc) = MemWriter::with_handle();
        let (err, err_rc) = MemWriter::with_handle();
        let console = Self::new(Box::new(out), Box::new(err), None);
        (
            console,
            Captured {
                out: out_rc,
                err: err_rc,
            },
        )
    }

    /// Colours both streams regardless of where they go.
    pub fn coloured(mut self) -> Self {
        self.out_colour = true;
        self.err_colour = true;
        self
    }

    /// Raw access to the output stream, for callers that flush themselves.
    pub fn output(&mut self) -> &mut dyn Write {
        &mut *self.out
    }

    /// Writes `bytes` to the output stream and flushes.
    pub fn print(&mut self, bytes: &[u8]) -> IoResult<()> {
        self.out.write_all(bytes)?;
        self.out.flush()
    }

    /// Formatted variant of [`print`](Self::print).
    pub fn print_fmt(&mut self, args: fmt::Arguments<'_>) -> IoResult<()> {
        self.out.write_fmt(args)?;
        self.out.flush()
    }

    /// Writes `bytes` in `colour` when the output stream is coloured.
    pub fn print_coloured(&mut self, colour: Colour, bytes: &[u8]) -> IoResult<()> {
        if self.out_colour {
            self.out.write_all(colour.code().as_bytes())?;
            self.out.write_all(bytes)?;
            self.out.write_all(RESET.as_bytes())?;
            self.out.flush()
        } else {
            self.print(bytes)
        }
    }

    /// Writes a diagnostic line to the error stream.
    ///
    /// Failures to write are logged and otherwise ignored: there is nowhere
    /// left to report them.
    pub fn error(&mut self, args: fmt::Arguments<'_>) {
        let result = if self.err_colour {
            write!(self.err, "{RED}{args}\r\n{RESET}")
        } else {
            write!(self.err, "{args}\r\n")
        };
        if let Err(e) = result.and_then(|()| self.err.flush()) {
            tracing::warn!("failed to write diagnostic: {e}");
        }
    }

    /// Leaves raw mode so a child sees a normal terminal. No-op without one.
    pub fn suspend_raw_mode(&mut self) -> Result<(), TerminalError> {
        match &mut self.terminal {
            Some(terminal) => terminal.suspend(),
            None => Ok(()),
        }
    }

    /// Re-enters raw mode after a child has finished.
    pub fn resume_raw_mode(&mut self) -> Result<(), TerminalError> {
        match &mut self.terminal {
            Some(terminal) => terminal.resume(),
            None => Ok(()),
        }
    }
}
