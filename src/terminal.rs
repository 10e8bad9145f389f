//! Raw-mode handling for the controlling terminal.
//!
//! Raw mode turns off echo, canonical line buffering, signal keys, output
//! post-processing and CR/LF translation, and makes `read` return after at
//! most a tenth of a second even when no byte arrived. The original settings
//! are restored when [`RawTerminal`] is dropped.

use nix::sys::termios::{
    self, ControlFlags, InputFlags, LocalFlags, OutputFlags, SetArg, SpecialCharacterIndices,
    Termios,
};
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TerminalError {
    #[error("Unable to get terminal attributes: {0}")]
    Attributes(#[source] nix::Error),
    #[error("Unable to enter raw mode: {0}")]
    Enter(#[source] nix::Error),
    #[error("Unable to leave raw mode: {0}")]
    Leave(#[source] nix::Error),
    #[error("Unable to read key input: {0}")]
    Read(#[source] io::Error),
    #[error("Unable to write to terminal: {0}")]
    Write(#[source] io::Error),
}

/// Owns the terminal attributes of standard input while raw mode is in use.
pub struct RawTerminal {
    original: Termios,
    raw: Termios,
    active: bool,
}

impl RawTerminal {
    /// Saves the current attributes and switches standard input to raw mode.
    pub fn enable() -> Result<Self, TerminalError> {
        let original = termios::tcgetattr(io::stdin()).map_err(TerminalError::Attributes)?;
        let mut raw = original.clone();
        raw.local_flags
            .remove(LocalFlags::ECHO | LocalFlags::ICANON | LocalFlags::IEXTEN | LocalFlags::ISIG);
        raw.input_flags.remove(
            InputFlags::ICRNL
                | InputFlags::IXON
                | InputFlags::BRKINT
                | InputFlags::INPCK
                | InputFlags::ISTRIP,
        );
        raw.output_flags.remove(OutputFlags::OPOST);
        raw.control_flags.insert(ControlFlags::CS8);
        raw.control_chars[SpecialCharacterIndices::VMIN as usize] = 0;
        raw.control_chars[SpecialCharacterIndices::VTIME as usize] = 1;

        let mut terminal = Self {
            original,
            raw,
            active: false,
        };
        terminal.resume()?;
        Ok(terminal)
    }

    /// Restores the saved attributes, e.g. before running a child process.
    pub fn suspend(&mut self) -> Result<(), TerminalError> {
        if self.active {
            termios::tcsetattr(io::stdin(), SetArg::TCSAFLUSH, &self.original)
                .map_err(TerminalError::Leave)?;
            self.active = false;
        }
        Ok(())
    }

    /// Re-enters raw mode after [`suspend`](Self::suspend).
    pub fn resume(&mut self) -> Result<(), TerminalError> {
        if !self.active {
            termios::tcsetattr(io::stdin(), SetArg::TCSAFLUSH, &self.raw)
                .map_err(TerminalError::Enter)?;
            self.active = true;
        }
        Ok(())
    }
}

impl Drop for RawTerminal {
    fn drop(&mut self) {
        if let Err(e) = self.suspend() {
            eprint!("{e}\r\n");
        }
    }
}
