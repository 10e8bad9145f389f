//! Line editing over a raw-mode terminal.
//!
//! Keys are decoded from the byte stream one at a time, applied to the
//! composing line, and the whole line is redrawn after every key. Lines are
//! interned values; an edit produces a new value and never touches the one a
//! history entry refers to.

use crate::intern::{Handle, Interner};
use crate::io_adapters::Console;
use crate::terminal::TerminalError;
use std::io::{self, ErrorKind, Read, Write};

const ESC: u8 = 0x1b;
const DEL: u8 = 127;

/// A decoded keystroke.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Char(u8),
    Up,
    Down,
    Left,
    Right,
    Backspace,
    Delete,
    Newline,
    Tab,
    /// Unrecognised control byte or escape sequence.
    Invalid,
}

/// Reads the next byte, or `None` if the read timed out.
fn next_byte(input: &mut impl Read) -> Result<Option<u8>, TerminalError> {
    let mut buf = [0u8; 1];
    loop {
        match input.read(&mut buf) {
            Ok(0) => return Ok(None),
            Ok(_) => return Ok(Some(buf[0])),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(TerminalError::Read(e)),
        }
    }
}

/// Blocks until a key arrives.
pub fn read_key(input: &mut impl Read) -> Result<Key, TerminalError> {
    loop {
        if let Some(first) = next_byte(input)? {
            return decode_key(first, input);
        }
    }
}

/// Decodes the key starting with `first`, pulling escape-sequence bytes
/// from `input`. A sequence cut short by a read timeout is [`Key::Invalid`].
pub fn decode_key(first: u8, input: &mut impl Read) -> Result<Key, TerminalError> {
    let key = match first {
        ESC => {
            if next_byte(input)? != Some(b'[') {
                return Ok(Key::Invalid);
            }
            match next_byte(input)? {
                Some(b'A') => Key::Up,
                Some(b'B') => Key::Down,
                Some(b'C') => Key::Right,
                Some(b'D') => Key::Left,
                Some(digit @ b'0'..=b'9') => match (digit, next_byte(input)?) {
                    (b'3', Some(b'~')) => Key::Delete,
                    _ => Key::Invalid,
                },
                _ => Key::Invalid,
            }
        }
        DEL => Key::Backspace,
        b'\n' | b'\r' => Key::Newline,
        b'\t' => Key::Tab,
        b if b.is_ascii_control() => Key::Invalid,
        b => Key::Char(b),
    };
    Ok(key)
}

/// The composing line, its cursor, and the committed-line history.
pub struct LineEditor {
    history: Vec<Handle>,
    line: Handle,
    cursor: usize,
    /// History entry being shown; `history.len()` while composing.
    row: usize,
}

impl LineEditor {
    /// An editor with an empty line and no history.
    pub fn new(interner: &Interner) -> Self {
        Self {
            history: Vec::new(),
            line: interner.empty(),
            cursor: 0,
            row: 0,
        }
    }

    /// The line being composed.
    pub fn line(&self) -> Handle {
        self.line
    }

    /// Cursor position as a byte offset into the line.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Committed lines, oldest first.
    pub fn history(&self) -> &[Handle] {
        &self.history
    }

    /// Applies one key. Returns the finished line when `key` commits it.
    pub fn apply(&mut self, key: Key, interner: &mut Interner) -> Option<Handle> {
        match key {
            Key::Char(byte) => {
                self.line = interner.insert_at(self.line, byte, self.cursor);
                self.cursor += 1;
                self.detach();
            }
            Key::Delete => {
                if self.cursor < interner.len(self.line) {
                    self.line = interner.remove_at(self.line, self.cursor);
                    self.detach();
                }
            }
            Key::Backspace => {
                if self.cursor > 0 {
                    self.cursor -= 1;
                    self.line = interner.remove_at(self.line, self.cursor);
                    self.detach();
                }
            }
            Key::Left => self.cursor = self.cursor.saturating_sub(1),
            Key::Right => self.cursor = (self.cursor + 1).min(interner.len(self.line)),
            Key::Up => {
                if self.row > 0 {
                    self.row -= 1;
                    self.recall(interner);
                }
            }
            Key::Down => {
                if self.row + 1 < self.history.len() {
                    self.row += 1;
                    self.recall(interner);
                }
            }
            Key::Newline => return Some(self.commit(interner)),
            Key::Tab | Key::Invalid => {}
        }
        None
    }

    fn recall(&mut self, interner: &Interner) {
        self.line = self.history[self.row];
        self.cursor = interner.len(self.line);
    }

    fn detach(&mut self) {
        self.row = self.history.len();
    }

    fn commit(&mut self, interner: &mut Interner) -> Handle {
        let finished = self.line;
        interner.mark_persistent(finished);
        self.history.push(finished);
        self.line = interner.empty();
        self.cursor = 0;
        self.row = self.history.len();
        finished
    }

    /// Clears the terminal line and rewrites `prompt` and the composing line,
    /// leaving the terminal cursor at the editing position.
    pub fn redraw(&self, out: &mut dyn Write, prompt: &[u8], interner: &Interner) -> io::Result<()> {
        let text = interner.bytes(self.line);
        out.write_all(b"\x1b[2K\r")?;
        out.write_all(prompt)?;
        out.write_all(text)?;
        let back = text.len() - self.cursor;
        if back > 0 {
            write!(out, "\x1b[{back}D")?;
        }
        out.flush()
    }

    /// Edits until a line is committed and returns it.
    ///
    /// The returned line is persistent and recorded in the history.
    pub fn read_line(
        &mut self,
        input: &mut impl Read,
        console: &mut Console,
        prompt: &[u8],
        interner: &mut Interner,
    ) -> Result<Handle, TerminalError> {
        self.redraw(console.output(), prompt, interner)
            .map_err(TerminalError::Write)?;
        loop {
            let key = read_key(input)?;
            if let Some(line) = self.apply(key, interner) {
                console.print(b"\r\n").map_err(TerminalError::Write)?;
                return Ok(line);
            }
            self.redraw(console.output(), prompt, interner)
                .map_err(TerminalError::Write)?;
        }
    }
}
