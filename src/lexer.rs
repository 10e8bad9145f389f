//! Lexical analysis for the instruction language.
//!
//! A line is split on unquoted whitespace. A span opened by `'` or `"` runs
//! to the matching quote character and may contain whitespace; inside it a
//! backslash escape is decoded (`\n`, `\r`, `\t`, `\\`, `\'`, `\"`), any other
//! escape is kept verbatim including the backslash. Quoted and unquoted text
//! that touch form a single token. Outside quotes the backslash is an
//! ordinary character, which is what lets `\` serve as an opcode.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LexingState {
    Start,
    ReadingWord,
    /// Inside a quoted span opened by the given byte.
    ReadingQuote(u8),
    /// Just read a backslash inside a quoted span.
    ReadingEscape(u8),
}

struct LexingFSM<'a> {
    input: &'a [u8],
    pos: usize,
    state: LexingState,
    buffer: Vec<u8>,
}

impl<'a> LexingFSM<'a> {
    fn new(line: &'a [u8]) -> Self {
        LexingFSM {
            input: line,
            pos: 0,
            state: LexingState::Start,
            buffer: Vec::new(),
        }
    }

    fn make_tokens(&mut self) -> Vec<Vec<u8>> {
        let mut out = Vec::new();

        while let Some(byte) = self.read_byte() {
            match self.state {
                LexingState::Start => self.handle_start(byte),
                LexingState::ReadingWord => self.handle_word(byte, &mut out),
                LexingState::ReadingQuote(quote) => self.handle_quote(byte, quote),
                LexingState::ReadingEscape(quote) => self.handle_escape(byte, quote),
            }
        }

        // An unterminated quote closes silently at end of line. A dangling
        // backslash inside it is kept as typed.
        if let LexingState::ReadingEscape(_) = self.state {
            self.buffer.push(b'\\');
        }
        if self.state != LexingState::Start {
            out.push(std::mem::take(&mut self.buffer));
        }
        out
    }

    fn read_byte(&mut self) -> Option<u8> {
        let byte = self.input.get(self.pos).copied();
        if byte.is_some() {
            self.pos += 1;
        }
        byte
    }

    fn handle_start(&mut self, byte: u8) {
        match byte {
            b if is_separator(b) => {}
            b'\'' | b'"' => self.state = LexingState::ReadingQuote(byte),
            b => {
                self.buffer.push(b);
                self.state = LexingState::ReadingWord;
            }
        }
    }

    fn handle_word(&mut self, byte: u8, out: &mut Vec<Vec<u8>>) {
        match byte {
            b if is_separator(b) => {
                out.push(std::mem::take(&mut self.buffer));
                self.state = LexingState::Start;
            }
            b'\'' | b'"' => self.state = LexingState::ReadingQuote(byte),
            b => self.buffer.push(b),
        }
    }

    fn handle_quote(&mut self, byte: u8, quote: u8) {
        match byte {
            b if b == quote => self.state = LexingState::ReadingWord,
            b'\\' => self.state = LexingState::ReadingEscape(quote),
            b => self.buffer.push(b),
        }
    }

    fn handle_escape(&mut self, byte: u8, quote: u8) {
        match byte {
            b'n' => self.buffer.push(b'\n'),
            b'r' => self.buffer.push(b'\r'),
            b't' => self.buffer.push(b'\t'),
            b'\\' | b'\'' | b'"' => self.buffer.push(byte),
            other => {
                self.buffer.push(b'\\');
                self.buffer.push(other);
            }
        }
        self.state = LexingState::ReadingQuote(quote);
    }
}

fn is_separator(byte: u8) -> bool {
    matches!(byte, b' ' | b'\t' | b'\r' | b'\n')
}

/// Splits one line into tokens. Never fails.
pub fn split_into_tokens(line: &[u8]) -> Vec<Vec<u8>> {
    LexingFSM::new(line).make_tokens()
}
