use crate::command::ProcessExecutor;
use crate::editor::LineEditor;
use crate::env::Environment;
use crate::intern::{Handle, Interner};
use crate::interpreter::{Halt, Interpreter};
use crate::io_adapters::Console;
use crate::terminal::TerminalError;
use anyhow::{Context, Result};
use std::io::Read;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

/// One shell session: the line buffer and everything that executes it.
///
/// Lines are appended to the buffer and never removed, so labels declared
/// earlier stay reachable from later lines. Every buffered line is a
/// persistent interned value.
pub struct Shell {
    interner: Interner,
    interpreter: Interpreter,
    editor: LineEditor,
    console: Console,
    lines: Vec<Handle>,
}

impl Shell {
    /// A session with an empty line buffer.
    pub fn new(env: Environment, launcher: Box<dyn ProcessExecutor>, console: Console) -> Self {
        let interner = Interner::new();
        let interpreter = Interpreter::new(&interner, env, launcher);
        let editor = LineEditor::new(&interner);
        Self {
            interner,
            interpreter,
            editor,
            console,
            lines: Vec::new(),
        }
    }

    /// The interpreter running this session.
    pub fn interpreter(&self) -> &Interpreter {
        &self.interpreter
    }

    /// Storage for every line and register value.
    pub fn interner(&self) -> &Interner {
        &self.interner
    }

    /// Buffered lines so far.
    pub fn lines(&self) -> &[Handle] {
        &self.lines
    }

    /// `<working directory> >> `
    pub fn prompt(&self) -> Vec<u8> {
        let mut prompt = self.interpreter.env().current_dir.as_os_str().as_bytes().to_vec();
        prompt.extend_from_slice(b" >> ");
        prompt
    }

    fn push_line(&mut self, line: &[u8]) {
        let handle = self.interner.intern(line);
        self.interner.mark_persistent(handle);
        self.lines.push(handle);
    }

    /// Appends one line and runs from it.
    pub fn execute_line(&mut self, line: &[u8]) -> Result<Halt, TerminalError> {
        let start = self.lines.len();
        self.push_line(line);
        self.resume(start)
    }

    /// Appends every non-empty line of `script` and runs from the first.
    pub fn run_script(&mut self, script: &[u8]) -> Result<Halt, TerminalError> {
        let start = self.lines.len();
        for line in split_script(script) {
            self.push_line(line);
        }
        tracing::debug!(lines = self.lines.len() - start, "script loaded");
        self.resume(start)
    }

    /// Loads `path` and runs it as a script.
    pub fn run_file(&mut self, path: &Path) -> Result<Halt> {
        let script = std::fs::read(path).with_context(|| format!("Unable to read {}", path.display()))?;
        Ok(self.run_script(&script)?)
    }

    /// Prompts, reads and executes lines until a `=` instruction.
    pub fn run_interactive(&mut self, input: &mut impl Read) -> Result<(), TerminalError> {
        loop {
            self.interpreter.report_finished_jobs(&mut self.console);
            let prompt = self.prompt();
            let line = self
                .editor
                .read_line(input, &mut self.console, &prompt, &mut self.interner)?;
            self.lines.push(line);
            if self.resume(self.lines.len() - 1)? == Halt::Terminated {
                return Ok(());
            }
        }
    }

    fn resume(&mut self, ip: usize) -> Result<Halt, TerminalError> {
        self.interpreter
            .run(&mut self.interner, &mut self.console, &self.lines, ip)
    }
}

/// Splits a script on `\n`, dropping empty lines.
pub fn split_script(script: &[u8]) -> impl Iterator<Item = &[u8]> {
    script.split(|b| *b == b'\n').filter(|line| !line.is_empty())
}
