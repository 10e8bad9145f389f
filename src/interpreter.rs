use crate::builtin;
use crate::command::{ProcessExecutor, Spawned, StreamPaths};
use crate::env::Environment;
use crate::intern::{Handle, Interner};
use crate::io_adapters::{Colour, Console};
use crate::labels::LabelTable;
use crate::lexer::split_into_tokens;
use crate::parser::{Instruction, InstructionError, Register, parse_instruction};
use crate::terminal::TerminalError;
use std::ffi::{OsStr, OsString};
use std::io::Write;
use std::os::unix::ffi::OsStrExt;
use std::path::PathBuf;

const CLEAR_SCREEN: &[u8] = b"\x1b[2J\x1b[H";

/// Why [`Interpreter::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Halt {
    /// The instruction pointer ran past the last line.
    Exhausted,
    /// A `=` instruction ran.
    Terminated,
}

/// Files substituted for a child's standard streams.
#[derive(Debug, Clone, Copy, Default)]
struct Redirection {
    stdin: Option<Handle>,
    stdout: Option<Handle>,
    stdout_append: bool,
    stderr: Option<Handle>,
    stderr_append: bool,
}

enum Flow {
    Next,
    Jump(usize),
    Halt,
}

/// Executes the line language against a register file.
///
/// The interpreter owns everything an instruction can change: the ten
/// registers, the label table, the redirection configuration, the background
/// flag and the [`Environment`] handed to children. Text lives in the
/// [`Interner`] passed to [`run`](Self::run); after every instruction all
/// temporary values not reachable from this state are swept.
pub struct Interpreter {
    registers: [Handle; Register::COUNT],
    labels: LabelTable,
    redirection: Redirection,
    background: bool,
    env: Environment,
    launcher: Box<dyn ProcessExecutor>,
}

impl Interpreter {
    /// A fresh interpreter whose registers all hold the empty string.
    pub fn new(interner: &Interner, env: Environment, launcher: Box<dyn ProcessExecutor>) -> Self {
        Self {
            registers: [interner.empty(); Register::COUNT],
            labels: LabelTable::default(),
            redirection: Redirection::default(),
            background: false,
            env,
            launcher,
        }
    }

    /// Variables and working directory handed to children.
    pub fn env(&self) -> &Environment {
        &self.env
    }

    /// Current content of `register`.
    pub fn register(&self, register: Register) -> Handle {
        self.registers[register.index()]
    }

    /// Whether `#` currently leaves children running in the background.
    pub fn background(&self) -> bool {
        self.background
    }

    /// Runs `lines` from `ip` until the end of the buffer or a `=`.
    ///
    /// Labels are rescanned over the whole buffer first, so a label declared
    /// after the current position is already bound. Malformed label lines at
    /// or after `ip` are reported; earlier ones were reported by a previous
    /// run. Bad lines are reported and skipped. Only a terminal failure
    /// while handing the terminal to a child ends the run early.
    pub fn run(
        &mut self,
        interner: &mut Interner,
        console: &mut Console,
        lines: &[Handle],
        mut ip: usize,
    ) -> Result<Halt, TerminalError> {
        let (labels, malformed) = LabelTable::scan(lines, interner);
        self.labels = labels;
        for index in malformed.into_iter().filter(|&i| i >= ip) {
            console.error(format_args!(
                "Invalid instruction '{}'",
                interner.display(lines[index])
            ));
        }

        while let Some(&line) = lines.get(ip) {
            let flow = self.step(interner, console, line)?;
            self.report_finished_jobs(console);
            self.collect_garbage(interner);
            match flow {
                Flow::Next => ip += 1,
                Flow::Jump(target) => ip = target,
                Flow::Halt => return Ok(Halt::Terminated),
            }
        }
        Ok(Halt::Exhausted)
    }

    /// Prints `[pid] done <status>` for every background job that exited.
    pub fn report_finished_jobs(&mut self, console: &mut Console) {
        for job in self.launcher.reap() {
            tracing::debug!(pid = job.pid, code = job.code, "background job finished");
            if let Err(e) = console.print_fmt(format_args!("[{}] done {}\r\n", job.pid, job.code)) {
                tracing::warn!("failed to report job {}: {e}", job.pid);
            }
        }
    }

    /// Sweeps every temporary value except what the interpreter still names.
    pub fn collect_garbage(&self, interner: &mut Interner) {
        let Redirection {
            stdin,
            stdout,
            stderr,
            ..
        } = self.redirection;
        let roots = self
            .registers
            .iter()
            .copied()
            .chain(self.labels.names())
            .chain([stdin, stdout, stderr].into_iter().flatten());
        interner.sweep_with_roots(roots);
    }

    fn step(
        &mut self,
        interner: &mut Interner,
        console: &mut Console,
        line: Handle,
    ) -> Result<Flow, TerminalError> {
        let tokens = split_into_tokens(interner.bytes(line));
        let instruction = match parse_instruction(&tokens) {
            Ok(Some(instruction)) => instruction,
            Ok(None) => return Ok(Flow::Next),
            Err(InstructionError::UnknownCommand(op)) => {
                console.error(format_args!("Unknown command '{op}'"));
                return Ok(Flow::Next);
            }
            Err(e) => {
                tracing::debug!("rejected line: {e}");
                console.error(format_args!("Invalid instruction '{}'", interner.display(line)));
                return Ok(Flow::Next);
            }
        };

        match instruction {
            Instruction::Copy { dst, src } => {
                self.registers[dst.index()] = self.registers[src.index()];
            }
            Instruction::Assign { dst, literal } => {
                self.registers[dst.index()] = interner.intern(&literal);
            }
            Instruction::Label => {}
            Instruction::Jump { target, condition } => {
                let name = self.register(target);
                let Some(destination) = self.labels.resolve(name) else {
                    console.error(format_args!("Invalid jump location '{}'", interner.display(name)));
                    return Ok(Flow::Next);
                };
                let taken = match condition {
                    Some(reg) => interner.len(self.register(reg)) > 0,
                    None => true,
                };
                if taken {
                    return Ok(Flow::Jump(destination));
                }
            }
            Instruction::Spawn(argv) => self.spawn(interner, console, &argv)?,
            Instruction::ChangeDir(target) => {
                let target = target.map(|reg| self.path(&*interner, reg));
                if let Err(e) = builtin::change_directory(&mut self.env, target.as_deref()) {
                    console.error(format_args!("{e}"));
                }
            }
            Instruction::ListDir(paths) => {
                let paths: Vec<PathBuf> = paths
                    .iter()
                    .map(|&reg| self.path(&*interner, reg))
                    .collect();
                if let Err(e) = builtin::list_directory(console, &self.env, &paths) {
                    tracing::debug!("listing incomplete: {e:#}");
                }
            }
            Instruction::ClearScreen => write_or_log(console.print(CLEAR_SCREEN)),
            Instruction::Print(registers) => {
                let mut out = Vec::new();
                for (i, reg) in registers.iter().enumerate() {
                    if i > 0 {
                        out.push(b' ');
                    }
                    out.extend_from_slice(interner.bytes(self.register(*reg)));
                }
                out.extend_from_slice(b"\r\n");
                write_or_log(console.print(&out));
            }
            Instruction::Terminate => return Ok(Flow::Halt),
            Instruction::Dump => self.dump(interner, console),
            Instruction::RedirectStdin(source) => {
                self.redirection.stdin = self.stream_target(interner, source);
            }
            Instruction::RedirectStdout(target) => {
                self.redirection.stdout = self.stream_target(interner, target);
                self.redirection.stdout_append = false;
            }
            Instruction::ToggleStdoutAppend => {
                self.redirection.stdout_append = !self.redirection.stdout_append;
            }
            Instruction::RedirectStderr(target) => {
                self.redirection.stderr = self.stream_target(interner, target);
            }
            Instruction::ToggleStderrAppend => {
                self.redirection.stderr_append = !self.redirection.stderr_append;
            }
            Instruction::ToggleBackground => self.background = !self.background,
            Instruction::DumpEnvironment => {
                let mut out = Vec::new();
                for entry in builtin::read_environment(&self.env) {
                    out.extend_from_slice(entry.as_bytes());
                    out.extend_from_slice(b"\r\n");
                }
                write_or_log(console.print(&out));
            }
        }
        Ok(Flow::Next)
    }

    fn spawn(
        &mut self,
        interner: &Interner,
        console: &mut Console,
        argv: &[Register],
    ) -> Result<(), TerminalError> {
        let argv: Vec<OsString> = argv
            .iter()
            .map(|&reg| OsStr::from_bytes(interner.bytes(self.register(reg))).to_os_string())
            .collect();
        let streams = self.stream_paths(interner);

        console.suspend_raw_mode()?;
        let result = self
            .launcher
            .execute(&argv, &streams, self.background, &self.env);
        console.resume_raw_mode()?;

        match result {
            Ok(Spawned::Exited(code)) => tracing::debug!(code, "foreground process exited"),
            Ok(Spawned::Background { pid }) => tracing::debug!(pid, "running in background"),
            Err(e) => console.error(format_args!("{e}")),
        }
        Ok(())
    }

    fn stream_paths(&self, interner: &Interner) -> StreamPaths {
        let path = |h: Option<Handle>| h.map(|h| PathBuf::from(OsStr::from_bytes(interner.bytes(h))));
        StreamPaths {
            stdin: path(self.redirection.stdin),
            stdout: path(self.redirection.stdout),
            stdout_append: self.redirection.stdout_append,
            stderr: path(self.redirection.stderr),
            stderr_append: self.redirection.stderr_append,
        }
    }

    /// An empty register names the default stream.
    fn stream_target(&self, interner: &Interner, reg: Option<Register>) -> Option<Handle> {
        reg.map(|reg| self.register(reg))
            .filter(|&handle| interner.len(handle) > 0)
    }

    fn path(&self, interner: &Interner, reg: Register) -> PathBuf {
        PathBuf::from(OsStr::from_bytes(interner.bytes(self.register(reg))))
    }

    fn dump(&self, interner: &Interner, console: &mut Console) {
        write_or_log(console.print(b"Directory: "));
        if let Err(e) = builtin::print_working_directory(console, &self.env) {
            tracing::warn!("failed to write output: {e}");
        }

        let target = |h: Option<Handle>| match h {
            Some(h) => format!("'{}'", interner.display(h)),
            None => "default".to_owned(),
        };
        let mode = |append: bool| if append { 'a' } else { 'w' };
        let r = &self.redirection;

        let mut background = Vec::new();
        let _ = write!(background, "Background: {}\r\n", self.background);

        let mut stdio = Vec::new();
        let _ = write!(stdio, "Stdio\r\n");
        let _ = write!(stdio, "\t[r] stdin:  {}\r\n", target(r.stdin));
        let _ = write!(stdio, "\t[{}] stdout: {}\r\n", mode(r.stdout_append), target(r.stdout));
        let _ = write!(stdio, "\t[{}] stderr: {}\r\n", mode(r.stderr_append), target(r.stderr));

        let mut registers = Vec::new();
        let _ = write!(registers, "Registers\r\n");
        for (i, reg) in self.registers.iter().enumerate() {
            let _ = write!(registers, "\t[{i}] '{}'\r\n", interner.display(*reg));
        }

        write_or_log(console.print_coloured(Colour::Purple, &background));
        write_or_log(console.print_coloured(Colour::Green, &stdio));
        write_or_log(console.print_coloured(Colour::Blue, &registers));
    }
}

fn write_or_log(result: std::io::Result<()>) {
    if let Err(e) = result {
        tracing::warn!("failed to write output: {e}");
    }
}
