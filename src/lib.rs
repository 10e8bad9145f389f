//! A small shell driven by a register-based line language.
//!
//! Each line ends in a one-character opcode preceded by its arguments, e.g.
//! `0 hello :` stores `hello` in register 0 and `0 \` prints it. Lines come
//! from a script file or from a raw-mode line editor with history, and are
//! executed by an [`Interpreter`] that can jump between labels, redirect the
//! standard streams of child processes and run them in the background.
//!
//! All text is held in an [`Interner`]: equal strings share one handle and
//! unreachable temporaries are swept after every instruction.

mod builtin;
pub mod command;
pub mod editor;
pub mod env;
mod external;
pub mod intern;
mod interpreter;
mod io_adapters;
mod labels;
mod lexer;
pub mod parser;
mod shell;
pub mod terminal;

pub use external::ExternalLauncher;
pub use intern::{Handle, Interner};
pub use interpreter::{Halt, Interpreter};
pub use io_adapters::{Captured, Colour, Console, MemWriter};
pub use lexer::split_into_tokens;
pub use shell::{Shell, split_script};
