//! Decoding of tokenized lines into typed instructions.
//!
//! The last token of a line is the opcode and must be a single byte. The
//! tokens before it are positional arguments; most of them name registers
//! and must be all decimal digits with a value below [`Register::COUNT`].

use thiserror::Error;

/// Index of one of the ten registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Register(u8);

impl Register {
    pub const COUNT: usize = 10;

    /// Register `index`, or `None` past the last one.
    pub fn new(index: usize) -> Option<Self> {
        (index < Self::COUNT).then_some(Register(index as u8))
    }

    /// Parses a register token: decimal digits only, value in `0..COUNT`.
    pub fn parse(token: &[u8]) -> Result<Self, InstructionError> {
        let bad = || InstructionError::BadRegister(String::from_utf8_lossy(token).into_owned());
        if token.is_empty() || !token.iter().all(u8::is_ascii_digit) {
            return Err(bad());
        }
        let mut value: usize = 0;
        for digit in token {
            value = value
                .checked_mul(10)
                .and_then(|v| v.checked_add(usize::from(digit - b'0')))
                .ok_or_else(bad)?;
        }
        Register::new(value).ok_or_else(bad)
    }

    /// Slot number in `0..COUNT`.
    pub fn index(self) -> usize {
        usize::from(self.0)
    }
}

/// A decoded line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    /// `;` dst src
    Copy { dst: Register, src: Register },
    /// `:` dst literal
    Assign { dst: Register, literal: Vec<u8> },
    /// `<` label declaration; handled by the label scan.
    Label,
    /// `>` target [condition]
    Jump {
        target: Register,
        condition: Option<Register>,
    },
    /// `#` argv registers
    Spawn(Vec<Register>),
    /// `@` [path]
    ChangeDir(Option<Register>),
    /// `_` paths
    ListDir(Vec<Register>),
    /// `)`
    ClearScreen,
    /// `\` registers
    Print(Vec<Register>),
    /// `=`
    Terminate,
    /// `-`
    Dump,
    /// `(` [path]
    RedirectStdin(Option<Register>),
    /// `]` [path]
    RedirectStdout(Option<Register>),
    /// `}`
    ToggleStdoutAppend,
    /// `[` [path]
    RedirectStderr(Option<Register>),
    /// `{`
    ToggleStderrAppend,
    /// `~`
    ToggleBackground,
    /// `?`
    DumpEnvironment,
}

/// Why a line could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InstructionError {
    #[error("unknown command '{0}'")]
    UnknownCommand(String),
    #[error("'{opcode}' does not take {args} argument(s)")]
    Arity { opcode: char, args: usize },
    #[error("'{0}' is not a register")]
    BadRegister(String),
}

/// Decodes one tokenized line. An empty line decodes to `None`.
pub fn parse_instruction(tokens: &[Vec<u8>]) -> Result<Option<Instruction>, InstructionError> {
    let Some((opcode, args)) = tokens.split_last() else {
        return Ok(None);
    };
    let &[op] = opcode.as_slice() else {
        return Err(InstructionError::UnknownCommand(
            String::from_utf8_lossy(opcode).into_owned(),
        ));
    };
    let arity = |ok: bool| {
        if ok {
            Ok(())
        } else {
            Err(InstructionError::Arity {
                opcode: char::from(op),
                args: args.len(),
            })
        }
    };

    let instruction = match op {
        b';' => {
            arity(args.len() == 2)?;
            Instruction::Copy {
                dst: Register::parse(&args[0])?,
                src: Register::parse(&args[1])?,
            }
        }
        b':' => {
            arity(args.len() == 2)?;
            Instruction::Assign {
                dst: Register::parse(&args[0])?,
                literal: args[1].clone(),
            }
        }
        b'<' => Instruction::Label,
        b'>' => {
            arity(matches!(args.len(), 1 | 2))?;
            Instruction::Jump {
                target: Register::parse(&args[0])?,
                condition: args.get(1).map(|t| Register::parse(t)).transpose()?,
            }
        }
        b'#' => {
            arity(!args.is_empty())?;
            Instruction::Spawn(registers(args)?)
        }
        b'@' => Instruction::ChangeDir(optional_register(args, &arity)?),
        b'_' => Instruction::ListDir(registers(args)?),
        b'\\' => Instruction::Print(registers(args)?),
        b'(' => Instruction::RedirectStdin(optional_register(args, &arity)?),
        b']' => Instruction::RedirectStdout(optional_register(args, &arity)?),
        b'[' => Instruction::RedirectStderr(optional_register(args, &arity)?),
        b')' | b'=' | b'-' | b'}' | b'{' | b'~' | b'?' => {
            arity(args.is_empty())?;
            match op {
                b')' => Instruction::ClearScreen,
                b'=' => Instruction::Terminate,
                b'-' => Instruction::Dump,
                b'}' => Instruction::ToggleStdoutAppend,
                b'{' => Instruction::ToggleStderrAppend,
                b'~' => Instruction::ToggleBackground,
                _ => Instruction::DumpEnvironment,
            }
        }
        _ => {
            return Err(InstructionError::UnknownCommand(
                char::from(op).to_string(),
            ));
        }
    };
    Ok(Some(instruction))
}

fn registers(args: &[Vec<u8>]) -> Result<Vec<Register>, InstructionError> {
    args.iter().map(|t| Register::parse(t)).collect()
}

fn optional_register(
    args: &[Vec<u8>],
    arity: &dyn Fn(bool) -> Result<(), InstructionError>,
) -> Result<Option<Register>, InstructionError> {
    arity(args.len() <= 1)?;
    args.first().map(|t| Register::parse(t)).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::split_into_tokens;

    fn parse(line: &str) -> Result<Option<Instruction>, InstructionError> {
        parse_instruction(&split_into_tokens(line.as_bytes()))
    }

    fn reg(i: usize) -> Register {
        Register::new(i).unwrap()
    }

    #[test]
    fn test_register_tokens() {
        assert_eq!(Register::parse(b"7"), Ok(reg(7)));
        assert_eq!(Register::parse(b"007"), Ok(reg(7)));
        assert!(Register::parse(b"10").is_err());
        assert!(Register::parse(b"-1").is_err());
        assert!(Register::parse(b"a").is_err());
        assert!(Register::parse(b"").is_err());
        assert!(Register::parse(b"99999999999999999999999").is_err());
    }

    #[test]
    fn test_decodes_assignment_and_copy() {
        assert_eq!(
            parse("0 hello :"),
            Ok(Some(Instruction::Assign {
                dst: reg(0),
                literal: b"hello".to_vec()
            }))
        );
        assert_eq!(
            parse("3 4 ;"),
            Ok(Some(Instruction::Copy {
                dst: reg(3),
                src: reg(4)
            }))
        );
    }

    #[test]
    fn test_decodes_both_jump_forms() {
        assert_eq!(
            parse("1 >"),
            Ok(Some(Instruction::Jump {
                target: reg(1),
                condition: None
            }))
        );
        assert_eq!(
            parse("1 2 >"),
            Ok(Some(Instruction::Jump {
                target: reg(1),
                condition: Some(reg(2))
            }))
        );
        assert!(matches!(parse(">"), Err(InstructionError::Arity { .. })));
        assert!(matches!(parse("1 2 3 >"), Err(InstructionError::Arity { .. })));
    }

    #[test]
    fn test_arity_violations_are_reported() {
        assert_eq!(
            parse("9 9 9 ;"),
            Err(InstructionError::Arity {
                opcode: ';',
                args: 3
            })
        );
        assert!(matches!(parse("1 ="), Err(InstructionError::Arity { .. })));
        assert!(matches!(parse("1 2 @"), Err(InstructionError::Arity { .. })));
        assert!(matches!(parse("#"), Err(InstructionError::Arity { .. })));
    }

    #[test]
    fn test_register_lists() {
        assert_eq!(parse("\\"), Ok(Some(Instruction::Print(vec![]))));
        assert_eq!(
            parse("0 1 2 #"),
            Ok(Some(Instruction::Spawn(vec![reg(0), reg(1), reg(2)])))
        );
        assert_eq!(parse("_"), Ok(Some(Instruction::ListDir(vec![]))));
        assert!(matches!(parse("0 x \\"), Err(InstructionError::BadRegister(_))));
    }

    #[test]
    fn test_optional_register_opcodes() {
        assert_eq!(parse("@"), Ok(Some(Instruction::ChangeDir(None))));
        assert_eq!(parse("5 ("), Ok(Some(Instruction::RedirectStdin(Some(reg(5))))));
        assert_eq!(parse("]"), Ok(Some(Instruction::RedirectStdout(None))));
        assert_eq!(parse("2 ["), Ok(Some(Instruction::RedirectStderr(Some(reg(2))))));
    }

    #[test]
    fn test_unknown_and_empty_lines() {
        assert_eq!(parse(""), Ok(None));
        assert_eq!(
            parse("0 1 ab"),
            Err(InstructionError::UnknownCommand("ab".into()))
        );
        assert_eq!(
            parse("0 !"),
            Err(InstructionError::UnknownCommand("!".into()))
        );
        assert_eq!(parse("anything at all <"), Ok(Some(Instruction::Label)));
    }
}
