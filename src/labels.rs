use crate::intern::{Handle, Interner};
use crate::lexer::split_into_tokens;
use std::collections::HashMap;

/// Label name to instruction pointer, rebuilt before every resumed run.
///
/// Names are interned, so lookup is by handle identity.
#[derive(Debug, Default)]
pub struct LabelTable {
    targets: HashMap<Handle, usize>,
}

impl LabelTable {
    /// Scans every line for `name <` declarations.
    ///
    /// A declaration binds `name` to the line after it; later declarations
    /// win. Any other line ending in a lone `<` token is malformed, and the
    /// returned list carries the index of each such line.
    pub fn scan(lines: &[Handle], interner: &mut Interner) -> (Self, Vec<usize>) {
        let mut table = LabelTable::default();
        let mut malformed = Vec::new();
        for (index, line) in lines.iter().enumerate() {
            let tokens = split_into_tokens(interner.bytes(*line));
            match tokens.as_slice() {
                [name, op] if op == b"<" => {
                    let name = interner.intern(name);
                    table.targets.insert(name, index + 1);
                }
                [.., op] if op == b"<" => malformed.push(index),
                _ => {}
            }
        }
        tracing::debug!(labels = table.targets.len(), malformed = malformed.len(), "label scan");
        (table, malformed)
    }

    /// Line index bound to the label `name`, if declared.
    pub fn resolve(&self, name: Handle) -> Option<usize> {
        self.targets.get(&name).copied()
    }

    /// Number of distinct labels.
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// True when no label is declared.
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Label names, for keeping them alive across a sweep.
    pub fn names(&self) -> impl Iterator<Item = Handle> + '_ {
        self.targets.keys().copied()
    }
}
