use std::collections::BTreeMap;
use std::env as stdenv;
use std::ffi::{OsStr, OsString};
use std::path::PathBuf;

/// The shell's view of the process environment.
///
/// The environment contains:
/// - `vars`: the variables handed to spawned processes and listed by `?`,
///   kept sorted by name.
/// - `current_dir`: the working directory for spawned processes and the prompt.
///
/// Directory changes keep `PWD` and `OLDPWD` in `vars` up to date.
#[derive(Debug, Clone)]
pub struct Environment {
    pub vars: BTreeMap<OsString, OsString>,
    pub current_dir: PathBuf,
}

impl Environment {
    /// Snapshot of the process variables and working directory at start-up.
    pub fn new() -> Self {
        let vars = stdenv::vars_os().collect();
        let current_dir = stdenv::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self { vars, current_dir }
    }

    /// An environment with no variables, rooted at `current_dir`.
    pub fn empty(current_dir: impl Into<PathBuf>) -> Self {
        Self {
            vars: BTreeMap::new(),
            current_dir: current_dir.into(),
        }
    }

    /// Value of `key`, if set.
    pub fn get_var(&self, key: impl AsRef<OsStr>) -> Option<&OsStr> {
        self.vars.get(key.as_ref()).map(OsString::as_os_str)
    }

    /// Sets `key`, replacing any previous value.
    pub fn set_var(&mut self, key: impl Into<OsString>, val: impl Into<OsString>) {
        self.vars.insert(key.into(), val.into());
    }

    /// Records a new working directory, moving the old one to `OLDPWD`.
    pub fn enter_dir(&mut self, dir: PathBuf) {
        let previous = std::mem::replace(&mut self.current_dir, dir);
        self.set_var("OLDPWD", previous);
        self.set_var("PWD", self.current_dir.clone());
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}
