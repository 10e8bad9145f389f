use crate::env::Environment;
use anyhow::Result;
use std::ffi::OsString;
use std::path::PathBuf;

/// Conventional process exit code type used by this crate.
///
/// A value of 0 indicates success; any non-zero value indicates failure.
pub type ExitCode = i32;

/// Where a spawned process's standard streams go.
///
/// `None` means the stream is inherited from the shell.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamPaths {
    pub stdin: Option<PathBuf>,
    pub stdout: Option<PathBuf>,
    pub stdout_append: bool,
    pub stderr: Option<PathBuf>,
    pub stderr_append: bool,
}

/// How a spawn request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Spawned {
    /// Foreground child ran to completion.
    Exited(ExitCode),
    /// Child was left running in the background.
    Background { pid: u32 },
}

/// A background child that has finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Finished {
    pub pid: u32,
    pub code: ExitCode,
}

/// Launches external programs on behalf of the `#` instruction.
///
/// Implementations resolve `argv[0]` (directly when it contains `/`, through
/// `PATH` otherwise) and fail without spawning anything when it cannot be
/// resolved or a redirection target cannot be opened. Between fork and exec
/// the child may only install the already-opened redirection descriptors
/// and exec; it must not allocate.
pub trait ProcessExecutor {
    fn execute(
        &mut self,
        argv: &[OsString],
        streams: &StreamPaths,
        background: bool,
        env: &Environment,
    ) -> Result<Spawned>;

    /// Collects background children that have exited since the last call.
    fn reap(&mut self) -> Vec<Finished>;
}
