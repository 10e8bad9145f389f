use crate::command::{ExitCode, Finished, ProcessExecutor, Spawned, StreamPaths};
use crate::env::Environment;
use anyhow::{Context, Result, anyhow};
use std::ffi::{OsStr, OsString};
use std::fs::{File, OpenOptions};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::PermissionsExt;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};

/// Spawns programs with `std::process::Command`.
///
/// Redirection files are opened here, in the parent, and handed to the
/// child as descriptors, so the child only duplicates them onto 0/1/2 and
/// execs. Background children are kept until [`reap`](ProcessExecutor::reap)
/// sees them exit.
#[derive(Default)]
pub struct ExternalLauncher {
    jobs: Vec<Child>,
}

impl ExternalLauncher {
    /// A launcher with no background jobs.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of background children not yet reaped.
    pub fn running(&self) -> usize {
        self.jobs.len()
    }
}

impl ProcessExecutor for ExternalLauncher {
    fn execute(
        &mut self,
        argv: &[OsString],
        streams: &StreamPaths,
        background: bool,
        env: &Environment,
    ) -> Result<Spawned> {
        let (name, args) = argv
            .split_first()
            .ok_or_else(|| anyhow!("Invalid instruction: nothing to run"))?;
        let search_paths = env.get_var("PATH").unwrap_or_default();
        let executable = find_command_path(search_paths, Path::new(name), &env.current_dir)
            .ok_or_else(|| anyhow!("Unknown command '{}'", name.to_string_lossy()))?;

        let (stdin, stdout, stderr) = open_streams(streams, background, &env.current_dir)
            .context("Unable to redirect child stdin, stdout and stderr")?;

        let mut child = Command::new(&executable)
            .arg0(name)
            .args(args)
            .env_clear()
            .envs(&env.vars)
            .current_dir(&env.current_dir)
            .stdin(stdin)
            .stdout(stdout)
            .stderr(stderr)
            .spawn()
            .with_context(|| format!("Unable to run '{}'", executable.display()))?;

        if background {
            let pid = child.id();
            tracing::debug!(pid, program = %executable.display(), "spawned background job");
            self.jobs.push(child);
            return Ok(Spawned::Background { pid });
        }

        let status = child.wait()?;
        let code = exit_code(status);
        tracing::debug!(code, program = %executable.display(), "process exited");
        Ok(Spawned::Exited(code))
    }

    fn reap(&mut self) -> Vec<Finished> {
        let mut finished = Vec::new();
        self.jobs.retain_mut(|child| match child.try_wait() {
            Ok(Some(status)) => {
                finished.push(Finished {
                    pid: child.id(),
                    code: exit_code(status),
                });
                false
            }
            Ok(None) => true,
            Err(e) => {
                tracing::warn!(pid = child.id(), "lost track of background job: {e}");
                false
            }
        });
        finished
    }
}

fn open_streams(
    streams: &StreamPaths,
    background: bool,
    base: &Path,
) -> Result<(Stdio, Stdio, Stdio)> {
    let stdin = match &streams.stdin {
        Some(path) => {
            let path = base.join(path);
            Stdio::from(File::open(&path).with_context(|| format!("can't read {}", path.display()))?)
        }
        // A background job must not compete with the line editor for keys.
        None if background => Stdio::null(),
        None => Stdio::inherit(),
    };
    let stdout = output_stream(streams.stdout.as_deref(), streams.stdout_append, base)?;
    let stderr = output_stream(streams.stderr.as_deref(), streams.stderr_append, base)?;
    Ok((stdin, stdout, stderr))
}

fn output_stream(path: Option<&Path>, append: bool, base: &Path) -> Result<Stdio> {
    let Some(path) = path else {
        return Ok(Stdio::inherit());
    };
    let path = base.join(path);
    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .append(append)
        .truncate(!append)
        .open(&path)
        .with_context(|| format!("can't write {}", path.display()))?;
    Ok(Stdio::from(file))
}

/// Exit status as a shell reports it: the code itself, or `128 + signal`
/// for a child killed by a signal.
fn exit_code(status: ExitStatus) -> ExitCode {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|signal| 128 + signal))
        .unwrap_or(-1)
}

/// Resolve a command path the way a typical shell would.
///
/// Behavior:
/// - A name containing `/` is taken as a path (relative ones against `cwd`)
///   and returned if it is an executable file.
/// - Otherwise each non-empty entry of `search_paths` (colon separated) is
///   tried in order and the first executable file wins.
/// - Empty name: `None`.
pub fn find_command_path(search_paths: &OsStr, name: &Path, cwd: &Path) -> Option<PathBuf> {
    let bytes = name.as_os_str().as_bytes();
    if bytes.is_empty() {
        return None;
    }
    if bytes.contains(&b'/') {
        let path = cwd.join(name);
        return is_executable(&path).then_some(path);
    }
    find_in_path(search_paths, name.as_os_str())
}

fn find_in_path(search_paths: &OsStr, cmd: &OsStr) -> Option<PathBuf> {
    search_paths
        .as_bytes()
        .split(|b| *b == b':')
        .filter(|dir| !dir.is_empty())
        .map(|dir| Path::new(OsStr::from_bytes(dir)).join(cmd))
        .find(|path| is_executable(path))
}

fn is_executable(path: &Path) -> bool {
    match path.metadata() {
        Ok(meta) => meta.is_file() && meta.permissions().mode() & 0o111 != 0,
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn osstr(s: &str) -> &OsStr {
        OsStr::new(s)
    }

    fn make_script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn env_with_path(dir: &Path, path: &str) -> Environment {
        let mut env = Environment::empty(dir);
        env.set_var("PATH", path);
        env
    }

    #[test]
    fn test_absolute_existing() {
        let found = find_command_path(osstr("/nowhere"), Path::new("/bin/sh"), Path::new("/"));
        assert_eq!(found.as_deref(), Some(Path::new("/bin/sh")));
    }

    #[test]
    fn test_absolute_nonexisting() {
        let path = Path::new("/bin/nonexisting");
        assert!(find_command_path(osstr("/bin"), path, Path::new("/")).is_none());
    }

    #[test]
    fn test_single_component_found_in_path() {
        let found = find_command_path(osstr(":/nowhere::/bin"), Path::new("sh"), Path::new("/"))
            .expect("Expected to find 'sh' in /bin via PATH search");
        assert_eq!(found, Path::new("/bin/sh"));
    }

    #[test]
    fn test_first_executable_match_wins() {
        let temp = tempfile::tempdir().unwrap();
        let first = temp.path().join("first");
        let second = temp.path().join("second");
        fs::create_dir_all(&first).unwrap();
        fs::create_dir_all(&second).unwrap();
        fs::write(first.join("tool"), "not executable").unwrap();
        let winner = make_script(&second, "tool", "true");

        let search = format!("{}:{}", first.display(), second.display());
        let found = find_command_path(osstr(&search), Path::new("tool"), Path::new("/"));
        assert_eq!(found, Some(winner));
    }

    #[test]
    fn test_relative_with_slash_resolves_against_cwd() {
        let temp = tempfile::tempdir().unwrap();
        fs::create_dir(temp.path().join("bin")).unwrap();
        make_script(&temp.path().join("bin"), "run", "true");

        let found = find_command_path(osstr(""), Path::new("bin/run"), temp.path());
        assert_eq!(found, Some(temp.path().join("bin/run")));
        assert!(find_command_path(osstr(""), Path::new("run"), temp.path()).is_none());
    }

    #[test]
    fn test_empty_name_is_none() {
        assert!(find_command_path(osstr("/bin"), Path::new(""), Path::new("/")).is_none());
    }

    #[test]
    fn test_runs_foreground_with_redirected_stdout() {
        let temp = tempfile::tempdir().unwrap();
        let env = env_with_path(temp.path(), "/bin:/usr/bin");
        let streams = StreamPaths {
            stdout: Some(PathBuf::from("out.txt")),
            ..StreamPaths::default()
        };
        let mut launcher = ExternalLauncher::new();
        let argv = [OsString::from("echo"), OsString::from("hi")];

        let first = launcher.execute(&argv, &streams, false, &env).unwrap();
        launcher.execute(&argv, &streams, false, &env).unwrap();

        assert_eq!(first, Spawned::Exited(0));
        assert_eq!(fs::read_to_string(temp.path().join("out.txt")).unwrap(), "hi\n");
    }

    #[test]
    fn test_append_mode_keeps_previous_output() {
        let temp = tempfile::tempdir().unwrap();
        let env = env_with_path(temp.path(), "/bin:/usr/bin");
        let streams = StreamPaths {
            stdout: Some(PathBuf::from("log")),
            stdout_append: true,
            ..StreamPaths::default()
        };
        let mut launcher = ExternalLauncher::new();
        let argv = [OsString::from("echo"), OsString::from("x")];
        launcher.execute(&argv, &streams, false, &env).unwrap();
        launcher.execute(&argv, &streams, false, &env).unwrap();
        assert_eq!(fs::read_to_string(temp.path().join("log")).unwrap(), "x\nx\n");
    }

    #[test]
    fn test_reports_exit_code_and_stdin_redirect() {
        let temp = tempfile::tempdir().unwrap();
        fs::write(temp.path().join("in"), "abc").unwrap();
        make_script(temp.path(), "check", "read line; [ \"$line\" = abc ] && exit 3; exit 4");
        let env = env_with_path(temp.path(), "/bin:/usr/bin");
        let streams = StreamPaths {
            stdin: Some(PathBuf::from("in")),
            ..StreamPaths::default()
        };
        let mut launcher = ExternalLauncher::new();
        let res = launcher
            .execute(&[OsString::from("./check")], &streams, false, &env)
            .unwrap();
        assert_eq!(res, Spawned::Exited(3));
    }

    #[test]
    fn test_unknown_command_spawns_nothing() {
        let temp = tempfile::tempdir().unwrap();
        let env = env_with_path(temp.path(), temp.path().to_str().unwrap());
        let mut launcher = ExternalLauncher::new();
        let err = launcher
            .execute(&[OsString::from("no-such-tool")], &StreamPaths::default(), false, &env)
            .unwrap_err();
        assert_eq!(err.to_string(), "Unknown command 'no-such-tool'");
    }

    #[test]
    fn test_unopenable_redirect_spawns_nothing() {
        let temp = tempfile::tempdir().unwrap();
        let env = env_with_path(temp.path(), "/bin:/usr/bin");
        let streams = StreamPaths {
            stdin: Some(PathBuf::from("missing")),
            ..StreamPaths::default()
        };
        let mut launcher = ExternalLauncher::new();
        let err = launcher
            .execute(&[OsString::from("true")], &streams, false, &env)
            .unwrap_err();
        assert_eq!(err.to_string(), "Unable to redirect child stdin, stdout and stderr");
    }

    #[test]
    fn test_signal_exit_maps_above_128() {
        use std::os::unix::process::ExitStatusExt;
        assert_eq!(exit_code(ExitStatus::from_raw(9)), 137);
        assert_eq!(exit_code(ExitStatus::from_raw(3 << 8)), 3);
    }

    #[test]
    fn test_background_jobs_are_reaped() {
        let temp = tempfile::tempdir().unwrap();
        let env = env_with_path(temp.path(), "/bin:/usr/bin");
        let mut launcher = ExternalLauncher::new();
        let spawned = launcher
            .execute(&[OsString::from("true")], &StreamPaths::default(), true, &env)
            .unwrap();
        let Spawned::Background { pid } = spawned else {
            panic!("expected a background job, got {spawned:?}");
        };
        assert_eq!(launcher.running(), 1);

        let mut finished = Vec::new();
        for _ in 0..200 {
            finished.extend(launcher.reap());
            if !finished.is_empty() {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
        assert_eq!(finished, vec![Finished { pid, code: 0 }]);
        assert_eq!(launcher.running(), 0);
    }
}
