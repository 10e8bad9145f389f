//! In-process collaborators: directory change, listing, working directory
//! and environment dump.

use crate::env::Environment;
use crate::io_adapters::Console;
use anyhow::{Context, Result, anyhow};
use std::env;
use std::ffi::OsString;
use std::fs;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

/// Changes the working directory to `target`, or to `$HOME` when omitted.
///
/// An empty target names no directory and is an error. Relative targets are resolved against the environment's directory. On
/// success `PWD`/`OLDPWD` are updated; on failure nothing changes.
pub fn change_directory(env: &mut Environment, target: Option<&Path>) -> Result<()> {
    let target = match target {
        Some(t) if t.as_os_str().is_empty() => {
            return Err(anyhow!("Error opening directory {}", t.display()));
        }
        Some(t) => t.to_path_buf(),
        None => env
            .get_var("HOME")
            .map(PathBuf::from)
            .ok_or_else(|| anyhow!("Error getting home directory"))?,
    };

    let new_dir = if target.is_absolute() {
        target
    } else {
        env.current_dir.join(target)
    };

    let canonical = fs::canonicalize(&new_dir)
        .with_context(|| format!("Error opening directory {}", new_dir.display()))?;
    env::set_current_dir(&canonical)
        .with_context(|| format!("Error opening directory {}", canonical.display()))?;
    tracing::debug!(dir = %canonical.display(), "changed directory");
    env.enter_dir(canonical);
    Ok(())
}

/// Lists each of `paths` (or the working directory when empty).
///
/// Entries are sorted and `.`/`..` are skipped. With more than one path each
/// section is headed by `<path>:`. A path that cannot be read is reported on
/// the error stream and listing carries on; the result is an error if any
/// path failed.
pub fn list_directory(console: &mut Console, env: &Environment, paths: &[PathBuf]) -> Result<()> {
    let sections: Vec<(&Path, PathBuf)> = if paths.is_empty() {
        vec![(env.current_dir.as_path(), env.current_dir.clone())]
    } else {
        paths
            .iter()
            .map(|p| (p.as_path(), env.current_dir.join(p)))
            .collect()
    };
    let sectioned = sections.len() > 1;

    let mut failed = 0;
    for (shown, target) in &sections {
        if sectioned {
            console.print_fmt(format_args!("{}:\r\n", shown.display()))?;
        }
        match read_entries(target) {
            Ok(entries) => {
                for entry in entries {
                    console.print(entry.as_bytes())?;
                    console.print(b"\r\n")?;
                }
                console.print(b"\r\n")?;
            }
            Err(e) => {
                tracing::debug!("listing {} failed: {e:#}", target.display());
                console.error(format_args!("Error opening directory {}", shown.display()));
                failed += 1;
            }
        }
    }

    if failed > 0 {
        Err(anyhow!("{failed} director(ies) could not be listed"))
    } else {
        Ok(())
    }
}

fn read_entries(dir: &Path) -> Result<Vec<OsString>> {
    let mut entries = fs::read_dir(dir)
        .with_context(|| format!("can't open {}", dir.display()))?
        .map(|entry| entry.map(|e| e.file_name()))
        .collect::<std::io::Result<Vec<_>>>()?;
    entries.retain(|name| name != "." && name != "..");
    entries.sort();
    Ok(entries)
}

/// Writes the working directory followed by a line break.
pub fn print_working_directory(console: &mut Console, env: &Environment) -> Result<()> {
    console.print(env.current_dir.as_os_str().as_bytes())?;
    console.print(b"\r\n")?;
    Ok(())
}

/// `NAME=VALUE` for every variable, ordered by name.
pub fn read_environment(env: &Environment) -> Vec<OsString> {
    env.vars
        .iter()
        .map(|(name, value)| {
            let mut line = name.clone();
            line.push("=");
            line.push(value);
            line
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::{Mutex, MutexGuard, OnceLock};

    /// Serialises tests that move the process working directory.
    pub(crate) fn lock_current_dir() -> MutexGuard<'static, ()> {
        static MUTEX: OnceLock<Mutex<()>> = OnceLock::new();
        MUTEX
            .get_or_init(|| Mutex::new(()))
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    #[test]
    fn test_cd_to_absolute_path() {
        let _lock = lock_current_dir();
        let orig = env::current_dir().unwrap();
        let temp = tempfile::tempdir().unwrap();
        let canonical = fs::canonicalize(temp.path()).unwrap();

        let mut env = Environment::empty(&orig);
        change_directory(&mut env, Some(&canonical)).unwrap();

        assert_eq!(env.current_dir, canonical);
        assert_eq!(fs::canonicalize(env::current_dir().unwrap()).unwrap(), canonical);
        assert_eq!(env.get_var("OLDPWD"), Some(orig.as_os_str()));
        assert_eq!(env.get_var("PWD"), Some(canonical.as_os_str()));

        env::set_current_dir(orig).unwrap();
    }

    #[test]
    fn test_cd_without_target_goes_home() {
        let _lock = lock_current_dir();
        let orig = env::current_dir().unwrap();
        let temp = tempfile::tempdir().unwrap();
        let canonical = fs::canonicalize(temp.path()).unwrap();

        let mut env = Environment::empty(&orig);
        env.set_var("HOME", canonical.clone());
        change_directory(&mut env, None).unwrap();
        assert_eq!(env.current_dir, canonical);

        env::set_current_dir(orig).unwrap();
    }

    #[test]
    fn test_cd_without_home_fails() {
        let mut env = Environment::empty("/");
        assert!(change_directory(&mut env, None).is_err());
        assert_eq!(env.current_dir, PathBuf::from("/"));
    }

    #[test]
    fn test_cd_to_empty_path_fails() {
        let mut env = Environment::empty("/start");
        env.set_var("HOME", "/");
        let err = change_directory(&mut env, Some(Path::new(""))).unwrap_err();
        assert_eq!(err.to_string(), "Error opening directory ");
        assert_eq!(env.current_dir, PathBuf::from("/start"));
        assert_eq!(env.get_var("PWD"), None);
    }

    #[test]
    fn test_cd_to_missing_directory_leaves_state() {
        let _lock = lock_current_dir();
        let orig = env::current_dir().unwrap();
        let temp = tempfile::tempdir().unwrap();
        let mut env = Environment::empty(temp.path());

        let err = change_directory(&mut env, Some(Path::new("does-not-exist"))).unwrap_err();

        assert!(err.to_string().starts_with("Error opening directory"));
        assert_eq!(env.current_dir, temp.path());
        assert_eq!(env.get_var("PWD"), None);
        assert_eq!(env::current_dir().unwrap(), orig);
    }

    #[test]
    fn test_lists_single_directory_sorted() {
        let temp = tempfile::tempdir().unwrap();
        fs::write(temp.path().join("b.txt"), "").unwrap();
        fs::write(temp.path().join("a.txt"), "").unwrap();
        fs::create_dir(temp.path().join("c")).unwrap();

        let env = Environment::empty(temp.path());
        let (mut console, captured) = Console::captured();
        list_directory(&mut console, &env, &[]).unwrap();

        assert_eq!(captured.stdout(), "a.txt\r\nb.txt\r\nc\r\n\r\n");
    }

    #[test]
    fn test_lists_several_directories_with_headers() {
        let temp = tempfile::tempdir().unwrap();
        fs::create_dir(temp.path().join("one")).unwrap();
        fs::create_dir(temp.path().join("two")).unwrap();
        fs::write(temp.path().join("one").join("x"), "").unwrap();

        let env = Environment::empty(temp.path());
        let (mut console, captured) = Console::captured();
        list_directory(
            &mut console,
            &env,
            &[PathBuf::from("one"), PathBuf::from("two")],
        )
        .unwrap();

        assert_eq!(captured.stdout(), "one:\r\nx\r\n\r\ntwo:\r\n\r\n");
    }

    #[test]
    fn test_listing_continues_past_bad_path() {
        let temp = tempfile::tempdir().unwrap();
        fs::create_dir(temp.path().join("ok")).unwrap();
        let env = Environment::empty(temp.path());
        let (mut console, captured) = Console::captured();

        let res = list_directory(
            &mut console,
            &env,
            &[PathBuf::from("missing"), PathBuf::from("ok")],
        );

        assert!(res.is_err());
        assert_eq!(captured.stderr(), "Error opening directory missing\r\n");
        assert!(captured.stdout().ends_with("ok:\r\n\r\n"));
    }

    #[test]
    fn test_pwd_and_environment() {
        let mut env = Environment::empty("/some/where");
        env.set_var("B", "2");
        env.set_var("A", "1");
        let (mut console, captured) = Console::captured();
        print_working_directory(&mut console, &env).unwrap();
        assert_eq!(captured.stdout(), "/some/where\r\n");
        assert_eq!(read_environment(&env), vec![OsString::from("A=1"), OsString::from("B=2")]);
    }
}
