use assert_cmd::Command;
use std::fs;
use std::path::Path;

fn run_script(dir: &Path, script: &str) -> std::process::Output {
    let path = dir.join("script.fj");
    fs::write(&path, script).unwrap();
    Command::cargo_bin("flapjack")
        .unwrap()
        .current_dir(dir)
        .arg(&path)
        .output()
        .unwrap()
}

fn stdout(out: &std::process::Output) -> String {
    String::from_utf8_lossy(&out.stdout).into_owned()
}

fn stderr(out: &std::process::Output) -> String {
    String::from_utf8_lossy(&out.stderr).into_owned()
}

#[test]
fn test_prints_register() {
    let temp = tempfile::tempdir().unwrap();
    let out = run_script(temp.path(), "0 hello :\n0 \\\n");
    assert!(out.status.success());
    assert_eq!(stdout(&out), "hello\r\n");
    assert_eq!(stderr(&out), "");
}

#[test]
fn test_jump_skips_lines() {
    let temp = tempfile::tempdir().unwrap();
    let out = run_script(temp.path(), "1 after :\n1 >\n0 never :\nafter <\n0 \\\n");
    assert_eq!(stdout(&out), "\r\n");
}

#[test]
fn test_bad_lines_do_not_stop_the_script() {
    let temp = tempfile::tempdir().unwrap();
    let out = run_script(temp.path(), "9 9 9 ;\nx\n0 ok :\n0 \\\n");
    assert!(out.status.success());
    assert_eq!(stdout(&out), "ok\r\n");
    let err = stderr(&out);
    assert!(err.contains("Invalid instruction '9 9 9 ;'"), "{err}");
    assert!(err.contains("Unknown command 'x'"), "{err}");
}

#[test]
fn test_terminate_exits_successfully() {
    let temp = tempfile::tempdir().unwrap();
    let out = run_script(temp.path(), "0 a :\n=\n0 \\\n");
    assert!(out.status.success());
    assert_eq!(stdout(&out), "");
}

#[test]
fn test_runs_program_with_redirected_output() {
    let temp = tempfile::tempdir().unwrap();
    let out = run_script(
        temp.path(),
        "0 echo :\n1 written :\n2 out.txt :\n2 ]\n0 1 #\n0 1 #\n}\n0 1 #\n",
    );
    assert!(out.status.success(), "{}", stderr(&out));
    assert_eq!(
        fs::read_to_string(temp.path().join("out.txt")).unwrap(),
        "written\nwritten\n"
    );
}

#[test]
fn test_unknown_program_is_reported() {
    let temp = tempfile::tempdir().unwrap();
    let out = run_script(temp.path(), "0 definitely-not-a-program :\n0 #\n");
    assert!(out.status.success());
    assert_eq!(stderr(&out), "Unknown command 'definitely-not-a-program'\r\n");
}

#[test]
fn test_lists_and_changes_directory() {
    let temp = tempfile::tempdir().unwrap();
    fs::create_dir(temp.path().join("sub")).unwrap();
    fs::write(temp.path().join("sub").join("file"), "").unwrap();
    let out = run_script(temp.path(), "0 sub :\n0 @\n_\n");
    assert_eq!(stdout(&out), "file\r\n\r\n");
}

#[test]
fn test_environment_includes_shell() {
    let temp = tempfile::tempdir().unwrap();
    let out = run_script(temp.path(), "?\n");
    assert!(stdout(&out).contains("SHELL="));
}

#[test]
fn test_missing_script_fails() {
    let temp = tempfile::tempdir().unwrap();
    Command::cargo_bin("flapjack")
        .unwrap()
        .arg(temp.path().join("nope"))
        .assert()
        .failure();
}
