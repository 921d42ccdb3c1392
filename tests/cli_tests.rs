//! Exercise the installed binary end to end.

use std::io::Write;
use std::process::Command;

use tempfile::NamedTempFile;

fn write_program(source: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp file");
    file.write_all(source.as_bytes()).expect("write program");
    file
}

fn a68(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_a68"))
        .args(args)
        .output()
        .expect("binary runs")
}

#[test]
fn runs_a_program_file_and_prints() {
    let file = write_program("INT a = 3, b = 4; print(a + b)");
    let out = a68(&[file.path().to_str().unwrap()]);
    assert_eq!(out.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains('7'), "stdout was {:?}", stdout);
}

#[test]
fn check_flag_suppresses_execution() {
    let file = write_program("print(1)");
    let out = a68(&["--check", file.path().to_str().unwrap()]);
    assert_eq!(out.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.is_empty(), "stdout was {:?}", stdout);
}

#[test]
fn mode_error_exits_2() {
    let file = write_program("INT a = TRUE");
    let out = a68(&[file.path().to_str().unwrap()]);
    assert_eq!(out.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("mode error"), "stderr was {:?}", stderr);
}

#[test]
fn syntax_error_exits_3() {
    let file = write_program("IF TRUE THEN 1");
    let out = a68(&[file.path().to_str().unwrap()]);
    assert_eq!(out.status.code(), Some(3));
}

#[test]
fn runtime_error_exits_1() {
    let file = write_program("INT z := 0; print(1 % z)");
    let out = a68(&[file.path().to_str().unwrap()]);
    assert_eq!(out.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("division by zero"), "stderr was {:?}", stderr);
}

#[test]
fn timelimit_exits_4() {
    let file = write_program("WHILE TRUE DO SKIP OD");
    let out = a68(&["--timelimit", "1", file.path().to_str().unwrap()]);
    assert_eq!(out.status.code(), Some(4));
}

#[test]
fn strict_rejects_extensions() {
    let file = write_program("INT i := 0; DO i +:= 1 UNTIL i = 3 OD");
    let ok = a68(&[file.path().to_str().unwrap()]);
    assert_eq!(ok.status.code(), Some(0));
    let strict = a68(&["--strict", file.path().to_str().unwrap()]);
    assert_eq!(strict.status.code(), Some(3));
}

#[test]
fn quiet_silences_warnings() {
    let file = write_program("REF INT i := LOC INT := 0; print(i)");
    let noisy = a68(&[file.path().to_str().unwrap()]);
    assert!(!String::from_utf8_lossy(&noisy.stderr).is_empty());
    let quiet = a68(&["--quiet", file.path().to_str().unwrap()]);
    assert!(String::from_utf8_lossy(&quiet.stderr).is_empty());
}

#[test]
fn regression_test_makes_random_reproducible() {
    let file = write_program("print(ENTIER (random * 1000000.0))");
    let path = file.path().to_str().unwrap().to_string();
    let first = a68(&["--regression-test", &path]);
    let second = a68(&["--regression-test", &path]);
    assert_eq!(first.status.code(), Some(0));
    assert_eq!(first.stdout, second.stdout);
}

#[test]
fn segment_sizes_are_configurable() {
    let file = write_program(
        "PROC deep = (INT n) INT: (n = 0 | 0 | deep(n - 1)); print(deep(64))",
    );
    let shallow = a68(&["--frame", "8", file.path().to_str().unwrap()]);
    assert_eq!(shallow.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&shallow.stderr);
    assert!(stderr.contains("frame stack overflow"), "stderr was {:?}", stderr);
    let roomy = a68(&["--frame", "512", file.path().to_str().unwrap()]);
    assert_eq!(roomy.status.code(), Some(0));
}
