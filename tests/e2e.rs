use std::fs;
use std::path::Path;
use std::process::Command;

use tempfile::TempDir;

const PRINT_SUM: &str = r#"{
  "functions": [{
    "name": "main",
    "return_type": {"name": "void"},
    "body": [
      {"var_decl": {"var": {"name": "x", "data_type": {"name": "int"}},
                    "init": {"binary": {"op": "add",
                                        "left": {"literal": {"int": 3}},
                                        "right": {"literal": {"int": 4}}}}}},
      {"call": {"name": "print", "args": [{"path": [{"name": "x"}]}]}}
    ]
  }]
}"#;

fn write_tree(dir: &TempDir, name: &str, json: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, json).unwrap();
    path
}

fn run_mypl(args: &[&str], file: &Path) -> (String, String, bool) {
    let output = Command::new(env!("CARGO_BIN_EXE_mypl"))
        .args(args)
        .arg(file)
        .output()
        .expect("failed to execute mypl");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn test_run() {
    let dir = tempfile::tempdir().unwrap();
    let tree = write_tree(&dir, "sum.json", PRINT_SUM);
    let (stdout, stderr, success) = run_mypl(&["run"], &tree);
    assert!(success, "program should succeed, stderr:\n{}", stderr);
    assert_eq!(stdout, "7");
    assert!(stderr.is_empty());
}

#[test]
fn test_ir() {
    let dir = tempfile::tempdir().unwrap();
    let tree = write_tree(&dir, "sum.json", PRINT_SUM);
    let (stdout, _, success) = run_mypl(&["ir"], &tree);
    assert!(success);
    assert_eq!(
        stdout,
        "Frame 'main'\n  0: PUSH(3)\n  1: PUSH(4)\n  2: ADD()\n  3: STORE(0)\n  \
         4: LOAD(0)\n  5: WRITE()\n  6: PUSH(null)\n  7: RET()\n"
    );
}

#[test]
fn test_check() {
    let dir = tempfile::tempdir().unwrap();
    let tree = write_tree(&dir, "sum.json", PRINT_SUM);
    let (stdout, _, success) = run_mypl(&["check"], &tree);
    assert!(success);
    assert_eq!(stdout, "Code generation passed.\n");
}

#[test]
fn test_malformed_tree() {
    let dir = tempfile::tempdir().unwrap();
    let tree = write_tree(&dir, "bad.json", r#"{"functions": [{"name": 1}]}"#);
    let (_, stderr, success) = run_mypl(&["run"], &tree);
    assert!(!success);
    assert!(stderr.contains("invalid syntax tree"), "stderr: {}", stderr);
}

#[test]
fn test_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let (_, stderr, success) = run_mypl(&["check"], &dir.path().join("absent.json"));
    assert!(!success);
    assert!(stderr.contains("failed to access"), "stderr: {}", stderr);
}

#[test]
fn test_trace_flag() {
    let dir = tempfile::tempdir().unwrap();
    let tree = write_tree(&dir, "sum.json", PRINT_SUM);
    let (stdout, stderr, success) = run_mypl(&["run", "--trace"], &tree);
    assert!(success);
    assert_eq!(stdout, "7");
    assert!(stderr.contains("[trace] main:2 ADD() top=Int(4) depth=1"), "stderr: {}", stderr);
}

#[test]
fn test_profile_from_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let tree = write_tree(&dir, "sum.json", PRINT_SUM);
    let config = dir.path().join("mypl.toml");
    fs::write(&config, "profile_opcodes = true\n").unwrap();
    let (stdout, stderr, success) =
        run_mypl(&["run", "--config", config.to_str().unwrap()], &tree);
    assert!(success);
    assert_eq!(stdout, "7");
    assert!(stderr.contains("[profile] PUSH"), "stderr: {}", stderr);
    assert!(!stderr.contains("[trace]"));
}

#[test]
fn test_bad_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let tree = write_tree(&dir, "sum.json", PRINT_SUM);
    let config = dir.path().join("mypl.toml");
    fs::write(&config, "trace = \"yes\"\n").unwrap();
    let (_, stderr, success) = run_mypl(&["run", "--config", config.to_str().unwrap()], &tree);
    assert!(!success);
    assert!(stderr.contains("invalid config file"), "stderr: {}", stderr);
}

#[test]
fn test_dump_bytecode_to_file() {
    let dir = tempfile::tempdir().unwrap();
    let tree = write_tree(&dir, "sum.json", PRINT_SUM);
    let dump = dir.path().join("sum.ir");
    let flag = format!("--dump-bytecode={}", dump.display());
    let (stdout, _, success) = run_mypl(&["run", &flag], &tree);
    assert!(success);
    assert_eq!(stdout, "7");
    let listing = fs::read_to_string(&dump).unwrap();
    assert!(listing.starts_with("Frame 'main'\n  0: PUSH(3)\n"));
}

#[test]
fn test_dump_bytecode_to_stderr() {
    let dir = tempfile::tempdir().unwrap();
    let tree = write_tree(&dir, "sum.json", PRINT_SUM);
    let (stdout, stderr, success) = run_mypl(&["run", "--dump-bytecode"], &tree);
    assert!(success);
    assert_eq!(stdout, "7");
    assert!(stderr.contains("  5: WRITE()"), "stderr: {}", stderr);
}
