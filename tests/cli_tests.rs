use std::path::{Path, PathBuf};
use std::process::{Command, Output};

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("fixtures")
        .join(name)
}

fn camel(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_camel"))
        .args(args)
        .output()
        .expect("spawn camel")
}

fn camel_with_file(file: &Path, flags: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_camel"))
        .arg(file)
        .args(flags)
        .output()
        .expect("spawn camel")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("camel-{}-{name}", std::process::id()))
}

#[test]
fn runs_source_file() {
    let output = camel_with_file(&fixture("fib.cml"), &[]);
    let expected = std::fs::read_to_string(fixture("fib.expected")).expect("read fib.expected");
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert_eq!(stdout(&output), expected);
}

#[test]
fn compile_error_exits_65() {
    let output = camel_with_file(&fixture("error_missing_end.cml"), &[]);
    assert_eq!(output.status.code(), Some(65));
    assert!(stdout(&output).is_empty());
    assert!(
        stderr(&output).contains("expected 'end'"),
        "stderr: {}",
        stderr(&output)
    );
}

#[test]
fn runtime_error_exits_70() {
    let output = camel_with_file(&fixture("runtime_undefined.cml"), &[]);
    assert_eq!(output.status.code(), Some(70));
    assert_eq!(stdout(&output), "1\n");
    assert!(stderr(&output).contains("[line 3] Undefined variable 'b'"));
}

#[test]
fn missing_file_exits_74() {
    let output = camel(&["does-not-exist.cml"]);
    assert_eq!(output.status.code(), Some(74));
    assert!(stderr(&output).contains("does-not-exist.cml"));
}

#[test]
fn unknown_flag_exits_64() {
    let output = camel(&["--no-such-flag"]);
    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn dump_tokens_lists_kinds() {
    let output = camel_with_file(&fixture("typed.cml"), &["--dump-tokens"]);
    assert!(output.status.success());
    let text = stdout(&output);
    let first = text.lines().next().expect("at least one token");
    assert_eq!(first, "   1 DEFINE 'define'");
    assert!(text.lines().last().is_some_and(|l| l.contains("EOF")));
}

#[test]
fn dump_ast_as_sexp_and_json() {
    let sexp = camel_with_file(&fixture("typed.cml"), &["--dump-ast"]);
    assert!(sexp.status.success());
    assert!(stdout(&sexp).starts_with("(define small: u8 200)"));

    let json = camel_with_file(&fixture("typed.cml"), &["--dump-ast", "--ast-format", "json"]);
    assert!(json.status.success());
    let parsed: serde_json::Value =
        serde_json::from_str(&stdout(&json)).expect("AST dump should be valid JSON");
    assert!(parsed.get("declarations").is_some_and(|d| d.is_array()));
}

#[test]
fn disassemble_source() {
    let output = camel_with_file(&fixture("fib.cml"), &["--disassemble"]);
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("Constants:"));
    assert!(text.contains("define_global"));
    assert!(text.contains("loop"));
    assert!(text.trim_end().ends_with("return"));
}

#[test]
fn save_then_load_bytecode() {
    let path = temp_path("fib.cmlb");
    let path_arg = path.to_str().expect("utf-8 path");
    let saved = camel_with_file(&fixture("fib.cml"), &["--save-bytecode", path_arg]);
    assert!(saved.status.success(), "stderr: {}", stderr(&saved));
    assert!(stdout(&saved).is_empty());

    let loaded = camel(&["--load-bytecode", path_arg]);
    let expected = std::fs::read_to_string(fixture("fib.expected")).expect("read fib.expected");
    assert!(loaded.status.success(), "stderr: {}", stderr(&loaded));
    assert_eq!(stdout(&loaded), expected);

    let listing = camel(&["--load-bytecode", path_arg, "--disassemble"]);
    assert!(stdout(&listing).contains("Code:"));

    std::fs::remove_file(&path).ok();
}

#[test]
fn loading_garbage_exits_74() {
    let path = temp_path("garbage.cmlb");
    std::fs::write(&path, b"definitely not bytecode").expect("write temp file");
    let output = camel(&["--load-bytecode", path.to_str().expect("utf-8 path")]);
    assert_eq!(output.status.code(), Some(74));
    assert!(stderr(&output).contains("bad magic"));
    std::fs::remove_file(&path).ok();
}
