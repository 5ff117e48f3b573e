//! End-to-end driver tests

use basalt_cli::{compile, compile_to_string, Options};
use basalt_common::Diagnostics;
use std::io::Write;
use tempfile::NamedTempFile;

fn source_file(source: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".bas")
        .tempfile()
        .expect("temp file");
    file.write_all(source.as_bytes()).expect("write source");
    file
}

fn compile_source(source: &str) -> Result<String, String> {
    let file = source_file(source);
    let options = Options {
        inputs: vec![file.path().to_path_buf()],
        output: "unused".into(),
    };

    let mut diagnostics = Diagnostics::new();
    compile_to_string(&options, &mut diagnostics).map_err(|e| e.message().to_string())
}

#[test]
fn compiles_return_zero_to_assembly() {
    // S1 end to end.
    let asm = compile_source("$public main :: () -> s64 { ret 0; }").expect("compiles");

    assert!(asm.contains(".global\tmain"), "{}", asm);
    assert!(asm.contains("movq\t$0, %rax"), "{}", asm);
}

#[test]
fn compiles_arithmetic_on_locals() {
    // S2 end to end.
    let asm = compile_source("$public main :: () -> s64 { let x: mut s64 = 5; x = x + 3; ret x; }")
        .expect("compiles");

    assert!(asm.contains("main:"), "{}", asm);
    assert!(asm.contains("(%rbp)"), "{}", asm);
}

#[test]
fn semantic_errors_fail_compilation() {
    // S4: stop outside of a loop.
    let err = compile_source("foo :: () -> s64 { stop; }").expect_err("must fail");
    assert!(err.contains("'stop' outside of loop"), "{}", err);
}

#[test]
fn main_signature_errors_fail_compilation() {
    // S3: main must return s64. The checks are non-fatal errors, so the
    // driver aborts after semantic analysis.
    let err = compile_source("$public main :: () -> s8;").expect_err("must fail");
    assert!(err.contains("semantic analysis failed"), "{}", err);
}

#[test]
fn load_imports_pull_in_other_files() {
    let dir = tempfile::tempdir().expect("temp dir");

    let lib = dir.path().join("lib.bas");
    std::fs::write(&lib, "seven :: () -> s64 { ret 7; }").unwrap();

    let main = dir.path().join("main.bas");
    std::fs::write(
        &main,
        "load \"lib.bas\";\nseven :: () -> s64;\n$public main :: () -> s64 { ret seven(); }",
    )
    .unwrap();

    let options = Options { inputs: vec![main], output: "unused".into() };
    let mut diagnostics = Diagnostics::new();
    let asm = compile_to_string(&options, &mut diagnostics).expect("compiles");

    assert!(asm.contains("call\tseven"), "{}", asm);
    assert!(asm.contains("seven:"), "{}", asm);
}

#[test]
fn writes_assembly_to_the_output_path() {
    let dir = tempfile::tempdir().expect("temp dir");
    let input = dir.path().join("prog.bas");
    std::fs::write(&input, "$public main :: () -> s64 { ret 0; }").unwrap();

    let output = dir.path().join("prog.s");
    let options = Options { inputs: vec![input], output: output.clone() };

    let mut diagnostics = Diagnostics::new();
    compile(&options, &mut diagnostics).expect("compiles");

    let written = std::fs::read_to_string(&output).expect("output exists");
    assert!(written.contains(".global\tmain"));
}

#[test]
fn missing_input_is_an_io_error() {
    let options = Options {
        inputs: vec!["does-not-exist.bas".into()],
        output: "unused".into(),
    };

    let mut diagnostics = Diagnostics::new();
    let err = compile_to_string(&options, &mut diagnostics).expect_err("must fail");
    assert!(err.message().contains("cannot read"), "{}", err.message());
    assert!(diagnostics.has_errors());
}
