use std::path::{Path, PathBuf};
use std::process::{Command, Output};

fn mscript(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_mscript"))
        .arg("--no-color")
        .args(args)
        .env_remove("MSCRIPT_LOG")
        .output()
        .expect("mscript should start")
}

fn write_script(dir: &Path, name: &str, source: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, source).unwrap();
    path
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

const OPTIMIZE: &str = "Create Spacecraft Sat1;
Create VF13ad myOpt;
myOpt.MaximumIterations = 2;

BeginMissionSequence;
Optimize myOpt
   Minimize myOpt(Sat1.SMA);
EndOptimize;
";

#[test]
fn script_suite_passes() {
    let scripts = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/scripts");
    let output = mscript(&["test", scripts.to_str().unwrap()]);
    assert!(output.status.success(), "{}", stderr(&output));
    assert!(stderr(&output).contains("test result: ok."));
}

#[test]
fn single_category() {
    let scripts = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/scripts");
    let output = mscript(&["test", scripts.to_str().unwrap(), "--category", "solvers"]);
    assert!(output.status.success(), "{}", stderr(&output));
    let log = stderr(&output);
    assert!(log.contains("solvers"));
    assert!(!log.contains("control"));
}

#[test]
fn failing_test_file_reports_reason() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_script(
        dir.path(),
        "wrong.test.script",
        "---\nexpect_values = { x = 2.0 }\n---\nCreate Variable x;\nx = 1;\n",
    );
    let output = mscript(&["test", path.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(1));
    let log = stderr(&output);
    assert!(log.contains("FAIL"));
    assert!(log.contains("x: expected 2, got Some(1.0)"), "{}", log);
}

#[test]
fn run_prints_solver_results() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_script(dir.path(), "opt.script", OPTIMIZE);

    let output = mscript(&["run", path.to_str().unwrap()]);
    assert!(output.status.success(), "{}", stderr(&output));
    let text = stdout(&output);
    assert!(text.starts_with("myOpt:"), "{}", text);
    assert!(text.contains("Sat1.SMA"));
    assert!(text.contains("(2 report(s))"));
}

#[test]
fn file_argument_defaults_to_run() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_script(dir.path(), "opt.script", OPTIMIZE);

    let output = mscript(&[path.to_str().unwrap()]);
    assert!(output.status.success(), "{}", stderr(&output));
    assert!(stdout(&output).contains("myOpt:"));
}

#[test]
fn check_reports_compile_errors() {
    let dir = tempfile::tempdir().unwrap();
    let good = write_script(dir.path(), "good.script", "Create Variable x;\nx = 1;\n");
    let bad = write_script(
        dir.path(),
        "bad.script",
        "Create Variable x;\nIf x < 1\n   x = 1;\nEndWhile;\n",
    );

    let output = mscript(&["check", good.to_str().unwrap()]);
    assert!(output.status.success(), "{}", stderr(&output));
    assert!(stderr(&output).contains("ok:"));

    let output = mscript(&["check", bad.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(1));
    let log = stderr(&output);
    assert!(log.contains("EndWhile found where EndIf was expected"), "{}", log);
    assert!(log.contains("could not compile due to 2 error(s)"), "{}", log);
}

#[test]
fn dump_with_generating_strings() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_script(
        dir.path(),
        "dump.script",
        "Create Variable x;\nBeginMissionSequence;\nx = 1;\n",
    );

    let output = mscript(&["dump", path.to_str().unwrap(), "--gen"]);
    assert!(output.status.success(), "{}", stderr(&output));
    let text = stdout(&output);
    assert!(text.contains("---------- Mission Sequence ----------"));
    assert!(text.contains("  Assignment  <x = 1;>"), "{}", text);
}

#[test]
fn config_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_script(
        dir.path(),
        "mscript.toml",
        "commands = [\"Propagate2\"]\nmax_loop_iterations = 5\n",
    );
    let path = write_script(
        dir.path(),
        "loop.script",
        "Create Spacecraft Sat1;
Create Variable x;
BeginMissionSequence;
Propagate2 Sat1;
While x < 10
   x = x;
EndWhile;
",
    );

    let output = mscript(&["--config", config.to_str().unwrap(), path.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(1));
    let log = stderr(&output);
    assert!(log.contains("While loop exceeded 5 iterations"), "{}", log);
}

#[test]
fn bad_config_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_script(dir.path(), "mscript.toml", "unknown_key = 1\n");
    let path = write_script(dir.path(), "x.script", "Create Variable x;\n");

    let output = mscript(&["--config", config.to_str().unwrap(), "check", path.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("TOML parse error"));
}
