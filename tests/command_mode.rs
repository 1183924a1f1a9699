//! Integration tests for the command line (-c, --commands, -o).

use std::path::PathBuf;
use std::process::Command;

fn run_command(args: &[&str]) -> (String, String, i32) {
    let output = Command::new("cargo")
        .arg("run")
        .arg("-q")
        .arg("--")
        // Tests must not depend on a user's ~/.config/tabula/config.toml.
        .arg("--no-config")
        .args(args)
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let exit_code = output.status.code().unwrap_or(-1);

    (stdout, stderr, exit_code)
}

fn temp_path(tag: &str) -> PathBuf {
    std::env::temp_dir().join(format!(
        "tabula_cli_{tag}_{}_{}_{:?}.json",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos(),
        std::thread::current().id(),
    ))
}

struct Cleanup(PathBuf);
impl Drop for Cleanup {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
    }
}

#[test]
fn test_basic_arithmetic() {
    let (stdout, _, code) = run_command(&["-c", "5 + 3"]);
    assert_eq!(stdout.trim(), "8");
    assert_eq!(code, 0);
}

#[test]
fn test_function_call() {
    let (stdout, _, code) = run_command(&["-c", "SUM(1, 2, 3) * 2"]);
    assert_eq!(stdout.trim(), "12");
    assert_eq!(code, 0);
}

#[test]
fn test_auto_prepend_equals() {
    let (stdout1, _, _) = run_command(&["-c", "10 + 5"]);
    let (stdout2, _, _) = run_command(&["-c", "=10 + 5"]);
    assert_eq!(stdout1, stdout2);
}

#[test]
fn test_async_function_is_awaited() {
    let (stdout, _, code) = run_command(&["-c", "WAIT(20) + 1"]);
    assert_eq!(stdout.trim(), "21");
    assert_eq!(code, 0);
}

#[test]
fn test_unknown_function_exit_code() {
    let (stdout, _, code) = run_command(&["-c", "NOPE(1)"]);
    assert!(stdout.starts_with("#NAME"), "{stdout}");
    assert_eq!(code, 1);
}

#[test]
fn test_division_by_zero() {
    let (stdout, _, code) = run_command(&["-c", "1/0"]);
    assert!(stdout.starts_with("#ERROR"), "{stdout}");
    assert_eq!(code, 1);
}

#[test]
fn test_commands_file_then_print_sheet() {
    let commands = temp_path("commands");
    let _cleanup = Cleanup(commands.clone());
    std::fs::write(
        &commands,
        r#"[
            {"type": "UPDATE_CELL", "sheetId": "sheet1", "col": 0, "row": 0, "content": "2"},
            {"type": "UPDATE_CELL", "sheetId": "sheet1", "col": 1, "row": 0, "content": "=A1*21"},
            {"type": "UPDATE_CELL", "sheetId": "sheet1", "col": 0, "row": 1, "content": "hi"}
        ]"#,
    )
    .unwrap();

    let (stdout, _, code) = run_command(&["--commands", commands.to_str().unwrap()]);
    assert_eq!(code, 0);
    assert_eq!(stdout, "2\t42\nhi\n");
}

#[test]
fn test_refused_command_is_reported() {
    let commands = temp_path("refused");
    let _cleanup = Cleanup(commands.clone());
    std::fs::write(
        &commands,
        r#"[{"type": "DELETE_SHEET", "sheetId": "sheet1"}]"#,
    )
    .unwrap();

    let (_, stderr, code) = run_command(&["--commands", commands.to_str().unwrap()]);
    assert_eq!(code, 0);
    assert!(stderr.contains("command refused"), "{stderr}");
}

#[test]
fn test_export_then_reopen() {
    let commands = temp_path("export_commands");
    let workbook = temp_path("export_workbook");
    let _c1 = Cleanup(commands.clone());
    let _c2 = Cleanup(workbook.clone());
    std::fs::write(
        &commands,
        r#"[{"type": "UPDATE_CELL", "sheetId": "sheet1", "col": 2, "row": 2, "content": "7"}]"#,
    )
    .unwrap();

    let (stdout, _, code) = run_command(&[
        "--commands",
        commands.to_str().unwrap(),
        "-o",
        workbook.to_str().unwrap(),
    ]);
    assert_eq!(code, 0);
    assert!(stdout.starts_with("Exported to"), "{stdout}");

    let (stdout, _, code) = run_command(&[workbook.to_str().unwrap(), "-c", "C3 * 6"]);
    assert_eq!(stdout.trim(), "42");
    assert_eq!(code, 0);
}

#[test]
fn test_missing_workbook_fails() {
    let missing = temp_path("missing");
    let (_, stderr, code) = run_command(&[missing.to_str().unwrap()]);
    assert_eq!(code, 1);
    assert!(stderr.contains("failed to open"), "{stderr}");
}
