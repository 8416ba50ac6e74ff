//! End-to-end runs of the `lsp-conform` binary

use std::process::Command;

fn lsp_conform() -> Command {
    Command::new(env!("CARGO_BIN_EXE_lsp-conform"))
}

#[test]
fn missing_server_exits_with_startup_failure() {
    let root = tempfile::tempdir().unwrap();
    let output = lsp_conform()
        .arg("--root")
        .arg(root.path())
        .arg("lsp-conform-no-such-server")
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("not found in PATH"), "stderr: {stderr}");
}

#[test]
fn missing_config_file_exits_with_startup_failure() {
    let dir = tempfile::tempdir().unwrap();
    let output = lsp_conform()
        .arg("--config")
        .arg(dir.path().join("absent.toml"))
        .arg("mylang")
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("absent.toml"), "stderr: {stderr}");
}

#[test]
fn no_server_anywhere_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.toml");
    std::fs::write(&config, "[timeouts]\nresponse_secs = 1\n").unwrap();

    let output = lsp_conform().arg("--config").arg(&config).output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("no server given"));
}

#[cfg(unix)]
#[test]
fn server_that_exits_immediately_aborts() {
    let root = tempfile::tempdir().unwrap();
    let output = lsp_conform()
        .args(["--timeout", "5", "--root"])
        .arg(root.path())
        .args(["sh", "--", "-c", "exit 0"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(2));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("[TEST] initialize"), "stdout: {stdout}");
    assert!(stdout.contains("[FAIL] fatal:"), "stdout: {stdout}");
    assert!(stdout.contains("[DONE] aborted"), "stdout: {stdout}");
}

/// A minimal language server in POSIX sh: answers each call the scenario
/// makes and exits on `exit`.
#[cfg(unix)]
const SCRIPTED_SERVER: &str = r#"
send() { printf 'Content-Length: %s\r\n\r\n%s' "${#1}" "$1"; }
reply() { send "{\"jsonrpc\":\"2.0\",\"id\":$1,\"result\":$2}"; }

while :; do
    len=
    while IFS= read -r line; do
        line=$(printf '%s' "$line" | tr -d '\r')
        [ -z "$line" ] && break
        case $line in
            Content-Length:*) len=${line#Content-Length: } ;;
        esac
    done
    [ -n "$len" ] || exit 1
    body=$(dd bs=1 count="$len" 2>/dev/null)
    id=$(printf '%s' "$body" | sed -n 's/.*"id":\([0-9]*\).*/\1/p')

    case $body in
        *'"method":"initialize"'*) reply "$id" '{"capabilities":{}}' ;;
        *'"method":"textDocument/didOpen"'*)
            uri=$(printf '%s' "$body" | sed -n 's/.*"uri":"\([^"]*\)".*/\1/p')
            send "{\"jsonrpc\":\"2.0\",\"method\":\"textDocument/publishDiagnostics\",\"params\":{\"uri\":\"$uri\",\"diagnostics\":[{\"message\":\"expected identifier\"}]}}"
            ;;
        *'"method":"textDocument/completion"'*) reply "$id" '[{"label":"answer"}]' ;;
        *'"method":"textDocument/hover"'*) reply "$id" null ;;
        *'"method":"shutdown"'*) reply "$id" null ;;
        *'"method":"exit"'*) exit 0 ;;
    esac
done
"#;

#[cfg(unix)]
#[test]
fn conforming_server_completes_every_step() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("server.sh");
    std::fs::write(&script, SCRIPTED_SERVER).unwrap();
    let config = dir.path().join("config.toml");
    std::fs::write(&config, "[timeouts]\ngrace_millis = 5000\n").unwrap();

    let output = lsp_conform()
        .arg("--config")
        .arg(&config)
        .args(["--timeout", "10", "--root"])
        .arg(dir.path())
        .args(["sh", "--"])
        .arg(&script)
        .output()
        .unwrap();

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(output.status.code(), Some(0), "stdout: {stdout}");
    assert!(stdout.contains("[TEST] server termination"), "stdout: {stdout}");
    assert!(stdout.contains("[PASS] Server exited"), "stdout: {stdout}");
    assert!(!stdout.contains("[FAIL]"), "stdout: {stdout}");
    assert!(
        stdout.contains("[DONE] all steps passed (9 passed, 0 failed)"),
        "stdout: {stdout}"
    );
}
