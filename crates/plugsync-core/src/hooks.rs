//! Hook entry points for the host agent. Every function here is fail-open:
//! a broken queue, a missing binary, or bad stdin must never block the host,
//! so errors degrade to a pass-through result with a `tracing::warn`.

use crate::paths::Paths;
use crate::queue::{self, Command};
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

// ---------------------------------------------------------------------------
// Prompt-submit hook
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct PromptSubmitInput {
    #[serde(default = "unknown_session")]
    pub session_id: String,
    #[serde(default)]
    pub prompt: String,
}

#[derive(Debug, Deserialize)]
pub struct StopInput {
    #[serde(default = "unknown_session")]
    pub session_id: String,
    #[serde(default)]
    pub stop_reason: String,
}

fn unknown_session() -> String {
    "unknown".to_string()
}

fn pass_through() -> Value {
    json!({"result": "continue"})
}

fn prompt_output(cmd: &Command) -> Value {
    json!({
        "hookSpecificOutput": {
            "hookEventName": "UserPromptSubmit",
            "additionalContext": cmd.prompt(),
        }
    })
}

/// Split a multi-command prompt: the first command is returned for immediate
/// execution, the rest are queued for the stop hook to replay.
pub fn prompt_submit(paths: &Paths, raw_input: &str) -> Value {
    let input: PromptSubmitInput = match serde_json::from_str(raw_input) {
        Ok(i) => i,
        Err(e) => {
            tracing::warn!("prompt-submit: invalid input: {e}");
            return pass_through();
        }
    };
    if input.prompt.is_empty() {
        return pass_through();
    }

    let mut commands = queue::parse_commands(&input.prompt);
    if commands.is_empty() {
        return pass_through();
    }

    let first = commands.remove(0);
    if !commands.is_empty() {
        if let Err(e) = queue::enqueue(paths, &input.session_id, &commands) {
            tracing::warn!("prompt-submit: failed to queue commands: {e}");
        }
    }
    prompt_output(&first)
}

/// Replay the next queued command, or allow the stop when nothing is queued.
/// `None` means no output: the host proceeds with the stop.
pub fn stop(paths: &Paths, raw_input: &str) -> Option<Value> {
    let input: StopInput = match serde_json::from_str(raw_input) {
        Ok(i) => i,
        Err(e) => {
            tracing::warn!("stop: invalid input: {e}");
            return None;
        }
    };
    tracing::debug!("stop hook triggered, reason: {}", input.stop_reason);

    match queue::pop(paths, &input.session_id) {
        Ok(Some(prompt)) => Some(json!({
            "decision": "block",
            "reason": prompt,
            "continue": true,
        })),
        Ok(None) => None,
        Err(e) => {
            tracing::warn!("stop: queue pop failed: {e}");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Session-start hook (bd integration)
// ---------------------------------------------------------------------------

const BD_TIMEOUT: Duration = Duration::from_secs(5);

const STALE_FILES: &[&str] = &["daemon.lock", "beads.db-shm", "beads.db-wal"];

/// Initialize the `bd` issue tracker for this session and assemble workflow
/// context. Returns `None` when bd is not installed or the project has no
/// `.beads/` database.
pub fn session_start(paths: &Paths) -> Option<Value> {
    if which::which("bd").is_err() {
        return None;
    }

    auto_init(&paths.root);
    if !paths.root.join(".beads").is_dir() {
        return None;
    }

    cleanup_stale_daemon(&paths.root);
    ensure_db_synced(&paths.root);

    let lines = build_context(&paths.root);
    Some(json!({
        "hookSpecificOutput": {
            "hookEventName": "SessionStart",
            "additionalContext": lines.join("\n"),
        }
    }))
}

fn auto_init(root: &Path) {
    if !root.join(".beads").is_dir() && root.join(".git").is_dir() {
        run_bd_write(root, &["init", "--quiet"]);
        run_bd_write(root, &["hooks", "install"]);
    }
}

fn cleanup_stale_daemon(root: &Path) {
    let lock_path = root.join(".beads/daemon.lock");
    let Some(pid) = daemon_pid(&lock_path) else {
        return;
    };
    if process_alive(pid) {
        return;
    }
    for name in STALE_FILES {
        let _ = std::fs::remove_file(root.join(".beads").join(name));
    }
}

fn daemon_pid(lock_path: &Path) -> Option<u32> {
    let data = std::fs::read_to_string(lock_path).ok()?;
    let value: Value = serde_json::from_str(&data).ok()?;
    value.get("pid")?.as_u64().map(|p| p as u32)
}

#[cfg(target_os = "linux")]
fn process_alive(pid: u32) -> bool {
    Path::new(&format!("/proc/{pid}")).exists()
}

// Without /proc there is no cheap liveness probe; assume alive so we never
// delete a running daemon's lock.
#[cfg(not(target_os = "linux"))]
fn process_alive(_pid: u32) -> bool {
    true
}

fn ensure_db_synced(root: &Path) {
    let Some(output) = run_with_timeout(root, &["bd", "--sandbox", "stats", "--json"]) else {
        return;
    };
    let combined = format!(
        "{}{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    if needs_sync(&combined) {
        run_bd_write(root, &["sync", "--import-only"]);
    }
}

pub fn needs_sync(stats_output: &str) -> bool {
    stats_output.contains("out of sync") || stats_output.contains("import-only")
}

/// Read-only bd invocation: sandbox mode, stdout on success, empty otherwise.
fn run_bd(root: &Path, args: &[&str]) -> String {
    let mut full = vec!["bd", "--sandbox"];
    full.extend_from_slice(args);
    match run_with_timeout(root, &full) {
        Some(output) if output.status.success() => {
            String::from_utf8_lossy(&output.stdout).trim().to_string()
        }
        _ => String::new(),
    }
}

/// Write-mode bd invocation. Fire and forget.
fn run_bd_write(root: &Path, args: &[&str]) {
    let mut full = vec!["bd"];
    full.extend_from_slice(args);
    run_with_timeout(root, &full);
}

/// Run a command with a hard deadline. The child is killed on timeout and
/// `None` is returned; spawn failures also yield `None`.
fn run_with_timeout(root: &Path, argv: &[&str]) -> Option<std::process::Output> {
    let mut child = std::process::Command::new(argv[0])
        .args(&argv[1..])
        .current_dir(root)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .ok()?;

    let deadline = Instant::now() + BD_TIMEOUT;
    loop {
        match child.try_wait() {
            Ok(Some(_)) => return child.wait_with_output().ok(),
            Ok(None) => {
                if Instant::now() >= deadline {
                    let _ = child.kill();
                    let _ = child.wait_with_output();
                    return None;
                }
                std::thread::sleep(Duration::from_millis(50));
            }
            Err(_) => return None,
        }
    }
}

// ---------------------------------------------------------------------------
// Context assembly
// ---------------------------------------------------------------------------

fn build_context(root: &Path) -> Vec<String> {
    let mut lines = read_context_file();
    lines.extend(format_ready_section(&run_bd(root, &["ready", "--json"])));
    lines.extend(format_in_progress_items(parse_items(&run_bd(
        root,
        &["list", "--status", "in_progress", "--json"],
    ))));
    lines
}

fn read_context_file() -> Vec<String> {
    let Ok(plugin_root) = std::env::var("CLAUDE_PLUGIN_ROOT") else {
        return Vec::new();
    };
    let path = Path::new(&plugin_root).join("skills/beads/context/session-start.md");
    match std::fs::read_to_string(path) {
        Ok(content) => vec![content],
        Err(_) => Vec::new(),
    }
}

fn parse_items(raw: &str) -> Option<Vec<Value>> {
    if raw.is_empty() {
        return None;
    }
    serde_json::from_str(raw).ok()
}

fn format_ready_section(raw: &str) -> Vec<String> {
    let mut lines = vec!["## Current Ready Work".to_string(), String::new()];
    if raw.is_empty() {
        lines.push("*bd unavailable - check beads status*".to_string());
    } else {
        lines.extend(format_ready_items(parse_items(raw)));
    }
    lines.push(String::new());
    lines
}

fn format_ready_items(items: Option<Vec<Value>>) -> Vec<String> {
    let empty_msg = "*No ready work - all issues are blocked or completed*".to_string();
    let Some(items) = items else {
        return vec![empty_msg];
    };
    let lines: Vec<String> = items
        .iter()
        .filter_map(|item| {
            let obj = item.as_object()?;
            let id = field_str(obj, "id", "?");
            let title = field_str(obj, "title", "untitled");
            let priority = field_str(obj, "priority", "?");
            let kind = field_str(obj, "type", "task");
            Some(format!("- **[{id}]** {title} (P{priority}, {kind})"))
        })
        .collect();
    if lines.is_empty() {
        vec![empty_msg]
    } else {
        lines
    }
}

fn format_in_progress_items(items: Option<Vec<Value>>) -> Vec<String> {
    let Some(items) = items else {
        return Vec::new();
    };
    let mut lines = vec!["## In Progress".to_string(), String::new()];
    let mut any = false;
    for item in &items {
        let Some(obj) = item.as_object() else {
            continue;
        };
        let id = field_str(obj, "id", "?");
        let title = field_str(obj, "title", "untitled");
        lines.push(format!("- **[{id}]** {title}"));
        any = true;
    }
    if !any {
        return Vec::new();
    }
    lines.push(String::new());
    lines
}

fn field_str(obj: &serde_json::Map<String, Value>, key: &str, default: &str) -> String {
    match obj.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => default.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
