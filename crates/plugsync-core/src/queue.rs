use crate::error::Result;
use crate::io::atomic_write;
use crate::paths::Paths;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use regex::Regex;
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Multi-command parsing
// ---------------------------------------------------------------------------

/// A parsed slash command with its trailing prompt body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub name: String,
    pub body: String,
}

impl Command {
    /// The full prompt line: `/cmd body` (or just `/cmd`).
    pub fn prompt(&self) -> String {
        if self.body.is_empty() {
            self.name.clone()
        } else {
            format!("{} {}", self.name, self.body)
        }
    }
}

static CMD_RE: OnceLock<Regex> = OnceLock::new();

// A command line starts with /letters-or-colons followed by a space or EOL:
// /do:plan, /help, /do:status
fn cmd_re() -> &'static Regex {
    CMD_RE.get_or_init(|| Regex::new(r"^(/[A-Za-z:]+)(\s|$)").unwrap())
}

/// Split a prompt into logical commands. A line matching the command pattern
/// starts a new command; following lines belong to its body until the next
/// match. Text before the first command is ignored.
pub fn parse_commands(prompt: &str) -> Vec<Command> {
    let mut commands = Vec::new();
    let mut current: Option<(String, Vec<String>)> = None;

    for line in prompt.split('\n') {
        if let Some(caps) = cmd_re().captures(line) {
            if let Some((name, lines)) = current.take() {
                commands.push(finish(name, lines));
            }
            let name = caps[1].to_string();
            let mut rest = &line[name.len()..];
            if let Some(r) = rest.strip_prefix(' ') {
                rest = r;
            }
            let lines = if rest.is_empty() {
                Vec::new()
            } else {
                vec![rest.to_string()]
            };
            current = Some((name, lines));
        } else if let Some((_, lines)) = current.as_mut() {
            lines.push(line.to_string());
        }
    }

    if let Some((name, lines)) = current {
        commands.push(finish(name, lines));
    }
    commands
}

fn finish(name: String, lines: Vec<String>) -> Command {
    Command {
        name,
        body: lines.join("\n").trim().to_string(),
    }
}

// ---------------------------------------------------------------------------
// Queue file
// ---------------------------------------------------------------------------

/// Encode a command as a single base64 queue line.
pub fn encode_entry(cmd: &Command) -> String {
    BASE64.encode(cmd.prompt().as_bytes())
}

/// Decode a queue line back into the prompt string.
pub fn decode_entry(line: &str) -> Result<String> {
    let bytes = BASE64.decode(line.trim().as_bytes())?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Write commands to the session queue file, one base64 entry per line.
pub fn enqueue(paths: &Paths, session_id: &str, commands: &[Command]) -> Result<()> {
    let mut data = String::new();
    for cmd in commands {
        data.push_str(&encode_entry(cmd));
        data.push('\n');
    }
    atomic_write(&paths.queue(session_id), data.as_bytes())
}

/// Pop the head of the session queue, FIFO.
///
/// The remainder is committed with an atomic rename so a crash mid-pop never
/// leaves a torn queue file; the file is removed once drained. A missing or
/// empty queue returns `None` — that just means nothing is queued.
pub fn pop(paths: &Paths, session_id: &str) -> Result<Option<String>> {
    let queue_path = paths.queue(session_id);
    let data = match std::fs::read_to_string(&queue_path) {
        Ok(d) => d,
        Err(_) => return Ok(None),
    };

    let mut lines: Vec<&str> = data.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    if lines.is_empty() {
        std::fs::remove_file(&queue_path)?;
        return Ok(None);
    }

    let head = lines.remove(0);
    if lines.is_empty() {
        std::fs::remove_file(&queue_path)?;
    } else {
        let mut rest = lines.join("\n");
        rest.push('\n');
        atomic_write(&queue_path, rest.as_bytes())?;
    }

    match decode_entry(head) {
        Ok(prompt) => Ok(Some(prompt)),
        Err(e) => {
            // Entry already popped; drop it rather than wedge the queue.
            tracing::warn!("dropping undecodable queue entry: {e}");
            Ok(None)
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn paths() -> (TempDir, Paths) {
        let dir = TempDir::new().unwrap();
        let p = Paths::with_home(dir.path().join("proj"), dir.path().join("home"));
        (dir, p)
    }

    fn cmd(name: &str, body: &str) -> Command {
        Command {
            name: name.to_string(),
            body: body.to_string(),
        }
    }

    #[test]
    fn parses_two_commands() {
        let cmds = parse_commands("/do:plan make a plan\n/do:it go");
        assert_eq!(
            cmds,
            vec![cmd("/do:plan", "make a plan"), cmd("/do:it", "go")]
        );
    }

    #[test]
    fn body_spans_multiple_lines() {
        let cmds = parse_commands("/do:plan first line\nsecond line\n\n/help");
        assert_eq!(cmds.len(), 2);
        assert_eq!(cmds[0].body, "first line\nsecond line");
        assert_eq!(cmds[1], cmd("/help", ""));
    }

    #[test]
    fn bare_command_without_args() {
        let cmds = parse_commands("/do:status");
        assert_eq!(cmds, vec![cmd("/do:status", "")]);
    }

    #[test]
    fn plain_text_yields_no_commands() {
        assert!(parse_commands("just some prose\nwith lines").is_empty());
    }

    #[test]
    fn text_before_first_command_is_ignored() {
        let cmds = parse_commands("preamble\n/do:it go");
        assert_eq!(cmds, vec![cmd("/do:it", "go")]);
    }

    #[test]
    fn mid_line_slash_is_not_a_command() {
        let cmds = parse_commands("see /do:plan for details");
        assert!(cmds.is_empty());
    }

    #[test]
    fn entry_round_trip() {
        let c = cmd("/do:plan", "make a plan");
        let encoded = encode_entry(&c);
        assert_eq!(decode_entry(&encoded).unwrap(), "/do:plan make a plan");
    }

    #[test]
    fn fifo_pop_order_and_cleanup() {
        let (_dir, p) = paths();
        enqueue(
            &p,
            "sess1",
            &[cmd("/a", "1"), cmd("/b", "2"), cmd("/c", "")],
        )
        .unwrap();

        assert_eq!(pop(&p, "sess1").unwrap().as_deref(), Some("/a 1"));
        assert_eq!(pop(&p, "sess1").unwrap().as_deref(), Some("/b 2"));
        assert_eq!(pop(&p, "sess1").unwrap().as_deref(), Some("/c"));
        assert!(!p.queue("sess1").exists(), "file deleted after last pop");
        assert_eq!(pop(&p, "sess1").unwrap(), None);
    }

    #[test]
    fn pop_missing_queue_is_none() {
        let (_dir, p) = paths();
        assert_eq!(pop(&p, "nope").unwrap(), None);
    }

    #[test]
    fn pop_blank_only_queue_removes_file() {
        let (_dir, p) = paths();
        let qp = p.queue("sess");
        std::fs::create_dir_all(qp.parent().unwrap()).unwrap();
        std::fs::write(&qp, "\n\n  \n").unwrap();
        assert_eq!(pop(&p, "sess").unwrap(), None);
        assert!(!qp.exists());
    }

    #[test]
    fn pop_skips_garbage_entry() {
        let (_dir, p) = paths();
        let qp = p.queue("sess");
        std::fs::create_dir_all(qp.parent().unwrap()).unwrap();
        std::fs::write(&qp, "!!!not-base64!!!\n").unwrap();
        assert_eq!(pop(&p, "sess").unwrap(), None);
        assert!(!qp.exists(), "bad entry consumed");
    }

    #[test]
    fn queues_are_per_session() {
        let (_dir, p) = paths();
        enqueue(&p, "a", &[cmd("/x", "")]).unwrap();
        enqueue(&p, "b", &[cmd("/y", "")]).unwrap();
        assert_eq!(pop(&p, "a").unwrap().as_deref(), Some("/x"));
        assert_eq!(pop(&p, "b").unwrap().as_deref(), Some("/y"));
    }
}
