//! Start/end sentinels that frame one command's output in a shared buffer.

use std::time::Instant;

use uuid::Uuid;

/// Every sentinel starts with this prefix, so cleanup can drop marker lines
/// left behind by earlier calls.
pub const SENTINEL_PREFIX: &str = "__TABMUX_";

/// Separates the end sentinel from the exit status: `<end>_EXIT_CODE:<digits>`.
pub const EXIT_CODE_TAG: &str = "_EXIT_CODE:";

/// Variable used to carry `$?` across the start marker.
const STATUS_VAR: &str = "__tabmux_rc";

/// Byte offset at which an echoed marker line starts inside `line`.
///
/// Typed-ahead marker lines can land behind command output or a prompt on the
/// same screen line, and readline redraws may garble their tail. The status
/// variable near the front survives, so the cut is made there.
pub fn marker_echo_start(line: &str) -> Option<usize> {
    let at = line.find(STATUS_VAR)?;
    let opener = line[..at].rfind("( ").filter(|&i| i + 2 == at);
    Some(opener.unwrap_or(at))
}

/// Wrap `body` so it runs with `$?` saved in `STATUS_VAR` and restored after.
fn preserving_status(body: &str) -> String {
    format!("( {STATUS_VAR}=$?; {body}; exit ${STATUS_VAR} )")
}

/// One in-flight bounded execution. Lives only for the duration of the call.
#[derive(Debug, Clone)]
pub struct PendingExecution {
    pub start_sentinel: String,
    pub end_sentinel: String,
    pub deadline: Instant,
    pub command_text: String,
}

/// Location of a completed command in a captured buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    /// Index of the first output line (just past the start marker).
    pub body_start: usize,
    /// Index of the end marker line.
    pub end_line: usize,
    pub exit_code: i32,
}

impl PendingExecution {
    /// Fresh sentinels for one call. Never reused.
    pub fn new(command_text: impl Into<String>, deadline: Instant) -> Self {
        let start_sentinel = format!("{SENTINEL_PREFIX}BEGIN_{}", Uuid::new_v4().simple());
        let end_sentinel = format!("{SENTINEL_PREFIX}END_{}", Uuid::new_v4().simple());
        Self {
            start_sentinel,
            end_sentinel,
            deadline,
            command_text: command_text.into(),
        }
    }

    /// The three lines typed into the shell, in order.
    ///
    /// Both markers are echoed from a subshell that exits with the `$?` it
    /// inherited, so neither marker disturbs the status seen by the command
    /// or by the next call on the same session.
    pub fn injected_lines(&self) -> [String; 3] {
        [
            preserving_status(&format!("echo {}", self.start_sentinel)),
            self.command_text.clone(),
            preserving_status(&format!(
                "echo {}{EXIT_CODE_TAG}${STATUS_VAR}",
                self.end_sentinel
            )),
        ]
    }

    /// Parse the exit code out of a line, if it is this call's end marker.
    ///
    /// The terminal echo of the injected line (`..._EXIT_CODE:$__tabmux_rc`)
    /// never matches, only the shell's expanded output does.
    pub fn exit_code_in(&self, line: &str) -> Option<i32> {
        let marker = format!("{}{EXIT_CODE_TAG}", self.end_sentinel);
        let at = line.find(&marker)?;
        let rest = &line[at + marker.len()..];
        let digits_len = rest.bytes().take_while(u8::is_ascii_digit).count();
        if digits_len == 0 {
            return None;
        }
        // Exit statuses are 0..=255; anything that overflows is reported as -1.
        Some(rest[..digits_len].parse().unwrap_or(-1))
    }

    /// Index of the first line that is exactly the start sentinel.
    pub fn start_line(&self, lines: &[String]) -> Option<usize> {
        lines.iter().position(|l| l.trim() == self.start_sentinel)
    }

    /// The shell's prompt once the start marker has run: the cursor line,
    /// provided it comes after the start sentinel's output.
    pub fn prompt_after_start(&self, lines: &[String]) -> Option<String> {
        let start = self.start_line(lines)?;
        let (offset, line) = lines
            .iter()
            .enumerate()
            .rev()
            .find(|(_, l)| !l.trim().is_empty())?;
        (offset > start).then(|| line.trim_end().to_string())
    }

    /// Find the completed frame, if the end marker has been printed.
    ///
    /// If the start marker scrolled out of history the body begins at the top
    /// of the buffer.
    pub fn locate(&self, lines: &[String]) -> Option<Frame> {
        let body_start = self.start_line(lines).map_or(0, |i| i + 1);
        lines[body_start..]
            .iter()
            .enumerate()
            .find_map(|(offset, line)| {
                self.exit_code_in(line).map(|code| Frame {
                    body_start,
                    end_line: body_start + offset,
                    exit_code: code,
                })
            })
    }

    /// Whether a line mentions either of this call's sentinels.
    pub fn is_marker_line(&self, line: &str) -> bool {
        line.contains(&self.start_sentinel) || line.contains(&self.end_sentinel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending(cmd: &str) -> PendingExecution {
        PendingExecution::new(cmd, Instant::now())
    }

    fn owned(lines: &[&str]) -> Vec<String> {
        lines.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn sentinels_are_fresh_per_call() {
        let a = pending("true");
        let b = pending("true");
        assert_ne!(a.start_sentinel, b.start_sentinel);
        assert_ne!(a.end_sentinel, b.end_sentinel);
        assert_ne!(a.start_sentinel, a.end_sentinel);
        assert!(a.start_sentinel.len() > 32, "long random token");
    }

    #[test]
    fn injected_lines_order() {
        let p = pending("ls -la");
        let lines = p.injected_lines();
        assert!(lines[0].contains(&p.start_sentinel));
        assert!(lines[0].starts_with("( "));
        assert_eq!(lines[1], "ls -la");
        assert_eq!(
            lines[2],
            format!(
                "( __tabmux_rc=$?; echo {}_EXIT_CODE:$__tabmux_rc; exit $__tabmux_rc )",
                p.end_sentinel
            )
        );
    }

    #[test]
    fn echoed_end_line_is_not_completion() {
        let p = pending("x");
        let typed = &p.injected_lines()[2];
        assert_eq!(p.exit_code_in(&format!("$ {typed}")), None);
        assert_eq!(p.exit_code_in(&format!("{}_EXIT_CODE:2", p.end_sentinel)), Some(2));
    }

    #[test]
    fn other_calls_markers_do_not_match() {
        let p = pending("x");
        let stale = pending("x");
        assert_eq!(p.exit_code_in(&format!("{}_EXIT_CODE:0", stale.end_sentinel)), None);
    }

    #[test]
    fn locate_frame() {
        let p = pending("echo hi");
        let lines = owned(&[
            "old output",
            &format!("$ ( __tabmux_rc=$?; echo {}; exit $__tabmux_rc )", p.start_sentinel),
            &p.start_sentinel,
            "$ echo hi",
            "hi",
            &format!("$ {}", p.injected_lines()[2]),
            &format!("{}_EXIT_CODE:0", p.end_sentinel),
            "$",
        ]);
        let frame = p.locate(&lines).expect("complete");
        assert_eq!(frame.body_start, 3);
        assert_eq!(frame.end_line, 6);
        assert_eq!(frame.exit_code, 0);
    }

    #[test]
    fn locate_without_end_is_incomplete() {
        let p = pending("sleep 5");
        let lines = owned(&[&p.start_sentinel, "$ sleep 5"]);
        assert_eq!(p.locate(&lines), None);
        assert_eq!(p.start_line(&lines), Some(0));
    }

    #[test]
    fn locate_when_start_scrolled_away() {
        let p = pending("seq 3");
        let lines = owned(&["2", "3", &format!("{}_EXIT_CODE:0", p.end_sentinel)]);
        let frame = p.locate(&lines).expect("complete");
        assert_eq!(frame.body_start, 0);
        assert_eq!(frame.end_line, 2);
    }

    #[test]
    fn marker_lines() {
        let p = pending("x");
        assert!(p.is_marker_line(&format!("$ echo {}", p.start_sentinel)));
        assert!(!p.is_marker_line("plain"));
    }

    #[test]
    fn marker_echo_cut_points() {
        let p = pending("x");
        let end = p.injected_lines()[2].clone();
        assert_eq!(marker_echo_start(&end), Some(0));
        assert_eq!(marker_echo_start(&format!("no newline{end}")), Some(10));
        assert_eq!(marker_echo_start("out$ ( __tabmux_rc=$?; echo __TAf3"), Some(5));
        assert_eq!(marker_echo_start("plain output"), None);
    }

    #[test]
    fn prompt_is_the_cursor_line_after_start() {
        let p = pending("ls");
        let lines = owned(&["old", &p.start_sentinel, "bash-5.2$ ", "", ""]);
        assert_eq!(p.prompt_after_start(&lines).as_deref(), Some("bash-5.2$"));

        let not_yet = owned(&["bash-5.2$ ( __tabmux_rc=$?; ... )", ""]);
        assert_eq!(p.prompt_after_start(&not_yet), None);

        let marker_last = owned(&["bash-5.2$ x", &p.start_sentinel, ""]);
        assert_eq!(p.prompt_after_start(&marker_last), None);
    }
}
