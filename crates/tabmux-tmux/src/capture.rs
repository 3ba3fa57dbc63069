//! Pane capture.

use crate::error::TmuxError;
use crate::executor::TmuxCommandRunner;

/// How much of a window's buffer to capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureRange {
    /// Visible screen plus the entire scrollback.
    All,
    /// The most recent `n` lines of scrollback plus the visible screen.
    History(u32),
}

/// Capture the text content of a window's active pane.
///
/// Wrapped lines are joined (`-J`) so a long line reads back as one line.
/// Escape sequences are only included when `with_escapes` is set.
pub fn capture_window(
    runner: &impl TmuxCommandRunner,
    target: &str,
    range: CaptureRange,
    with_escapes: bool,
) -> Result<Vec<String>, TmuxError> {
    let start = match range {
        CaptureRange::All => "-".to_string(),
        CaptureRange::History(n) => format!("-{n}"),
    };
    let mut args = vec!["capture-pane", "-p", "-J", "-t", target, "-S", start.as_str(), "-E", "-"];
    if with_escapes {
        args.push("-e");
    }
    let output = runner.run(&args)?;
    Ok(output.lines().map(String::from).collect())
}
