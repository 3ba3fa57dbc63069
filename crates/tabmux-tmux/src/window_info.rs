//! TmuxWindowInfo, list-windows format string, and parser.

use crate::error::TmuxError;
use crate::executor::TmuxCommandRunner;

/// Tab-delimited format string for `tmux list-windows -F`.
///
/// The window name is the last field and the parser splits at most twice, so
/// names containing tabs (or anything else) survive intact.
pub const LIST_WINDOWS_FORMAT: &str = "#{window_id}\t#{window_active}\t#{window_name}";

/// Metadata for one tmux window.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TmuxWindowInfo {
    pub window_id: String,
    pub window_name: String,
    pub active: bool,
}

/// Execute `tmux list-windows -t =<session>` and parse the output.
pub fn list_windows(
    runner: &impl TmuxCommandRunner,
    session: &str,
) -> Result<Vec<TmuxWindowInfo>, TmuxError> {
    let target = exact_session(session);
    let output = runner.run(&["list-windows", "-t", &target, "-F", LIST_WINDOWS_FORMAT])?;
    parse_list_windows_output(&output)
}

/// Parse the raw output of `tmux list-windows -F <LIST_WINDOWS_FORMAT>`.
pub fn parse_list_windows_output(output: &str) -> Result<Vec<TmuxWindowInfo>, TmuxError> {
    let mut windows = Vec::new();
    for (idx, line) in output.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        windows.push(parse_line(line, idx + 1)?);
    }
    Ok(windows)
}

fn parse_line(line: &str, line_num: usize) -> Result<TmuxWindowInfo, TmuxError> {
    let mut parts = line.splitn(3, '\t');
    let (Some(window_id), Some(active), Some(name)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(TmuxError::ParseError {
            line_num,
            detail: "expected 3 tab-separated fields".to_string(),
        });
    };

    let window_id = window_id.trim();
    if !is_window_id(window_id) {
        return Err(TmuxError::ParseError {
            line_num,
            detail: format!("invalid window id {window_id:?}"),
        });
    }

    Ok(TmuxWindowInfo {
        window_id: window_id.to_string(),
        window_name: name.trim_end_matches(['\r', '\n']).to_string(),
        active: matches!(active.trim(), "1" | "true"),
    })
}

/// Validate that an id matches the tmux window-id format `@<digits>`.
pub fn is_window_id(id: &str) -> bool {
    id.len() >= 2 && id.starts_with('@') && id[1..].bytes().all(|b| b.is_ascii_digit())
}

/// Escape `#` so tmux format expansion leaves a literal name untouched.
pub fn escape_format(text: &str) -> String {
    text.replace('#', "##")
}

/// Target string that matches the session name exactly (no prefix matching).
pub fn exact_session(session: &str) -> String {
    format!("={session}")
}
