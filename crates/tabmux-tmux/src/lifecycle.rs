//! Server, session and window lifecycle commands.

use crate::error::TmuxError;
use crate::executor::TmuxCommandRunner;
use crate::window_info::{escape_format, exact_session, is_window_id};

/// Options for `new-window`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewWindow<'a> {
    /// Literal window name; `#` is escaped before it reaches tmux.
    pub name: &'a str,
    pub cwd: Option<&'a str>,
    /// `NAME=value` pairs placed in the window's environment (`-e`).
    pub env: &'a [String],
    /// Shell command to run instead of the default shell.
    pub shell_command: Option<&'a str>,
}

/// Create the detached managed session with a first window named `first_window`.
///
/// Returns `Ok(false)` when the session already existed: losing the creation
/// race to a concurrent caller is not an error.
pub fn new_session(
    runner: &impl TmuxCommandRunner,
    session: &str,
    first_window: &str,
) -> Result<bool, TmuxError> {
    let name = escape_format(first_window);
    match runner.run(&["new-session", "-d", "-s", session, "-n", &name]) {
        Ok(_) => Ok(true),
        Err(e) if e.is_duplicate_session() => Ok(false),
        Err(e) => Err(e),
    }
}

/// Create a window in `session` and return its id.
///
/// The id comes from the creating call itself (`-P -F #{window_id}`), never
/// from a follow-up listing.
pub fn new_window(
    runner: &impl TmuxCommandRunner,
    session: &str,
    opts: &NewWindow<'_>,
) -> Result<String, TmuxError> {
    let target = format!("{}:", exact_session(session));
    let name = escape_format(opts.name);
    let mut args = vec![
        "new-window",
        "-P",
        "-F",
        "#{window_id}",
        "-t",
        target.as_str(),
        "-n",
        name.as_str(),
    ];
    if let Some(cwd) = opts.cwd {
        args.extend(["-c", cwd]);
    }
    for var in opts.env {
        args.extend(["-e", var.as_str()]);
    }
    if let Some(cmd) = opts.shell_command {
        args.push(cmd);
    }

    let output = runner.run(&args)?;
    let id = output.trim();
    if !is_window_id(id) {
        return Err(TmuxError::ParseError {
            line_num: 1,
            detail: format!("new-window printed {id:?}, expected a window id"),
        });
    }
    Ok(id.to_string())
}

pub fn kill_window(runner: &impl TmuxCommandRunner, window_id: &str) -> Result<(), TmuxError> {
    runner.run(&["kill-window", "-t", window_id])?;
    Ok(())
}

/// Set a global option on the server (applies to windows created afterwards).
pub fn set_global_option(
    runner: &impl TmuxCommandRunner,
    option: &str,
    value: &str,
) -> Result<(), TmuxError> {
    runner.run(&["set-option", "-g", option, value])?;
    Ok(())
}

/// Tear the server down. A server that is already gone is fine.
pub fn kill_server(runner: &impl TmuxCommandRunner) -> Result<(), TmuxError> {
    match runner.run(&["kill-server"]) {
        Ok(_) => Ok(()),
        Err(e) if e.is_no_server() => Ok(()),
        Err(e) => Err(e),
    }
}
