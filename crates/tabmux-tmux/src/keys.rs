//! Keystroke injection via `send-keys`.

use crate::error::TmuxError;
use crate::executor::TmuxCommandRunner;

/// Named keys understood by `tmux send-keys`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Enter,
    /// Ctrl-C, delivers SIGINT to the foreground process group.
    Interrupt,
    /// Ctrl-\, delivers SIGQUIT to the foreground process group.
    Quit,
}

impl Key {
    pub fn as_tmux(self) -> &'static str {
        match self {
            Self::Enter => "Enter",
            Self::Interrupt => "C-c",
            Self::Quit => "C-\\",
        }
    }
}

/// Type `text` into the target as literal keystrokes (no key-name lookup).
pub fn send_literal(
    runner: &impl TmuxCommandRunner,
    target: &str,
    text: &str,
) -> Result<(), TmuxError> {
    runner.run(&["send-keys", "-t", target, "-l", "--", text])?;
    Ok(())
}

/// Press a single named key in the target.
pub fn send_key(runner: &impl TmuxCommandRunner, target: &str, key: Key) -> Result<(), TmuxError> {
    runner.run(&["send-keys", "-t", target, key.as_tmux()])?;
    Ok(())
}

/// Type `line` literally and submit it with Enter.
pub fn submit_line(
    runner: &impl TmuxCommandRunner,
    target: &str,
    line: &str,
) -> Result<(), TmuxError> {
    send_literal(runner, target, line)?;
    send_key(runner, target, Key::Enter)
}
