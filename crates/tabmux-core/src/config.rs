//! Core configuration.

use std::time::Duration;

/// Knobs for the session core. The runtime fills this from CLI flags and
/// environment variables; tests build it directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreConfig {
    /// Name of the managed tmux session that owns every tab.
    pub session_name: String,
    /// Delay between buffer snapshots while waiting for a command to finish.
    pub poll_interval: Duration,
    /// Budget used by `execute_command` when the caller gives none.
    pub default_timeout: Duration,
    /// Scrollback lines kept per window.
    pub history_limit: u32,
    /// Follow the signal keystroke in `stop_process` with `exit`.
    pub exit_shell_on_stop: bool,
    /// User/host substrings that identify prompt lines. Empty selects the
    /// generic `$`/`#` prompt heuristics.
    pub prompt_hints: Vec<String>,
    /// Shell that new tabs start, as tmux's `default-shell`. `None` keeps
    /// tmux's own choice (usually `$SHELL`).
    pub shell: Option<String>,
}

pub const DEFAULT_SESSION_NAME: &str = "tabmux";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(10_000);
pub const DEFAULT_HISTORY_LIMIT: u32 = 50_000;

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            session_name: DEFAULT_SESSION_NAME.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            default_timeout: DEFAULT_TIMEOUT,
            history_limit: DEFAULT_HISTORY_LIMIT,
            exit_shell_on_stop: false,
            prompt_hints: Vec::new(),
            shell: None,
        }
    }
}
