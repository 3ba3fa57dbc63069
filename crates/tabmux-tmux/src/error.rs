//! Error types for the tmux backend.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TmuxError {
    #[error("tmux binary not found")]
    NotFound,

    #[error("tmux command failed (exit {}): {stderr}", code.map_or_else(|| "signal".to_string(), |c| c.to_string()))]
    CommandFailed { code: Option<i32>, stderr: String },

    #[error("failed to parse tmux output line {line_num}: {detail}")]
    ParseError { line_num: usize, detail: String },

    #[error("tmux io error: {0}")]
    Io(#[from] std::io::Error),
}

impl TmuxError {
    /// Shorthand for a non-zero exit with the given stderr text.
    pub fn failed(stderr: impl Into<String>) -> Self {
        Self::CommandFailed {
            code: Some(1),
            stderr: stderr.into(),
        }
    }

    /// stderr of a failed command, empty for every other variant.
    pub fn stderr(&self) -> &str {
        match self {
            Self::CommandFailed { stderr, .. } => stderr,
            _ => "",
        }
    }

    /// The tmux server behind the socket is not running or refused the connection.
    pub fn is_no_server(&self) -> bool {
        let stderr = self.stderr();
        stderr.contains("no server running")
            || stderr.contains("error connecting to")
            || stderr.contains("server exited")
    }

    /// The target window or pane does not exist.
    pub fn is_missing_target(&self) -> bool {
        let stderr = self.stderr();
        stderr.contains("can't find window")
            || stderr.contains("can't find pane")
            || stderr.contains("no such window")
    }

    /// The managed session does not exist (server may still be running).
    pub fn is_missing_session(&self) -> bool {
        let stderr = self.stderr();
        stderr.contains("can't find session") || stderr.contains("session not found")
    }

    /// `new-session` lost the race against another creator.
    pub fn is_duplicate_session(&self) -> bool {
        self.stderr().contains("duplicate session")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_no_server() {
        let err = TmuxError::failed("no server running on /tmp/tabmux-1.sock");
        assert!(err.is_no_server());
        assert!(!err.is_missing_target());
    }

    #[test]
    fn classifies_missing_window() {
        let err = TmuxError::failed("can't find window: @7");
        assert!(err.is_missing_target());
        assert!(!err.is_no_server());
    }

    #[test]
    fn classifies_duplicate_session() {
        assert!(TmuxError::failed("duplicate session: tabmux").is_duplicate_session());
    }

    #[test]
    fn display_includes_exit_code() {
        let err = TmuxError::CommandFailed {
            code: Some(1),
            stderr: "boom".to_string(),
        };
        assert_eq!(err.to_string(), "tmux command failed (exit 1): boom");
        let err = TmuxError::CommandFailed {
            code: None,
            stderr: "killed".to_string(),
        };
        assert_eq!(err.to_string(), "tmux command failed (exit signal): killed");
    }

    #[test]
    fn non_command_errors_have_empty_stderr() {
        assert_eq!(TmuxError::NotFound.stderr(), "");
        assert!(!TmuxError::NotFound.is_no_server());
    }
}
