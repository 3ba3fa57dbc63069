//! Error taxonomy for session operations.

use tabmux_tmux::TmuxError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("multiplexer unavailable: {0}")]
    MultiplexerUnavailable(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl SessionError {
    /// Stable machine-readable kind.
    pub fn code(&self) -> &'static str {
        match self {
            Self::SessionNotFound(_) => "session_not_found",
            Self::MultiplexerUnavailable(_) => "multiplexer_unavailable",
            Self::InvalidArgument(_) => "invalid_argument",
            Self::Internal(_) => "internal_error",
        }
    }

    /// JSON-RPC error code.
    pub fn rpc_code(&self) -> i64 {
        match self {
            Self::SessionNotFound(_) => -32001,
            Self::MultiplexerUnavailable(_) => -32002,
            Self::InvalidArgument(_) => -32602,
            Self::Internal(_) => -32603,
        }
    }

    /// Classify a tmux failure. `target` is the session id the call addressed,
    /// if any; a missing target only becomes `SessionNotFound` when set.
    pub fn from_tmux(err: TmuxError, target: Option<&str>) -> Self {
        match err {
            TmuxError::NotFound => Self::MultiplexerUnavailable("tmux binary not found".into()),
            TmuxError::Io(e) => Self::MultiplexerUnavailable(format!("failed to run tmux: {e}")),
            ref e if e.is_no_server() => Self::MultiplexerUnavailable(e.stderr().to_string()),
            ref e if e.is_missing_target() => match target {
                Some(id) => Self::SessionNotFound(id.to_string()),
                None => Self::Internal(e.to_string()),
            },
            e => Self::Internal(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawn_failures_are_unavailable() {
        let err = SessionError::from_tmux(TmuxError::NotFound, Some("@1"));
        assert!(matches!(err, SessionError::MultiplexerUnavailable(_)));
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = SessionError::from_tmux(TmuxError::Io(io), None);
        assert_eq!(err.code(), "multiplexer_unavailable");
    }

    #[test]
    fn missing_window_with_target_is_not_found() {
        let err = SessionError::from_tmux(TmuxError::failed("can't find window: @9"), Some("@9"));
        assert!(matches!(err, SessionError::SessionNotFound(ref id) if id == "@9"));
        assert_eq!(err.rpc_code(), -32001);
    }

    #[test]
    fn missing_window_without_target_is_internal() {
        let err = SessionError::from_tmux(TmuxError::failed("can't find window: @9"), None);
        assert!(matches!(err, SessionError::Internal(_)));
    }

    #[test]
    fn no_server_is_unavailable() {
        let err = SessionError::from_tmux(TmuxError::failed("no server running on /tmp/s"), Some("@1"));
        assert_eq!(err.code(), "multiplexer_unavailable");
        assert_eq!(err.rpc_code(), -32002);
    }

    #[test]
    fn other_failures_are_internal() {
        let err = SessionError::from_tmux(TmuxError::failed("unknown option"), Some("@1"));
        assert_eq!(err.code(), "internal_error");
        assert_eq!(err.rpc_code(), -32603);
    }
}
