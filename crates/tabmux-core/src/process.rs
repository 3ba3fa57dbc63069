//! Long-running foreground processes: start without waiting, stop by signal
//! keystroke.

use std::sync::Arc;

use serde::Serialize;
use tabmux_tmux::{Key, TmuxCommandRunner, send_key, send_literal, submit_line};

use crate::directory::SessionDirectory;
use crate::error::SessionError;
use crate::lock::SessionLocks;
use crate::multiplexer::Multiplexer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StartOutcome {
    pub started: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StopOutcome {
    pub success: bool,
}

/// Map a signal name to the keystroke that delivers it through the tty.
///
/// Unrecognised names map to `None` and produce no keystroke.
pub fn signal_key(signal: &str) -> Option<Key> {
    let name = signal.trim().to_ascii_uppercase();
    match name.strip_prefix("SIG").unwrap_or(name.as_str()) {
        "INT" => Some(Key::Interrupt),
        "TERM" | "QUIT" => Some(Key::Quit),
        _ => None,
    }
}

pub struct ProcessController<R> {
    mux: Arc<Multiplexer<R>>,
    directory: Arc<SessionDirectory<R>>,
    locks: Arc<SessionLocks>,
    exit_shell_on_stop: bool,
}

impl<R: TmuxCommandRunner + 'static> ProcessController<R> {
    pub fn new(
        mux: Arc<Multiplexer<R>>,
        directory: Arc<SessionDirectory<R>>,
        locks: Arc<SessionLocks>,
        exit_shell_on_stop: bool,
    ) -> Self {
        Self {
            mux,
            directory,
            locks,
            exit_shell_on_stop,
        }
    }

    /// Type `command` into the session and return immediately.
    ///
    /// The lock covers only the keystroke injection; the process keeps the
    /// pane's foreground after this returns.
    pub async fn start(
        &self,
        session_id: &str,
        command: &str,
        append_newline: bool,
    ) -> Result<StartOutcome, SessionError> {
        let _guard = self.locks.acquire(session_id).await;
        self.directory.require(session_id).await?;

        let target = session_id.to_string();
        let text = command.to_string();
        self.mux
            .call(Some(session_id), move |r| {
                if append_newline {
                    submit_line(r, &target, &text)
                } else {
                    send_literal(r, &target, &text)
                }
            })
            .await?;

        tracing::info!(window_id = %session_id, command = %command, append_newline, "process started");
        Ok(StartOutcome { started: true })
    }

    /// Deliver `signal` to the foreground process as a keystroke.
    ///
    /// With `exit_shell_on_stop` the shell itself is then ended with `exit`,
    /// which closes the session's window.
    pub async fn stop(&self, session_id: &str, signal: &str) -> Result<StopOutcome, SessionError> {
        let _guard = self.locks.acquire(session_id).await;
        self.directory.require(session_id).await?;

        let key = signal_key(signal);
        if key.is_none() {
            tracing::warn!(window_id = %session_id, signal = %signal, "unsupported signal, no keystroke sent");
        }
        let exit_shell = self.exit_shell_on_stop;
        let target = session_id.to_string();
        self.mux
            .call(Some(session_id), move |r| {
                if let Some(key) = key {
                    send_key(r, &target, key)?;
                }
                if exit_shell {
                    submit_line(r, &target, "exit")?;
                }
                Ok(())
            })
            .await?;

        tracing::info!(window_id = %session_id, signal = %signal, exit_shell, "process stopped");
        Ok(StopOutcome { success: true })
    }
}
