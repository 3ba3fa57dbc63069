//! Process-wide handle on the managed tmux server.
//!
//! Constructed once by the runtime and shared by `Arc`. Every tmux call goes
//! through `call`, which moves the blocking subprocess onto tokio's blocking
//! pool so work on one session never stalls another.

use std::sync::Arc;

use tabmux_tmux::{TmuxCommandRunner, TmuxError, kill_server, new_session, set_global_option};

use crate::error::SessionError;

/// Name given to the window tmux creates together with the managed session.
pub const BOOTSTRAP_WINDOW: &str = "main";

pub struct Multiplexer<R> {
    runner: Arc<R>,
    session_name: String,
    history_limit: u32,
    shell: Option<String>,
}

impl<R: TmuxCommandRunner + 'static> Multiplexer<R> {
    pub fn new(runner: R, session_name: impl Into<String>, history_limit: u32) -> Self {
        Self {
            runner: Arc::new(runner),
            session_name: session_name.into(),
            history_limit,
            shell: None,
        }
    }

    /// Start new tabs with `shell` instead of tmux's default.
    pub fn with_shell(mut self, shell: Option<String>) -> Self {
        self.shell = shell;
        self
    }

    pub fn session_name(&self) -> &str {
        &self.session_name
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Run `f` against the runner on the blocking pool and classify failures.
    ///
    /// `target` names the session the call addresses, so a vanished window
    /// surfaces as `SessionNotFound` instead of an internal error.
    pub async fn call<T, F>(&self, target: Option<&str>, f: F) -> Result<T, SessionError>
    where
        F: FnOnce(&R) -> Result<T, TmuxError> + Send + 'static,
        T: Send + 'static,
    {
        let runner = Arc::clone(&self.runner);
        match tokio::task::spawn_blocking(move || f(&runner)).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                tracing::debug!(target_id = ?target, error = %e, "tmux call failed");
                Err(SessionError::from_tmux(e, target))
            }
            Err(join) => Err(SessionError::Internal(format!("tmux task failed: {join}"))),
        }
    }

    /// Make sure the managed session exists, creating it on first use.
    ///
    /// Concurrent creators race on `new-session`; the loser's "duplicate
    /// session" error is swallowed.
    pub async fn ensure_context(&self) -> Result<(), SessionError> {
        let session = self.session_name.clone();
        let created = self
            .call(None, move |r| new_session(r, &session, BOOTSTRAP_WINDOW))
            .await?;
        if created {
            tracing::info!(session = %self.session_name, "created managed tmux session");
            let limit = self.history_limit.to_string();
            self.call(None, move |r| set_global_option(r, "history-limit", &limit))
                .await?;
            if let Some(shell) = self.shell.clone() {
                self.call(None, move |r| set_global_option(r, "default-shell", &shell))
                    .await?;
            }
        }
        Ok(())
    }

    /// Kill the managed server. Safe to call when it was never started.
    pub async fn shutdown(&self) -> Result<(), SessionError> {
        self.call(None, |r| kill_server(r)).await?;
        tracing::info!(session = %self.session_name, "managed tmux server stopped");
        Ok(())
    }
}
