//! Bounded command execution inside a live interactive shell.
//!
//! The start marker is typed first and the buffer polled until the shell has
//! run it and is back at its prompt, which is remembered for cleanup. Only
//! then are the command and the end marker typed; the buffer is polled until
//! the end sentinel (with the expanded exit status) shows up or the deadline
//! passes. A timeout is a normal result,
//! not an error: the foreground job is interrupted and whatever output exists
//! is returned with `timed_out = true`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tabmux_tmux::{CaptureRange, Key, TmuxCommandRunner, capture_window, send_key, submit_line};

use crate::cleanup::OutputCleaner;
use crate::directory::SessionDirectory;
use crate::error::SessionError;
use crate::lock::SessionLocks;
use crate::multiplexer::Multiplexer;
use crate::sentinel::{Frame, PendingExecution};

/// Exit status reported when a command was interrupted at its deadline.
pub const INTERRUPTED_EXIT_CODE: i32 = 130;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecOutcome {
    pub output: String,
    pub exit_code: i32,
    pub timed_out: bool,
}

#[derive(Debug, Clone)]
pub struct ExecRequest {
    pub session_id: String,
    pub command: String,
    pub timeout: Duration,
    pub strip_ansi: bool,
}

pub struct BoundedExecutor<R> {
    mux: Arc<Multiplexer<R>>,
    directory: Arc<SessionDirectory<R>>,
    locks: Arc<SessionLocks>,
    cleaner: OutputCleaner,
    poll_interval: Duration,
}

impl<R: TmuxCommandRunner + 'static> BoundedExecutor<R> {
    pub fn new(
        mux: Arc<Multiplexer<R>>,
        directory: Arc<SessionDirectory<R>>,
        locks: Arc<SessionLocks>,
        cleaner: OutputCleaner,
        poll_interval: Duration,
    ) -> Self {
        Self {
            mux,
            directory,
            locks,
            cleaner,
            poll_interval,
        }
    }

    /// Run `req.command` to completion (or to its deadline) in the session.
    ///
    /// Holds the session lock for the whole call; it is released on every
    /// exit path when the guard drops.
    pub async fn execute(&self, req: ExecRequest) -> Result<ExecOutcome, SessionError> {
        let _guard = self.locks.acquire(&req.session_id).await;
        self.directory.require(&req.session_id).await?;

        let started = Instant::now();
        let pending = PendingExecution::new(req.command.as_str(), started + req.timeout);
        let id = req.session_id.as_str();
        tracing::debug!(window_id = %id, command = %req.command, timeout_ms = req.timeout.as_millis() as u64, "execute");

        let [start_line, command_line, end_line] = pending.injected_lines();
        self.type_line(id, start_line).await?;
        let prompt = self.await_prompt(id, &pending).await?;

        let mut polls = 0u32;
        if prompt.is_some() {
            self.type_line(id, command_line).await?;
            self.type_line(id, end_line).await?;

            loop {
                let lines = self.capture(id).await?;
                polls += 1;
                if let Some(frame) = pending.locate(&lines) {
                    tracing::debug!(
                        window_id = %id,
                        exit_code = frame.exit_code,
                        polls,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "command finished"
                    );
                    return Ok(self.finished(&lines, &pending, frame, prompt.as_deref(), req.strip_ansi));
                }

                let now = Instant::now();
                if now >= pending.deadline {
                    break;
                }
                tokio::time::sleep(self.poll_interval.min(pending.deadline - now)).await;
            }
        }

        tracing::warn!(window_id = %id, command = %req.command, polls, "command timed out, interrupting");
        let target = id.to_string();
        self.mux
            .call(Some(id), move |r| send_key(r, &target, Key::Interrupt))
            .await?;
        let lines = self.capture(id).await?;
        if let Some(frame) = pending
            .locate(&lines)
            .filter(|f| f.exit_code != INTERRUPTED_EXIT_CODE)
        {
            tracing::debug!(window_id = %id, exit_code = frame.exit_code, "command finished at its deadline");
            return Ok(self.finished(&lines, &pending, frame, prompt.as_deref(), req.strip_ansi));
        }
        let body_start = pending.start_line(&lines).map_or(0, |i| i + 1);
        let output = self.cleaner.clean_command_output(
            &lines[body_start..],
            &pending.command_text,
            prompt.as_deref(),
            req.strip_ansi,
        );

        Ok(ExecOutcome {
            output,
            exit_code: INTERRUPTED_EXIT_CODE,
            timed_out: true,
        })
    }

    fn finished(
        &self,
        lines: &[String],
        pending: &PendingExecution,
        frame: Frame,
        prompt: Option<&str>,
        strip_ansi: bool,
    ) -> ExecOutcome {
        let output = self.cleaner.clean_command_output(
            &lines[frame.body_start..frame.end_line],
            &pending.command_text,
            prompt,
            strip_ansi,
        );
        ExecOutcome {
            output,
            exit_code: frame.exit_code,
            timed_out: false,
        }
    }

    async fn type_line(&self, id: &str, line: String) -> Result<(), SessionError> {
        let target = id.to_string();
        self.mux
            .call(Some(id), move |r| submit_line(r, &target, &line))
            .await
    }

    /// Poll until the start marker has run and the shell shows its prompt
    /// again. `None` when the deadline passes first.
    async fn await_prompt(
        &self,
        id: &str,
        pending: &PendingExecution,
    ) -> Result<Option<String>, SessionError> {
        loop {
            let lines = self.capture(id).await?;
            if let Some(prompt) = pending.prompt_after_start(&lines) {
                return Ok(Some(prompt));
            }
            let now = Instant::now();
            if now >= pending.deadline {
                return Ok(None);
            }
            tokio::time::sleep(self.poll_interval.min(pending.deadline - now)).await;
        }
    }

    async fn capture(&self, id: &str) -> Result<Vec<String>, SessionError> {
        let target = id.to_string();
        self.mux
            .call(Some(id), move |r| {
                capture_window(r, &target, CaptureRange::All, false)
            })
            .await
    }
}
