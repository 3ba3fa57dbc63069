//! Out-of-band reads of a session's buffer.

use std::sync::Arc;

use serde::Serialize;
use tabmux_tmux::{CaptureRange, TmuxCommandRunner, capture_window};

use crate::cleanup::OutputCleaner;
use crate::directory::SessionDirectory;
use crate::error::SessionError;
use crate::lock::SessionLocks;
use crate::multiplexer::Multiplexer;

pub const DEFAULT_RECENT_LINES: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecentOutput {
    pub content: String,
    pub returned_lines: usize,
    pub truncated: bool,
}

pub struct OutputReader<R> {
    mux: Arc<Multiplexer<R>>,
    directory: Arc<SessionDirectory<R>>,
    locks: Arc<SessionLocks>,
    cleaner: OutputCleaner,
}

impl<R: TmuxCommandRunner + 'static> OutputReader<R> {
    pub fn new(
        mux: Arc<Multiplexer<R>>,
        directory: Arc<SessionDirectory<R>>,
        locks: Arc<SessionLocks>,
        cleaner: OutputCleaner,
    ) -> Self {
        Self {
            mux,
            directory,
            locks,
            cleaner,
        }
    }

    /// Cleaned buffer content. `history_limit` bounds how much scrollback is
    /// included; `None` reads everything tmux still holds.
    pub async fn read(
        &self,
        session_id: &str,
        history_limit: Option<u32>,
        strip_ansi: bool,
    ) -> Result<String, SessionError> {
        let range = history_limit.map_or(CaptureRange::All, CaptureRange::History);
        let lines = self.capture(session_id, range).await?;
        Ok(self.cleaner.clean_capture(&lines, strip_ansi).join("\n"))
    }

    /// The last `max_lines` cleaned lines, with a flag telling whether older
    /// lines were left out.
    pub async fn read_recent(
        &self,
        session_id: &str,
        max_lines: usize,
        strip_ansi: bool,
    ) -> Result<RecentOutput, SessionError> {
        if max_lines == 0 {
            return Err(SessionError::InvalidArgument(
                "lines must be at least 1".to_string(),
            ));
        }
        let lines = self.capture(session_id, CaptureRange::All).await?;
        let cleaned = self.cleaner.clean_capture(&lines, strip_ansi);

        let total = cleaned.len();
        let tail = &cleaned[total.saturating_sub(max_lines)..];
        tracing::debug!(window_id = %session_id, total, returned = tail.len(), "read recent output");
        Ok(RecentOutput {
            content: tail.join("\n"),
            returned_lines: tail.len(),
            truncated: total > max_lines,
        })
    }

    /// Snapshot under the session lock so a read never lands between the
    /// keystrokes of a concurrent injection.
    async fn capture(
        &self,
        session_id: &str,
        range: CaptureRange,
    ) -> Result<Vec<String>, SessionError> {
        let _guard = self.locks.acquire(session_id).await;
        self.directory.require(session_id).await?;
        let target = session_id.to_string();
        self.mux
            .call(Some(session_id), move |r| capture_window(r, &target, range, false))
            .await
    }
}
