//! Session directory: the multiplexer is the only source of truth for which
//! sessions exist. Nothing is cached; every lookup re-queries tmux.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tabmux_tmux::{
    NewWindow, TmuxCommandRunner, TmuxWindowInfo, is_window_id, kill_window, list_windows,
    new_window,
};
use uuid::Uuid;

use crate::error::SessionError;
use crate::multiplexer::Multiplexer;

/// One addressable interactive shell (a tmux window in the managed session).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    #[serde(rename = "window_id")]
    pub id: String,
    #[serde(rename = "name")]
    pub display_name: String,
    #[serde(rename = "active")]
    pub is_active: bool,
}

impl From<TmuxWindowInfo> for Session {
    fn from(w: TmuxWindowInfo) -> Self {
        Self {
            id: w.window_id,
            display_name: w.window_name,
            is_active: w.active,
        }
    }
}

/// Options for `SessionDirectory::create`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateOptions {
    pub name: Option<String>,
    pub cwd: Option<String>,
    pub env: BTreeMap<String, String>,
    /// Start the window with a login shell.
    pub login: bool,
}

impl CreateOptions {
    /// Argument checks that need no tmux round-trip.
    pub fn validate(&self) -> Result<(), SessionError> {
        if let Some(ref cwd) = self.cwd {
            if !Path::new(cwd).is_dir() {
                return Err(SessionError::InvalidArgument(format!(
                    "working directory does not exist: {cwd}"
                )));
            }
        }
        if let Some(bad) = self.env.keys().find(|k| !is_shell_identifier(k)) {
            return Err(SessionError::InvalidArgument(format!(
                "invalid environment variable name: {bad:?}"
            )));
        }
        Ok(())
    }
}

fn is_shell_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn login_shell_command() -> String {
    let shell = std::env::var("SHELL")
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "/bin/sh".to_string());
    format!("{shell} -l")
}

fn generated_name() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("tab-{}", &id[..8])
}

/// Reject ids that are not tmux window ids before they reach a `-t` target.
pub fn validate_session_id(id: &str) -> Result<(), SessionError> {
    if is_window_id(id) {
        Ok(())
    } else {
        Err(SessionError::InvalidArgument(format!(
            "invalid window_id {id:?}, expected @<number>"
        )))
    }
}

pub struct SessionDirectory<R> {
    mux: Arc<Multiplexer<R>>,
}

impl<R: TmuxCommandRunner + 'static> SessionDirectory<R> {
    pub fn new(mux: Arc<Multiplexer<R>>) -> Self {
        Self { mux }
    }

    /// Allocate a new window and return it.
    ///
    /// The id is printed by `new-window` itself, so concurrent creations never
    /// race on a follow-up listing.
    pub async fn create(&self, opts: CreateOptions) -> Result<Session, SessionError> {
        opts.validate()?;
        self.mux.ensure_context().await?;

        let name = opts.name.clone().unwrap_or_else(generated_name);
        let session = self.mux.session_name().to_string();
        let shell_command = opts.login.then(login_shell_command);
        let window_name = name.clone();
        let cwd = opts.cwd.clone();
        let env: Vec<String> = opts.env.iter().map(|(k, v)| format!("{k}={v}")).collect();
        let id = self
            .mux
            .call(None, move |r| {
                new_window(
                    r,
                    &session,
                    &NewWindow {
                        name: &window_name,
                        cwd: cwd.as_deref(),
                        env: &env,
                        shell_command: shell_command.as_deref(),
                    },
                )
            })
            .await?;

        tracing::info!(window_id = %id, name = %name, "session created");
        Ok(Session {
            id,
            display_name: name,
            is_active: true,
        })
    }

    /// All sessions in the managed context. The first call on a fresh server
    /// initializes the context and returns an empty list.
    pub async fn list(&self) -> Result<Vec<Session>, SessionError> {
        match self.query().await? {
            Some(windows) => Ok(windows.into_iter().map(Session::from).collect()),
            None => {
                self.mux.ensure_context().await?;
                Ok(Vec::new())
            }
        }
    }

    /// Reconfirm that `id` is a live session and return its current metadata.
    pub async fn require(&self, id: &str) -> Result<Session, SessionError> {
        validate_session_id(id)?;
        self.query()
            .await?
            .unwrap_or_default()
            .into_iter()
            .find(|w| w.window_id == id)
            .map(Session::from)
            .ok_or_else(|| SessionError::SessionNotFound(id.to_string()))
    }

    /// Destroy the session's window. A missing id is `SessionNotFound`.
    pub async fn close(&self, id: &str) -> Result<(), SessionError> {
        self.require(id).await?;
        let target = id.to_string();
        self.mux
            .call(Some(id), move |r| kill_window(r, &target))
            .await?;
        tracing::info!(window_id = %id, "session closed");
        Ok(())
    }

    /// `None` when the managed session (or the whole server) does not exist.
    async fn query(&self) -> Result<Option<Vec<TmuxWindowInfo>>, SessionError> {
        let session = self.mux.session_name().to_string();
        self.mux
            .call(None, move |r| match list_windows(r, &session) {
                Ok(windows) => Ok(Some(windows)),
                Err(e) if e.is_no_server() || e.is_missing_session() => Ok(None),
                Err(e) => Err(e),
            })
            .await
    }
}
