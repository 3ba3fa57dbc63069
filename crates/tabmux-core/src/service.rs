//! `TabService`: the one object the RPC layer talks to.
//!
//! Bundles the multiplexer handle, the session directory, the lock table and
//! the three session components. Request arguments are validated here,
//! before any session lock is touched.

use std::sync::Arc;
use std::time::Duration;

use tabmux_tmux::TmuxCommandRunner;

use crate::cleanup::OutputCleaner;
use crate::config::CoreConfig;
use crate::directory::{CreateOptions, Session, SessionDirectory, validate_session_id};
use crate::error::SessionError;
use crate::exec::{BoundedExecutor, ExecOutcome, ExecRequest};
use crate::lock::SessionLocks;
use crate::multiplexer::Multiplexer;
use crate::process::{ProcessController, StartOutcome, StopOutcome};
use crate::reader::{OutputReader, RecentOutput};

pub struct TabService<R> {
    config: CoreConfig,
    mux: Arc<Multiplexer<R>>,
    directory: Arc<SessionDirectory<R>>,
    executor: BoundedExecutor<R>,
    processes: ProcessController<R>,
    reader: OutputReader<R>,
}

impl<R: TmuxCommandRunner + 'static> TabService<R> {
    pub fn new(runner: R, config: CoreConfig) -> Self {
        let mux = Arc::new(Multiplexer::new(
            runner,
            config.session_name.clone(),
            config.history_limit,
        )
        .with_shell(config.shell.clone()));
        let directory = Arc::new(SessionDirectory::new(Arc::clone(&mux)));
        let locks = Arc::new(SessionLocks::new());
        let cleaner = OutputCleaner::from_hints(&config.prompt_hints);

        Self {
            executor: BoundedExecutor::new(
                Arc::clone(&mux),
                Arc::clone(&directory),
                Arc::clone(&locks),
                cleaner.clone(),
                config.poll_interval,
            ),
            processes: ProcessController::new(
                Arc::clone(&mux),
                Arc::clone(&directory),
                Arc::clone(&locks),
                config.exit_shell_on_stop,
            ),
            reader: OutputReader::new(Arc::clone(&mux), Arc::clone(&directory), locks, cleaner),
            config,
            mux,
            directory,
        }
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn runner(&self) -> &R {
        self.mux.runner()
    }

    pub async fn create_tab(&self, opts: CreateOptions) -> Result<Session, SessionError> {
        self.directory.create(opts).await
    }

    pub async fn list_tabs(&self) -> Result<Vec<Session>, SessionError> {
        self.directory.list().await
    }

    pub async fn close_tab(&self, session_id: &str) -> Result<(), SessionError> {
        self.directory.close(session_id).await
    }

    /// `timeout` falls back to the configured default when `None`.
    pub async fn execute_command(
        &self,
        session_id: &str,
        command: &str,
        timeout: Option<Duration>,
        strip_ansi: bool,
    ) -> Result<ExecOutcome, SessionError> {
        validate_session_id(session_id)?;
        require_text("command", command)?;
        let timeout = timeout.unwrap_or(self.config.default_timeout);
        if timeout.is_zero() {
            return Err(SessionError::InvalidArgument(
                "timeout_ms must be greater than 0".to_string(),
            ));
        }
        self.executor
            .execute(ExecRequest {
                session_id: session_id.to_string(),
                command: command.to_string(),
                timeout,
                strip_ansi,
            })
            .await
    }

    pub async fn read_logs(
        &self,
        session_id: &str,
        lines: usize,
        strip_ansi: bool,
    ) -> Result<RecentOutput, SessionError> {
        validate_session_id(session_id)?;
        self.reader.read_recent(session_id, lines, strip_ansi).await
    }

    pub async fn read_output(
        &self,
        session_id: &str,
        history_limit: Option<u32>,
        strip_ansi: bool,
    ) -> Result<String, SessionError> {
        validate_session_id(session_id)?;
        self.reader.read(session_id, history_limit, strip_ansi).await
    }

    pub async fn start_process(
        &self,
        session_id: &str,
        command: &str,
        append_newline: bool,
    ) -> Result<StartOutcome, SessionError> {
        validate_session_id(session_id)?;
        require_text("command", command)?;
        self.processes.start(session_id, command, append_newline).await
    }

    pub async fn stop_process(
        &self,
        session_id: &str,
        signal: &str,
    ) -> Result<StopOutcome, SessionError> {
        validate_session_id(session_id)?;
        self.processes.stop(session_id, signal).await
    }

    /// Tear down the managed tmux server and every session in it.
    pub async fn shutdown(&self) -> Result<(), SessionError> {
        self.mux.shutdown().await
    }
}

fn require_text(field: &str, value: &str) -> Result<(), SessionError> {
    if value.trim().is_empty() {
        return Err(SessionError::InvalidArgument(format!("{field} must not be empty")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;
    use crate::fake::FakeTmux;

    fn service() -> TabService<FakeTmux> {
        TabService::new(
            FakeTmux::new(),
            CoreConfig {
                poll_interval: Duration::from_millis(5),
                ..CoreConfig::default()
            },
        )
    }

    fn named(name: &str) -> CreateOptions {
        CreateOptions {
            name: Some(name.to_string()),
            ..CreateOptions::default()
        }
    }

    #[tokio::test]
    async fn created_names_survive_listing() {
        let svc = service();
        let tab = svc.create_tab(named("build: #1 (release)")).await.expect("create");
        let tabs = svc.list_tabs().await.expect("list");
        let found = tabs.iter().find(|t| t.id == tab.id).expect("listed");
        assert_eq!(found.display_name, "build: #1 (release)");
    }

    #[tokio::test]
    async fn exit_status_carries_across_calls() {
        let svc = service();
        let id = svc.create_tab(CreateOptions::default()).await.expect("create").id;
        let out = svc.execute_command(&id, "false", None, false).await.expect("false");
        assert_eq!(out.exit_code, 1);
        let out = svc.execute_command(&id, "echo $?", None, false).await.expect("echo");
        assert_eq!(out.output, "1");
    }

    #[tokio::test]
    async fn empty_command_rejected_before_any_tmux_call() {
        let svc = service();
        let err = svc.execute_command("@1", "   ", None, false).await.unwrap_err();
        assert!(matches!(err, SessionError::InvalidArgument(_)));
        let err = svc.start_process("@1", "", true).await.unwrap_err();
        assert!(matches!(err, SessionError::InvalidArgument(_)));
        assert_eq!(svc.runner().count_calls("list-windows"), 0);
    }

    #[tokio::test]
    async fn malformed_id_is_invalid_argument() {
        let svc = service();
        let err = svc.read_logs("window-1", 10, false).await.unwrap_err();
        assert!(matches!(err, SessionError::InvalidArgument(_)));
        let err = svc.stop_process("1", "SIGINT").await.unwrap_err();
        assert!(matches!(err, SessionError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn zero_timeout_rejected() {
        let svc = service();
        let err = svc
            .execute_command("@1", "echo hi", Some(Duration::ZERO), false)
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn close_then_execute_is_not_found() {
        let svc = service();
        let id = svc.create_tab(CreateOptions::default()).await.expect("create").id;
        svc.close_tab(&id).await.expect("close");
        let err = svc.execute_command(&id, "echo hi", None, false).await.unwrap_err();
        assert!(matches!(err, SessionError::SessionNotFound(_)));
        let err = svc.close_tab(&id).await.unwrap_err();
        assert!(matches!(err, SessionError::SessionNotFound(_)));
    }

    #[tokio::test]
    async fn timeout_then_session_survives() {
        let svc = service();
        let id = svc.create_tab(CreateOptions::default()).await.expect("create").id;
        let started = Instant::now();
        let out = svc
            .execute_command(&id, "sleep 5", Some(Duration::from_millis(100)), false)
            .await
            .expect("timeout is not an error");
        assert!(out.timed_out);
        assert_eq!(out.exit_code, 130);
        assert!(started.elapsed() < Duration::from_secs(2));

        let alive = svc.execute_command(&id, "echo alive", None, false).await.expect("alive");
        assert_eq!(alive.output, "alive");
        assert!(!alive.timed_out);
    }

    #[tokio::test]
    async fn process_round_trip() {
        let svc = service();
        let id = svc.create_tab(CreateOptions::default()).await.expect("create").id;
        let started = Instant::now();
        assert!(svc.start_process(&id, "sleep 30", true).await.expect("start").started);
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(svc.stop_process(&id, "SIGINT").await.expect("stop").success);
        let alive = svc.execute_command(&id, "echo alive", None, false).await.expect("alive");
        assert_eq!(alive.output, "alive");
    }

    #[tokio::test]
    async fn concurrent_tabs_are_isolated() {
        let svc = Arc::new(service());
        let a = svc.create_tab(named("a")).await.expect("a").id;
        let b = svc.create_tab(named("b")).await.expect("b").id;

        let (ra, rb) = tokio::join!(
            svc.execute_command(&a, "echo from-a", None, false),
            svc.execute_command(&b, "echo from-b", None, false),
        );
        assert_eq!(ra.expect("a").output, "from-a");
        assert_eq!(rb.expect("b").output, "from-b");
    }

    #[tokio::test]
    async fn unavailable_multiplexer_surfaces() {
        let svc = TabService::new(FakeTmux::unavailable(), CoreConfig::default());
        let err = svc.list_tabs().await.unwrap_err();
        assert!(matches!(err, SessionError::MultiplexerUnavailable(_)));
        let err = svc.create_tab(CreateOptions::default()).await.unwrap_err();
        assert_eq!(err.code(), "multiplexer_unavailable");
    }

    #[tokio::test]
    async fn shutdown_tolerates_never_started_server() {
        let svc = service();
        svc.shutdown().await.expect("no server yet");
        svc.create_tab(CreateOptions::default()).await.expect("create");
        svc.shutdown().await.expect("shutdown");
        assert!(svc.runner().window_ids().is_empty());
    }
}
