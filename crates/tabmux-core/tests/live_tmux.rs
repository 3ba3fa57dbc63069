//! End-to-end runs against a real tmux server and bash.
//!
//! Each test starts its own tmux server on a private socket and tears it down
//! afterwards. Tests return early when tmux or /bin/bash is not installed.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tabmux_core::{CoreConfig, CreateOptions, TabService};
use tabmux_tmux::{TmuxExecutor, kill_server, private_socket_path};

const BASH: &str = "/bin/bash";

struct Live {
    service: TabService<TmuxExecutor>,
    socket: PathBuf,
}

impl Live {
    fn start() -> Option<Self> {
        let tmux_ok = std::process::Command::new("tmux")
            .arg("-V")
            .output()
            .is_ok_and(|o| o.status.success());
        if !tmux_ok || !Path::new(BASH).exists() {
            eprintln!("tmux or {BASH} not available, skipping");
            return None;
        }
        let socket = private_socket_path();
        let runner = TmuxExecutor::new("tmux").with_socket_path(socket.clone());
        let config = CoreConfig {
            session_name: "tabmux-live".to_string(),
            poll_interval: Duration::from_millis(20),
            default_timeout: Duration::from_secs(10),
            shell: Some(BASH.to_string()),
            ..CoreConfig::default()
        };
        Some(Self {
            service: TabService::new(runner, config),
            socket,
        })
    }

    async fn tab(&self) -> String {
        self.service
            .create_tab(CreateOptions::default())
            .await
            .expect("create tab")
            .id
    }

    async fn run(&self, id: &str, command: &str) -> tabmux_core::ExecOutcome {
        self.service
            .execute_command(id, command, None, true)
            .await
            .expect("execute")
    }

    async fn finish(self) {
        self.service.shutdown().await.expect("shutdown");
    }
}

impl Drop for Live {
    fn drop(&mut self) {
        let _ = kill_server(self.service.runner());
        let _ = std::fs::remove_file(&self.socket);
    }
}

#[tokio::test]
async fn echo_and_back_to_back_calls() {
    let Some(live) = Live::start() else { return };
    let id = live.tab().await;

    let out = live.run(&id, "echo X").await;
    assert_eq!((out.output.as_str(), out.exit_code, out.timed_out), ("X", 0, false));

    for i in 0..20 {
        let out = live.run(&id, &format!("echo v{i}")).await;
        assert_eq!(out.output, format!("v{i}"), "call {i}");
    }
    live.finish().await;
}

#[tokio::test]
async fn exit_status_carries_to_the_next_call() {
    let Some(live) = Live::start() else { return };
    let id = live.tab().await;

    let failed = live.run(&id, "false").await;
    assert_eq!((failed.output.as_str(), failed.exit_code), ("", 1));
    let status = live.run(&id, "echo $?").await;
    assert_eq!(status.output, "1");
    live.finish().await;
}

#[tokio::test]
async fn timeout_interrupts_and_the_tab_keeps_working() {
    let Some(live) = Live::start() else { return };
    let id = live.tab().await;

    let slow = live
        .service
        .execute_command(&id, "sleep 5", Some(Duration::from_millis(500)), true)
        .await
        .expect("timeout is a result");
    assert!(slow.timed_out);
    assert_eq!(slow.exit_code, 130);

    let alive = live.run(&id, "echo alive").await;
    assert_eq!((alive.output.as_str(), alive.timed_out), ("alive", false));
    live.finish().await;
}

#[tokio::test]
async fn started_process_can_be_stopped() {
    let Some(live) = Live::start() else { return };
    let id = live.tab().await;

    let started = live.service.start_process(&id, "sleep 30", true).await.expect("start");
    assert!(started.started);
    tokio::time::sleep(Duration::from_millis(200)).await;
    let stopped = live.service.stop_process(&id, "SIGINT").await.expect("stop");
    assert!(stopped.success);

    let alive = live.run(&id, "echo alive").await;
    assert_eq!(alive.output, "alive");
    live.finish().await;
}

#[tokio::test]
async fn recent_logs_are_bounded() {
    let Some(live) = Live::start() else { return };
    let id = live.tab().await;

    live.run(&id, "seq 10").await;
    let logs = live.service.read_logs(&id, 5, true).await.expect("logs");
    assert!(logs.content.contains("10"), "{}", logs.content);
    assert!(logs.returned_lines <= 5);
    live.finish().await;
}

#[tokio::test]
async fn output_without_trailing_newline() {
    let Some(live) = Live::start() else { return };
    let id = live.tab().await;

    let out = live.run(&id, "printf 'no newline'").await;
    assert_eq!((out.output.as_str(), out.exit_code), ("no newline", 0));
    live.finish().await;
}
