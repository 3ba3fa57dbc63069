//! CLI definition using clap derive.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tabmux_core::CoreConfig;
use tabmux_core::config::{
    DEFAULT_HISTORY_LIMIT, DEFAULT_POLL_INTERVAL, DEFAULT_SESSION_NAME, DEFAULT_TIMEOUT,
};

#[derive(Parser)]
#[command(name = "tabmux", version, about = "tmux-backed terminal tabs over JSON-RPC")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Serve JSON-RPC on stdio, or on a Unix socket with --listen
    Serve(ServeOpts),
    /// Send one request to a running `serve --listen` instance
    Call(CallOpts),
}

#[derive(clap::Args, Debug)]
pub struct ServeOpts {
    /// Unix socket to listen on instead of stdio
    #[arg(long, env = "TABMUX_LISTEN")]
    pub listen: Option<PathBuf>,

    /// tmux executable
    #[arg(long, env = "TABMUX_TMUX_BIN", default_value = "tmux")]
    pub tmux_bin: String,

    /// tmux server socket (default: private per-process path in the temp dir)
    #[arg(long, env = "TABMUX_TMUX_SOCKET")]
    pub tmux_socket: Option<PathBuf>,

    /// Managed tmux session that owns every tab
    #[arg(long, env = "TABMUX_SESSION", default_value = DEFAULT_SESSION_NAME)]
    pub session_name: String,

    /// Buffer poll interval while a command runs, in milliseconds
    #[arg(long, env = "TABMUX_POLL_INTERVAL_MS", default_value_t = DEFAULT_POLL_INTERVAL.as_millis() as u64)]
    pub poll_interval_ms: u64,

    /// execute_command timeout when the request gives none, in milliseconds
    #[arg(long, env = "TABMUX_DEFAULT_TIMEOUT_MS", default_value_t = DEFAULT_TIMEOUT.as_millis() as u64)]
    pub default_timeout_ms: u64,

    /// Scrollback lines kept per tab
    #[arg(long, env = "TABMUX_HISTORY_LIMIT", default_value_t = DEFAULT_HISTORY_LIMIT)]
    pub history_limit: u32,

    /// Make stop_process also end the tab's shell with `exit`
    #[arg(long, env = "TABMUX_EXIT_SHELL_ON_STOP")]
    pub exit_shell_on_stop: bool,

    /// User/host substring identifying prompt lines (repeatable)
    #[arg(long = "prompt-hint", env = "TABMUX_PROMPT_HINTS", value_delimiter = ',')]
    pub prompt_hints: Vec<String>,

    /// Shell started in new tabs (default: tmux's default-shell)
    #[arg(long, env = "TABMUX_SHELL")]
    pub shell: Option<String>,
}

impl ServeOpts {
    pub fn core_config(&self) -> CoreConfig {
        CoreConfig {
            session_name: self.session_name.clone(),
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
            default_timeout: Duration::from_millis(self.default_timeout_ms.max(1)),
            history_limit: self.history_limit,
            exit_shell_on_stop: self.exit_shell_on_stop,
            prompt_hints: self.prompt_hints.clone(),
            shell: self.shell.clone(),
        }
    }
}

#[derive(clap::Args, Debug)]
pub struct CallOpts {
    /// RPC method, e.g. list_tabs
    pub method: String,

    /// JSON object with the method's parameters
    #[arg(long, default_value = "{}")]
    pub params: String,

    /// Socket of the running server
    #[arg(long, env = "TABMUX_LISTEN")]
    pub listen: PathBuf,
}
