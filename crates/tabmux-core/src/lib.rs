//! tabmux-core: tmux-backed interactive sessions.
//!
//! Session directory, per-session FIFO locking, sentinel-framed bounded
//! command execution, long-running process control and buffer reads, all
//! reached through `TabService`.

pub mod cleanup;
pub mod config;
pub mod directory;
pub mod error;
pub mod exec;
#[cfg(any(test, feature = "test-support"))]
pub mod fake;
pub mod lock;
pub mod multiplexer;
pub mod process;
pub mod reader;
pub mod sentinel;
pub mod service;

pub use cleanup::{GenericPromptFilter, HintedPromptFilter, OutputCleaner, PromptFilter, strip_ansi};
pub use config::CoreConfig;
pub use directory::{CreateOptions, Session, SessionDirectory};
pub use error::SessionError;
pub use exec::{BoundedExecutor, ExecOutcome, ExecRequest};
pub use lock::{SessionGuard, SessionLocks};
pub use multiplexer::Multiplexer;
pub use process::{ProcessController, StartOutcome, StopOutcome};
pub use reader::{DEFAULT_RECENT_LINES, OutputReader, RecentOutput};
pub use service::TabService;
