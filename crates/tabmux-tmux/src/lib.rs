//! tabmux-tmux: tmux backend IO boundary.
//! Provides subprocess execution, window listing, pane capture, keystroke
//! injection and server/window lifecycle commands. No business logic.

pub mod capture;
pub mod error;
pub mod executor;
pub mod keys;
pub mod lifecycle;
pub mod window_info;

pub use capture::{CaptureRange, capture_window};
pub use error::TmuxError;
pub use executor::{TmuxCommandRunner, TmuxExecutor, private_socket_path};
pub use keys::{Key, send_key, send_literal, submit_line};
pub use lifecycle::{NewWindow, kill_server, kill_window, new_session, new_window, set_global_option};
pub use window_info::{
    LIST_WINDOWS_FORMAT, TmuxWindowInfo, escape_format, exact_session, is_window_id, list_windows,
    parse_list_windows_output,
};
