//! RPC method table: request params, dispatch, result shaping.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tabmux_core::reader::DEFAULT_RECENT_LINES;
use tabmux_core::{CreateOptions, SessionError, TabService};
use tabmux_tmux::TmuxCommandRunner;

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;

/// A structured JSON-RPC error.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcFailure {
    pub code: i64,
    pub message: String,
    pub kind: &'static str,
}

impl RpcFailure {
    pub fn new(code: i64, kind: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            kind,
        }
    }

    pub fn to_json(&self) -> Value {
        json!({
            "code": self.code,
            "message": self.message,
            "data": { "kind": self.kind },
        })
    }
}

impl From<SessionError> for RpcFailure {
    fn from(err: SessionError) -> Self {
        Self::new(err.rpc_code(), err.code(), err.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct CreateTabParams {
    name: Option<String>,
    cwd: Option<String>,
    #[serde(default)]
    env: BTreeMap<String, String>,
    #[serde(default)]
    login: bool,
}

#[derive(Debug, Deserialize)]
struct WindowParams {
    window_id: String,
}

#[derive(Debug, Deserialize)]
struct ExecuteParams {
    window_id: String,
    command: String,
    timeout_ms: Option<u64>,
    #[serde(default)]
    strip_ansi: bool,
}

#[derive(Debug, Deserialize)]
struct ReadLogsParams {
    window_id: String,
    #[serde(default = "default_lines")]
    lines: usize,
    #[serde(default)]
    strip_ansi: bool,
}

#[derive(Debug, Deserialize)]
struct ReadOutputParams {
    window_id: String,
    history_limit: Option<u32>,
    #[serde(default)]
    strip_ansi: bool,
}

#[derive(Debug, Deserialize)]
struct StartParams {
    window_id: String,
    command: String,
    #[serde(default = "default_true")]
    append_newline: bool,
}

#[derive(Debug, Deserialize)]
struct StopParams {
    window_id: String,
    #[serde(default = "default_signal")]
    signal: String,
}

fn default_lines() -> usize {
    DEFAULT_RECENT_LINES
}

fn default_true() -> bool {
    true
}

fn default_signal() -> String {
    "SIGINT".to_string()
}

/// Decode params; absent or `null` params read as an empty object.
fn params<T: DeserializeOwned>(raw: Value) -> Result<T, RpcFailure> {
    let raw = if raw.is_null() { json!({}) } else { raw };
    serde_json::from_value(raw)
        .map_err(|e| RpcFailure::new(INVALID_PARAMS, "invalid_argument", format!("invalid params: {e}")))
}

fn to_json(value: impl serde::Serialize) -> Result<Value, RpcFailure> {
    serde_json::to_value(value)
        .map_err(|e| RpcFailure::new(-32603, "internal_error", format!("serialize result: {e}")))
}

/// Run one method against the service and return its result object.
///
/// Params are fully decoded before the service is called, so a malformed
/// request never reaches a session lock.
pub async fn dispatch<R: TmuxCommandRunner + 'static>(
    service: &TabService<R>,
    method: &str,
    raw: Value,
) -> Result<Value, RpcFailure> {
    match method {
        "create_tab" => {
            let p: CreateTabParams = params(raw)?;
            let tab = service
                .create_tab(CreateOptions {
                    name: p.name,
                    cwd: p.cwd,
                    env: p.env,
                    login: p.login,
                })
                .await?;
            Ok(json!({ "window_id": tab.id, "name": tab.display_name }))
        }
        "list_tabs" => {
            let tabs = service.list_tabs().await?;
            Ok(json!({ "tabs": to_json(tabs)? }))
        }
        "close_tab" => {
            let p: WindowParams = params(raw)?;
            service.close_tab(&p.window_id).await?;
            Ok(json!({ "closed": true }))
        }
        "execute_command" => {
            let p: ExecuteParams = params(raw)?;
            let timeout = p.timeout_ms.map(Duration::from_millis);
            let out = service
                .execute_command(&p.window_id, &p.command, timeout, p.strip_ansi)
                .await?;
            to_json(out)
        }
        "read_logs_from_tab" => {
            let p: ReadLogsParams = params(raw)?;
            to_json(service.read_logs(&p.window_id, p.lines, p.strip_ansi).await?)
        }
        "read_tab_output" => {
            let p: ReadOutputParams = params(raw)?;
            let content = service
                .read_output(&p.window_id, p.history_limit, p.strip_ansi)
                .await?;
            Ok(json!({ "content": content }))
        }
        "start_process" => {
            let p: StartParams = params(raw)?;
            to_json(
                service
                    .start_process(&p.window_id, &p.command, p.append_newline)
                    .await?,
            )
        }
        "stop_process" => {
            let p: StopParams = params(raw)?;
            to_json(service.stop_process(&p.window_id, &p.signal).await?)
        }
        _ => Err(RpcFailure::new(
            METHOD_NOT_FOUND,
            "method_not_found",
            format!("method not found: {method}"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_optional_fields() {
        let p: ReadLogsParams = params(json!({ "window_id": "@1" })).expect("decode");
        assert_eq!(p.lines, 500);
        assert!(!p.strip_ansi);

        let p: StartParams = params(json!({ "window_id": "@1", "command": "make" })).expect("decode");
        assert!(p.append_newline);

        let p: StopParams = params(json!({ "window_id": "@1" })).expect("decode");
        assert_eq!(p.signal, "SIGINT");

        let p: ExecuteParams =
            params(json!({ "window_id": "@1", "command": "ls" })).expect("decode");
        assert_eq!(p.timeout_ms, None);
    }

    #[test]
    fn null_params_read_as_empty_object() {
        let p: CreateTabParams = params(Value::Null).expect("decode");
        assert!(p.name.is_none());
        assert!(p.env.is_empty());
        assert!(!p.login);
    }

    #[test]
    fn missing_required_field_is_invalid_params() {
        let err = params::<ExecuteParams>(json!({ "window_id": "@1" })).unwrap_err();
        assert_eq!(err.code, INVALID_PARAMS);
        assert_eq!(err.kind, "invalid_argument");
        assert!(err.message.contains("command"));
    }

    #[test]
    fn session_errors_keep_their_codes() {
        let failure = RpcFailure::from(SessionError::SessionNotFound("@3".into()));
        assert_eq!(failure.code, -32001);
        assert_eq!(failure.to_json()["data"]["kind"], "session_not_found");
    }
}
