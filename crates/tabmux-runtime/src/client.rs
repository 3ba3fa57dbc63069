//! UDS JSON-RPC client for the `call` subcommand.

use std::path::Path;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

pub(crate) async fn rpc_call(
    socket_path: &Path,
    method: &str,
    params: Value,
) -> anyhow::Result<Value> {
    let stream = UnixStream::connect(socket_path).await.map_err(|e| {
        anyhow::anyhow!("cannot connect to tabmux at {}: {e}", socket_path.display())
    })?;

    let (reader, mut writer) = stream.into_split();

    let request = serde_json::json!({
        "jsonrpc": "2.0",
        "method": method,
        "params": params,
        "id": 1,
    });
    let mut req = serde_json::to_string(&request)?;
    req.push('\n');
    writer.write_all(req.as_bytes()).await?;
    writer.shutdown().await?;

    let mut reader = BufReader::new(reader);
    let mut line = String::new();
    reader.read_line(&mut line).await?;
    if line.trim().is_empty() {
        anyhow::bail!("server closed the connection without a response");
    }

    let response: Value = serde_json::from_str(line.trim())?;
    decode_response(&response)
}

/// Unwrap the single text item of a result, or turn an RPC error into `Err`.
pub(crate) fn decode_response(response: &Value) -> anyhow::Result<Value> {
    if let Some(error) = response.get("error") {
        let message = error["message"].as_str().unwrap_or("unknown error");
        let kind = error["data"]["kind"].as_str().unwrap_or("unknown");
        anyhow::bail!("RPC error {} ({kind}): {message}", error["code"]);
    }
    let text = response["result"]["content"][0]["text"]
        .as_str()
        .ok_or_else(|| anyhow::anyhow!("response has no text payload: {response}"))?;
    Ok(serde_json::from_str(text)?)
}

/// `tabmux call <method>`: print the decoded result as pretty JSON.
pub async fn cmd_call(socket_path: &Path, method: &str, params: &str) -> anyhow::Result<()> {
    let params: Value = serde_json::from_str(params)
        .map_err(|e| anyhow::anyhow!("--params is not valid JSON: {e}"))?;
    let result = rpc_call(socket_path, method, params).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_text_payload() {
        let resp = json!({
            "jsonrpc": "2.0",
            "result": { "content": [{ "type": "text", "text": "{\"started\":true}" }] },
            "id": 1,
        });
        assert_eq!(decode_response(&resp).expect("ok"), json!({ "started": true }));
    }

    #[test]
    fn error_response_becomes_err() {
        let resp = json!({
            "jsonrpc": "2.0",
            "error": { "code": -32001, "message": "session not found: @4", "data": { "kind": "session_not_found" } },
            "id": 1,
        });
        let err = decode_response(&resp).unwrap_err().to_string();
        assert!(err.contains("-32001"));
        assert!(err.contains("session_not_found"));
    }

    #[test]
    fn missing_payload_is_err() {
        let resp = json!({ "jsonrpc": "2.0", "result": {}, "id": 1 });
        assert!(decode_response(&resp).is_err());
    }

    #[tokio::test]
    async fn round_trip_over_socket() {
        use std::sync::Arc;
        use std::time::Duration;

        use tabmux_core::fake::FakeTmux;
        use tabmux_core::{CoreConfig, TabService};

        let dir = tempfile::tempdir().expect("tempdir");
        let socket = dir.path().join("tabmux.sock");
        let service = Arc::new(TabService::new(
            FakeTmux::new(),
            CoreConfig {
                poll_interval: Duration::from_millis(5),
                ..CoreConfig::default()
            },
        ));
        let server_socket = socket.clone();
        let server = tokio::spawn(async move { crate::server::run_uds(&server_socket, service).await });

        for _ in 0..100 {
            if socket.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let created = rpc_call(&socket, "create_tab", json!({ "name": "sock" })).await.expect("create");
        assert_eq!(created["name"], "sock");
        let tabs = rpc_call(&socket, "list_tabs", json!({})).await.expect("list");
        assert!(tabs["tabs"].as_array().expect("tabs").iter().any(|t| t["name"] == "sock"));

        server.abort();
    }
}
