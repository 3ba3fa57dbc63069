//! Line-delimited JSON-RPC server over stdio or a Unix domain socket.
//!
//! Every request line is handled on its own task, so slow commands in one tab
//! never hold up requests for another. Responses are written as they finish
//! and carry the request's `id`; a handler that panics still gets an
//! `internal_error` response.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use serde_json::{Value, json};
use tabmux_core::TabService;
use tabmux_tmux::TmuxCommandRunner;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::UnixListener;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::protocol::{INTERNAL_ERROR, INVALID_REQUEST, PARSE_ERROR, RpcFailure, dispatch};

/// Handle one request line and build the response line (without newline).
pub async fn handle_line<R: TmuxCommandRunner + 'static>(
    service: &TabService<R>,
    line: &str,
) -> String {
    let request: Value = match serde_json::from_str(line.trim()) {
        Ok(v) => v,
        Err(e) => {
            let failure = RpcFailure::new(PARSE_ERROR, "parse_error", format!("parse error: {e}"));
            return error_response(Value::Null, &failure);
        }
    };
    let id = request.get("id").cloned().unwrap_or(Value::Null);
    let Some(method) = request.get("method").and_then(Value::as_str) else {
        let failure = RpcFailure::new(INVALID_REQUEST, "invalid_request", "missing method");
        return error_response(id, &failure);
    };
    let params = request.get("params").cloned().unwrap_or(Value::Null);

    tracing::debug!(method, id = %id, "rpc request");
    match dispatch(service, method, params).await {
        Ok(result) => success_response(id, &result),
        Err(failure) => {
            tracing::debug!(method, code = failure.code, message = %failure.message, "rpc error");
            error_response(id, &failure)
        }
    }
}

/// Results travel as one text item holding the serialized result object.
fn success_response(id: Value, result: &Value) -> String {
    let response = json!({
        "jsonrpc": "2.0",
        "result": { "content": [{ "type": "text", "text": result.to_string() }] },
        "id": id,
    });
    response.to_string()
}

fn error_response(id: Value, failure: &RpcFailure) -> String {
    let response = json!({
        "jsonrpc": "2.0",
        "error": failure.to_json(),
        "id": id,
    });
    response.to_string()
}

/// Run a request handler on its own task. If it panics, answer `line` with an
/// internal error carrying the request's id.
async fn guarded<F>(line: &str, handler: F) -> String
where
    F: Future<Output = String> + Send + 'static,
{
    match tokio::spawn(handler).await {
        Ok(resp) => resp,
        Err(e) => {
            tracing::error!("request handler failed: {e}");
            let id = serde_json::from_str::<Value>(line.trim())
                .ok()
                .and_then(|v| v.get("id").cloned())
                .unwrap_or(Value::Null);
            let failure =
                RpcFailure::new(INTERNAL_ERROR, "internal_error", format!("request handler failed: {e}"));
            error_response(id, &failure)
        }
    }
}

fn log_join_failure(done: Result<(), tokio::task::JoinError>) {
    if let Err(e) = done {
        tracing::error!("request task failed: {e}");
    }
}

/// Serve requests read from `reader` until EOF, then wait for in-flight
/// requests to finish.
pub async fn serve_lines<Rd, W, R>(
    reader: Rd,
    writer: W,
    service: Arc<TabService<R>>,
) -> anyhow::Result<()>
where
    Rd: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
    R: TmuxCommandRunner + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let writer_task = tokio::spawn(async move {
        let mut writer = writer;
        while let Some(mut resp) = rx.recv().await {
            resp.push('\n');
            writer.write_all(resp.as_bytes()).await?;
            writer.flush().await?;
        }
        anyhow::Ok(())
    });

    let mut in_flight = JoinSet::new();
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        while let Some(done) = in_flight.try_join_next() {
            log_join_failure(done);
        }
        if line.trim().is_empty() {
            continue;
        }
        let service = Arc::clone(&service);
        let tx = tx.clone();
        in_flight.spawn(async move {
            let handler = {
                let line = line.clone();
                async move { handle_line(&service, &line).await }
            };
            let resp = guarded(&line, handler).await;
            // Receiver only goes away when the writer failed.
            let _ = tx.send(resp);
        });
    }
    while let Some(done) = in_flight.join_next().await {
        log_join_failure(done);
    }
    drop(tx);

    writer_task.await??;
    Ok(())
}

/// Serve on stdin/stdout. Returns when stdin reaches EOF.
pub async fn run_stdio<R: TmuxCommandRunner + 'static>(
    service: Arc<TabService<R>>,
) -> anyhow::Result<()> {
    tracing::info!("serving JSON-RPC on stdio");
    let stdin = BufReader::new(tokio::io::stdin());
    serve_lines(stdin, tokio::io::stdout(), service).await?;
    tracing::info!("stdin closed");
    Ok(())
}

/// Serve on a Unix socket. Each connection may send any number of requests.
pub async fn run_uds<R: TmuxCommandRunner + 'static>(
    socket_path: &Path,
    service: Arc<TabService<R>>,
) -> anyhow::Result<()> {
    if let Some(socket_dir) = socket_path.parent().filter(|d| !d.as_os_str().is_empty()) {
        if !socket_dir.exists() {
            std::fs::create_dir_all(socket_dir)?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                std::fs::set_permissions(socket_dir, std::fs::Permissions::from_mode(0o700))?;
            }
        }
    }

    if socket_path.exists() {
        if tokio::net::UnixStream::connect(socket_path).await.is_err() {
            std::fs::remove_file(socket_path)?;
            tracing::info!("removed stale socket at {}", socket_path.display());
        } else {
            anyhow::bail!("another server is already listening at {}", socket_path.display());
        }
    }

    let listener = UnixListener::bind(socket_path)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
    }

    tracing::info!("serving JSON-RPC on {}", socket_path.display());

    loop {
        let (stream, _) = listener.accept().await?;
        let service = Arc::clone(&service);
        tokio::spawn(async move {
            let (reader, writer) = stream.into_split();
            if let Err(e) = serve_lines(BufReader::new(reader), writer, service).await {
                tracing::debug!("connection error: {e}");
            }
        });
    }
}
