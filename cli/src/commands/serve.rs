use std::future::Future;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use syncbridge_core::api::{BridgeError, CommandResponse, SyncBridge};
use syncbridge_plugins::surface::jsonl::STDOUT_TARGET;
use syncbridge_plugins::surface::{start_jsonl_writer, JsonlSurface, JsonlWriter};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::task::JoinSet;

use super::cli::ServeArgs;
use crate::error::CliError;

/// One line of input: `{"id"?, "command", "args"?}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Request {
    #[serde(default)]
    pub id: Option<Value>,
    pub command: String,
    #[serde(default)]
    pub args: Value,
}

pub fn parse_request(line: &str) -> Result<Request, String> {
    serde_json::from_str(line).map_err(|e| e.to_string())
}

/// Turns one raw input line into a request. `None` for blank lines.
fn decode_line(raw: Vec<u8>) -> Option<Result<Request, String>> {
    let line = match String::from_utf8(raw) {
        Ok(line) => line,
        Err(e) => return Some(Err(format!("line is not valid UTF-8: {}", e.utf8_error()))),
    };
    let line = line.trim_end_matches(['\n', '\r']);
    if line.trim().is_empty() {
        return None;
    }
    Some(parse_request(line))
}

/// `{"type":"response","id":..}` merged with the response fields.
pub fn response_line(id: Option<&Value>, resp: &CommandResponse) -> Value {
    let mut line = json!({ "type": "response", "id": id });
    let fields = serde_json::to_value(resp);
    if let (Some(obj), Ok(Value::Object(fields))) = (line.as_object_mut(), fields) {
        obj.extend(fields);
    }
    line
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ServeStats {
    pub requests: usize,
    pub rejected: usize,
}

/// Dispatches every request line concurrently until EOF or `shutdown`
/// resolves, then waits for in-flight requests and destroys the bridge.
pub async fn serve_lines<R, S>(
    bridge: Arc<SyncBridge>,
    out: JsonlWriter,
    input: R,
    shutdown: S,
) -> Result<ServeStats, CliError>
where
    R: AsyncBufRead + Unpin,
    S: Future<Output = ()>,
{
    let mut input = input;
    let mut buf = Vec::new();
    let mut inflight = JoinSet::new();
    let mut stats = ServeStats::default();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("interrupted, shutting down");
                break;
            }
            // partial reads stay in `buf` if another branch wins
            read = input.read_until(b'\n', &mut buf) => {
                let eof = read? == 0;
                if buf.is_empty() {
                    if eof {
                        tracing::debug!("stdin closed");
                        break;
                    }
                    continue;
                }
                let raw = std::mem::take(&mut buf);
                let Some(parsed) = decode_line(raw) else {
                    continue;
                };
                stats.requests += 1;
                match parsed {
                    Ok(req) => {
                        let bridge = bridge.clone();
                        let out = out.clone();
                        inflight.spawn(async move {
                            let resp = bridge.dispatch(&req.command, req.args).await;
                            out.send_value(&response_line(req.id.as_ref(), &resp)).await;
                        });
                    }
                    Err(e) => {
                        stats.rejected += 1;
                        let err = BridgeError::validation(format!("invalid request: {e}"));
                        out.send_value(&response_line(None, &CommandResponse::failure(&err)))
                            .await;
                    }
                }
                if eof {
                    tracing::debug!("stdin closed");
                    break;
                }
            }
            Some(done) = inflight.join_next(), if !inflight.is_empty() => {
                if let Err(e) = done {
                    tracing::warn!("request task failed: {}", e);
                }
            }
        }
    }

    // nobody is left to answer a conflict; parked syncs must not wait out
    // the timeout. Commands stay bound until in-flight requests drain.
    bridge.conflicts().shutdown();
    while let Some(done) = inflight.join_next().await {
        if let Err(e) = done {
            tracing::warn!("request task failed: {}", e);
        }
    }
    bridge.destroy();
    Ok(stats)
}

pub async fn run_serve(bridge: Arc<SyncBridge>, args: &ServeArgs) -> Result<i32, CliError> {
    let (out, writer_task) = start_jsonl_writer(STDOUT_TARGET, args.output_capacity, false)
        .await
        .map_err(CliError::Startup)?;
    bridge
        .surfaces()
        .open(JsonlSurface::new(args.surface_id.clone(), out.clone()));

    let shutdown = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };
    let stdin = BufReader::new(tokio::io::stdin());
    let stats = serve_lines(bridge.clone(), out, stdin, shutdown).await?;

    bridge.surfaces().close(&args.surface_id);
    if let Err(e) = writer_task.await {
        tracing::warn!("output writer failed: {}", e);
    }
    tracing::info!(
        requests = stats.requests,
        rejected = stats.rejected,
        "serve finished"
    );
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use syncbridge_core::api::{ConflictConfig, SurfaceSet};
    use syncbridge_plugins::engine::LocalMirrorEngine;
    use tempfile::tempdir;

    #[test]
    fn test_parse_request() {
        let req = parse_request(r#"{"id":7,"command":"get-status"}"#).unwrap();
        assert_eq!(req.id, Some(json!(7)));
        assert_eq!(req.command, "get-status");
        assert_eq!(req.args, Value::Null);
        assert!(parse_request(r#"{"args":{}}"#).is_err());
    }

    #[test]
    fn test_decode_line() {
        assert_eq!(decode_line(b"  \r\n".to_vec()), None);
        let req = decode_line(b"{\"command\":\"disable\"}\r\n".to_vec())
            .unwrap()
            .unwrap();
        assert_eq!(req.command, "disable");
        let err = decode_line(b"{\"command\":\"\xff\xfe\"}\n".to_vec())
            .unwrap()
            .unwrap_err();
        assert!(err.contains("not valid UTF-8"));
    }

    #[test]
    fn test_response_line_shape() {
        let err = BridgeError::NotFound;
        let line = response_line(Some(&json!("a")), &CommandResponse::failure(&err));
        assert_eq!(
            line,
            json!({
                "type": "response",
                "id": "a",
                "success": false,
                "error": "conflict not found or already resolved",
                "errorCode": "not_found",
            })
        );
    }

    #[tokio::test]
    async fn test_serve_answers_each_request() {
        let dir = tempdir().unwrap();
        let engine = LocalMirrorEngine::open(dir.path().join("data"), dir.path().join("state"))
            .await
            .unwrap();
        let bridge = Arc::new(SyncBridge::new(
            Arc::new(engine),
            Arc::new(SurfaceSet::new()),
            &ConflictConfig::default(),
        ));
        bridge.initialize();

        let out_path = dir.path().join("out.jsonl");
        let (out, writer_task) = start_jsonl_writer(&out_path.to_string_lossy(), 64, false)
            .await
            .unwrap();
        let input = concat!(
            r#"{"id":1,"command":"get-status"}"#,
            "\n",
            "not json\n",
            "\n",
            r#"{"id":"x","command":"resolve-conflict","args":{"conflictId":"conflict_9","resolution":"local"}}"#,
            "\n",
        );

        let stats = serve_lines(
            bridge.clone(),
            out,
            input.as_bytes(),
            std::future::pending::<()>(),
        )
        .await
        .unwrap();
        writer_task.await.unwrap();

        assert_eq!(stats, ServeStats { requests: 3, rejected: 1 });
        assert!(!bridge.is_initialized());

        let lines: Vec<Value> = std::fs::read_to_string(&out_path)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 3);
        let by_id = |id: Value| lines.iter().find(|l| l["id"] == id).unwrap().clone();
        assert_eq!(by_id(json!(1))["data"]["state"], json!("disabled"));
        assert_eq!(
            by_id(json!("x"))["error"],
            json!("conflict not found or already resolved")
        );
        assert_eq!(by_id(Value::Null)["errorCode"], json!("validation_error"));
    }

    #[tokio::test]
    async fn test_non_utf8_line_is_rejected_and_serving_continues() {
        let dir = tempdir().unwrap();
        let engine = LocalMirrorEngine::open(dir.path().join("data"), dir.path().join("state"))
            .await
            .unwrap();
        let bridge = Arc::new(SyncBridge::new(
            Arc::new(engine),
            Arc::new(SurfaceSet::new()),
            &ConflictConfig::default(),
        ));
        bridge.initialize();

        let out_path = dir.path().join("out.jsonl");
        let (out, writer_task) = start_jsonl_writer(&out_path.to_string_lossy(), 64, false)
            .await
            .unwrap();
        let mut input: Vec<u8> = b"{\"id\":1,\"command\":\"".to_vec();
        input.extend_from_slice(&[0xff, 0xfe]);
        input.extend_from_slice(b"\"}\n{\"id\":2,\"command\":\"get-status\"}");

        let stats = serve_lines(
            bridge.clone(),
            out,
            input.as_slice(),
            std::future::pending::<()>(),
        )
        .await
        .unwrap();
        writer_task.await.unwrap();

        assert_eq!(stats, ServeStats { requests: 2, rejected: 1 });
        let lines: Vec<Value> = std::fs::read_to_string(&out_path)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        let rejected = lines.iter().find(|l| l["id"].is_null()).unwrap();
        assert_eq!(rejected["success"], json!(false));
        assert!(rejected["error"]
            .as_str()
            .unwrap()
            .starts_with("invalid request: line is not valid UTF-8"));
        let status = lines.iter().find(|l| l["id"] == json!(2)).unwrap();
        assert_eq!(status["success"], json!(true));
    }
}
