use serde_json::Value;
use syncbridge_core::api::SyncBridge;

use super::cli::CallArgs;
use crate::error::CliError;

/// `--args` must be a JSON object; absent or blank means no arguments.
pub fn parse_call_args(raw: Option<&str>) -> Result<Value, CliError> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(Value::Null);
    };
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| CliError::Args(format!("--args is not valid JSON: {e}")))?;
    if value.is_object() || value.is_null() {
        Ok(value)
    } else {
        Err(CliError::Args("--args must be a JSON object".to_string()))
    }
}

/// Dispatches one command and prints the response. Exits 1 when the command
/// reported a failure.
pub async fn run_call(bridge: &SyncBridge, args: &CallArgs) -> Result<i32, CliError> {
    let payload = parse_call_args(args.args.as_deref())?;
    let resp = bridge.dispatch(&args.command, payload).await;

    let text = if args.pretty {
        serde_json::to_string_pretty(&resp)
    } else {
        serde_json::to_string(&resp)
    }
    .map_err(anyhow::Error::from)?;
    println!("{text}");

    Ok(if resp.success { 0 } else { 1 })
}
