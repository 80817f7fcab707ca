//! Process bridge: one structured request, one external process invocation.

use crate::config::{BridgeConfig, CommandTemplate};
use crate::error::{BridgeError, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;
use uuid::Uuid;

/// One incoming call: an operation name plus named scalar parameters.
#[derive(Debug, Clone)]
pub struct Request {
    pub operation: String,
    pub params: HashMap<String, Value>,
    /// Caller-supplied deadline override, clamped to the configured cap.
    pub timeout_secs: Option<u64>,
}

impl Request {
    pub fn new(operation: impl Into<String>, params: HashMap<String, Value>) -> Self {
        Self {
            operation: operation.into(),
            params,
            timeout_secs: None,
        }
    }
}

/// Raw outcome of one process run. The status is set exactly once, after
/// the process has terminated.
#[derive(Debug, Clone)]
pub struct InvocationResult {
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

/// Successful outcome surfaced to the caller. The payload is the
/// process's stdout, captured verbatim and otherwise treated as opaque
/// text.
#[derive(Debug, Clone)]
pub struct Response {
    pub operation: String,
    pub payload: String,
    pub status: i32,
    pub duration: Duration,
}

/// Executes one external command per request and normalizes the outcome.
///
/// Holds only the immutable configuration, so concurrent `invoke` calls
/// share nothing mutable: each owns its child process and buffers.
#[derive(Debug, Clone)]
pub struct ProcessBridge {
    config: Arc<BridgeConfig>,
}

impl ProcessBridge {
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Resolve the configured binary to an executable path.
    ///
    /// Paths with a directory component are taken as-is; bare names go
    /// through a PATH lookup.
    pub fn resolve_binary(&self) -> Result<String> {
        let binary = &self.config.binary;
        if Path::new(binary).components().count() > 1 {
            return Ok(binary.clone());
        }
        which::which(binary)
            .map(|p| p.to_string_lossy().to_string())
            .map_err(|e| {
                BridgeError::Spawn(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("{}: {}", binary, e),
                ))
            })
    }

    /// Execute one request: validate, render, spawn, collect, classify.
    ///
    /// Validation failures never reach the OS. On timeout the child is
    /// killed and any partial output is discarded.
    pub async fn invoke(&self, request: &Request) -> Result<Response> {
        let request_id = Uuid::new_v4();

        let template = self.validate(request)?;
        let args = render_args(template, &request.params)?;
        let stdin_payload = template
            .stdin
            .as_deref()
            .map(|t| render(t, template, &request.params))
            .transpose()?;

        let binary = self.resolve_binary()?;
        let timeout_secs = request
            .timeout_secs
            .unwrap_or_else(|| self.config.timeout_secs(template))
            .min(self.config.max_timeout_secs);

        tracing::debug!(
            %request_id,
            operation = %request.operation,
            %binary,
            timeout_secs,
            "spawning external process"
        );

        let outcome = run_process(&binary, &args, stdin_payload, timeout_secs).await?;
        tracing::debug!(
            %request_id,
            status = ?outcome.status,
            duration_ms = outcome.duration.as_millis() as u64,
            "process finished"
        );

        match outcome.status {
            Some(0) => Ok(Response {
                operation: request.operation.clone(),
                payload: outcome.stdout,
                status: 0,
                duration: outcome.duration,
            }),
            status => Err(BridgeError::External {
                status,
                stderr: outcome.stderr,
            }),
        }
    }

    fn validate(&self, request: &Request) -> Result<&CommandTemplate> {
        if request.operation.trim().is_empty() {
            return Err(BridgeError::Validation(
                "operation name must not be empty".into(),
            ));
        }
        let Some(template) = self.config.template(&request.operation) else {
            return Err(BridgeError::Validation(format!(
                "unknown operation: {}",
                request.operation
            )));
        };
        for (name, value) in &request.params {
            if !matches!(value, Value::String(_) | Value::Number(_) | Value::Bool(_)) {
                return Err(BridgeError::Validation(format!(
                    "parameter `{}` must be a string, number, or boolean",
                    name
                )));
            }
        }
        Ok(template)
    }
}

/// Spawn the process and collect its full output under a deadline.
///
/// `kill_on_drop` ensures the child is terminated on every exit path,
/// including timeout and caller cancellation.
async fn run_process(
    binary: &str,
    args: &[String],
    stdin_payload: Option<String>,
    timeout_secs: u64,
) -> Result<InvocationResult> {
    let mut cmd = Command::new(binary);
    cmd.args(args)
        .stdin(if stdin_payload.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let start = Instant::now();
    let mut child = cmd.spawn()?;

    // Feed stdin from a separate task so a large payload cannot deadlock
    // against the child filling its output pipes.
    if let Some(payload) = stdin_payload {
        let mut stdin = child.stdin.take().ok_or_else(|| {
            BridgeError::Spawn(std::io::Error::other("child stdin was not captured"))
        })?;
        tokio::spawn(async move {
            if let Err(e) = stdin.write_all(payload.as_bytes()).await {
                tracing::warn!("failed to write stdin payload: {}", e);
            }
            let _ = stdin.shutdown().await;
        });
    }

    match timeout(Duration::from_secs(timeout_secs), child.wait_with_output()).await {
        Ok(Ok(output)) => Ok(InvocationResult {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration: start.elapsed(),
        }),
        Ok(Err(e)) => Err(BridgeError::Spawn(e)),
        Err(_) => {
            // Dropping the wait future drops the child, which kills it.
            Err(BridgeError::Timeout { secs: timeout_secs })
        }
    }
}

/// Render every argument of the template against the request parameters.
fn render_args(template: &CommandTemplate, params: &HashMap<String, Value>) -> Result<Vec<String>> {
    template
        .args
        .iter()
        .map(|arg| render(arg, template, params))
        .collect()
}

/// Substitute `{name}` placeholders from the request parameters, falling
/// back to template defaults. A placeholder with neither is a validation
/// error.
fn render(text: &str, template: &CommandTemplate, params: &HashMap<String, Value>) -> Result<String> {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let Some(close) = rest[open..].find('}') else {
            return Err(BridgeError::Validation(format!(
                "unterminated placeholder in template: {}",
                text
            )));
        };
        let name = &rest[open + 1..open + close];
        match params.get(name) {
            Some(value) => out.push_str(&scalar_to_string(name, value)?),
            None => match template.defaults.get(name) {
                Some(default) => out.push_str(default),
                None => {
                    return Err(BridgeError::Validation(format!(
                        "missing required parameter: {}",
                        name
                    )));
                }
            },
        }
        rest = &rest[open + close + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

fn scalar_to_string(name: &str, value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        _ => Err(BridgeError::Validation(format!(
            "parameter `{}` must be a string, number, or boolean",
            name
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn params(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn plain_template(args: &[&str]) -> CommandTemplate {
        CommandTemplate {
            description: String::new(),
            args: args.iter().map(|s| s.to_string()).collect(),
            stdin: None,
            timeout_secs: None,
            defaults: BTreeMap::new(),
        }
    }

    #[test]
    fn render_substitutes_params() {
        let t = plain_template(&["--prompt", "{prompt}"]);
        let args = render_args(&t, &params(&[("prompt", json!("2+2"))])).unwrap();
        assert_eq!(args, vec!["--prompt", "2+2"]);
    }

    #[test]
    fn render_coerces_numbers_and_bools() {
        let t = plain_template(&["{n}", "{b}"]);
        let args = render_args(&t, &params(&[("n", json!(3)), ("b", json!(true))])).unwrap();
        assert_eq!(args, vec!["3", "true"]);
    }

    #[test]
    fn render_falls_back_to_defaults() {
        let mut t = plain_template(&["{language}"]);
        t.defaults
            .insert("language".to_string(), "auto-detect".to_string());
        let args = render_args(&t, &HashMap::new()).unwrap();
        assert_eq!(args, vec!["auto-detect"]);
    }

    #[test]
    fn render_rejects_missing_parameter() {
        let t = plain_template(&["{prompt}"]);
        let err = render_args(&t, &HashMap::new()).unwrap_err();
        assert_eq!(err.kind(), "validation");
        assert!(err.to_string().contains("prompt"));
    }

    #[test]
    fn render_rejects_unterminated_placeholder() {
        let t = plain_template(&["{prompt"]);
        assert!(render_args(&t, &HashMap::new()).is_err());
    }

    #[tokio::test]
    async fn unknown_operation_is_validation_error() {
        let bridge = ProcessBridge::new(BridgeConfig::builtin());
        let err = bridge
            .invoke(&Request::new("no-such-op", HashMap::new()))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "validation");
    }

    #[tokio::test]
    async fn empty_operation_is_validation_error() {
        let bridge = ProcessBridge::new(BridgeConfig::builtin());
        let err = bridge
            .invoke(&Request::new("  ", HashMap::new()))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "validation");
    }

    #[tokio::test]
    async fn non_scalar_parameter_is_validation_error() {
        let bridge = ProcessBridge::new(BridgeConfig::builtin());
        let err = bridge
            .invoke(&Request::new(
                "ask",
                params(&[("prompt", json!(["not", "scalar"]))]),
            ))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "validation");
    }

    #[tokio::test]
    async fn missing_binary_is_spawn_error() {
        let mut cfg = BridgeConfig::builtin();
        cfg.binary = "gemini-bridge-test-no-such-binary".to_string();
        let bridge = ProcessBridge::new(cfg);
        let err = bridge
            .invoke(&Request::new("ask", params(&[("prompt", json!("hi"))])))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "spawn");
    }
}
