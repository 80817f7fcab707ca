//! MCP server surface for the process bridge.

use crate::bridge::{ProcessBridge, Request};
use crate::config::BridgeConfig;
use crate::error::BridgeError;
use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::*;
use rmcp::schemars::{self, JsonSchema};
use rmcp::{tool, tool_handler, tool_router, ErrorData as McpError, ServiceExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Input parameters for the `invoke` tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[schemars(description = "Parameters for invoking a registered Gemini operation")]
pub struct InvokeToolInput {
    /// Name of a registered operation (see `list_operations`).
    #[schemars(description = "Registered operation name, e.g. `ask` or `review`")]
    pub operation: String,

    /// Named parameters substituted into the operation's command template.
    #[schemars(description = "Named parameters (strings, numbers, booleans)")]
    #[serde(default)]
    pub params: HashMap<String, Value>,

    /// Optional deadline override in seconds.
    #[schemars(description = "Deadline override in seconds (clamped to the server cap)")]
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// Wire body for both success and error outcomes of `invoke`.
#[derive(Debug, Serialize, Deserialize)]
struct InvokeOutput {
    success: bool,
    operation: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    payload: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    exit_status: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stderr: Option<String>,
}

impl InvokeOutput {
    fn failure(operation: &str, err: &BridgeError) -> Self {
        let (exit_status, stderr) = match err {
            BridgeError::External { status, stderr } => (*status, Some(stderr.clone())),
            _ => (None, None),
        };
        Self {
            success: false,
            operation: operation.to_string(),
            payload: None,
            exit_status,
            duration_ms: None,
            error: Some(err.to_string()),
            error_kind: Some(err.kind().to_string()),
            stderr,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct OperationInfo {
    name: String,
    description: String,
    parameters: Vec<String>,
    defaults: HashMap<String, String>,
}

/// The bridge MCP server.
#[derive(Clone)]
pub struct BridgeServer {
    bridge: ProcessBridge,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl BridgeServer {
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            bridge: ProcessBridge::new(config),
            tool_router: Self::tool_router(),
        }
    }

    #[tool(
        name = "invoke",
        description = "Runs a registered Gemini CLI operation and returns its output.

**Return structure:**
- `success`: boolean indicating execution status
- `operation`: the operation that was invoked
- `payload`: the process's stdout when `success=true`
- `exit_status` / `stderr`: set when the process ran but failed
- `duration_ms`: wall-clock duration of the process
- `error` / `error_kind`: description and classification when `success=false`
  (`validation`, `spawn`, `timeout`, or `external`)

**Best practices:**
- Call `list_operations` first to discover operation names and their parameters
- Parameters must be strings, numbers, or booleans
- Only pass `timeout_secs` when the default deadline is known to be too short"
    )]
    async fn invoke(
        &self,
        Parameters(input): Parameters<InvokeToolInput>,
    ) -> Result<CallToolResult, McpError> {
        let mut request = Request::new(input.operation.clone(), input.params);
        request.timeout_secs = input.timeout_secs;

        let output = match self.bridge.invoke(&request).await {
            Ok(response) => InvokeOutput {
                success: true,
                operation: response.operation,
                payload: Some(response.payload),
                exit_status: Some(response.status),
                duration_ms: Some(response.duration.as_millis() as u64),
                error: None,
                error_kind: None,
                stderr: None,
            },
            Err(e) => {
                tracing::warn!(operation = %input.operation, kind = e.kind(), "invoke failed: {}", e);
                InvokeOutput::failure(&input.operation, &e)
            }
        };

        let json_str = serde_json::to_string(&output).map_err(|e| {
            McpError::internal_error(format!("failed to serialize output: {}", e), None)
        })?;
        Ok(CallToolResult::success(vec![Content::text(json_str)]))
    }

    #[tool(
        name = "list_operations",
        description = "Lists the registered operations with their parameters and defaults."
    )]
    async fn list_operations(&self) -> Result<CallToolResult, McpError> {
        let operations: Vec<OperationInfo> = self
            .bridge
            .config()
            .operations()
            .map(|(name, template)| OperationInfo {
                name: name.to_string(),
                description: template.description.clone(),
                parameters: template.placeholders(),
                defaults: template
                    .defaults
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            })
            .collect();

        let json_str = serde_json::to_string(&operations).map_err(|e| {
            McpError::internal_error(format!("failed to serialize output: {}", e), None)
        })?;
        Ok(CallToolResult::success(vec![Content::text(json_str)]))
    }
}

#[tool_handler]
impl rmcp::ServerHandler for BridgeServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Gemini Bridge MCP Server - runs registered Gemini CLI operations. \
                 Use `list_operations` to discover operations, then `invoke` to run one."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

/// Create and run the MCP server over stdio transport.
pub async fn run_server(config: BridgeConfig) -> anyhow::Result<()> {
    tracing::info!("Starting Gemini Bridge MCP server...");

    let server = BridgeServer::new(config);
    let service = server.serve(rmcp::transport::stdio()).await?;

    tracing::info!("Gemini Bridge MCP server is running");

    service.waiting().await?;

    tracing::info!("Gemini Bridge MCP server shutting down");
    Ok(())
}
