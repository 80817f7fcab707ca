//! Bridge configuration: the external binary, timeouts, and the
//! operation registry.
//!
//! The registry is built once at startup and handed to the bridge as an
//! immutable value. A JSON config file may override the binary and
//! timeouts and add or replace operations on top of the built-in set.

use crate::error::{BridgeError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

pub const DEFAULT_TIMEOUT_SECS: u64 = 120;
pub const MAX_TIMEOUT_SECS: u64 = 3600;
const DEFAULT_BINARY: &str = "gemini";
const DEFAULT_MODEL: &str = "gemini-2.5-pro";

/// How one operation maps onto an external command invocation.
///
/// `args` and `stdin` may contain `{name}` placeholders, filled from the
/// request parameters or from `defaults`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandTemplate {
    #[serde(default)]
    pub description: String,
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub defaults: BTreeMap<String, String>,
}

impl CommandTemplate {
    /// Placeholder names appearing in `args` and `stdin`, in order of
    /// first appearance.
    pub fn placeholders(&self) -> Vec<String> {
        let mut names = Vec::new();
        let mut push = |name: &str| {
            if !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        };
        for piece in self.args.iter().chain(self.stdin.iter()) {
            let mut rest = piece.as_str();
            while let Some(open) = rest.find('{') {
                let Some(close) = rest[open..].find('}') else {
                    break;
                };
                push(&rest[open + 1..open + close]);
                rest = &rest[open + close + 1..];
            }
        }
        names
    }
}

/// Shape of the optional JSON config file.
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    binary: Option<String>,
    default_timeout_secs: Option<u64>,
    max_timeout_secs: Option<u64>,
    #[serde(default)]
    operations: BTreeMap<String, CommandTemplate>,
}

/// Immutable configuration handed to [`ProcessBridge`](crate::bridge::ProcessBridge).
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub binary: String,
    pub default_timeout_secs: u64,
    pub max_timeout_secs: u64,
    operations: BTreeMap<String, CommandTemplate>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self::builtin()
    }
}

impl BridgeConfig {
    /// The built-in operation set, no config file involved.
    pub fn builtin() -> Self {
        Self {
            binary: binary_from_env().unwrap_or_else(|| DEFAULT_BINARY.to_string()),
            default_timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_timeout_secs: MAX_TIMEOUT_SECS,
            operations: builtin_operations(),
        }
    }

    /// Built-in set overlaid with the given JSON config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            BridgeError::Validation(format!("cannot read config file {}: {}", path.display(), e))
        })?;
        let file: ConfigFile = serde_json::from_str(&raw)
            .map_err(|e| BridgeError::Validation(format!("invalid config file: {}", e)))?;

        let mut cfg = Self::builtin();
        if let Some(binary) = file.binary {
            // GEMINI_BIN still wins over the file.
            if binary_from_env().is_none() {
                cfg.binary = binary;
            }
        }
        if let Some(t) = file.default_timeout_secs {
            cfg.default_timeout_secs = t;
        }
        if let Some(t) = file.max_timeout_secs {
            cfg.max_timeout_secs = t;
        }
        for (name, template) in file.operations {
            cfg.operations.insert(name, template);
        }
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        if self.binary.trim().is_empty() {
            return Err(BridgeError::Validation("binary must not be empty".into()));
        }
        if self.default_timeout_secs == 0 || self.max_timeout_secs == 0 {
            return Err(BridgeError::Validation("timeouts must be positive".into()));
        }
        for name in self.operations.keys() {
            if name.trim().is_empty() {
                return Err(BridgeError::Validation(
                    "operation names must not be empty".into(),
                ));
            }
        }
        Ok(())
    }

    pub fn template(&self, operation: &str) -> Option<&CommandTemplate> {
        self.operations.get(operation)
    }

    /// Registered operations, sorted by name.
    pub fn operations(&self) -> impl Iterator<Item = (&str, &CommandTemplate)> {
        self.operations.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Effective deadline for one operation, clamped to the configured cap.
    pub fn timeout_secs(&self, template: &CommandTemplate) -> u64 {
        template
            .timeout_secs
            .unwrap_or(self.default_timeout_secs)
            .min(self.max_timeout_secs)
    }
}

fn binary_from_env() -> Option<String> {
    std::env::var("GEMINI_BIN")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn template(description: &str, prompt: &str, defaults: &[(&str, &str)]) -> CommandTemplate {
    let mut map = BTreeMap::new();
    map.insert("model".to_string(), DEFAULT_MODEL.to_string());
    for (k, v) in defaults {
        map.insert((*k).to_string(), (*v).to_string());
    }
    CommandTemplate {
        description: description.to_string(),
        args: vec![
            "--model".to_string(),
            "{model}".to_string(),
            "--prompt".to_string(),
            prompt.to_string(),
        ],
        stdin: None,
        timeout_secs: None,
        defaults: map,
    }
}

/// Operations the server ships with. Each assembles a Gemini prompt from
/// the request parameters; `model` always defaults and can be overridden
/// per request.
fn builtin_operations() -> BTreeMap<String, CommandTemplate> {
    let mut ops = BTreeMap::new();

    ops.insert(
        "ask".to_string(),
        template("Send a free-form prompt to Gemini", "{prompt}", &[]),
    );

    ops.insert(
        "review".to_string(),
        template(
            "Analyze code quality, style, and potential issues",
            "You are an expert code reviewer. Analyze the provided code for \
             quality and style issues, potential bugs and security \
             vulnerabilities, performance, and maintainability. Provide \
             specific, actionable feedback with line numbers when possible.\n\n\
             Please review the following {language} code:\n\n{code}\n\n\
             Focus area: {focus}",
            &[("language", "auto-detect"), ("focus", "general")],
        ),
    );

    ops.insert(
        "plan".to_string(),
        template(
            "Review a feature plan or specification",
            "You are a senior software architect. Review the provided feature \
             plan for clarity and completeness of requirements, technical \
             feasibility, missing considerations, and edge cases. Provide \
             constructive feedback to improve the plan.\n\n\
             Feature plan:\n\n{feature_plan}\n\n\
             Context: {context}\n\nFocus areas: {focus_areas}",
            &[
                ("context", ""),
                ("focus_areas", "completeness,feasibility,clarity"),
            ],
        ),
    );

    ops.insert(
        "bug".to_string(),
        template(
            "Analyze a bug report and suggest fixes",
            "You are a debugging expert. Identify the root cause of the \
             reported issue, explain why it occurs, suggest specific fixes \
             with code examples, and recommend preventive measures.\n\n\
             Bug description: {bug_description}\n\n\
             Error logs:\n{error_logs}\n\n\
             Relevant {language} code:\n{code_context}\n\n\
             Environment: {environment}\n\n\
             Steps to reproduce: {reproduction_steps}",
            &[
                ("error_logs", ""),
                ("code_context", ""),
                ("language", "unknown"),
                ("environment", ""),
                ("reproduction_steps", ""),
            ],
        ),
    );

    ops.insert(
        "explain".to_string(),
        template(
            "Explain code functionality and implementation",
            "You are a technical educator. Explain what the provided code \
             does, how it works step by step, the key concepts and patterns \
             used, and potential improvements. Adjust the explanation to the \
             requested detail level.\n\n\
             Please explain this {language} code:\n\n{code}\n\n\
             Detail level: {detail_level}\nSpecific questions: {questions}",
            &[
                ("language", "auto-detect"),
                ("detail_level", "intermediate"),
                ("questions", ""),
            ],
        ),
    );

    ops
}
