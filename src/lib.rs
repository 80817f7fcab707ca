//! Gemini Bridge - bridges the Model Context Protocol to the Gemini CLI.
//!
//! Each MCP call maps to exactly one external process invocation: the
//! request is validated against a pre-registered operation table, rendered
//! into CLI arguments, and the process outcome is normalized into a
//! structured response.

pub mod bridge;
pub mod config;
pub mod error;
pub mod server;

pub use bridge::{InvocationResult, ProcessBridge, Request, Response};
pub use config::{BridgeConfig, CommandTemplate};
pub use error::{BridgeError, Result};
pub use server::{run_server, BridgeServer, InvokeToolInput};
