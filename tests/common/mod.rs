// Common test utilities: stub external binaries and configs built around them.

use gemini_bridge::BridgeConfig;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Write an executable shell script into `dir` and return its path.
pub fn stub_binary(dir: &TempDir, name: &str, script: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", script)).unwrap();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }
    path
}

/// Build a config file pointing at `binary` with the given operation table,
/// and load it the way the server does.
pub fn config_with_operations(dir: &TempDir, binary: &Path, operations: Value) -> BridgeConfig {
    let config_path = dir.path().join("bridge.json");
    let body = serde_json::json!({
        "binary": binary.to_string_lossy(),
        "operations": operations,
    });
    std::fs::write(&config_path, serde_json::to_string_pretty(&body).unwrap()).unwrap();
    BridgeConfig::from_file(&config_path).unwrap()
}
