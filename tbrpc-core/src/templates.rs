//! Saved RPC request templates
//!
//! A JSON array of `{"name", "method", "params"}` objects.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Failed to read templates: {0}")]
    Read(#[from] std::io::Error),

    #[error("Failed to parse templates: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcTemplate {
    pub name: String,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// Load templates; a missing file is an empty list
pub fn load_templates(path: &Path) -> Result<Vec<RpcTemplate>, TemplateError> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

pub fn find<'a>(templates: &'a [RpcTemplate], name: &str) -> Option<&'a RpcTemplate> {
    templates.iter().find(|t| t.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_find() {
        let templates: Vec<RpcTemplate> = serde_json::from_str(
            r#"[
                {"name": "Read temperature", "method": "getTemperature", "params": {}},
                {"name": "Reboot", "method": "reboot"}
            ]"#,
        )
        .unwrap();

        let reboot = find(&templates, "Reboot").unwrap();
        assert_eq!(reboot.method, "reboot");
        assert_eq!(reboot.params, Value::Null);
        assert!(find(&templates, "Unknown").is_none());
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("templates.json");
        assert!(load_templates(&path).unwrap().is_empty());
    }
}
