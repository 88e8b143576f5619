//! Append-only RPC history
//!
//! One JSON object per line, one line per invoke.

use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum LogError {
    #[error("Failed to write history: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode history record: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RecordType {
    Response,
    Error,
}

/// Terminal outcome of one invoke
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcLogRecord {
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub record_type: RecordType,
    pub method: String,
    pub params: Value,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub token_refreshed: bool,
}

pub trait LogSink {
    fn append(&mut self, record: &RpcLogRecord) -> Result<(), LogError>;
}

/// JSON-lines file sink
#[derive(Debug, Clone)]
pub struct JsonlLog {
    path: PathBuf,
}

impl JsonlLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The last `limit` records, oldest first. Lines that are not records
    /// are skipped.
    pub fn read_recent(&self, limit: usize) -> Result<Vec<RpcLogRecord>, LogError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let file = std::fs::File::open(&self.path)?;
        let mut records = Vec::new();

        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<RpcLogRecord>(&line) {
                Ok(record) => records.push(record),
                Err(e) => debug!("Skipping history line: {}", e),
            }
        }

        let skip = records.len().saturating_sub(limit);
        Ok(records.split_off(skip))
    }
}

impl LogSink for JsonlLog {
    fn append(&mut self, record: &RpcLogRecord) -> Result<(), LogError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }
}

/// Collects records in memory
#[derive(Debug, Default, Clone)]
pub struct MemoryLog {
    pub records: Vec<RpcLogRecord>,
}

impl LogSink for MemoryLog {
    fn append(&mut self, record: &RpcLogRecord) -> Result<(), LogError> {
        self.records.push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(method: &str, record_type: RecordType) -> RpcLogRecord {
        RpcLogRecord {
            timestamp: Utc::now(),
            record_type,
            method: method.to_string(),
            params: json!({"pin": 4}),
            duration_ms: 12,
            data: (record_type == RecordType::Response).then(|| json!({"ok": true})),
            error: (record_type == RecordType::Error).then(|| json!({"kind": "no_response"})),
            token_refreshed: false,
        }
    }

    #[test]
    fn test_record_wire_shape() {
        let line = serde_json::to_value(record("setGpio", RecordType::Response)).unwrap();
        assert_eq!(line["type"], "RESPONSE");
        assert_eq!(line["method"], "setGpio");
        assert_eq!(line["durationMs"], 12);
        assert_eq!(line["data"]["ok"], true);
        assert!(line.get("error").is_none());
        assert!(line.get("tokenRefreshed").is_none());
    }

    #[test]
    fn test_append_and_read_recent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("rpc-debug.log");
        let mut log = JsonlLog::new(&path);

        log.append(&record("a", RecordType::Response)).unwrap();
        log.append(&record("b", RecordType::Error)).unwrap();
        std::fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .unwrap()
            .write_all(b"{\"type\":\"REQUEST\",\"method\":\"old\"}\n")
            .unwrap();
        log.append(&record("c", RecordType::Response)).unwrap();

        let recent = log.read_recent(2).unwrap();
        let methods: Vec<_> = recent.iter().map(|r| r.method.as_str()).collect();
        assert_eq!(methods, vec!["b", "c"]);
        assert_eq!(log.read_recent(10).unwrap().len(), 3);
    }
}
