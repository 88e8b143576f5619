//! Text rendering for command output

use std::fmt::Write;

use tbrpc_core::{Device, RpcLogRecord, RpcOutcome};

/// One device row: status, name, type and id
fn device_row(out: &mut String, device: &Device, favorite: bool) {
    let _ = writeln!(
        out,
        "{} {:<8} {:<32} {:<16} {}",
        if favorite { "★" } else { "☆" },
        if device.active { "online" } else { "offline" },
        device.name,
        device.device_type.as_deref().unwrap_or("unknown"),
        device.id
    );
}

/// Favorites block first, then the rest
pub fn device_list(favorites: &[&Device], others: &[&Device]) -> String {
    let mut out = String::new();

    if favorites.is_empty() && others.is_empty() {
        out.push_str("No devices found\n");
        return out;
    }

    if !favorites.is_empty() {
        out.push_str("Favorites\n");
        for device in favorites {
            device_row(&mut out, device, true);
        }
        out.push('\n');
    }

    for device in others {
        device_row(&mut out, device, false);
    }
    out
}

pub fn outcome(outcome: &RpcOutcome) -> String {
    let pretty = |v: &serde_json::Value| {
        serde_json::to_string_pretty(v).unwrap_or_else(|_| v.to_string())
    };

    match outcome {
        RpcOutcome::Success {
            data,
            duration_ms,
            refreshed,
        } => format!(
            "Request succeeded ({}ms){}\n{}\n",
            duration_ms,
            if *refreshed { ", session token was refreshed" } else { "" },
            pretty(data)
        ),
        RpcOutcome::Error {
            kind,
            detail,
            duration_ms,
            session_expired,
        } => format!(
            "Request failed ({}ms): {:?}{}\n{}\n",
            duration_ms,
            kind,
            if *session_expired { ", session expired" } else { "" },
            pretty(detail)
        ),
    }
}

pub fn history_line(record: &RpcLogRecord) -> String {
    let body = record
        .data
        .as_ref()
        .or(record.error.as_ref())
        .map(|v| v.to_string())
        .unwrap_or_default();

    format!(
        "{} {:?} {} {}ms {} -> {}",
        record.timestamp.format("%Y-%m-%d %H:%M:%S"),
        record.record_type,
        record.method,
        record.duration_ms,
        record.params,
        body
    )
}
