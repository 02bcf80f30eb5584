//! Structured Audit Logger
//!
//! Emits one JSON record per line on stderr for every policy violation or
//! hard block. These records are the guard's security audit trail and are
//! distinct from `tracing` diagnostics.

use crate::core::policy::ViolationMode;
use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditEvent {
    /// A validator rejected a sink argument.
    Violation,
    /// The sink was hard-denied (forbidden function or `yaml.load`).
    Blocked,
}

/// One violation record, serialized verbatim to the error stream.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    pub ts: f64,
    pub event: AuditEvent,
    pub sink: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validator: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<&'static str>,
    pub taint_flow: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub basename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<&'static str>,
}

impl AuditEntry {
    pub fn violation(
        sink: &str,
        validator: &str,
        msg: &str,
        mode: ViolationMode,
        taint_flow: Vec<String>,
    ) -> Self {
        Self {
            ts: AuditLogger::now(),
            event: AuditEvent::Violation,
            sink: sink.to_string(),
            validator: Some(validator.to_string()),
            msg: Some(msg.to_string()),
            mode: Some(mode.as_str()),
            taint_flow,
            basename: None,
            full_path: None,
            reason: None,
            // sanitize is reserved; record that it was handled as warn
            note: matches!(mode, ViolationMode::Sanitize)
                .then_some("sanitize not implemented; treated as warn"),
        }
    }

    pub fn blocked(sink: &str, reason: &str, taint_flow: Vec<String>) -> Self {
        Self {
            ts: AuditLogger::now(),
            event: AuditEvent::Blocked,
            sink: sink.to_string(),
            validator: None,
            msg: None,
            mode: None,
            taint_flow,
            basename: None,
            full_path: None,
            reason: Some(reason.to_string()),
            note: None,
        }
    }

    /// Attach the basename/full-path pair recorded for file-open violations.
    pub fn with_paths(mut self, basename: &str, full_path: &str) -> Self {
        self.basename = Some(basename.to_string());
        self.full_path = Some(full_path.to_string());
        self
    }
}

pub struct AuditLogger;

impl AuditLogger {
    pub fn log(entry: &AuditEntry) {
        if let Ok(json) = serde_json::to_string(entry) {
            eprintln!("{json}");
        }
    }

    pub fn now() -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64()
    }
}
