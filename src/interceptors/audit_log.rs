//! Audit log interceptor
//!
//! Appends one JSONL line per request start and completion. Payloads and
//! results are never written.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::{InterceptorDecision, RequestContext, RequestInterceptor};
use crate::error::ErrorCode;
use crate::Result;

/// Entry in the audit log
#[derive(Debug, Serialize)]
struct AuditEntry<'a> {
    timestamp: DateTime<Utc>,
    entry_type: &'static str,
    request_type: &'static str,
    correlation_id: &'a str,
    chain_id: Option<&'a str>,
    method: Option<&'a str>,
    error_code: Option<ErrorCode>,
    duration_ms: u64,
    status: &'static str,
}

/// Writer for audit log entries
struct AuditLogWriter {
    path: PathBuf,
}

impl AuditLogWriter {
    fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn write(&self, entry: &AuditEntry<'_>) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        let json = serde_json::to_string(entry)?;
        writeln!(file, "{}", json)?;
        Ok(())
    }
}

/// Interceptor that logs all requests to a file
pub struct AuditLogInterceptor {
    writer: Arc<Mutex<AuditLogWriter>>,
}

impl AuditLogInterceptor {
    /// # Arguments
    /// * `log_path` - Path to the audit log file (JSONL format)
    pub fn new(log_path: impl Into<PathBuf>) -> Self {
        Self {
            writer: Arc::new(Mutex::new(AuditLogWriter::new(log_path.into()))),
        }
    }

    async fn append(&self, entry: &AuditEntry<'_>) {
        let writer = self.writer.lock().await;
        if let Err(e) = writer.write(entry) {
            tracing::warn!(error = %e, "Failed to write audit log entry");
        }
    }
}

fn entry<'a>(
    context: &'a RequestContext,
    entry_type: &'static str,
    status: &'static str,
) -> AuditEntry<'a> {
    AuditEntry {
        timestamp: Utc::now(),
        entry_type,
        request_type: context.request_type.as_str(),
        correlation_id: &context.correlation_id,
        chain_id: context.chain_id.as_deref(),
        method: context.method.as_deref(),
        error_code: None,
        duration_ms: 0,
        status,
    }
}

#[async_trait]
impl RequestInterceptor for AuditLogInterceptor {
    async fn intercept_request(&self, context: &RequestContext) -> Result<InterceptorDecision> {
        self.append(&entry(context, "request_start", "pending")).await;

        // Audit logging never blocks
        Ok(InterceptorDecision::Allow)
    }

    async fn on_request_complete(
        &self,
        context: &RequestContext,
        result: &Result<Value>,
        duration_ms: u64,
    ) {
        let (status, error_code) = match result {
            Ok(_) => ("success", None),
            Err(e) => ("error", Some(e.code())),
        };
        let mut line = entry(context, "request_complete", status);
        line.error_code = error_code;
        line.duration_ms = duration_ms;
        self.append(&line).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::protocol::RequestType;
    use crate::Error;
    use serde_json::json;
    use tempfile::NamedTempFile;

    fn context() -> RequestContext {
        RequestContext {
            request_type: RequestType::EvmRequest,
            correlation_id: "abc-1".to_string(),
            chain_id: Some("1".to_string()),
            method: Some("personal_sign".to_string()),
        }
    }

    #[tokio::test]
    async fn test_logs_request() {
        let temp_file = NamedTempFile::new().unwrap();
        let interceptor = AuditLogInterceptor::new(temp_file.path());
        let context = context();

        // Should always allow
        let decision = interceptor.intercept_request(&context).await.unwrap();
        assert_eq!(decision, InterceptorDecision::Allow);

        interceptor
            .on_request_complete(&context, &Ok(json!("0xsecret-signature")), 150)
            .await;
        interceptor
            .on_request_complete(&context, &Err(Error::Locked), 3)
            .await;

        let content = std::fs::read_to_string(temp_file.path()).unwrap();
        let lines: Vec<Value> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["entry_type"], "request_start");
        assert_eq!(lines[1]["status"], "success");
        assert_eq!(lines[2]["error_code"], "LOCKED");
        assert_eq!(lines[2]["method"], "personal_sign");
        assert!(!content.contains("0xsecret-signature"));
    }
}
