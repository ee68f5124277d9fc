//! Call-record delivery to the downstream collaborator.

use crate::error::{CallError, CallResult};
use crate::recorder::CallRecord;
use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;
use tracing::info;

/// Where the finished call record goes.
#[async_trait]
pub trait RecordSink: Send + Sync {
    async fn deliver(&self, record: &CallRecord) -> CallResult<()>;
}

/// POSTs the record as JSON to the configured webhook.
#[derive(Debug, Clone)]
pub struct WebhookSink {
    url: String,
    client: reqwest::Client,
}

impl WebhookSink {
    pub fn new(url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            url: url.into(),
            client,
        }
    }
}

#[async_trait]
impl RecordSink for WebhookSink {
    async fn deliver(&self, record: &CallRecord) -> CallResult<()> {
        let res = self
            .client
            .post(&self.url)
            .json(record)
            .send()
            .await
            .map_err(|e| CallError::Delivery(format!("webhook {}: {}", self.url, e)))?;

        let status = res.status();
        if !status.is_success() {
            return Err(CallError::Delivery(format!(
                "webhook {} returned {}",
                self.url, status
            )));
        }
        info!("📡 call record delivered to {} ({})", self.url, status);
        Ok(())
    }
}

/// Collects records in memory. Test double.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<CallRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<CallRecord> {
        self.records.lock().expect("records lock").clone()
    }
}

#[async_trait]
impl RecordSink for MemorySink {
    async fn deliver(&self, record: &CallRecord) -> CallResult<()> {
        self.records.lock().expect("records lock").push(record.clone());
        Ok(())
    }
}
