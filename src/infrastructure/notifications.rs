//! Operator notification sinks

use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;
use tracing::info;

use crate::domain::external::NotificationSink;
use crate::shared::errors::AppError;

/// Writes every notification to the log
#[derive(Debug, Default)]
pub struct LogNotificationSink;

#[async_trait]
impl NotificationSink for LogNotificationSink {
    async fn send(&self, message: &str) -> Result<(), AppError> {
        info!("📣 {}", message);
        Ok(())
    }
}

/// POSTs `{"text": message}` to a webhook (Slack/Discord compatible)
pub struct WebhookNotificationSink {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotificationSink {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::ConfigError(format!("Failed to build webhook client: {}", e)))?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }

    pub fn payload(message: &str) -> serde_json::Value {
        json!({ "text": message, "content": message })
    }
}

#[async_trait]
impl NotificationSink for WebhookNotificationSink {
    async fn send(&self, message: &str) -> Result<(), AppError> {
        let response = self
            .client
            .post(&self.url)
            .json(&Self::payload(message))
            .send()
            .await
            .map_err(|e| AppError::Unknown(format!("Webhook request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::Unknown(format!("Webhook returned HTTP {}", response.status())));
        }
        Ok(())
    }
}

/// Fans one message out to several sinks; succeeds if any sink accepted it
pub struct MultiNotificationSink {
    sinks: Vec<Box<dyn NotificationSink>>,
}

impl MultiNotificationSink {
    pub fn new(sinks: Vec<Box<dyn NotificationSink>>) -> Self {
        Self { sinks }
    }
}

#[async_trait]
impl NotificationSink for MultiNotificationSink {
    async fn send(&self, message: &str) -> Result<(), AppError> {
        let mut last_error = None;
        let mut delivered = false;
        for sink in &self.sinks {
            match sink.send(message).await {
                Ok(()) => delivered = true,
                Err(e) => last_error = Some(e),
            }
        }
        match last_error {
            Some(e) if !delivered => Err(e),
            _ => Ok(()),
        }
    }
}
