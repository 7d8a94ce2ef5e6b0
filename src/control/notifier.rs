/// Toggle notifications
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::control::{InvocationSource, WorkerAction};
use crate::error::{PipelineError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub subject: String,
    pub action: WorkerAction,
    #[serde(rename = "desiredCount")]
    pub desired_count: u32,
    pub source: InvocationSource,
    pub service: String,
    pub timestamp: DateTime<Utc>,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn publish(&self, notification: &Notification) -> Result<()>;
}

/// Appends one JSON line per notification
pub struct JsonlNotifier {
    path: PathBuf,
}

impl JsonlNotifier {
    pub fn new(path: impl AsRef<Path>) -> Self {
        JsonlNotifier {
            path: path.as_ref().to_path_buf(),
        }
    }

    async fn append(&self, line: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.write_all(b"\n").await?;
        file.flush().await
    }
}

#[async_trait]
impl Notifier for JsonlNotifier {
    async fn publish(&self, notification: &Notification) -> Result<()> {
        let line = serde_json::to_string(notification)?;
        self.append(&line)
            .await
            .map_err(|e| PipelineError::Notification(format!("{}: {}", self.path.display(), e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unwritable_log_is_notification_error() {
        let missing_dir = std::env::temp_dir()
            .join(format!("quoteflow-missing-{}", Uuid::new_v4()))
            .join("notify.jsonl");
        let notifier = JsonlNotifier::new(&missing_dir);

        let notification = Notification {
            id: Uuid::new_v4(),
            subject: "Stock worker turned OFF".to_string(),
            action: WorkerAction::Off,
            desired_count: 0,
            source: InvocationSource::Scheduler,
            service: "stock-worker".to_string(),
            timestamp: Utc::now(),
        };

        let err = notifier.publish(&notification).await.unwrap_err();
        assert!(matches!(err, PipelineError::Notification(_)));
        assert!(!err.is_recoverable());
    }
}
