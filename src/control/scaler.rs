/// Desired-count scaling for the worker service, persisted as a small JSON state file
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceState {
    pub desired_count: u32,
    pub updated_at: DateTime<Utc>,
}

impl ServiceState {
    pub fn is_running(&self) -> bool {
        self.desired_count > 0
    }
}

#[async_trait]
pub trait ServiceScaler: Send + Sync {
    fn service_name(&self) -> &str;

    async fn set_desired_count(&self, desired_count: u32) -> Result<ServiceState>;

    /// Last applied state, None if never set
    async fn current(&self) -> Result<Option<ServiceState>>;
}

pub struct FileServiceScaler {
    state_file: PathBuf,
    service_name: String,
}

impl FileServiceScaler {
    pub fn new(state_file: impl AsRef<Path>, service_name: &str) -> Self {
        FileServiceScaler {
            state_file: state_file.as_ref().to_path_buf(),
            service_name: service_name.to_string(),
        }
    }

    /// Whether the worker should run. No state file means enabled; an unreadable one
    /// is logged and treated as enabled.
    pub async fn is_enabled(&self) -> bool {
        match self.current().await {
            Ok(Some(state)) => state.is_running(),
            Ok(None) => true,
            Err(e) => {
                warn!("Unreadable control state {}: {}", self.state_file.display(), e);
                true
            }
        }
    }
}

#[async_trait]
impl ServiceScaler for FileServiceScaler {
    fn service_name(&self) -> &str {
        &self.service_name
    }

    async fn set_desired_count(&self, desired_count: u32) -> Result<ServiceState> {
        let state = ServiceState {
            desired_count,
            updated_at: Utc::now(),
        };

        if let Some(parent) = self.state_file.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let json = serde_json::to_string_pretty(&state)?;
        tokio::fs::write(&self.state_file, json).await?;

        debug!("Control state saved to {}", self.state_file.display());
        Ok(state)
    }

    async fn current(&self) -> Result<Option<ServiceState>> {
        if !tokio::fs::try_exists(&self.state_file).await? {
            return Ok(None);
        }
        let content = tokio::fs::read_to_string(&self.state_file).await?;
        Ok(Some(serde_json::from_str(&content)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_state_round_trip() {
        let path = std::env::temp_dir()
            .join(format!("quoteflow-scaler-{}", uuid::Uuid::new_v4()))
            .join("state.json");
        let scaler = FileServiceScaler::new(&path, "stock-worker");

        assert_eq!(scaler.current().await.unwrap(), None);
        assert!(scaler.is_enabled().await);

        scaler.set_desired_count(0).await.unwrap();
        assert!(!scaler.is_enabled().await);

        let state = scaler.set_desired_count(1).await.unwrap();
        assert_eq!(scaler.current().await.unwrap(), Some(state));
        assert!(scaler.is_enabled().await);

        if let Some(dir) = path.parent() {
            let _ = std::fs::remove_dir_all(dir);
        }
    }

    #[tokio::test]
    async fn test_corrupt_state_keeps_worker_enabled() {
        let path = std::env::temp_dir().join(format!("quoteflow-scaler-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&path, "{ not json").unwrap();

        let scaler = FileServiceScaler::new(&path, "stock-worker");
        assert!(scaler.current().await.is_err());
        assert!(scaler.is_enabled().await);

        let _ = std::fs::remove_file(path);
    }
}
