//! Worker on/off switch: action parsing, desired-count scaling and notification

pub mod notifier;
pub mod scaler;

pub use notifier::{JsonlNotifier, Notification, Notifier};
pub use scaler::{FileServiceScaler, ServiceScaler, ServiceState};

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::error::{PipelineError, Result};

const SCHEDULER_SOURCE: &str = "aws.scheduler";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerAction {
    On,
    Off,
}

impl WorkerAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerAction::On => "on",
            WorkerAction::Off => "off",
        }
    }

    pub fn desired_count(&self) -> u32 {
        match self {
            WorkerAction::On => 1,
            WorkerAction::Off => 0,
        }
    }
}

impl FromStr for WorkerAction {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "on" => Ok(WorkerAction::On),
            "off" => Ok(WorkerAction::Off),
            _ => Err(PipelineError::InvalidParameter("action must be 'on' or 'off'".to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvocationSource {
    Scheduler,
    Api,
}

impl InvocationSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvocationSource::Scheduler => "scheduler",
            InvocationSource::Api => "api",
        }
    }
}

/// Toggle request as delivered by an HTTP gateway or a scheduler
#[derive(Debug, Clone, Default)]
pub struct SwitchRequest {
    /// Raw JSON body
    pub body: Option<String>,
    pub query: HashMap<String, String>,
    /// Top-level `action` field (scheduler payloads)
    pub action: Option<String>,
    pub source: Option<String>,
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

impl SwitchRequest {
    /// Build from an event shaped `{body, queryStringParameters, action, source}`
    pub fn from_event(event: &Value) -> Self {
        let query = event
            .get("queryStringParameters")
            .and_then(Value::as_object)
            .map(|qs| {
                qs.iter()
                    .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                    .collect()
            })
            .unwrap_or_default();

        SwitchRequest {
            body: event.get("body").and_then(Value::as_str).map(str::to_string),
            query,
            action: event.get("action").and_then(value_text),
            source: event.get("source").and_then(Value::as_str).map(str::to_string),
        }
    }

    pub fn invocation_source(&self) -> InvocationSource {
        match self.source.as_deref() {
            Some(SCHEDULER_SOURCE) => InvocationSource::Scheduler,
            _ => InvocationSource::Api,
        }
    }

    /// First non-empty of: body `action`, query `action`, top-level `action`
    pub fn resolve_action(&self) -> Result<WorkerAction> {
        let from_body = self
            .body
            .as_deref()
            .filter(|b| !b.is_empty())
            .and_then(|b| serde_json::from_str::<Value>(b).ok())
            .and_then(|body| body.get("action").and_then(value_text));

        let raw = from_body
            .filter(|a| !a.is_empty())
            .or_else(|| self.query.get("action").cloned().filter(|a| !a.is_empty()))
            .or_else(|| self.action.clone().filter(|a| !a.is_empty()));

        match raw {
            Some(raw) => raw.parse(),
            None => Err(PipelineError::InvalidParameter("action must be 'on' or 'off'".to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToggleOutcome {
    pub action: WorkerAction,
    #[serde(rename = "desiredCount")]
    pub desired_count: u32,
    pub source: InvocationSource,
    pub notified: bool,
}

pub struct ControlSwitch {
    scaler: Arc<dyn ServiceScaler>,
    notifier: Option<Arc<dyn Notifier>>,
}

impl ControlSwitch {
    pub fn new(scaler: Arc<dyn ServiceScaler>, notifier: Option<Arc<dyn Notifier>>) -> Self {
        ControlSwitch { scaler, notifier }
    }

    /// Apply the requested action. Scaling errors fail the toggle; notification errors do not.
    pub async fn toggle(&self, request: &SwitchRequest) -> Result<ToggleOutcome> {
        let action = request.resolve_action()?;
        let source = request.invocation_source();
        let desired_count = action.desired_count();

        self.scaler.set_desired_count(desired_count).await?;
        info!(
            "🔀 Worker {} turned {} (desired_count={}, source={})",
            self.scaler.service_name(),
            action.as_str().to_uppercase(),
            desired_count,
            source.as_str()
        );

        let notified = match &self.notifier {
            None => false,
            Some(notifier) => {
                let notification = Notification {
                    id: uuid::Uuid::new_v4(),
                    subject: format!("Stock worker turned {}", action.as_str().to_uppercase()),
                    action,
                    desired_count,
                    source,
                    service: self.scaler.service_name().to_string(),
                    timestamp: Utc::now(),
                };
                match notifier.publish(&notification).await {
                    Ok(()) => true,
                    Err(e) => {
                        warn!("Failed to publish notification: {} ({})", e, e.error_code());
                        false
                    }
                }
            }
        };

        Ok(ToggleOutcome {
            action,
            desired_count,
            source,
            notified,
        })
    }
}
