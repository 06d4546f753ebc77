//! Notification dispatch: builds the FCM message for a request, sends it to
//! its target and folds the provider's answer into a [`DispatchOutcome`].
//!
//! Multicast failures follow an asymmetric policy. A multicast where every
//! token fails is a failure; one where only some tokens fail is a success that
//! lists the failing tokens.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::Endpoints;
use crate::credential::Credential;
use crate::messaging::models::{
    AndroidConfig, AndroidMessagePriority, AndroidNotification, ApnsConfig, ApnsPayload, Aps,
    Message, Notification,
};
use crate::messaging::MessagingProvider;
use crate::registry::AppRegistry;

pub mod models;
#[cfg(test)]
mod tests;

pub use models::{DispatchError, DispatchOutcome, NotificationRequest, Target, TargetResult, TargetType};

pub const DEFAULT_CLICK_ACTION: &str = "FLUTTER_NOTIFICATION_CLICK";
pub const DEFAULT_STATUS: &str = "done";

/// Sends notifications through per-project cached Firebase apps.
#[derive(Clone, Default)]
pub struct Dispatcher {
    registry: Arc<AppRegistry>,
    endpoints: Endpoints,
}

impl Dispatcher {
    pub fn new(registry: Arc<AppRegistry>, endpoints: Endpoints) -> Self {
        Self { registry, endpoints }
    }

    pub async fn dispatch(&self, request: &NotificationRequest, credential: &Credential) -> DispatchOutcome {
        let app = self.registry.get_or_init(credential, &self.endpoints).await;
        dispatch_with(app.messaging(), request).await
    }
}

/// Validates `request`, sends it through `provider` and reports the outcome.
/// Never fails: every error is folded into the returned outcome.
pub async fn dispatch_with(provider: &dyn MessagingProvider, request: &NotificationRequest) -> DispatchOutcome {
    match try_dispatch(provider, request).await {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!(target_type = %request.target.target_type(), error = %e, "Notification dispatch failed");
            let mut outcome = DispatchOutcome::failed(&e);
            // A provider error means every attempted target went undelivered.
            if let DispatchError::Provider(_) = e {
                outcome.failure_count = attempted_targets(&request.target);
            }
            outcome
        }
    }
}

fn attempted_targets(target: &Target) -> usize {
    match target {
        Target::Single(_) | Target::Topic(_) => 1,
        Target::Multi(tokens) => tokens.iter().filter(|t| !t.trim().is_empty()).count(),
    }
}

async fn try_dispatch(
    provider: &dyn MessagingProvider,
    request: &NotificationRequest,
) -> Result<DispatchOutcome, DispatchError> {
    if request.title.trim().is_empty() {
        return Err(DispatchError::MissingField("title"));
    }
    if request.body.trim().is_empty() {
        return Err(DispatchError::MissingField("body"));
    }

    let message = build_message(request);

    match &request.target {
        Target::Single(token) => {
            let token = non_blank(token)?;
            let message = Message {
                token: Some(token.to_string()),
                ..message
            };
            send_one(provider, &message, request.dry_run).await
        }
        Target::Topic(topic) => {
            let topic = non_blank(topic)?;
            let message = Message {
                topic: Some(topic.to_string()),
                ..message
            };
            send_one(provider, &message, request.dry_run).await
        }
        Target::Multi(tokens) => {
            let tokens: Vec<String> = tokens
                .iter()
                .map(|t| t.trim())
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect();
            if tokens.is_empty() {
                return Err(DispatchError::NoValidTargets);
            }
            send_many(provider, &message, &tokens, request.dry_run).await
        }
    }
}

fn non_blank(target: &str) -> Result<&str, DispatchError> {
    let target = target.trim();
    if target.is_empty() {
        return Err(DispatchError::MissingTarget);
    }
    Ok(target)
}

async fn send_one(
    provider: &dyn MessagingProvider,
    message: &Message,
    dry_run: bool,
) -> Result<DispatchOutcome, DispatchError> {
    let message_id = provider
        .send(message, dry_run)
        .await
        .map_err(|e| DispatchError::Provider(e.to_string()))?;

    info!(message_id = %message_id, dry_run, "Successfully sent message");
    Ok(DispatchOutcome::delivered(message_id))
}

async fn send_many(
    provider: &dyn MessagingProvider,
    message: &Message,
    tokens: &[String],
    dry_run: bool,
) -> Result<DispatchOutcome, DispatchError> {
    let batch = provider
        .send_multicast(message, tokens, dry_run)
        .await
        .map_err(|e| DispatchError::Provider(e.to_string()))?;

    let failures: Vec<_> = tokens
        .iter()
        .zip(batch.responses.iter())
        .filter(|(_, response)| !response.success)
        .map(|(token, response)| TargetResult {
            target: token.clone(),
            success: false,
            error: Some(
                response
                    .error
                    .clone()
                    .unwrap_or_else(|| "Unknown error".to_string()),
            ),
        })
        .collect();

    for failure in &failures {
        debug!(token = %failure.target, error = ?failure.error, "Token failed to receive notification");
    }
    info!(
        success_count = batch.success_count,
        failure_count = batch.failure_count,
        dry_run,
        "Multicast send completed"
    );

    let mut outcome = DispatchOutcome {
        success: true,
        error: None,
        results: None,
        message_id: None,
        success_count: batch.success_count,
        failure_count: batch.failure_count,
        sent_at: chrono::Utc::now(),
    };

    if batch.failure_count == 0 {
        return Ok(outcome);
    }

    if batch.success_count == 0 {
        outcome.success = false;
        outcome.error = Some(DispatchError::AllTargetsFailed(tokens.len()).to_string());
    }
    outcome.results = Some(failures);

    Ok(outcome)
}

/// Builds the untargeted envelope shared by every target strategy.
pub fn build_message(request: &NotificationRequest) -> Message {
    let data = build_data(request.payload.as_deref());
    let click_action = data.get("click_action").cloned();

    Message {
        data: Some(data),
        notification: Some(Notification {
            title: Some(request.title.clone()),
            body: Some(request.body.clone()),
            image: request.image.clone().filter(|image| !image.trim().is_empty()),
        }),
        android: Some(AndroidConfig {
            priority: Some(AndroidMessagePriority::High),
            notification: Some(AndroidNotification {
                sound: Some("default".to_string()),
                click_action,
            }),
        }),
        apns: Some(ApnsConfig {
            payload: Some(ApnsPayload {
                aps: Some(Aps {
                    sound: Some("default".to_string()),
                    content_available: Some(1),
                }),
            }),
        }),
        ..Default::default()
    }
}

/// Merges the custom JSON payload over the default data keys.
///
/// A payload that is not a JSON object is ignored with a warning.
pub fn build_data(payload: Option<&str>) -> HashMap<String, String> {
    let mut data = HashMap::from([
        ("click_action".to_string(), DEFAULT_CLICK_ACTION.to_string()),
        ("status".to_string(), DEFAULT_STATUS.to_string()),
    ]);

    let Some(payload) = payload.map(str::trim).filter(|p| !p.is_empty()) else {
        return data;
    };

    match serde_json::from_str::<Value>(payload) {
        Ok(Value::Object(fields)) => {
            data.extend(fields.into_iter().map(|(key, value)| (key, stringify(value))));
        }
        Ok(other) => {
            warn!(kind = json_kind(&other), "Custom payload is not a JSON object, using default data");
        }
        Err(e) => {
            warn!(error = %e, "Failed to parse custom payload, using default data");
        }
    }

    data
}

fn stringify(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
