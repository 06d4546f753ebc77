use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::credential::CredentialError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error(transparent)]
    Credential(#[from] CredentialError),
    #[error("Missing required field: {0}")]
    MissingField(&'static str),
    #[error("No valid tokens provided")]
    NoValidTargets,
    #[error("Target is required")]
    MissingTarget,
    #[error("{0}")]
    Provider(String),
    #[error("All {0} tokens failed to receive notification")]
    AllTargetsFailed(usize),
    #[error("Target type {0} takes a single target, got {1}")]
    UnexpectedTargets(TargetType, usize),
}

/// The three literal target tags accepted at the inbound boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetType {
    Token,
    Multitoken,
    Topic,
}

impl TargetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetType::Token => "token",
            TargetType::Multitoken => "multitoken",
            TargetType::Topic => "topic",
        }
    }
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "token" | "single" => Ok(TargetType::Token),
            "multitoken" | "multi" => Ok(TargetType::Multitoken),
            "topic" => Ok(TargetType::Topic),
            other => Err(format!("unknown target type {:?} (expected token, multitoken or topic)", other)),
        }
    }
}

/// Where a notification goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Single(String),
    Multi(Vec<String>),
    Topic(String),
}

impl Target {
    /// Builds a target from a tag and its values. Multi-token values are
    /// additionally split on line breaks; token and topic targets accept at
    /// most one value.
    pub fn from_parts<I, S>(target_type: TargetType, values: I) -> Result<Self, DispatchError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let values: Vec<String> = values.into_iter().map(|v| v.as_ref().to_string()).collect();
        match target_type {
            TargetType::Multitoken => Ok(Target::Multi(
                values
                    .iter()
                    .flat_map(|v| v.lines().map(str::to_string))
                    .collect(),
            )),
            _ if values.len() > 1 => Err(DispatchError::UnexpectedTargets(target_type, values.len())),
            TargetType::Token => Ok(Target::Single(values.into_iter().next().unwrap_or_default())),
            TargetType::Topic => Ok(Target::Topic(values.into_iter().next().unwrap_or_default())),
        }
    }

    pub fn target_type(&self) -> TargetType {
        match self {
            Target::Single(_) => TargetType::Token,
            Target::Multi(_) => TargetType::Multitoken,
            Target::Topic(_) => TargetType::Topic,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationRequest {
    pub title: String,
    pub body: String,
    pub target: Target,
    /// Raw JSON object text merged into the data payload.
    pub payload: Option<String>,
    pub image: Option<String>,
    /// Ask FCM to validate the message without delivering it.
    pub dry_run: bool,
}

impl NotificationRequest {
    pub fn new(title: impl Into<String>, body: impl Into<String>, target: Target) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            target,
            payload: None,
            image: None,
            dry_run: false,
        }
    }

    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

/// Delivery result for one token of a multicast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetResult {
    pub target: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The uniform result returned to the caller for every request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Failing tokens of a multicast, in request order.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<TargetResult>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    pub success_count: usize,
    pub failure_count: usize,
    pub sent_at: DateTime<Utc>,
}

impl DispatchOutcome {
    pub(crate) fn delivered(message_id: String) -> Self {
        Self {
            success: true,
            error: None,
            results: None,
            message_id: Some(message_id),
            success_count: 1,
            failure_count: 0,
            sent_at: Utc::now(),
        }
    }

    pub fn failed(error: &DispatchError) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
            results: None,
            message_id: None,
            success_count: 0,
            failure_count: 0,
            sent_at: Utc::now(),
        }
    }
}
