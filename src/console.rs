//! The boundary a UI or CLI talks to: one inbound request in, one outcome out.

use std::sync::Arc;

use serde::Deserialize;
use tracing::warn;

use crate::config::{Endpoints, RawCredentials};
use crate::dispatch::{DispatchError, DispatchOutcome, Dispatcher, NotificationRequest, Target, TargetType};
use crate::registry::AppRegistry;

/// A send request as submitted by the console form.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundRequest {
    pub title: String,
    pub body: String,
    pub target_type: TargetType,
    pub target: TargetValue,
    #[serde(default)]
    pub payload: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub client_email: Option<String>,
    #[serde(default)]
    pub private_key: Option<String>,
}

/// A target given either as one (possibly newline-joined) string or a list.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum TargetValue {
    One(String),
    Many(Vec<String>),
}

impl InboundRequest {
    pub fn notification(&self) -> Result<NotificationRequest, DispatchError> {
        let target = match &self.target {
            TargetValue::One(value) => Target::from_parts(self.target_type, [value])?,
            TargetValue::Many(values) => Target::from_parts(self.target_type, values)?,
        };

        Ok(NotificationRequest {
            title: self.title.clone(),
            body: self.body.clone(),
            target,
            payload: self.payload.clone(),
            image: self.image.clone(),
            dry_run: self.dry_run,
        })
    }

    pub fn credentials(&self) -> RawCredentials {
        RawCredentials {
            project_id: self.project_id.clone(),
            client_email: self.client_email.clone(),
            private_key: self.private_key.clone(),
        }
    }
}

/// Normalizes credentials and dispatches, turning every failure into an outcome.
pub struct Console {
    dispatcher: Dispatcher,
    fallback: RawCredentials,
}

impl Console {
    pub fn new(endpoints: Endpoints, fallback: RawCredentials) -> Self {
        Self::with_registry(Arc::new(AppRegistry::new()), endpoints, fallback)
    }

    pub fn with_registry(registry: Arc<AppRegistry>, endpoints: Endpoints, fallback: RawCredentials) -> Self {
        Self {
            dispatcher: Dispatcher::new(registry, endpoints),
            fallback,
        }
    }

    pub async fn handle(&self, request: &InboundRequest) -> DispatchOutcome {
        match request.notification() {
            Ok(notification) => self.send(&notification, request.credentials()).await,
            Err(e) => {
                warn!(error = %e, "Rejected request");
                DispatchOutcome::failed(&e)
            }
        }
    }

    pub async fn send(&self, request: &NotificationRequest, credentials: RawCredentials) -> DispatchOutcome {
        let credential = match credentials.or(self.fallback.clone()).normalize() {
            Ok(credential) => credential,
            Err(e) => {
                warn!(error = %e, "Rejected credentials");
                return DispatchOutcome::failed(&DispatchError::Credential(e));
            }
        };

        self.dispatcher.dispatch(request, &credential).await
    }
}
