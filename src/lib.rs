//! Firebase Cloud Messaging test console.
//!
//! Repairs pasted service account credentials and dispatches a notification
//! to a single token, a list of tokens, or a topic, reporting per-token
//! failures for multicasts.

pub mod config;
pub mod console;
pub mod core;
pub mod credential;
pub mod dispatch;
pub mod messaging;
pub mod registry;

use reqwest_middleware::ClientWithMiddleware;

use crate::config::Endpoints;
use crate::core::middleware::AuthMiddleware;
use crate::credential::Credential;
use crate::messaging::FirebaseMessaging;

pub use console::{Console, InboundRequest};
pub use credential::CredentialError;
pub use dispatch::{DispatchError, DispatchOutcome, Dispatcher, NotificationRequest, Target, TargetType};
pub use registry::AppRegistry;

/// An authenticated connection to one Firebase project.
pub struct FirebaseApp {
    project_id: String,
    messaging: FirebaseMessaging,
}

impl FirebaseApp {
    pub fn new(credential: &Credential, endpoints: &Endpoints) -> Self {
        let middleware = AuthMiddleware::new(credential.service_account_key(endpoints.token_uri()));
        let send_url = endpoints.send_url(credential.project_id());

        Self {
            project_id: credential.project_id().to_string(),
            messaging: FirebaseMessaging::new(middleware, send_url),
        }
    }

    /// Builds an app over a caller-supplied HTTP stack, bypassing OAuth2.
    pub fn with_client(project_id: &str, client: ClientWithMiddleware, endpoints: &Endpoints) -> Self {
        Self {
            project_id: project_id.to_string(),
            messaging: FirebaseMessaging::new_with_client(client, endpoints.send_url(project_id)),
        }
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn messaging(&self) -> &FirebaseMessaging {
        &self.messaging
    }
}
