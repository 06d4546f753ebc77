use async_trait::async_trait;
use futures::future::join_all;
use reqwest::{header, Client};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::core::middleware::AuthMiddleware;
use crate::core::parse_error_response;
use crate::messaging::models::{BatchResponse, Message, SendResponse, SendResponseInternal};

pub mod models;

/// Upper bound on tokens addressed by one multicast.
pub const MAX_MULTICAST_TOKENS: usize = 500;

#[derive(Error, Debug)]
pub enum MessagingError {
    #[error("HTTP Request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("Middleware error: {0}")]
    MiddlewareError(#[from] reqwest_middleware::Error),
    #[error("{0}")]
    ApiError(String),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// The messaging backend a dispatch talks to.
#[async_trait]
pub trait MessagingProvider: Send + Sync {
    /// Sends one message and returns the provider's message name.
    async fn send(&self, message: &Message, dry_run: bool) -> Result<String, MessagingError>;

    /// Sends `base_message` to every token, one result per token in order.
    async fn send_multicast(
        &self,
        base_message: &Message,
        tokens: &[String],
        dry_run: bool,
    ) -> Result<BatchResponse, MessagingError>;
}

/// Client for the FCM HTTP v1 API.
#[derive(Clone)]
pub struct FirebaseMessaging {
    client: ClientWithMiddleware,
    send_url: String,
}

// Wrapper for the request body required by FCM v1 API
#[derive(Serialize)]
struct SendRequest<'a> {
    validate_only: bool,
    message: &'a Message,
}

impl FirebaseMessaging {
    pub fn new(middleware: AuthMiddleware, send_url: String) -> Self {
        let client = ClientBuilder::new(Client::new()).with(middleware).build();
        Self::new_with_client(client, send_url)
    }

    /// Creates a client over an already configured HTTP stack.
    pub fn new_with_client(client: ClientWithMiddleware, send_url: String) -> Self {
        Self { client, send_url }
    }

    pub async fn send(&self, message: &Message) -> Result<String, MessagingError> {
        self.validate_message(message)?;
        self.send_request(message, false).await
    }

    pub async fn send_dry_run(&self, message: &Message) -> Result<String, MessagingError> {
        self.validate_message(message)?;
        self.send_request(message, true).await
    }

    fn validate_message(&self, message: &Message) -> Result<(), MessagingError> {
        if message.target_count() != 1 {
            return Err(MessagingError::ApiError(
                "Message must have exactly one of token, topic, or condition.".to_string(),
            ));
        }

        Ok(())
    }

    async fn send_request(&self, message: &Message, dry_run: bool) -> Result<String, MessagingError> {
        let request = SendRequest {
            validate_only: dry_run,
            message,
        };

        let response = self
            .client
            .post(&self.send_url)
            .header(header::CONTENT_TYPE, "application/json")
            .body(serde_json::to_vec(&request)?)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(MessagingError::ApiError(
                parse_error_response(response, "FCM send failed").await,
            ));
        }

        let result: SendResponseInternal = response.json().await?;
        Ok(result.name)
    }

    /// Sends every message concurrently. A failed message never cancels the others.
    pub async fn send_each(&self, messages: &[Message], dry_run: bool) -> Result<BatchResponse, MessagingError> {
        for message in messages {
            self.validate_message(message)?;
        }

        if messages.is_empty() {
            return Ok(BatchResponse::default());
        }

        if messages.len() > MAX_MULTICAST_TOKENS {
            return Err(MessagingError::ApiError(format!(
                "Cannot send more than {} messages in a single batch.",
                MAX_MULTICAST_TOKENS
            )));
        }

        let results = join_all(messages.iter().map(|message| self.send_request(message, dry_run))).await;

        let responses = results
            .into_iter()
            .map(|result| match result {
                Ok(name) => SendResponse::sent(name),
                Err(e) => SendResponse::failed(e.to_string()),
            })
            .collect();

        Ok(BatchResponse::from_responses(responses))
    }

    pub async fn send_multicast(
        &self,
        base_message: &Message,
        tokens: &[String],
        dry_run: bool,
    ) -> Result<BatchResponse, MessagingError> {
        if base_message.target_count() != 0 {
            return Err(MessagingError::ApiError(
                "Multicast base message must not have a target (token, topic, or condition).".to_string(),
            ));
        }

        let messages: Vec<Message> = tokens
            .iter()
            .map(|token| {
                let mut msg = base_message.clone();
                msg.token = Some(token.clone());
                msg
            })
            .collect();

        let batch = self.send_each(&messages, dry_run).await?;
        debug!(
            success_count = batch.success_count,
            failure_count = batch.failure_count,
            "FCM multicast completed"
        );
        Ok(batch)
    }
}

#[async_trait]
impl MessagingProvider for FirebaseMessaging {
    async fn send(&self, message: &Message, dry_run: bool) -> Result<String, MessagingError> {
        if dry_run {
            FirebaseMessaging::send_dry_run(self, message).await
        } else {
            FirebaseMessaging::send(self, message).await
        }
    }

    async fn send_multicast(
        &self,
        base_message: &Message,
        tokens: &[String],
        dry_run: bool,
    ) -> Result<BatchResponse, MessagingError> {
        FirebaseMessaging::send_multicast(self, base_message, tokens, dry_run).await
    }
}
