pub mod middleware;

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct FirebaseErrorResponse {
    pub error: FirebaseErrorDetails,
}

#[derive(Debug, Deserialize)]
pub struct FirebaseErrorDetails {
    pub code: u16,
    pub message: String,
    pub status: Option<String>,
}

impl FirebaseErrorResponse {
    pub fn display_message(&self) -> String {
        match &self.error.status {
            Some(status) => format!("{} ({}, code: {})", self.error.message, status, self.error.code),
            None => format!("{} (code: {})", self.error.message, self.error.code),
        }
    }
}

/// Extracts the provider's message from a failed response, falling back to
/// `default_msg`, the HTTP status and the raw body.
pub async fn parse_error_response(response: reqwest::Response, default_msg: &str) -> String {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    match serde_json::from_str::<FirebaseErrorResponse>(&text) {
        Ok(error_resp) => error_resp.display_message(),
        Err(_) if text.trim().is_empty() => format!("{}: {}", default_msg, status),
        Err(_) => format!("{} {}: {}", default_msg, status, text.trim()),
    }
}
