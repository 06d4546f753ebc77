use super::*;
use crate::messaging::models::{BatchResponse, SendResponse};
use crate::messaging::MessagingError;
use async_trait::async_trait;
use std::sync::Mutex;

/// Scripted provider recording every message it receives.
#[derive(Default)]
struct FakeProvider {
    sent: Mutex<Vec<(Message, bool)>>,
    multicasts: Mutex<Vec<(Message, Vec<String>)>>,
    send_error: Option<String>,
    failing_tokens: HashMap<String, String>,
    multicast_error: Option<String>,
}

impl FakeProvider {
    fn failing_send(error: &str) -> Self {
        Self {
            send_error: Some(error.to_string()),
            ..Default::default()
        }
    }

    fn failing_tokens(tokens: &[(&str, &str)]) -> Self {
        Self {
            failing_tokens: tokens
                .iter()
                .map(|(token, error)| (token.to_string(), error.to_string()))
                .collect(),
            ..Default::default()
        }
    }

    fn calls(&self) -> usize {
        self.sent.lock().unwrap().len() + self.multicasts.lock().unwrap().len()
    }

    fn last_sent(&self) -> Message {
        self.sent.lock().unwrap().last().unwrap().0.clone()
    }
}

#[async_trait]
impl MessagingProvider for FakeProvider {
    async fn send(&self, message: &Message, dry_run: bool) -> Result<String, MessagingError> {
        self.sent.lock().unwrap().push((message.clone(), dry_run));
        match &self.send_error {
            Some(error) => Err(MessagingError::ApiError(error.clone())),
            None => Ok("projects/test-project/messages/1".to_string()),
        }
    }

    async fn send_multicast(
        &self,
        base_message: &Message,
        tokens: &[String],
        _dry_run: bool,
    ) -> Result<BatchResponse, MessagingError> {
        self.multicasts
            .lock()
            .unwrap()
            .push((base_message.clone(), tokens.to_vec()));
        if let Some(error) = &self.multicast_error {
            return Err(MessagingError::ApiError(error.clone()));
        }
        let responses = tokens
            .iter()
            .map(|token| match self.failing_tokens.get(token) {
                Some(error) => SendResponse::failed(error.clone()),
                None => SendResponse::sent(format!("projects/test-project/messages/{}", token)),
            })
            .collect();
        Ok(BatchResponse::from_responses(responses))
    }
}

fn multi(tokens: &[&str]) -> NotificationRequest {
    NotificationRequest::new("Hello", "World", Target::Multi(tokens.iter().map(|t| t.to_string()).collect()))
}

#[tokio::test]
async fn test_single_token_success() {
    let provider = FakeProvider::default();
    let request = NotificationRequest::new("Hello", "World", Target::Single(" device-token ".to_string()));

    let outcome = dispatch_with(&provider, &request).await;

    assert!(outcome.success);
    assert_eq!(outcome.error, None);
    assert_eq!(outcome.message_id.as_deref(), Some("projects/test-project/messages/1"));
    let sent = provider.last_sent();
    assert_eq!(sent.token.as_deref(), Some("device-token"));
    assert_eq!(sent.topic, None);
}

#[tokio::test]
async fn test_single_token_provider_error_is_reported() {
    let provider = FakeProvider::failing_send("Requested entity was not found. (NOT_FOUND, code: 404)");
    let request = NotificationRequest::new("Hello", "World", Target::Single("stale-token".to_string()));

    let outcome = dispatch_with(&provider, &request).await;

    assert!(!outcome.success);
    assert_eq!(
        outcome.error.as_deref(),
        Some("Requested entity was not found. (NOT_FOUND, code: 404)")
    );
    assert_eq!(outcome.results, None);
    assert_eq!(outcome.success_count, 0);
    assert_eq!(outcome.failure_count, 1);
}

#[tokio::test]
async fn test_topic_send() {
    let provider = FakeProvider::default();
    let request = NotificationRequest::new("Hello", "World", Target::Topic("news".to_string())).dry_run(true);

    let outcome = dispatch_with(&provider, &request).await;

    assert!(outcome.success);
    let (sent, dry_run) = provider.sent.lock().unwrap()[0].clone();
    assert!(dry_run);
    assert_eq!(sent.topic.as_deref(), Some("news"));
    assert_eq!(sent.token, None);
}

#[tokio::test]
async fn test_blank_single_and_topic_targets_fail_fast() {
    let provider = FakeProvider::default();

    for target in [Target::Single("   ".to_string()), Target::Topic(String::new())] {
        let outcome = dispatch_with(&provider, &NotificationRequest::new("Hello", "World", target)).await;
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("Target is required"));
        assert_eq!(outcome.failure_count, 0);
    }
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn test_blank_title_or_body_fail_fast() {
    let provider = FakeProvider::default();
    let target = Target::Single("device-token".to_string());

    let outcome = dispatch_with(&provider, &NotificationRequest::new(" ", "World", target.clone())).await;
    assert_eq!(outcome.error.as_deref(), Some("Missing required field: title"));

    let outcome = dispatch_with(&provider, &NotificationRequest::new("Hello", "", target)).await;
    assert_eq!(outcome.error.as_deref(), Some("Missing required field: body"));

    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn test_multi_without_valid_tokens_never_calls_provider() {
    let provider = FakeProvider::default();

    let outcome = dispatch_with(&provider, &multi(&["", "  ", ""])).await;

    assert!(!outcome.success);
    assert_eq!(outcome.error.as_deref(), Some("No valid tokens provided"));
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn test_multi_filters_blank_tokens() {
    let provider = FakeProvider::default();

    let outcome = dispatch_with(&provider, &multi(&["token-1", "", " token-2 ", "\t"])).await;

    assert!(outcome.success);
    assert_eq!(outcome.success_count, 2);
    assert_eq!(outcome.results, None);
    let multicasts = provider.multicasts.lock().unwrap();
    assert_eq!(multicasts[0].1, vec!["token-1".to_string(), "token-2".to_string()]);
    assert_eq!(multicasts[0].0.token, None);
}

#[tokio::test]
async fn test_multi_partial_failure_is_success_with_itemized_failures() {
    let provider = FakeProvider::failing_tokens(&[("token-2", "The registration token is not a valid FCM registration token")]);

    let outcome = dispatch_with(&provider, &multi(&["token-1", "token-2", "token-3"])).await;

    assert!(outcome.success);
    assert_eq!(outcome.error, None);
    assert_eq!(outcome.success_count, 2);
    assert_eq!(outcome.failure_count, 1);
    assert_eq!(
        outcome.results,
        Some(vec![TargetResult {
            target: "token-2".to_string(),
            success: false,
            error: Some("The registration token is not a valid FCM registration token".to_string()),
        }])
    );
}

#[tokio::test]
async fn test_multi_all_failed() {
    let provider = FakeProvider::failing_tokens(&[
        ("token-1", "NOT_FOUND"),
        ("token-2", "NOT_FOUND"),
        ("token-3", "INVALID_ARGUMENT"),
    ]);

    let outcome = dispatch_with(&provider, &multi(&["token-1", "token-2", "token-3"])).await;

    assert!(!outcome.success);
    assert_eq!(outcome.error.as_deref(), Some("All 3 tokens failed to receive notification"));
    assert_eq!(outcome.failure_count, 3);
    let results = outcome.results.unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(results[2].error.as_deref(), Some("INVALID_ARGUMENT"));
}

#[tokio::test]
async fn test_multicast_provider_error_is_reported() {
    let provider = FakeProvider {
        multicast_error: Some("Failed to get auth token: invalid_grant".to_string()),
        ..Default::default()
    };

    let outcome = dispatch_with(&provider, &multi(&["token-1", " ", "token-2"])).await;

    assert!(!outcome.success);
    assert_eq!(outcome.error.as_deref(), Some("Failed to get auth token: invalid_grant"));
    assert_eq!(outcome.failure_count, 2);
}

#[tokio::test]
async fn test_invalid_payload_falls_back_to_defaults() {
    let provider = FakeProvider::default();
    let request = NotificationRequest::new("Hello", "World", Target::Single("device-token".to_string()))
        .with_payload("{not json");

    let outcome = dispatch_with(&provider, &request).await;

    assert!(outcome.success);
    let data = provider.last_sent().data.unwrap();
    assert_eq!(data.len(), 2);
    assert_eq!(data["click_action"], DEFAULT_CLICK_ACTION);
    assert_eq!(data["status"], DEFAULT_STATUS);
}

#[test]
fn test_payload_merges_over_defaults_and_stringifies() {
    let data = build_data(Some(
        r#"{"status": "pending", "screen": "inbox", "count": 3, "urgent": true, "meta": {"a": 1}, "none": null}"#,
    ));

    assert_eq!(data["click_action"], DEFAULT_CLICK_ACTION);
    assert_eq!(data["status"], "pending");
    assert_eq!(data["screen"], "inbox");
    assert_eq!(data["count"], "3");
    assert_eq!(data["urgent"], "true");
    assert_eq!(data["meta"], r#"{"a":1}"#);
    assert_eq!(data["none"], "null");
}

#[test]
fn test_non_object_payload_is_ignored() {
    for payload in ["[1, 2]", "42", "\"text\"", "   "] {
        let data = build_data(Some(payload));
        assert_eq!(data.len(), 2, "payload {:?}", payload);
    }
    assert_eq!(build_data(None).len(), 2);
}

#[test]
fn test_build_message_platform_hints() {
    let request = NotificationRequest::new("Hello", "World", Target::Topic("news".to_string()))
        .with_image("https://example.com/image.png")
        .with_payload(r#"{"click_action": "OPEN_INBOX"}"#);

    let message = build_message(&request);
    assert_eq!(message.target_count(), 0);

    let notification = message.notification.unwrap();
    assert_eq!(notification.title.as_deref(), Some("Hello"));
    assert_eq!(notification.body.as_deref(), Some("World"));
    assert_eq!(notification.image.as_deref(), Some("https://example.com/image.png"));

    let android = message.android.unwrap();
    assert_eq!(android.priority, Some(AndroidMessagePriority::High));
    assert_eq!(
        android.notification.unwrap().click_action.as_deref(),
        Some("OPEN_INBOX")
    );

    let aps = message.apns.unwrap().payload.unwrap().aps.unwrap();
    assert_eq!(aps.sound.as_deref(), Some("default"));
    assert_eq!(aps.content_available, Some(1));
}

#[test]
fn test_target_from_parts() {
    assert_eq!(
        Target::from_parts(TargetType::Multitoken, ["a\nb\n", "c"]),
        Ok(Target::Multi(vec!["a".to_string(), "b".to_string(), "c".to_string()]))
    );
    assert_eq!(Target::from_parts(TargetType::Token, ["a"]), Ok(Target::Single("a".to_string())));
    assert_eq!(
        Target::from_parts(TargetType::Topic, Vec::<String>::new()),
        Ok(Target::Topic(String::new()))
    );
}

#[test]
fn test_target_from_parts_rejects_extra_values() {
    assert_eq!(
        Target::from_parts(TargetType::Token, ["token-1", "token-2"]),
        Err(DispatchError::UnexpectedTargets(TargetType::Token, 2))
    );
    assert_eq!(
        Target::from_parts(TargetType::Topic, ["news", "sports", "weather"]),
        Err(DispatchError::UnexpectedTargets(TargetType::Topic, 3))
    );
    assert_eq!(
        DispatchError::UnexpectedTargets(TargetType::Topic, 3).to_string(),
        "Target type topic takes a single target, got 3"
    );
}

#[test]
fn test_target_type_from_str() {
    assert_eq!("token".parse::<TargetType>(), Ok(TargetType::Token));
    assert_eq!("MultiToken".parse::<TargetType>(), Ok(TargetType::Multitoken));
    assert_eq!("topic".parse::<TargetType>(), Ok(TargetType::Topic));
    assert!("broadcast".parse::<TargetType>().is_err());
}

#[test]
fn test_outcome_serializes_minimal_contract() {
    let outcome = DispatchOutcome::failed(&DispatchError::NoValidTargets);
    let json = serde_json::to_value(&outcome).unwrap();
    assert_eq!(json["success"], false);
    assert_eq!(json["error"], "No valid tokens provided");
    assert!(json.get("results").is_none());
}
