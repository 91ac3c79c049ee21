use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Response, StatusCode};
use tracing::{debug, warn};

use crate::config::BackendConfig;
use crate::controller::{await_or_cancel, is_cancelled, CancellationSignal, EventStream, StreamController};
use crate::error::{parse_error_message, InferenceApiError};
use crate::headers::build_headers;
use crate::message::{CanonicalMessage, Message};
use crate::normalize::normalize;
use crate::payload::ChatCompletionRequest;
use crate::url::normalize_chat_url;

#[derive(Debug)]
pub struct InferenceClient {
    http: Client,
    config: BackendConfig,
}

impl InferenceClient {
    pub fn new(config: BackendConfig) -> Result<Self, InferenceApiError> {
        let endpoint = normalize_chat_url(&config.base_url);
        reqwest::Url::parse(&endpoint)
            .map_err(|error| InferenceApiError::InvalidBaseUrl(format!("{endpoint}: {error}")))?;

        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build()?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    pub fn endpoint(&self) -> String {
        normalize_chat_url(&self.config.base_url)
    }

    pub fn build_headers(&self) -> Result<HeaderMap, InferenceApiError> {
        let mut out = HeaderMap::new();
        for (key, value) in build_headers(&self.config) {
            out.insert(
                HeaderName::from_bytes(key.as_bytes()).map_err(|_| {
                    InferenceApiError::InvalidHeader(format!("invalid header key: {key}"))
                })?,
                HeaderValue::from_str(&value).map_err(|_| {
                    InferenceApiError::InvalidHeader(format!("invalid header value for {key}"))
                })?,
            );
        }
        Ok(out)
    }

    /// Render canonical messages into a request body using the configured
    /// model, system prompt, token budget and image format.
    pub fn build_payload(&self, messages: &[CanonicalMessage]) -> ChatCompletionRequest {
        ChatCompletionRequest::from_canonical(
            self.config.model.clone(),
            self.config.system_prompt.as_deref(),
            messages,
            self.config.image_format,
        )
        .with_max_tokens(self.config.max_tokens)
    }

    pub fn build_request(
        &self,
        payload: &ChatCompletionRequest,
    ) -> Result<reqwest::RequestBuilder, InferenceApiError> {
        let headers = self.build_headers()?;
        let mut payload = payload.clone();
        payload.stream = true;
        Ok(self
            .http
            .post(self.endpoint())
            .headers(headers)
            .json(&payload))
    }

    /// Send the request, retrying transport failures and retryable statuses.
    ///
    /// A final non-success status is returned as [`InferenceApiError::Status`]
    /// with a message derived from the response body.
    pub async fn send_with_retry(
        &self,
        payload: &ChatCompletionRequest,
        cancellation: Option<&CancellationSignal>,
    ) -> Result<Response, InferenceApiError> {
        let policy = self.config.retry;
        let mut last_status: Option<StatusCode> = None;
        let mut last_error = None;

        for attempt in 0..=policy.max_retries {
            if is_cancelled(cancellation) {
                return Err(InferenceApiError::Cancelled);
            }

            let response = self.build_request(payload)?.send();
            let response = await_or_cancel(response, cancellation).await?;

            match response {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }

                    last_status = Some(status);
                    let body = await_or_cancel(response.text(), cancellation)
                        .await?
                        .unwrap_or_default();
                    let message = parse_error_message(status, &body);

                    if !policy.should_retry_status(attempt, status, &message) {
                        return Err(InferenceApiError::Status(status, message));
                    }
                    warn!(%status, attempt, %message, "backend rejected request, backing off");
                    last_error = Some(message);
                }
                Err(error) => {
                    if !policy.should_retry_transport(attempt, &error) {
                        return Err(InferenceApiError::RetryExhausted {
                            status: last_status,
                            last_error: Some(error.to_string()),
                        });
                    }
                    warn!(attempt, %error, "request failed, backing off");
                    last_error = Some(error.to_string());
                }
            }

            await_or_cancel(tokio::time::sleep(policy.delay(attempt)), cancellation).await?;
        }

        Err(InferenceApiError::RetryExhausted {
            status: last_status,
            last_error,
        })
    }

    /// Normalize `conversation` and stream one completion.
    ///
    /// Only pre-flight failures (unsupported content, invalid headers) are
    /// returned as `Err`, before any network call. Everything that goes wrong
    /// afterwards arrives as the stream's terminal `Error` event.
    pub async fn stream_conversation(
        &self,
        conversation: &[Message],
        cancellation: Option<CancellationSignal>,
    ) -> Result<EventStream, InferenceApiError> {
        let messages = normalize(conversation)?;
        self.stream_messages(&messages, cancellation).await
    }

    pub async fn stream_messages(
        &self,
        messages: &[CanonicalMessage],
        cancellation: Option<CancellationSignal>,
    ) -> Result<EventStream, InferenceApiError> {
        let payload = self.build_payload(messages);
        // Surface header problems before touching the network.
        self.build_headers()?;

        let controller = StreamController::new(self.config.backend_id.clone())
            .with_optional_cancellation(cancellation.clone());
        debug!(
            backend_id = %self.config.backend_id,
            endpoint = %self.endpoint(),
            messages = payload.messages.len(),
            "starting chat completion stream"
        );

        match self.send_with_retry(&payload, cancellation.as_ref()).await {
            Ok(response) => Ok(controller.from_response(response)),
            Err(InferenceApiError::Status(_, message)) => Ok(controller.fail(message)),
            Err(error) => Ok(controller.fail(error.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{ContentItem, Role};
    use crate::payload::ImageWireFormat;

    #[test]
    fn payload_uses_config_defaults() {
        let config = BackendConfig::new("qwen2-vl")
            .with_system_prompt("You are a coding assistant.")
            .with_max_tokens(1024)
            .with_image_format(ImageWireFormat::QwenVl);
        let client = InferenceClient::new(config).expect("client");

        let conversation = vec![Message::with_items(
            Role::User,
            vec![
                ContentItem::Text("what is this?".to_owned()),
                ContentItem::image_text("data:image/png;base64,QUJD"),
            ],
        )];
        let messages = normalize(&conversation).expect("normalizes");
        let payload = client.build_payload(&messages);

        assert_eq!(payload.model, "qwen2-vl");
        assert_eq!(payload.max_tokens, Some(1024));
        assert!(payload.stream);
        assert_eq!(payload.messages.len(), 2);
        assert_eq!(payload.messages[0]["role"], "system");
        assert_eq!(
            payload.messages[1]["content"][1],
            serde_json::json!({"type": "image", "image": "data:image/png;base64,QUJD"})
        );
    }

    #[test]
    fn bearer_header_only_when_key_configured() {
        let without = InferenceClient::new(BackendConfig::new("m")).expect("client");
        assert!(without
            .build_headers()
            .expect("headers")
            .get("authorization")
            .is_none());

        let with = InferenceClient::new(BackendConfig::new("m").with_api_key("sk-test"))
            .expect("client");
        assert_eq!(
            with.build_headers().expect("headers")["authorization"],
            "Bearer sk-test"
        );
    }

    #[test]
    fn unparsable_base_url_is_rejected() {
        let error = InferenceClient::new(BackendConfig::new("m").with_base_url("not a url"))
            .expect_err("invalid base url");
        assert!(matches!(error, InferenceApiError::InvalidBaseUrl(_)));
    }

    #[tokio::test]
    async fn unsupported_content_fails_before_network() {
        let client = InferenceClient::new(
            BackendConfig::new("m").with_base_url("http://127.0.0.1:9"),
        )
        .expect("client");
        let conversation = vec![Message::with_items(
            Role::User,
            vec![ContentItem::Unsupported(serde_json::json!({"type": "file"}))],
        )];

        let error = match client.stream_conversation(&conversation, None).await {
            Ok(_) => panic!("unsupported content must fail pre-flight"),
            Err(error) => error,
        };
        assert!(matches!(error, InferenceApiError::Normalize(_)));
    }
}
