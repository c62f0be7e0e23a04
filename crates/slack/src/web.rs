use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::blocks::MessageTemplate;

pub const DEFAULT_SLACK_API_BASE_URL: &str = "https://slack.com/api";
const SLACK_HTTP_TIMEOUT_SECS: u64 = 30;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageRef {
    pub channel: String,
    pub ts: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileUpload {
    pub channel_id: String,
    pub thread_ts: Option<String>,
    pub filename: String,
    pub title: String,
    pub content: String,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SlackApiError {
    #[error("{method} request failed: {message}")]
    Http { method: String, message: String },
    #[error("{method} returned error `{error}`")]
    Api { method: String, error: String },
    #[error("{method} response is missing `{field}`")]
    MissingField { method: String, field: &'static str },
    #[error("file bytes were rejected by the upload URL with HTTP {status}")]
    UploadRejected { status: u16 },
}

/// The Web API calls the lookup flow needs.
#[async_trait]
pub trait SlackWebApi: Send + Sync {
    async fn post_message(
        &self,
        channel: &str,
        thread_ts: Option<&str>,
        message: &MessageTemplate,
    ) -> Result<MessageRef, SlackApiError>;

    async fn post_ephemeral(
        &self,
        channel: &str,
        user: &str,
        thread_ts: Option<&str>,
        message: &MessageTemplate,
    ) -> Result<(), SlackApiError>;

    async fn update_message(
        &self,
        message_ref: &MessageRef,
        message: &MessageTemplate,
    ) -> Result<(), SlackApiError>;

    /// Ephemeral reply through a slash command's `response_url`.
    async fn respond(
        &self,
        response_url: &str,
        message: &MessageTemplate,
    ) -> Result<(), SlackApiError>;

    async fn upload_file(&self, upload: &FileUpload) -> Result<(), SlackApiError>;
}

#[derive(Deserialize)]
struct ApiEnvelope {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(flatten)]
    data: Map<String, Value>,
}

impl ApiEnvelope {
    fn string_field(&self, method: &str, field: &'static str) -> Result<String, SlackApiError> {
        self.data
            .get(field)
            .and_then(Value::as_str)
            .filter(|value| !value.is_empty())
            .map(str::to_owned)
            .ok_or_else(|| SlackApiError::MissingField { method: method.to_owned(), field })
    }
}

#[derive(Clone, Debug)]
pub struct HttpSlackWebApi {
    http: Client,
    base_url: String,
    bot_token: SecretString,
}

impl HttpSlackWebApi {
    pub fn new(bot_token: SecretString) -> Result<Self, SlackApiError> {
        let http = slack_http_client()?;
        Ok(Self::with_http_client(http, DEFAULT_SLACK_API_BASE_URL, bot_token))
    }

    pub fn with_http_client(http: Client, base_url: &str, bot_token: SecretString) -> Self {
        Self { http, base_url: base_url.trim().trim_end_matches('/').to_owned(), bot_token }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{method}", self.base_url)
    }

    async fn post_json(&self, method: &str, body: &Value) -> Result<ApiEnvelope, SlackApiError> {
        let request = self
            .http
            .post(self.method_url(method))
            .bearer_auth(self.bot_token.expose_secret())
            .json(body);
        send_api_request(method, request).await
    }

    async fn post_form(
        &self,
        method: &str,
        form: &[(&str, String)],
    ) -> Result<ApiEnvelope, SlackApiError> {
        let request = self
            .http
            .post(self.method_url(method))
            .bearer_auth(self.bot_token.expose_secret())
            .form(form);
        send_api_request(method, request).await
    }
}

#[async_trait]
impl SlackWebApi for HttpSlackWebApi {
    async fn post_message(
        &self,
        channel: &str,
        thread_ts: Option<&str>,
        message: &MessageTemplate,
    ) -> Result<MessageRef, SlackApiError> {
        let mut body = message_body(channel, message);
        if let Some(thread_ts) = thread_ts {
            body["thread_ts"] = json!(thread_ts);
        }

        let response = self.post_json("chat.postMessage", &body).await?;
        let ts = response.string_field("chat.postMessage", "ts")?;
        let channel = response
            .string_field("chat.postMessage", "channel")
            .unwrap_or_else(|_| channel.to_owned());
        Ok(MessageRef { channel, ts })
    }

    async fn post_ephemeral(
        &self,
        channel: &str,
        user: &str,
        thread_ts: Option<&str>,
        message: &MessageTemplate,
    ) -> Result<(), SlackApiError> {
        let mut body = message_body(channel, message);
        body["user"] = json!(user);
        if let Some(thread_ts) = thread_ts {
            body["thread_ts"] = json!(thread_ts);
        }

        self.post_json("chat.postEphemeral", &body).await.map(|_| ())
    }

    async fn update_message(
        &self,
        message_ref: &MessageRef,
        message: &MessageTemplate,
    ) -> Result<(), SlackApiError> {
        let mut body = message_body(&message_ref.channel, message);
        body["ts"] = json!(message_ref.ts);

        self.post_json("chat.update", &body).await.map(|_| ())
    }

    async fn respond(
        &self,
        response_url: &str,
        message: &MessageTemplate,
    ) -> Result<(), SlackApiError> {
        const METHOD: &str = "response_url";

        let body = json!({
            "response_type": "ephemeral",
            "replace_original": false,
            "text": message.fallback_text,
            "blocks": message.blocks,
        });
        // The webhook answers with plain `ok`, not a Web API envelope.
        let response = self
            .http
            .post(response_url)
            .json(&body)
            .send()
            .await
            .map_err(|error| http_error(METHOD, error))?;
        let status = response.status();
        if !status.is_success() {
            warn!(
                event_name = "egress.slack.http_error",
                method = METHOD,
                status = status.as_u16(),
                "slack response_url rejected the reply"
            );
            return Err(SlackApiError::Http {
                method: METHOD.to_owned(),
                message: format!("HTTP {}", status.as_u16()),
            });
        }
        Ok(())
    }

    async fn upload_file(&self, upload: &FileUpload) -> Result<(), SlackApiError> {
        const GET_URL: &str = "files.getUploadURLExternal";
        const COMPLETE: &str = "files.completeUploadExternal";

        let reserved = self
            .post_form(
                GET_URL,
                &[
                    ("filename", upload.filename.clone()),
                    ("length", upload.content.len().to_string()),
                ],
            )
            .await?;
        let upload_url = reserved.string_field(GET_URL, "upload_url")?;
        let file_id = reserved.string_field(GET_URL, "file_id")?;
        debug!(
            event_name = "egress.slack.upload_reserved",
            file_id = %file_id,
            filename = %upload.filename,
            bytes = upload.content.len(),
            "reserved slack upload url"
        );

        let response = self
            .http
            .post(&upload_url)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(upload.content.clone())
            .send()
            .await
            .map_err(|error| http_error("upload_url", error))?;
        if !response.status().is_success() {
            return Err(SlackApiError::UploadRejected { status: response.status().as_u16() });
        }

        let mut complete = json!({
            "files": [{ "id": file_id, "title": upload.title }],
            "channel_id": upload.channel_id,
        });
        if let Some(thread_ts) = &upload.thread_ts {
            complete["thread_ts"] = json!(thread_ts);
        }
        self.post_json(COMPLETE, &complete).await.map(|_| ())
    }
}

/// Requests a fresh Socket Mode websocket URL with the app-level token.
pub async fn open_socket_url(
    http: &Client,
    base_url: &str,
    app_token: &SecretString,
) -> Result<String, SlackApiError> {
    const METHOD: &str = "apps.connections.open";

    let request = http
        .post(format!("{}/{METHOD}", base_url.trim().trim_end_matches('/')))
        .bearer_auth(app_token.expose_secret());
    let response = send_api_request(METHOD, request).await?;
    response.string_field(METHOD, "url")
}

pub fn slack_http_client() -> Result<Client, SlackApiError> {
    Client::builder()
        .timeout(Duration::from_secs(SLACK_HTTP_TIMEOUT_SECS))
        .user_agent(concat!("firmscope/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|error| http_error("client", error))
}

fn message_body(channel: &str, message: &MessageTemplate) -> Value {
    json!({
        "channel": channel,
        "text": message.fallback_text,
        "blocks": message.blocks,
    })
}

async fn send_api_request(
    method: &str,
    request: RequestBuilder,
) -> Result<ApiEnvelope, SlackApiError> {
    let response = request.send().await.map_err(|error| http_error(method, error))?;
    let status = response.status();
    if !status.is_success() {
        warn!(
            event_name = "egress.slack.http_error",
            method,
            status = status.as_u16(),
            "slack web api returned non-success status"
        );
        return Err(SlackApiError::Http {
            method: method.to_owned(),
            message: format!("HTTP {}", status.as_u16()),
        });
    }

    let envelope: ApiEnvelope =
        response.json().await.map_err(|error| http_error(method, error))?;
    if !envelope.ok {
        let error = envelope.error.clone().unwrap_or_else(|| "unknown_error".to_owned());
        warn!(
            event_name = "egress.slack.api_error",
            method,
            error = %error,
            "slack web api call was rejected"
        );
        return Err(SlackApiError::Api { method: method.to_owned(), error });
    }

    Ok(envelope)
}

fn http_error(method: &str, error: reqwest::Error) -> SlackApiError {
    SlackApiError::Http { method: method.to_owned(), message: error.to_string() }
}
