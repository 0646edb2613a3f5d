//! Reqwest implementation of the gateway capabilities.
//!
//! Streaming chat replies arrive as SSE-style `data:` lines terminated by a
//! `[DONE]` marker. Each line's JSON is relayed upstream-shape-intact as an
//! opaque value; normalization happens in [`crate::core::extract`].

use std::collections::VecDeque;
use std::fmt;

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use memchr::memchr;
use reqwest::StatusCode;
use serde_json::Value;
use tracing::debug;

use crate::api::{ChatCallBody, UserIdentity};
use crate::platform::{ChatCall, ChatMode, ChatReply, PlatformAuth, PlatformChat, PlatformError};
use crate::utils::url::{construct_api_url, normalize_base_url};

pub struct HttpPlatform {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpPlatform {
    pub fn new(base_url: &str, token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: normalize_base_url(base_url),
            token: token.into(),
        }
    }
}

#[async_trait]
impl PlatformChat for HttpPlatform {
    async fn chat(&self, call: ChatCall) -> Result<ChatReply, PlatformError> {
        let ChatCall {
            model_id,
            prompt,
            image_url,
            mode,
        } = call;

        let body = ChatCallBody {
            model: model_id.clone(),
            prompt,
            stream: matches!(mode, ChatMode::Streaming),
            image_url,
        };

        debug!(model = %model_id, mode = ?mode, "Dispatching gateway chat call");

        let chat_url = construct_api_url(&self.base_url, "chat");
        let response = self
            .client
            .post(chat_url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .map_err(|err| PlatformError::new(format!("network request failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "<no body>".to_string());
            return Err(PlatformError::new(describe_error_body(status, &error_text)));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);

        if matches!(mode, ChatMode::Streaming) && is_event_stream(content_type.as_deref()) {
            let parser = SseParser::new(Box::pin(response.bytes_stream()));
            let stream = futures_util::stream::unfold(parser, |mut parser| async move {
                parser.next_value().await.map(|item| (item, parser))
            });
            return Ok(ChatReply::Stream(stream.boxed()));
        }

        let value = response.json::<Value>().await.map_err(|err| {
            PlatformError::new(format!("gateway reply was not valid JSON: {err}"))
        })?;
        Ok(ChatReply::Complete(value))
    }
}

#[async_trait]
impl PlatformAuth for HttpPlatform {
    async fn whoami(&self) -> Result<Option<UserIdentity>, PlatformError> {
        let whoami_url = construct_api_url(&self.base_url, "whoami");
        let response = self
            .client
            .get(whoami_url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|err| PlatformError::new(format!("whoami request failed: {err}")))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Ok(None);
        }
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "<no body>".to_string());
            return Err(PlatformError::new(describe_error_body(status, &error_text)));
        }

        response
            .json::<UserIdentity>()
            .await
            .map(Some)
            .map_err(|err| PlatformError::new(format!("whoami reply was not valid JSON: {err}")))
    }

    async fn sign_out(&self) -> Result<(), PlatformError> {
        let logout_url = construct_api_url(&self.base_url, "logout");
        let response = self
            .client
            .post(logout_url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|err| PlatformError::new(format!("sign-out request failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "<no body>".to_string());
            return Err(PlatformError::new(describe_error_body(status, &error_text)));
        }
        Ok(())
    }
}

fn is_event_stream(content_type: Option<&str>) -> bool {
    content_type
        .map(|value| value.to_ascii_lowercase().contains("text/event-stream"))
        .unwrap_or(false)
}

fn extract_data_payload(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim_start)
}

fn extract_error_summary(value: &Value) -> Option<String> {
    let summary = value
        .pointer("/error/message")
        .and_then(|v| v.as_str())
        .map(str::to_owned)
        .or_else(|| {
            value.get("error").and_then(|v| match v {
                Value::String(s) => Some(s.to_string()),
                Value::Object(map) => map
                    .get("message")
                    .and_then(|message| message.as_str().map(str::to_owned)),
                _ => None,
            })
        })
        .or_else(|| {
            value
                .get("message")
                .and_then(|v| v.as_str())
                .map(str::to_owned)
        });

    summary.map(|text| {
        let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
        collapsed.trim().to_string()
    })
}

fn describe_error_body(status: StatusCode, body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return format!("gateway returned {status}");
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        if let Some(summary) = extract_error_summary(&value) {
            if !summary.is_empty() {
                return format!("gateway returned {status}: {summary}");
            }
        }
    }

    let flattened: String = trimmed
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(200)
        .collect();
    format!("gateway returned {status}: {flattened}")
}

/// Incremental parser turning a byte stream of `data:` lines into JSON
/// values. Payload lines that fail to parse, and payloads carrying an error
/// member, surface as stream errors and stop the parse.
struct SseParser<S> {
    source: S,
    buffer: Vec<u8>,
    pending: VecDeque<Result<Value, PlatformError>>,
    finished: bool,
}

impl<S, B, E> SseParser<S>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: fmt::Display,
{
    fn new(source: S) -> Self {
        Self {
            source,
            buffer: Vec::new(),
            pending: VecDeque::new(),
            finished: false,
        }
    }

    async fn next_value(&mut self) -> Option<Result<Value, PlatformError>> {
        loop {
            if let Some(item) = self.pending.pop_front() {
                return Some(item);
            }
            if self.finished {
                return None;
            }
            match self.source.next().await {
                Some(Ok(chunk)) => self.ingest(chunk.as_ref()),
                Some(Err(err)) => {
                    self.finished = true;
                    return Some(Err(PlatformError::new(format!(
                        "stream read failed: {err}"
                    ))));
                }
                None => {
                    // Connection closed without a [DONE] marker
                    self.finished = true;
                }
            }
        }
    }

    fn ingest(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);

        while let Some(newline_pos) = memchr(b'\n', &self.buffer) {
            let line = match std::str::from_utf8(&self.buffer[..newline_pos]) {
                Ok(s) => s.trim().to_string(),
                Err(_) => {
                    self.buffer.drain(..=newline_pos);
                    continue;
                }
            };
            self.buffer.drain(..=newline_pos);

            self.accept_line(&line);
            if self.finished {
                break;
            }
        }
    }

    fn accept_line(&mut self, line: &str) {
        let Some(payload) = extract_data_payload(line) else {
            return;
        };
        if payload.is_empty() {
            return;
        }
        if payload == "[DONE]" {
            self.finished = true;
            return;
        }

        match serde_json::from_str::<Value>(payload) {
            Ok(value) => {
                if let Some(summary) = extract_error_summary(&value) {
                    self.pending.push_back(Err(PlatformError::new(summary)));
                    self.finished = true;
                } else {
                    self.pending.push_back(Ok(value));
                }
            }
            Err(_) => {
                self.pending.push_back(Err(PlatformError::new(format!(
                    "unparseable stream payload: {payload}"
                ))));
                self.finished = true;
            }
        }
    }
}
