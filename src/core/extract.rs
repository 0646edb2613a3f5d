//! Provider response normalization.
//!
//! The gateway relays each upstream provider's response body unchanged, so the
//! same logical reply arrives in one of several container shapes depending on
//! which family served it. Everything here is pure and panic-free; callers
//! decide what an unrecognized shape means for them.

use futures_util::{Stream, StreamExt};
use serde_json::Value;

/// Fixed text substituted when a one-shot response has no recognizable shape.
pub const UNRECOGNIZED_RESPONSE_TEXT: &str = "response format was different than expected";

/// Extract the reply text from a provider response object.
///
/// Shapes are tried in a fixed order: a bare JSON string, `{"text": ...}`,
/// `message.content[0].text`, `content[0].text`,
/// `choices[0].message.content`, and `choices[0].text`. Returns `None` when
/// none of them match, including for shapes that are present but carry a
/// non-string payload.
pub fn extract_text(value: &Value) -> Option<String> {
    value
        .as_str()
        .map(str::to_owned)
        .or_else(|| {
            value
                .get("text")
                .and_then(Value::as_str)
                .map(str::to_owned)
        })
        .or_else(|| {
            value
                .pointer("/message/content/0/text")
                .and_then(Value::as_str)
                .map(str::to_owned)
        })
        .or_else(|| {
            value
                .pointer("/content/0/text")
                .and_then(Value::as_str)
                .map(str::to_owned)
        })
        .or_else(|| {
            value
                .pointer("/choices/0/message/content")
                .and_then(Value::as_str)
                .map(str::to_owned)
        })
        .or_else(|| {
            value
                .pointer("/choices/0/text")
                .and_then(Value::as_str)
                .map(str::to_owned)
        })
}

/// Extract the reply text from a one-shot response, degrading to
/// [`UNRECOGNIZED_RESPONSE_TEXT`] instead of failing.
pub fn extract_text_or_fallback(value: &Value) -> String {
    extract_text(value).unwrap_or_else(|| UNRECOGNIZED_RESPONSE_TEXT.to_string())
}

/// Adapt a stream of provider response objects into a stream of text
/// increments. Elements without extractable text are skipped; upstream errors
/// pass through unchanged.
pub fn text_increments<S, E>(stream: S) -> impl Stream<Item = Result<String, E>>
where
    S: Stream<Item = Result<Value, E>>,
{
    stream.filter_map(|item| async move {
        match item {
            Ok(value) => extract_text(&value).map(Ok),
            Err(err) => Some(Err(err)),
        }
    })
}
