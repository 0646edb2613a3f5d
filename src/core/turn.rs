//! One chat turn, from prompt submission to a terminal event.
//!
//! Every turn runs on its own spawned task and reports through a single
//! unbounded channel as `(TurnEvent, TurnTag)` pairs. The tag carries the
//! conversation the turn was issued against, so late events land correctly
//! after a conversation switch. Exactly one terminal event (`Completed` or
//! `Failed`) is sent per turn.
//!
//! Families whose gateway endpoint answers in one piece get the reply
//! replayed locally in word groups on a fixed interval, so streaming and
//! non-streaming models feel the same at the prompt.

use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

use crate::core::config::Config;
use crate::core::extract::{extract_text_or_fallback, text_increments};
use crate::core::models::family_for_model;
use crate::platform::{ChatCall, ChatMode, ChatReply, PlatformChat, PlatformError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnErrorKind {
    Auth,
    PopupBlocked,
    Network,
    Timeout,
    UnsupportedModel,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnError {
    pub kind: TurnErrorKind,
    pub message: String,
}

impl TurnError {
    /// Best-effort substring classification of an underlying failure into a
    /// human-readable message.
    pub fn classify(source: &str) -> Self {
        let lowered = source.to_lowercase();
        let (kind, message) = if lowered.contains("popup") || lowered.contains("blocked") {
            (
                TurnErrorKind::PopupBlocked,
                "Sign-in was blocked before it completed. Sign in again with 'palabre auth'."
                    .to_string(),
            )
        } else if lowered.contains("network") || lowered.contains("fetch") {
            (
                TurnErrorKind::Network,
                "Network error. Please check your connection and try again.".to_string(),
            )
        } else if lowered.contains("timed out") || lowered.contains("timeout") {
            (
                TurnErrorKind::Timeout,
                "The request timed out. Please try again.".to_string(),
            )
        } else if lowered.contains("unauthorized")
            || lowered.contains("forbidden")
            || lowered.contains("401")
            || lowered.contains("403")
            || lowered.contains("auth")
        {
            (
                TurnErrorKind::Auth,
                "Authentication failed. Sign in again with 'palabre auth'.".to_string(),
            )
        } else if !source.trim().is_empty() {
            (TurnErrorKind::Other, source.to_string())
        } else {
            (
                TurnErrorKind::Other,
                "The request failed. Please try again.".to_string(),
            )
        };
        Self { kind, message }
    }

    pub fn unsupported_model() -> Self {
        Self {
            kind: TurnErrorKind::UnsupportedModel,
            message: "Unsupported model selected.".to_string(),
        }
    }
}

impl std::fmt::Display for TurnError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for TurnError {}

#[derive(Debug, Clone, PartialEq)]
pub enum TurnEvent {
    Chunk(String),
    Completed { full_text: String },
    Failed(TurnError),
}

/// Identifies which turn an event belongs to and where its output goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnTag {
    pub turn_id: u64,
    pub conversation_id: String,
    pub model_id: String,
}

#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub turn_id: u64,
    pub conversation_id: String,
    pub model_id: String,
    pub prompt: String,
    /// Data URL of an attached image, already encoded by the caller.
    pub image_url: Option<String>,
}

/// Pacing for locally replayed replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPacing {
    pub words_per_chunk: usize,
    pub interval: Duration,
}

impl ChunkPacing {
    pub fn from_config(config: &Config) -> Self {
        Self {
            words_per_chunk: config.effective_words_per_chunk(),
            interval: config.effective_chunk_interval(),
        }
    }
}

/// Split text into groups of whole words, each group keeping its original
/// trailing whitespace, so concatenating the groups reproduces the input
/// byte for byte. A text of N words yields ceil(N / words_per_chunk) groups.
pub fn word_groups(text: &str, words_per_chunk: usize) -> Vec<String> {
    let words_per_chunk = words_per_chunk.max(1);
    let mut groups: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut words_in_group = 0;
    let mut in_word = false;

    for ch in text.chars() {
        if ch.is_whitespace() {
            if in_word {
                words_in_group += 1;
                in_word = false;
            }
            current.push(ch);
        } else {
            if !in_word && words_in_group == words_per_chunk {
                groups.push(std::mem::take(&mut current));
                words_in_group = 0;
            }
            in_word = true;
            current.push(ch);
        }
    }
    if !current.is_empty() {
        groups.push(current);
    }
    groups
}

pub type TurnReceiver = mpsc::UnboundedReceiver<(TurnEvent, TurnTag)>;
type TurnSender = mpsc::UnboundedSender<(TurnEvent, TurnTag)>;

/// Spawns turns and owns the sending side of the event channel.
pub struct TurnRunner {
    platform: Arc<dyn PlatformChat>,
    pacing: ChunkPacing,
    tx: TurnSender,
}

impl TurnRunner {
    pub fn new(platform: Arc<dyn PlatformChat>, pacing: ChunkPacing) -> (Self, TurnReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                platform,
                pacing,
                tx,
            },
            rx,
        )
    }

    /// Launch one turn on its own task. Exactly one terminal event reaches
    /// the channel per call, even if the receiver has gone away.
    pub fn spawn_turn(&self, request: TurnRequest) {
        let platform = Arc::clone(&self.platform);
        let pacing = self.pacing;
        let tx = self.tx.clone();
        tokio::spawn(async move {
            run_turn(platform, pacing, tx, request).await;
        });
    }
}

async fn run_turn(
    platform: Arc<dyn PlatformChat>,
    pacing: ChunkPacing,
    tx: TurnSender,
    request: TurnRequest,
) {
    let tag = TurnTag {
        turn_id: request.turn_id,
        conversation_id: request.conversation_id.clone(),
        model_id: request.model_id.clone(),
    };

    debug!(
        turn_id = tag.turn_id,
        model = %tag.model_id,
        "Starting chat turn"
    );

    let terminal = match drive_turn(&platform, pacing, &tx, &tag, &request).await {
        Ok(full_text) => {
            debug!(
                turn_id = tag.turn_id,
                chars = full_text.len(),
                "Chat turn completed"
            );
            TurnEvent::Completed { full_text }
        }
        Err(err) => {
            debug!(
                turn_id = tag.turn_id,
                kind = ?err.kind,
                "Chat turn failed"
            );
            TurnEvent::Failed(err)
        }
    };
    let _ = tx.send((terminal, tag));
}

async fn drive_turn(
    platform: &Arc<dyn PlatformChat>,
    pacing: ChunkPacing,
    tx: &TurnSender,
    tag: &TurnTag,
    request: &TurnRequest,
) -> Result<String, TurnError> {
    let Some(family) = family_for_model(&request.model_id) else {
        debug!(model = %request.model_id, "Model matches no provider family");
        return Err(TurnError::unsupported_model());
    };

    // Attachments always go through the blocking path; only some families
    // stream at all.
    let try_native = family.streams_natively() && request.image_url.is_none();

    if try_native {
        match platform.chat(call_for(request, ChatMode::Streaming)).await {
            Ok(ChatReply::Stream(stream)) => match relay_native_stream(stream, tx, tag).await {
                NativeOutcome::Finished(full_text) => return Ok(full_text),
                NativeOutcome::FailedMidStream(err) => {
                    // Chunks already reached the user; a retry would repeat them.
                    return Err(TurnError::classify(err.message()));
                }
                NativeOutcome::FailedBeforeOutput(err) => {
                    debug!(error = %err, "Stream ended before any text, retrying blocking");
                }
            },
            Ok(ChatReply::Complete(value)) => {
                debug!(model = %request.model_id, "Gateway answered a streaming request in one piece");
                let full_text = extract_text_or_fallback(&value);
                simulate_stream(&full_text, pacing, tx, tag).await;
                return Ok(full_text);
            }
            Err(err) => {
                debug!(error = %err, "Streaming call failed, retrying blocking");
            }
        }
    }

    let reply = platform
        .chat(call_for(request, ChatMode::Blocking))
        .await
        .map_err(|err| TurnError::classify(err.message()))?;

    let full_text = match reply {
        ChatReply::Complete(value) => extract_text_or_fallback(&value),
        ChatReply::Stream(stream) => {
            // A blocking request answered with a stream: gather it whole.
            collect_stream_text(stream)
                .await
                .map_err(|err| TurnError::classify(err.message()))?
        }
    };

    simulate_stream(&full_text, pacing, tx, tag).await;
    Ok(full_text)
}

fn call_for(request: &TurnRequest, mode: ChatMode) -> ChatCall {
    ChatCall {
        model_id: request.model_id.clone(),
        prompt: request.prompt.clone(),
        image_url: request.image_url.clone(),
        mode,
    }
}

enum NativeOutcome {
    Finished(String),
    FailedBeforeOutput(PlatformError),
    FailedMidStream(PlatformError),
}

/// Forward native stream increments as chunk events, accumulating the full
/// text. Elements without text are skipped, as are empty increments.
async fn relay_native_stream(
    stream: BoxStream<'static, Result<Value, PlatformError>>,
    tx: &TurnSender,
    tag: &TurnTag,
) -> NativeOutcome {
    let increments = text_increments(stream);
    tokio::pin!(increments);

    let mut full_text = String::new();
    let mut emitted = false;
    while let Some(item) = increments.next().await {
        match item {
            Ok(text) => {
                if text.is_empty() {
                    continue;
                }
                full_text.push_str(&text);
                emitted = true;
                let _ = tx.send((TurnEvent::Chunk(text), tag.clone()));
            }
            Err(err) => {
                return if emitted {
                    NativeOutcome::FailedMidStream(err)
                } else {
                    NativeOutcome::FailedBeforeOutput(err)
                };
            }
        }
    }
    NativeOutcome::Finished(full_text)
}

async fn collect_stream_text(
    stream: BoxStream<'static, Result<Value, PlatformError>>,
) -> Result<String, PlatformError> {
    let increments = text_increments(stream);
    tokio::pin!(increments);

    let mut full_text = String::new();
    while let Some(item) = increments.next().await {
        full_text.push_str(&item?);
    }
    Ok(full_text)
}

/// Replay an already-complete reply as paced word-group chunks.
async fn simulate_stream(full_text: &str, pacing: ChunkPacing, tx: &TurnSender, tag: &TurnTag) {
    let groups = word_groups(full_text, pacing.words_per_chunk);
    debug!(
        chunks = groups.len(),
        interval_ms = pacing.interval.as_millis() as u64,
        "Replaying reply in word groups"
    );
    for (index, group) in groups.into_iter().enumerate() {
        if index > 0 && !pacing.interval.is_zero() {
            tokio::time::sleep(pacing.interval).await;
        }
        let _ = tx.send((TurnEvent::Chunk(group), tag.clone()));
    }
}
