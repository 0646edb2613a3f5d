//! In-memory conversation history and the streaming turn lifecycle.
//!
//! All mutation happens on the chat loop task, so the store is plain owned
//! state with no locking. A turn in flight is represented by a pending
//! record carrying the rollback point; a failed turn restores the
//! conversation to exactly its pre-turn message list.

use chrono::{DateTime, Utc};
use unicode_segmentation::UnicodeSegmentation;

pub const PLACEHOLDER_TITLE: &str = "New Conversation";

/// Titles keep the first 30 grapheme clusters of the opening prompt.
const TITLE_GRAPHEMES: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// Which model produced the reply. `None` on user messages.
    pub model: Option<String>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            model: None,
        }
    }

    pub fn assistant(content: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            model: Some(model.into()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Conversation {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub messages: Vec<Message>,
}

impl Conversation {
    fn new() -> Self {
        Self {
            id: new_conversation_id(),
            title: PLACEHOLDER_TITLE.to_string(),
            created_at: Utc::now(),
            messages: Vec::new(),
        }
    }
}

/// First 30 grapheme clusters of the opening prompt, always followed by an
/// ellipsis.
pub fn derive_title(first_prompt: &str) -> String {
    let mut title: String = first_prompt.graphemes(true).take(TITLE_GRAPHEMES).collect();
    title.push_str("...");
    title
}

fn new_conversation_id() -> String {
    best_effort_random_bytes(8)
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

fn best_effort_random_bytes(len: usize) -> Vec<u8> {
    let mut out = vec![0_u8; len];

    #[cfg(unix)]
    {
        use std::io::Read;
        if let Ok(mut file) = std::fs::File::open("/dev/urandom") {
            if file.read_exact(&mut out).is_ok() {
                return out;
            }
        }
    }

    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    let mut x = nanos ^ ((std::process::id() as u64) << 32) ^ (len as u64);
    for byte in &mut out {
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        *byte = (x & 0xFF) as u8;
    }
    out
}

#[derive(Debug, PartialEq, Eq)]
pub enum StoreError {
    UnknownConversation(String),
    TurnInFlight,
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::UnknownConversation(id) => {
                write!(f, "unknown conversation id: {id}")
            }
            StoreError::TurnInFlight => {
                write!(f, "a response is already in flight")
            }
        }
    }
}

impl std::error::Error for StoreError {}

#[derive(Debug)]
struct PendingTurn {
    conversation_id: String,
    /// Message count before the user message was appended. Rollback
    /// truncates to this.
    messages_before: usize,
    partial: String,
}

/// The ordered conversation set. Never empty; exactly one conversation is
/// active at any time.
#[derive(Debug)]
pub struct ConversationStore {
    conversations: Vec<Conversation>,
    active_id: String,
    pending: Option<PendingTurn>,
    streaming: bool,
}

impl ConversationStore {
    pub fn new() -> Self {
        let conversation = Conversation::new();
        let active_id = conversation.id.clone();
        Self {
            conversations: vec![conversation],
            active_id,
            pending: None,
            streaming: false,
        }
    }

    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn active_id(&self) -> &str {
        &self.active_id
    }

    pub fn active_conversation(&self) -> &Conversation {
        self.conversations
            .iter()
            .find(|c| c.id == self.active_id)
            .expect("the active conversation is always present")
    }

    pub fn conversation(&self, id: &str) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id == id)
    }

    fn conversation_mut(&mut self, id: &str) -> Result<&mut Conversation, StoreError> {
        self.conversations
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| StoreError::UnknownConversation(id.to_string()))
    }

    pub fn is_response_in_flight(&self) -> bool {
        self.streaming
    }

    /// Text streamed so far for the turn in flight.
    pub fn partial_response(&self) -> &str {
        self.pending
            .as_ref()
            .map(|pending| pending.partial.as_str())
            .unwrap_or("")
    }

    /// Append the user's message and record the rollback point. The first
    /// message also titles the conversation.
    pub fn append_user_message(&mut self, id: &str, content: &str) -> Result<(), StoreError> {
        if self.streaming {
            return Err(StoreError::TurnInFlight);
        }
        let conversation = self.conversation_mut(id)?;
        let messages_before = conversation.messages.len();
        if messages_before == 0 {
            conversation.title = derive_title(content);
        }
        conversation.messages.push(Message::user(content));
        self.pending = Some(PendingTurn {
            conversation_id: id.to_string(),
            messages_before,
            partial: String::new(),
        });
        Ok(())
    }

    pub fn begin_streaming(&mut self) {
        self.streaming = true;
        if let Some(pending) = self.pending.as_mut() {
            pending.partial.clear();
        }
    }

    /// Chunks accumulate in delivery order, none reordered or dropped.
    pub fn append_stream_chunk(&mut self, chunk: &str) {
        if let Some(pending) = self.pending.as_mut() {
            pending.partial.push_str(chunk);
        }
    }

    /// Land the finished reply on the conversation it was issued against,
    /// which need not be the active one.
    pub fn complete_streaming(
        &mut self,
        id: &str,
        full_content: &str,
        model_id: &str,
    ) -> Result<(), StoreError> {
        self.streaming = false;
        self.pending = None;
        let conversation = self.conversation_mut(id)?;
        conversation
            .messages
            .push(Message::assistant(full_content, model_id));
        Ok(())
    }

    /// Roll the conversation back to its pre-turn message list.
    pub fn fail_streaming(&mut self, id: &str) -> Result<(), StoreError> {
        self.streaming = false;
        let pending = self.pending.take();
        let conversation = self.conversation_mut(id)?;
        if let Some(pending) = pending.filter(|p| p.conversation_id == id) {
            conversation.messages.truncate(pending.messages_before);
        }
        Ok(())
    }

    /// Create a fresh conversation, put it first, and make it active.
    pub fn new_conversation(&mut self) -> String {
        let conversation = Conversation::new();
        let id = conversation.id.clone();
        self.conversations.insert(0, conversation);
        self.active_id = id.clone();
        id
    }

    /// Remove a conversation. The set never ends up empty: deleting the
    /// last one synthesizes a fresh default, and deleting the active one
    /// activates the first remaining.
    pub fn delete_conversation(&mut self, id: &str) -> Result<(), StoreError> {
        if !self.conversations.iter().any(|c| c.id == id) {
            return Err(StoreError::UnknownConversation(id.to_string()));
        }
        self.conversations.retain(|c| c.id != id);

        if self.conversations.is_empty() {
            let conversation = Conversation::new();
            self.active_id = conversation.id.clone();
            self.conversations.push(conversation);
        } else if self.active_id == id {
            self.active_id = self.conversations[0].id.clone();
        }
        Ok(())
    }

    pub fn select_conversation(&mut self, id: &str) -> Result<(), StoreError> {
        if !self.conversations.iter().any(|c| c.id == id) {
            return Err(StoreError::UnknownConversation(id.to_string()));
        }
        self.active_id = id.to_string();
        Ok(())
    }
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new()
    }
}
