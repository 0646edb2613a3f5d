#[cfg(test)]
use crate::platform::{ChatCall, ChatReply, PlatformChat, PlatformError};
#[cfg(test)]
use async_trait::async_trait;
#[cfg(test)]
use futures_util::stream;
#[cfg(test)]
use futures_util::StreamExt;
#[cfg(test)]
use serde_json::Value;
#[cfg(test)]
use std::collections::VecDeque;
#[cfg(test)]
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Scripted gateway stand-in. Replies are consumed in the order they
/// were pushed; every call is recorded for later inspection.
#[cfg(test)]
pub struct MockPlatform {
    replies: Mutex<VecDeque<Result<ChatReply, PlatformError>>>,
    calls: Mutex<Vec<ChatCall>>,
}

#[cfg(test)]
impl MockPlatform {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn push_complete(&self, value: Value) {
        self.replies
            .lock()
            .unwrap()
            .push_back(Ok(ChatReply::Complete(value)));
    }

    pub fn push_stream(&self, items: Vec<Result<Value, PlatformError>>) {
        self.replies
            .lock()
            .unwrap()
            .push_back(Ok(ChatReply::Stream(stream::iter(items).boxed())));
    }

    pub fn push_error(&self, message: &str) {
        self.replies
            .lock()
            .unwrap()
            .push_back(Err(PlatformError::new(message)));
    }

    pub fn calls(&self) -> Vec<ChatCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl PlatformChat for MockPlatform {
    async fn chat(&self, call: ChatCall) -> Result<ChatReply, PlatformError> {
        self.calls.lock().unwrap().push(call.clone());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(PlatformError::new("no scripted reply left")))
    }
}

#[cfg(test)]
static ENV_LOCK: Mutex<()> = Mutex::new(());

/// Holds the process-wide env lock for its lifetime and restores the
/// previous values of every variable it touched on drop.
#[cfg(test)]
pub struct TestEnvVarGuard {
    _lock: MutexGuard<'static, ()>,
    saved: Vec<(&'static str, Option<String>)>,
}

#[cfg(test)]
impl TestEnvVarGuard {
    pub fn new() -> Self {
        Self {
            _lock: ENV_LOCK.lock().unwrap_or_else(PoisonError::into_inner),
            saved: Vec::new(),
        }
    }

    pub fn set_var(&mut self, key: &'static str, value: &str) {
        self.save(key);
        std::env::set_var(key, value);
    }

    pub fn remove_var(&mut self, key: &'static str) {
        self.save(key);
        std::env::remove_var(key);
    }

    fn save(&mut self, key: &'static str) {
        if !self.saved.iter().any(|(k, _)| *k == key) {
            self.saved.push((key, std::env::var(key).ok()));
        }
    }
}

#[cfg(test)]
impl Drop for TestEnvVarGuard {
    fn drop(&mut self) {
        for (key, value) in self.saved.drain(..) {
            match value {
                Some(v) => std::env::set_var(key, v),
                None => std::env::remove_var(key),
            }
        }
    }
}
