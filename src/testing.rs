//! Test doubles shared by the unit tests.

use std::{
    collections::{BTreeSet, VecDeque},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use async_openai::types::chat::{ChatCompletionRequestMessage, ChatCompletionRequestUserMessageContent};
use async_trait::async_trait;

use crate::{
    api::ChatBackend,
    embeddings::Embedder,
    errors::BoxError,
    session::{Incoming, Transport},
    vector_store::{DEFAULT_DOCUMENTS, KnowledgeBase},
};

fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
}

/// Deterministic bag-of-words embedder over a fixed vocabulary.
///
/// Words outside the vocabulary are ignored; vectors are L2-normalized.
pub struct VocabEmbedder {
    vocabulary: Vec<String>,
}

impl VocabEmbedder {
    pub fn new(texts: &[String]) -> Self {
        let vocabulary: BTreeSet<String> = texts.iter().flat_map(|t| words(t)).collect();
        Self {
            vocabulary: vocabulary.into_iter().collect(),
        }
    }
}

impl Embedder for VocabEmbedder {
    fn dimension(&self) -> usize {
        self.vocabulary.len()
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, BoxError> {
        let mut vector = vec![0f32; self.vocabulary.len()];
        for word in words(text) {
            if let Ok(i) = self.vocabulary.binary_search(&word) {
                vector[i] += 1.0;
            }
        }
        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        Ok(vector)
    }
}

/// The five reference documents indexed with a [`VocabEmbedder`].
pub fn reference_knowledge() -> KnowledgeBase {
    let documents: Vec<String> = DEFAULT_DOCUMENTS.iter().map(|d| d.to_string()).collect();
    let embedder = Arc::new(VocabEmbedder::new(&documents));
    KnowledgeBase::build(documents, embedder).expect("reference corpus indexes")
}

fn last_user_text(messages: &[ChatCompletionRequestMessage]) -> String {
    match messages.last() {
        Some(ChatCompletionRequestMessage::User(m)) => match &m.content {
            ChatCompletionRequestUserMessageContent::Text(t) => t.clone(),
            _ => String::new(),
        },
        _ => String::new(),
    }
}

/// Replies `"reply to: <user text>"` and records every request.
#[derive(Default)]
pub struct RecordingChat {
    requests: Mutex<Vec<Vec<ChatCompletionRequestMessage>>>,
    fail_on: Option<String>,
}

impl RecordingChat {
    /// Errors for any user text containing `trigger`.
    pub fn failing_on(trigger: &str) -> Self {
        Self {
            requests: Mutex::default(),
            fail_on: Some(trigger.to_string()),
        }
    }

    pub fn requests(&self) -> Vec<Vec<ChatCompletionRequestMessage>> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatBackend for RecordingChat {
    async fn complete(&self, messages: Vec<ChatCompletionRequestMessage>) -> Result<String, BoxError> {
        let user_text = last_user_text(&messages);
        self.requests.lock().unwrap().push(messages);
        match &self.fail_on {
            Some(trigger) if user_text.contains(trigger.as_str()) => {
                Err("provider unavailable".into())
            }
            _ => Ok(format!("reply to: {user_text}")),
        }
    }
}

pub struct FailingChat;

#[async_trait]
impl ChatBackend for FailingChat {
    async fn complete(&self, _messages: Vec<ChatCompletionRequestMessage>) -> Result<String, BoxError> {
        Err("connection refused".into())
    }
}

/// Answers every request with whitespace only.
pub struct BlankChat;

#[async_trait]
impl ChatBackend for BlankChat {
    async fn complete(&self, _messages: Vec<ChatCompletionRequestMessage>) -> Result<String, BoxError> {
        Ok(" \n\t".to_string())
    }
}

pub struct SlowChat(pub Duration);

#[async_trait]
impl ChatBackend for SlowChat {
    async fn complete(&self, _messages: Vec<ChatCompletionRequestMessage>) -> Result<String, BoxError> {
        tokio::time::sleep(self.0).await;
        Ok("too late".to_string())
    }
}

/// In-memory [`Transport`]: replays queued client frames, then reports a disconnect.
///
/// Clones share state, so a test can keep one handle while the session owns another.
#[derive(Clone, Default)]
pub struct MemoryTransport {
    incoming: Arc<Mutex<VecDeque<String>>>,
    sent: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
    send_limit: Option<usize>,
    close_fails: bool,
}

impl MemoryTransport {
    pub fn new(frames: &[&str]) -> Self {
        Self {
            incoming: Arc::new(Mutex::new(frames.iter().map(|f| f.to_string()).collect())),
            ..Self::default()
        }
    }

    /// Fail every send after the first `n` succeed.
    pub fn failing_sends_after(mut self, n: usize) -> Self {
        self.send_limit = Some(n);
        self
    }

    /// Make `close` report an error.
    pub fn failing_close(mut self) -> Self {
        self.close_fails = true;
        self
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn recv(&mut self) -> Result<Incoming, BoxError> {
        Ok(match self.incoming.lock().unwrap().pop_front() {
            Some(text) => Incoming::Text(text),
            None => Incoming::Disconnected,
        })
    }

    async fn send_text(&mut self, text: String) -> Result<(), BoxError> {
        let mut sent = self.sent.lock().unwrap();
        if self.send_limit.is_some_and(|limit| sent.len() >= limit) {
            return Err("connection reset by peer".into());
        }
        sent.push(text);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), BoxError> {
        if self.close_fails {
            return Err("broken pipe".into());
        }
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
