//! Buffer-window memory — the last `k` exchanges of a session, in process.
//!
//! Histories live in a [`SessionStore`] shared by every memory handle, so a
//! session keeps its history across items and node executions for as long
//! as the store is alive.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use flowlm_core::error::MemoryError;
use flowlm_core::memory::ChatMemory;
use flowlm_core::message::Message;
use tokio::sync::RwLock;
use tracing::debug;

pub const DEFAULT_WINDOW: usize = 5;

/// Conversation histories keyed by session id.
#[derive(Clone, Default)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<String, Vec<Message>>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A memory handle for one session.
    pub fn session(&self, session_id: impl Into<String>, window: usize) -> BufferWindowMemory {
        BufferWindowMemory {
            store: self.clone(),
            session_id: session_id.into(),
            window,
        }
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

/// Keeps at most `window` (user, assistant) pairs per session.
#[derive(Clone)]
pub struct BufferWindowMemory {
    store: SessionStore,
    session_id: String,
    window: usize,
}

impl BufferWindowMemory {
    /// A memory with its own private store.
    pub fn new(session_id: impl Into<String>, window: usize) -> Self {
        SessionStore::new().session(session_id, window)
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

#[async_trait]
impl ChatMemory for BufferWindowMemory {
    fn name(&self) -> &str {
        "buffer_window"
    }

    async fn load_history(&self) -> Result<Vec<Message>, MemoryError> {
        let sessions = self.store.sessions.read().await;
        Ok(sessions.get(&self.session_id).cloned().unwrap_or_default())
    }

    async fn save_context(&self, input: &str, output: &str) -> Result<(), MemoryError> {
        let mut sessions = self.store.sessions.write().await;
        let history = sessions.entry(self.session_id.clone()).or_default();
        history.push(Message::user(input));
        history.push(Message::assistant(output));

        let keep = self.window * 2;
        if history.len() > keep {
            let excess = history.len() - keep;
            history.drain(..excess);
        }

        debug!(session = %self.session_id, messages = history.len(), "Saved exchange to memory");
        Ok(())
    }

    async fn clear(&self) -> Result<(), MemoryError> {
        self.store.sessions.write().await.remove(&self.session_id);
        Ok(())
    }
}
