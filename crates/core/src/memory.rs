//! Chat memory trait — conversation history connected to an agent node.
//!
//! An agent loads prior messages before the turn and saves the
//! `(input, output)` pair afterwards. Both directions are best-effort from
//! the agent's point of view: failures are logged and the turn continues.

use async_trait::async_trait;

use crate::error::MemoryError;
use crate::message::Message;

#[async_trait]
pub trait ChatMemory: Send + Sync {
    /// The name of this backend (e.g., "buffer_window").
    fn name(&self) -> &str;

    /// Prior messages, oldest first.
    async fn load_history(&self) -> std::result::Result<Vec<Message>, MemoryError>;

    /// Record one completed exchange.
    async fn save_context(&self, input: &str, output: &str) -> std::result::Result<(), MemoryError>;

    /// Forget the stored history.
    async fn clear(&self) -> std::result::Result<(), MemoryError>;
}
