//! Chat memory implementations for FlowLM agents.

pub mod buffer_window;

pub use buffer_window::{BufferWindowMemory, SessionStore};
