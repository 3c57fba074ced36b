//! The agent turn shared by every FlowLM agent node.
//!
//! A turn follows an **Assemble → Act → Observe** cycle:
//!
//! 1. **Assemble** memory history, the system instruction and the user instruction
//! 2. **Invoke** the model, with tools bound when any are connected
//! 3. **If tool calls**: dispatch each, append the observations, loop back to step 2
//! 4. **If text**: parse it, save the exchange to memory, flush observability
//!
//! The loop stops when the model answers without tool calls or the iteration
//! cap is reached.

pub mod messages;
pub mod result;
pub mod tool_loop;
pub mod turn;

#[cfg(test)]
mod test_helpers;

pub use messages::{DEFAULT_SYSTEM_MESSAGE, Prompt, PromptMode, assemble_messages};
pub use result::{StepsPolicy, TurnResult, parse_output, save_exchange};
pub use tool_loop::{AgentAction, DEFAULT_MAX_ITERATIONS, IntermediateStep, LoopOutcome, ToolLoop};
pub use turn::{AgentTurn, ROOT_SPAN_NAME};
