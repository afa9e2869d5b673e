//! # strata-core
//!
//! Core types, traits, and primitives for Strata: the shared vocabulary of
//! messages, tools, memory records, and the unified error type used by every
//! other crate in the workspace.

pub mod error;
pub mod memory;
pub mod message;
pub mod tool;

pub use error::{Result, StrataError};
pub use memory::{ConversationTurn, LongTermRecord, MemoryType, ScratchpadEntry};
pub use message::{Message, MessageContent, Role};
pub use tool::{Tool, ToolCall, ToolExecutor, ToolResult};

/// Identifier of a conversation session (e.g. `session_alice`).
pub type SessionId = String;

/// Identifier of an end user; long-term memory is scoped by it.
pub type UserId = String;
