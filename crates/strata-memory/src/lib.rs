//! # strata-memory
//!
//! Layered memory for the Strata agent:
//!
//! - **Conversation buffer**: the last N turns of each session (in-memory).
//! - **Task scratchpad**: in-progress reasoning artifacts per session (in-memory).
//! - **Long-term store**: per-user episodic and semantic records, embedded and
//!   kept in a filterable vector index (SQLite, persistent).
//!
//! [`ContextAssembler`] gathers all three into an [`AgentContext`] each turn.

pub mod buffer;
pub mod context;
pub mod index;
pub mod long_term;
pub mod scratchpad;
pub mod store;

pub use buffer::ConversationBuffer;
pub use context::{AgentContext, ContextAssembler, Profile, format_context};
pub use index::{IndexHit, IndexRecord, MetadataFilter, SqliteVectorIndex, VectorIndex, cosine_similarity};
pub use long_term::{LongTermStore, Recall};
pub use scratchpad::TaskScratchpad;
pub use store::MemoryStore;
