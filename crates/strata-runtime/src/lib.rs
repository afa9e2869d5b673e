//! # strata-runtime
//!
//! The agent runtime: the reasoning loop, the business tools it can call,
//! and the bridge that lets synchronous callers drive it.
//!
//! ## Architecture
//!
//! ```text
//!      HTTP handlers / CLI          (any thread)
//!              │ submit(job, timeout)
//!              ▼
//!      ┌──────────────────┐
//!      │   AsyncBridge    │  ← bounded queue, in-flight limit,
//!      │                  │    cancel on timeout
//!      └────────┬─────────┘
//!               │ one OS thread, current-thread runtime + LocalSet
//!               ▼
//!      ┌──────────────────┐
//!      │      Agent       │
//!      │                  │
//!      │  1. Remember     │  ← user turn into the buffer
//!      │  2. Recall       │  ← context from all memory layers
//!      │  3. Plan (CoT)   │  ← JSON thoughts + plan
//!      │  4. Act (ReAct)  │  ← tool calls, observations
//!      │  5. Remember     │  ← plan, observations, answer
//!      └──────────────────┘
//!               │
//!       ┌───────┼──────────────┐
//!       ▼       ▼              ▼
//!   ┌───────┐ ┌────────┐ ┌──────────────┐
//!   │  LLM  │ │ Memory │ │ PatentTools  │ → backend, retrieval pipeline
//!   └───────┘ └────────┘ └──────────────┘
//! ```

pub mod agent;
pub mod bridge;
pub mod builder;
pub mod tools;

pub use agent::{Agent, AgentRequest, Plan, ReasoningMode, default_session_id};
pub use bridge::{AsyncBridge, BridgeConfig, BridgeError};
pub use builder::{AgentBridge, build_agent, build_memory, build_retrieval, retrieval_config, start_agent};
pub use tools::PatentTools;
