use std::sync::Arc;
use tracing::debug;

use strata_core::{ConversationTurn, MemoryType, ScratchpadEntry};

use crate::buffer::ConversationBuffer;
use crate::long_term::{LongTermStore, Recall};
use crate::scratchpad::TaskScratchpad;

/// What the agent knows about the user beyond this conversation.
#[derive(Debug, Clone, PartialEq)]
pub enum Profile {
    Facts(Vec<String>),
    Summary(String),
}

impl Default for Profile {
    fn default() -> Self {
        Profile::Facts(Vec::new())
    }
}

/// Everything the reasoning loop sees for one turn. Rebuilt every turn.
#[derive(Debug, Clone, Default)]
pub struct AgentContext {
    pub history: Vec<ConversationTurn>,
    pub profile: Profile,
    pub relevant_long_term: Vec<String>,
    pub working: Vec<ScratchpadEntry>,
}

/// Gathers the three memory layers into an [`AgentContext`].
pub struct ContextAssembler {
    buffer: Arc<ConversationBuffer>,
    scratchpad: Arc<TaskScratchpad>,
    long_term: Arc<LongTermStore>,
}

impl ContextAssembler {
    pub fn new(
        buffer: Arc<ConversationBuffer>,
        scratchpad: Arc<TaskScratchpad>,
        long_term: Arc<LongTermStore>,
    ) -> Self {
        Self {
            buffer,
            scratchpad,
            long_term,
        }
    }

    pub async fn get_context(
        &self,
        user_id: &str,
        session_id: &str,
        query: &str,
        short_term_limit: usize,
        long_term_top_k: usize,
    ) -> AgentContext {
        let history = self.buffer.recent(session_id, short_term_limit);
        let profile = self
            .long_term
            .list_all(user_id, Some(MemoryType::Semantic))
            .await
            .into_hits();

        let mut recall = self
            .long_term
            .query_semantic(user_id, query, long_term_top_k, Some(MemoryType::Episodic))
            .await;
        // Nothing episodic: widen to every record type.
        if !recall.is_found() && !query.is_empty() {
            if let Recall::Unavailable(reason) = &recall {
                debug!(user_id, %reason, "episodic recall unavailable, retrying unscoped");
            }
            recall = self
                .long_term
                .query_semantic(user_id, query, long_term_top_k, None)
                .await;
        }

        AgentContext {
            history,
            profile: Profile::Facts(profile),
            relevant_long_term: recall.into_hits(),
            working: self.scratchpad.get(session_id),
        }
    }
}

/// Render the memory sections of a context for inclusion in a prompt.
///
/// Sections appear in a fixed order and empty ones are left out. The result
/// is either empty or ends with a blank line.
pub fn format_context(context: &AgentContext) -> String {
    let bullets = |items: &[String]| {
        items
            .iter()
            .map(|item| format!("- {item}"))
            .collect::<Vec<_>>()
            .join("\n")
    };

    let mut parts = Vec::new();
    if !context.relevant_long_term.is_empty() {
        parts.push(format!(
            "[Recalled long-term memory]\n{}",
            bullets(&context.relevant_long_term)
        ));
    }
    match &context.profile {
        Profile::Facts(facts) if !facts.is_empty() => {
            parts.push(format!("[User profile / knowledge]\n{}", bullets(facts)));
        }
        Profile::Summary(summary) if !summary.is_empty() => {
            parts.push(format!("[User profile]\n{summary}"));
        }
        _ => {}
    }
    if !context.working.is_empty() {
        let lines: Vec<String> = context
            .working
            .iter()
            .map(|entry| format!("- {}: {}", entry.key, entry.value))
            .collect();
        parts.push(format!("[Current task]\n{}", lines.join("\n")));
    }

    if parts.is_empty() {
        return String::new();
    }
    format!("{}\n\n", parts.join("\n\n"))
}
