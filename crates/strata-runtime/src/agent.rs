use std::sync::Arc;
use tracing::{debug, info, warn};

use strata_config::AgentConfig;
use strata_core::{
    ConversationTurn, MemoryType, Message, Result, Role, StrataError, Tool, ToolExecutor,
    ToolResult,
};
use strata_llm::{LlmProvider, LlmRequest};
use strata_memory::{AgentContext, MemoryStore, format_context};

const COT_INSTRUCTIONS: &str = "You are an intelligent agent. Using the conversation history and \
     what you know about the user, first think the problem through step by step, then give an \
     action plan (which tools, steps, or reasoning are needed). Reply with a JSON object: \
     {\"thoughts\": ..., \"plan\": ...}";

const REACT_INSTRUCTIONS: &str = "You are an intelligent agent. Work in rounds of Thought, \
     Action, and Observation: think first, then decide whether a tool call is needed, and \
     continue from its observation until the task is complete.";

// ── Reasoning mode ─────────────────────────────────────────────

/// How the agent reasons about a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReasoningMode {
    /// Think and plan in one completion.
    Cot,
    /// Think, act with tools, observe, repeat.
    React,
    /// Plan first, then let ReAct carry the plan out.
    CotReact,
}

impl ReasoningMode {
    /// Parse a mode name. `+` arrives as a space from URL query strings, so
    /// `cot react` is accepted as `cot+react`.
    pub fn parse(mode: &str) -> Result<Self> {
        match mode.trim().replace(' ', "+").to_ascii_lowercase().as_str() {
            "cot" => Ok(ReasoningMode::Cot),
            "react" => Ok(ReasoningMode::React),
            "cot+react" => Ok(ReasoningMode::CotReact),
            other => Err(StrataError::InvalidRequest(format!(
                "unknown reasoning mode '{other}' (expected cot, react, or cot+react)"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReasoningMode::Cot => "cot",
            ReasoningMode::React => "react",
            ReasoningMode::CotReact => "cot+react",
        }
    }
}

impl std::str::FromStr for ReasoningMode {
    type Err = StrataError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl std::fmt::Display for ReasoningMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Request ────────────────────────────────────────────────────

/// One query to the agent.
#[derive(Debug, Clone)]
pub struct AgentRequest {
    pub query: String,
    /// Empty means the configured default user.
    pub user_id: String,
    /// Defaults to `session_{user_id}`.
    pub session_id: Option<String>,
    /// Defaults to the configured mode.
    pub mode: Option<ReasoningMode>,
}

impl AgentRequest {
    pub fn new(query: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            user_id: user_id.into(),
            session_id: None,
            mode: None,
        }
    }

    pub fn with_mode(mut self, mode: ReasoningMode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

/// Session id used when a request names none.
pub fn default_session_id(user_id: &str) -> String {
    format!("session_{user_id}")
}

/// Output of the chain-of-thought step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Plan {
    pub thoughts: String,
    pub plan: String,
}

impl Plan {
    /// Read `{"thoughts", "plan"}`; anything that is not a JSON object is
    /// taken as the thoughts.
    pub fn parse(raw: &str) -> Self {
        match serde_json::from_str::<serde_json::Value>(raw.trim()) {
            Ok(value) if value.is_object() => Self {
                thoughts: json_text(&value["thoughts"]),
                plan: json_text(&value["plan"]),
            },
            _ => Self {
                thoughts: raw.to_string(),
                plan: String::new(),
            },
        }
    }
}

fn json_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ── Agent ──────────────────────────────────────────────────────

/// The reasoning loop: memory in, completions and tool calls, memory out.
pub struct Agent {
    memory: MemoryStore,
    llm: Arc<dyn LlmProvider>,
    tools: Arc<dyn ToolExecutor>,
    config: AgentConfig,
    catalog: Vec<Tool>,
    history_limit: usize,
    long_term_top_k: usize,
}

impl Agent {
    pub fn new(
        memory: MemoryStore,
        llm: Arc<dyn LlmProvider>,
        tools: Arc<dyn ToolExecutor>,
        config: AgentConfig,
    ) -> Self {
        Self {
            memory,
            llm,
            tools,
            config,
            catalog: Vec::new(),
            history_limit: 10,
            long_term_top_k: 3,
        }
    }

    pub fn with_context_limits(mut self, history_limit: usize, long_term_top_k: usize) -> Self {
        self.history_limit = history_limit;
        self.long_term_top_k = long_term_top_k;
        self
    }

    /// One-time init: load the tool catalog offered to the model.
    pub async fn connect(&mut self) -> Result<()> {
        self.catalog = self.tools.tools();
        let names: Vec<&str> = self.catalog.iter().map(|t| t.name.as_str()).collect();
        info!(tools = ?names, provider = self.llm.name(), "agent connected");
        Ok(())
    }

    pub fn catalog(&self) -> &[Tool] {
        &self.catalog
    }

    pub fn memory(&self) -> &MemoryStore {
        &self.memory
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub async fn process_query(&self, request: AgentRequest) -> Result<String> {
        let mode = match request.mode {
            Some(mode) => mode,
            None => ReasoningMode::parse(&self.config.default_mode)?,
        };
        let user_id = if request.user_id.trim().is_empty() {
            self.config.default_user_id.clone()
        } else {
            request.user_id
        };
        let session_id = request
            .session_id
            .unwrap_or_else(|| default_session_id(&user_id));
        let query = request.query;
        info!(user_id = %user_id, session_id = %session_id, %mode, "processing query");

        self.memory.add_turn(&session_id, Role::User, &query);
        let context = self
            .memory
            .get_context(&user_id, &session_id, &query, self.history_limit, self.long_term_top_k)
            .await;
        let rendered = format_context(&context);
        let messages = conversation(&context, &query);

        let answer = match mode {
            ReasoningMode::Cot => {
                let plan = self
                    .chain_of_thought(&self.system_prompt(COT_INSTRUCTIONS, &rendered, &user_id, None), &messages)
                    .await?;
                self.note_plan(&session_id, &plan);
                format!("[Reasoning]\n{}\n[Plan]\n{}", plan.thoughts, plan.plan)
            }
            ReasoningMode::React => {
                let trace = self
                    .react(
                        &self.system_prompt(REACT_INSTRUCTIONS, &rendered, &user_id, None),
                        messages,
                        &session_id,
                    )
                    .await?;
                format!("[ReAct]\n{trace}")
            }
            ReasoningMode::CotReact => {
                let plan = self
                    .chain_of_thought(&self.system_prompt(COT_INSTRUCTIONS, &rendered, &user_id, None), &messages)
                    .await?;
                self.note_plan(&session_id, &plan);
                let follow = format!("Carry out the task step by step following this plan: {}", plan.plan);
                let trace = self
                    .react(
                        &self.system_prompt(REACT_INSTRUCTIONS, &rendered, &user_id, Some(&follow)),
                        messages,
                        &session_id,
                    )
                    .await?;
                format!(
                    "[Reasoning]\n{}\n[Plan]\n{}\n[ReAct]\n{trace}",
                    plan.thoughts, plan.plan
                )
            }
        };

        self.memory.add_turn(&session_id, Role::Assistant, &answer);
        Ok(answer)
    }

    fn system_prompt(&self, instructions: &str, rendered: &str, user_id: &str, note: Option<&str>) -> String {
        let mut prompt = String::new();
        if let Some(base) = &self.config.system_prompt {
            prompt.push_str(base);
            prompt.push_str("\n\n");
        }
        prompt.push_str(instructions);
        prompt.push_str("\n\n");
        prompt.push_str(rendered);
        prompt.push_str(&format!(
            "[Session] The current user_id is {user_id}; use it for any tool that takes a user_id."
        ));
        if let Some(note) = note {
            prompt.push_str("\n\n");
            prompt.push_str(note);
        }
        prompt
    }

    fn request(&self, system: &str, messages: Vec<Message>) -> LlmRequest {
        LlmRequest {
            model: self.config.model.clone(),
            messages,
            tools: vec![],
            system: Some(system.to_string()),
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            json_mode: false,
        }
    }

    async fn chain_of_thought(&self, system: &str, messages: &[Message]) -> Result<Plan> {
        let mut request = self.request(system, messages.to_vec());
        request.json_mode = true;
        let response = self.llm.complete(&request).await?;
        let plan = Plan::parse(&response.text());
        debug!(plan_len = plan.plan.len(), "chain of thought complete");
        Ok(plan)
    }

    fn note_plan(&self, session_id: &str, plan: &Plan) {
        if !plan.plan.is_empty() {
            self.memory.scratchpad.add_text(session_id, "plan", &plan.plan);
        }
    }

    /// Up to `max_react_steps` completions; every tool call is executed and
    /// its observation fed back. Stops early once the model calls no tool.
    async fn react(&self, system: &str, mut messages: Vec<Message>, session_id: &str) -> Result<String> {
        let mut trace = Vec::new();

        for step in 0..self.config.max_react_steps {
            let mut request = self.request(system, messages.clone());
            request.tools = self.catalog.clone();
            let response = self.llm.complete(&request).await?;

            let text = response.text();
            if !text.is_empty() {
                trace.push(text);
            }
            let calls = response.message.tool_calls.clone();
            messages.push(response.message);
            if calls.is_empty() {
                debug!(step, "react finished without tool calls");
                break;
            }

            for call in &calls {
                let result = match self.tools.execute(call).await {
                    Ok(result) => result,
                    Err(e) => {
                        warn!(tool = %call.tool_name, error = %e, "tool call failed");
                        ToolResult::error(call, format!("Error: {e}"))
                    }
                };
                debug!(tool = %call.tool_name, is_error = result.is_error, "tool observation");
                self.memory.scratchpad.add_text(
                    session_id,
                    &format!("observation:{}", call.tool_name),
                    &result.content,
                );
                trace.push(format!("Observation ({}): {}", call.tool_name, result.content));
                messages.push(Message::tool_result(&result));
            }
        }

        Ok(trace.join("\n"))
    }

    // ── Memory operations ──────────────────────────────────────

    pub fn add_turn(&self, session_id: &str, role: Role, text: &str) {
        self.memory.add_turn(session_id, role, text);
    }

    pub async fn get_context(&self, user_id: &str, session_id: &str, query: &str) -> AgentContext {
        self.memory
            .get_context(user_id, session_id, query, self.history_limit, self.long_term_top_k)
            .await
    }

    pub fn clear_short_term(&self, session_id: &str) {
        self.memory.clear_short_term(session_id);
    }

    pub async fn upsert_long_term(
        &self,
        user_id: &str,
        key: &str,
        value: &str,
        memory_type: MemoryType,
    ) -> Result<()> {
        self.memory.upsert_long_term(user_id, key, value, memory_type).await
    }

    pub async fn clear_long_term(&self, user_id: &str) -> Result<usize> {
        self.memory.clear_long_term(user_id).await
    }
}

/// History turns followed by the query. The buffer already holds the query
/// as its newest turn, so that turn is not repeated.
fn conversation(context: &AgentContext, query: &str) -> Vec<Message> {
    let mut turns: &[ConversationTurn] = &context.history;
    if let Some((last, rest)) = turns.split_last()
        && last.role == Role::User
        && last.text == query
    {
        turns = rest;
    }

    let mut messages: Vec<Message> = turns
        .iter()
        .filter(|t| matches!(t.role, Role::User | Role::Assistant | Role::System))
        .map(|t| Message::text(t.role, &t.text))
        .collect();
    messages.push(Message::text(Role::User, query));
    messages
}
