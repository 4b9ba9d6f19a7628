//! # Agent Module
//!
//! The research agent bundles the capabilities workflow steps call into:
//! search, summarize, translate and the company/stock lookups. Steps only see
//! the [`ResearchExecutor`] trait, so tests can substitute a scripted executor.
//!
//! The agent also keeps light conversation bookkeeping: which tools a
//! conversation used and when it was last active, so idle conversations can be
//! expired.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::config::Config;
use crate::tools::{
    CompanyRecord, DataLookupTool, DuckDuckGoSearch, LanguageModel, OllamaModel, SearchBackend,
    SearchConfig, SearchResponse, SearchType, SmartSearch, StockRecord, SummaryOutput,
    SummaryTool, TavilySearch, ToolResult, TranslationOutput, TranslationTool,
};

// =============================================================================
// CAPABILITY INTERFACE
// =============================================================================
/// Capabilities a workflow step may call.
///
/// Every call reports success, error and execution time through [`ToolResult`].
/// `conversation_id`, when given, attributes the call to a conversation.
#[async_trait]
pub trait ResearchExecutor: Send + Sync {
    async fn search(
        &self,
        query: &str,
        search_type: SearchType,
        max_results: usize,
        conversation_id: Option<&str>,
    ) -> ToolResult<SearchResponse>;

    async fn summarize(
        &self,
        text: &str,
        max_length: usize,
        conversation_id: Option<&str>,
    ) -> ToolResult<SummaryOutput>;

    async fn translate(
        &self,
        text: &str,
        target_language: &str,
        source_language: &str,
        conversation_id: Option<&str>,
    ) -> ToolResult<TranslationOutput>;

    async fn lookup_company(
        &self,
        name: &str,
        conversation_id: Option<&str>,
    ) -> ToolResult<CompanyRecord>;

    async fn lookup_stock(
        &self,
        symbol: &str,
        conversation_id: Option<&str>,
    ) -> ToolResult<StockRecord>;

    /// Drop conversations idle for longer than the session timeout. Returns how many went.
    fn cleanup_expired_conversations(&self, _now: DateTime<Utc>) -> usize {
        0
    }
}

// =============================================================================
// CONVERSATION STATE
// =============================================================================
#[derive(Debug, Clone)]
struct ConversationState {
    user_id: Option<String>,
    created_at: DateTime<Utc>,
    last_activity: DateTime<Utc>,
    current_topic: Option<String>,
    search_history: Vec<String>,
    tools_used: Vec<&'static str>,
}

impl ConversationState {
    fn new(user_id: Option<String>, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            created_at: now,
            last_activity: now,
            current_topic: None,
            search_history: Vec::new(),
            tools_used: Vec::new(),
        }
    }
}

/// Point-in-time view of one conversation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationStats {
    pub conversation_id: String,
    pub user_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub current_topic: Option<String>,
    pub search_count: usize,
    /// Distinct tool names, sorted.
    pub active_tools: Vec<String>,
    /// Seconds between creation and last activity.
    pub session_duration: f64,
}

// =============================================================================
// RESEARCH AGENT
// =============================================================================
/// The production [`ResearchExecutor`].
pub struct ResearchAgent {
    search: SmartSearch,
    summary: SummaryTool,
    translation: TranslationTool,
    lookup: DataLookupTool,
    session_timeout: Duration,
    conversations: Mutex<HashMap<String, ConversationState>>,
}

impl ResearchAgent {
    pub fn new(backend: Arc<dyn SearchBackend>, model: Option<Arc<dyn LanguageModel>>) -> Self {
        let search = SmartSearch::new(backend);
        let (summary, translation) = match model {
            Some(model) => (
                SummaryTool::with_model(model.clone()),
                TranslationTool::with_model(model),
            ),
            None => (SummaryTool::new(), TranslationTool::new()),
        };

        Self {
            lookup: DataLookupTool::new(search.clone()),
            search,
            summary,
            translation,
            session_timeout: Duration::from_secs(7200),
            conversations: Mutex::new(HashMap::new()),
        }
    }

    /// Pick the search provider and language model from configuration.
    ///
    /// Tavily is used when an API key is configured, DuckDuckGo otherwise.
    pub fn from_config(config: &Config) -> Self {
        let backend: Arc<dyn SearchBackend> = match &config.tavily_api_key {
            Some(key) => Arc::new(TavilySearch::new(key.clone())),
            None => Arc::new(DuckDuckGoSearch::new()),
        };
        let model: Option<Arc<dyn LanguageModel>> = config.use_llm.then(|| {
            Arc::new(
                OllamaModel::new(&config.model, &config.ollama_host)
                    .with_temperature(config.temperature),
            ) as Arc<dyn LanguageModel>
        });

        info!(
            backend = backend.name(),
            llm = config.use_llm,
            "Research agent configured"
        );

        Self::new(backend, model).with_session_timeout(config.session_timeout)
    }

    pub fn with_session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = timeout;
        self
    }

    pub fn search_backend(&self) -> &'static str {
        self.search.backend_name()
    }

    /// Open a conversation and return its id.
    pub fn start_conversation(&self, user_id: Option<&str>) -> String {
        let conversation_id = uuid::Uuid::new_v4().to_string();
        self.conversations().insert(
            conversation_id.clone(),
            ConversationState::new(user_id.map(str::to_string), Utc::now()),
        );
        debug!(conversation_id = %conversation_id, "Conversation started");
        conversation_id
    }

    /// Returns whether the conversation existed.
    pub fn end_conversation(&self, conversation_id: &str) -> bool {
        self.conversations().remove(conversation_id).is_some()
    }

    pub fn conversation_stats(&self, conversation_id: &str) -> Option<ConversationStats> {
        let conversations = self.conversations();
        let state = conversations.get(conversation_id)?;
        let active_tools: BTreeSet<&str> = state.tools_used.iter().copied().collect();

        Some(ConversationStats {
            conversation_id: conversation_id.to_string(),
            user_id: state.user_id.clone(),
            created_at: state.created_at,
            last_activity: state.last_activity,
            current_topic: state.current_topic.clone(),
            search_count: state.search_history.len(),
            active_tools: active_tools.into_iter().map(str::to_string).collect(),
            session_duration: (state.last_activity - state.created_at)
                .to_std()
                .map(|d| d.as_secs_f64())
                .unwrap_or_default(),
        })
    }

    fn conversations(&self) -> MutexGuard<'_, HashMap<String, ConversationState>> {
        self.conversations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Attribute a tool call to a conversation. Unknown ids are ignored.
    fn record_tool_use(&self, conversation_id: Option<&str>, tool: &'static str, query: Option<&str>) {
        let Some(conversation_id) = conversation_id else {
            return;
        };
        let mut conversations = self.conversations();
        if let Some(state) = conversations.get_mut(conversation_id) {
            state.tools_used.push(tool);
            state.last_activity = Utc::now();
            if let Some(query) = query {
                state.search_history.push(query.to_string());
                state.current_topic = Some(query.to_string());
            }
        }
    }
}

#[async_trait]
impl ResearchExecutor for ResearchAgent {
    async fn search(
        &self,
        query: &str,
        search_type: SearchType,
        max_results: usize,
        conversation_id: Option<&str>,
    ) -> ToolResult<SearchResponse> {
        let started = std::time::Instant::now();
        let config = SearchConfig {
            search_type,
            max_results,
            include_summary: true,
        };
        let outcome = self.search.smart_search(query, &config).await;
        self.record_tool_use(conversation_id, "smart_search", Some(query));

        ToolResult::timed(
            "smart_search",
            serde_json::json!({
                "query": query,
                "search_type": search_type,
                "max_results": max_results,
            }),
            started,
            outcome,
        )
    }

    async fn summarize(
        &self,
        text: &str,
        max_length: usize,
        conversation_id: Option<&str>,
    ) -> ToolResult<SummaryOutput> {
        let result = self.summary.summarize(text, max_length).await;
        self.record_tool_use(conversation_id, "summarize", None);
        result
    }

    async fn translate(
        &self,
        text: &str,
        target_language: &str,
        source_language: &str,
        conversation_id: Option<&str>,
    ) -> ToolResult<TranslationOutput> {
        let result = self
            .translation
            .translate(text, target_language, source_language)
            .await;
        self.record_tool_use(conversation_id, "translate", None);
        result
    }

    async fn lookup_company(
        &self,
        name: &str,
        conversation_id: Option<&str>,
    ) -> ToolResult<CompanyRecord> {
        let result = self.lookup.lookup_company(name).await;
        self.record_tool_use(conversation_id, "lookup_company", None);
        result
    }

    async fn lookup_stock(
        &self,
        symbol: &str,
        conversation_id: Option<&str>,
    ) -> ToolResult<StockRecord> {
        let result = self.lookup.lookup_stock(symbol).await;
        self.record_tool_use(conversation_id, "lookup_stock", None);
        result
    }

    fn cleanup_expired_conversations(&self, now: DateTime<Utc>) -> usize {
        let timeout = self.session_timeout;
        let mut conversations = self.conversations();
        let before = conversations.len();
        conversations.retain(|_, state| {
            // A last_activity in the future counts as fresh.
            (now - state.last_activity)
                .to_std()
                .map_or(true, |idle| idle <= timeout)
        });
        let removed = before - conversations.len();
        if removed > 0 {
            info!(removed, "Expired idle conversations");
        }
        removed
    }
}

// =============================================================================
// AGENT MANAGER
// =============================================================================
/// Registry of executors, keyed by agent id.
#[derive(Default)]
pub struct AgentManager {
    agents: RwLock<HashMap<String, Arc<dyn ResearchExecutor>>>,
}

impl AgentManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) an agent under `agent_id`.
    pub fn register(&self, agent_id: impl Into<String>, agent: Arc<dyn ResearchExecutor>) {
        let agent_id = agent_id.into();
        debug!(agent_id = %agent_id, "Agent registered");
        self.agents
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(agent_id, agent);
    }

    pub fn get(&self, agent_id: &str) -> Option<Arc<dyn ResearchExecutor>> {
        self.agents
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(agent_id)
            .cloned()
    }

    pub fn agent_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .agents
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    /// Expire idle conversations across every agent. Returns the total removed.
    pub fn cleanup_all_expired(&self) -> usize {
        let now = Utc::now();
        let agents: Vec<Arc<dyn ResearchExecutor>> = self
            .agents
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .values()
            .cloned()
            .collect();
        agents
            .iter()
            .map(|agent| agent.cleanup_expired_conversations(now))
            .sum()
    }
}
