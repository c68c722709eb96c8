//! Supervisor loop
//!
//! A finite-state machine over [`State`] driven one step at a time. The
//! transition table lives in [`next_state`]; [`Supervisor::invoke`] runs the
//! action of each state and appends its messages before moving on.

use crate::agent::{Agent, AgentRole};
use crate::classifier::{IntentClassifier, RoutingDecision, RoutingMode, RoutingPolicy};
use crate::config::{RequestConfig, RouterConfig, DEFAULT_MAX_STEPS};
use crate::error::{Error, Result};
use crate::executor::ToolExecutor;
use crate::llm_client::LlmClient;
use crate::message::{Conversation, Message};
use crate::providers::{GoogleSearch, ProviderRegistry};
use crate::tools::{SearchBackend, ToolContext};
use crate::trace::{RunTrace, StepKind};
use crate::types::RequestId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Supervisor state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "role", rename_all = "snake_case")]
pub enum State {
    /// Decide which agent handles the turn
    Classify,
    /// Call the agent's model
    Agent(AgentRole),
    /// Run the tool calls the agent just requested
    Tools(AgentRole),
    /// Stop and hand the conversation back
    Terminal,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Classify => f.write_str("classify"),
            Self::Agent(role) => f.write_str(role.as_str()),
            Self::Tools(role) => write!(f, "{}_tools", role.as_str().trim_end_matches("_agent")),
            Self::Terminal => f.write_str("terminal"),
        }
    }
}

/// Transition table of the supervisor.
///
/// Pure: the next state depends only on the current state, the conversation
/// as it stands after the current state's action, and the routing mode.
pub fn next_state(
    state: State,
    conversation: &Conversation,
    classifier: &IntentClassifier,
    mode: RoutingMode,
) -> State {
    match state {
        State::Classify => match AgentRole::from_decision(classifier.classify(conversation)) {
            Some(role) => State::Agent(role),
            None => State::Terminal,
        },
        State::Agent(role) => {
            if conversation
                .last()
                .is_some_and(Message::has_pending_tool_calls)
            {
                State::Tools(role)
            } else {
                match mode {
                    RoutingMode::Simple => State::Terminal,
                    RoutingMode::LoopBack => State::Classify,
                }
            }
        }
        State::Tools(role) => State::Agent(role),
        State::Terminal => State::Terminal,
    }
}

fn decision_for(state: State) -> RoutingDecision {
    match state {
        State::Agent(AgentRole::Math) => RoutingDecision::MathAgent,
        State::Agent(AgentRole::Research) => RoutingDecision::ResearchAgent,
        _ => RoutingDecision::End,
    }
}

/// Result of one routed request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterOutput {
    /// Conversation including every message the run appended
    pub conversation: Conversation,
    /// First routing decision of the run
    pub route: RoutingDecision,
    /// Visited states, timings and token usage
    pub trace: RunTrace,
}

impl RouterOutput {
    /// Text of the last message, usually the agent's final answer
    pub fn answer(&self) -> Option<&str> {
        self.conversation.last().map(Message::content)
    }
}

/// Routes conversations to the math or research agent
#[derive(Debug, Clone)]
pub struct Supervisor {
    classifier: IntentClassifier,
    math_agent: Agent,
    research_agent: Agent,
    registry: ProviderRegistry,
    executor: ToolExecutor,
    max_steps: u32,
}

impl Supervisor {
    /// Create a new supervisor builder
    pub fn builder() -> SupervisorBuilder {
        SupervisorBuilder::new()
    }

    /// Build the full stack from configuration.
    ///
    /// The research agent searches through Gemini when Google is configured.
    /// Without it the search tool stays bound but every search fails, which
    /// the research agent sees as an error result.
    pub fn from_config(config: &RouterConfig) -> Result<Self> {
        config.validate()?;

        let backend: Arc<dyn SearchBackend> = match &config.google {
            Some(google) => Arc::new(GoogleSearch::new(google.clone(), config.search.clone())?),
            None => {
                tracing::warn!("GOOGLE_API_KEY not set; web search is unavailable");
                Arc::new(UnavailableSearch)
            }
        };

        Self::builder()
            .policy(config.routing)
            .registry(ProviderRegistry::from_config(config)?)
            .search_backend(backend)
            .max_steps(config.max_steps)
            .build()
    }

    /// Classifier in use
    pub fn classifier(&self) -> &IntentClassifier {
        &self.classifier
    }

    /// Agent for a role
    pub fn agent(&self, role: AgentRole) -> &Agent {
        match role {
            AgentRole::Math => &self.math_agent,
            AgentRole::Research => &self.research_agent,
        }
    }

    /// Provider registry in use
    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Bound on agent and tool steps per request
    pub fn max_steps(&self) -> u32 {
        self.max_steps
    }

    /// Route one conversation to completion
    #[tracing::instrument(
        skip_all,
        fields(
            request_id = tracing::field::Empty,
            messages = conversation.len(),
            provider = ?request.model_provider
        )
    )]
    pub async fn invoke(
        &self,
        mut conversation: Conversation,
        request: &RequestConfig,
    ) -> Result<RouterOutput> {
        let request_id = RequestId::new();
        tracing::Span::current().record("request_id", tracing::field::display(request_id));

        let client = self.registry.select(request.model_provider.as_deref())?;
        let mode = self.classifier.policy().mode;
        let mut trace = RunTrace::new(request_id);
        let mut route = None;
        let mut steps = 0u32;
        let mut state = State::Classify;

        while state != State::Terminal {
            let started = Instant::now();
            let next = match state {
                State::Classify => {
                    let next = next_state(state, &conversation, &self.classifier, mode);
                    let decision = decision_for(next);
                    route.get_or_insert(decision);
                    trace.record(StepKind::Classify { decision }, started.elapsed());
                    tracing::info!(decision = %decision, "Routed conversation");
                    next
                }
                State::Agent(role) => {
                    self.count_step(&mut steps)?;
                    let usage = self
                        .agent(role)
                        .run(&mut conversation, client.as_ref())
                        .await?;
                    let tool_calls = conversation.pending_tool_calls().len();
                    trace.record(
                        StepKind::Agent {
                            role,
                            tool_calls,
                            usage,
                        },
                        started.elapsed(),
                    );
                    next_state(state, &conversation, &self.classifier, mode)
                }
                State::Tools(role) => {
                    self.count_step(&mut steps)?;
                    let before = conversation.len();
                    let ctx = ToolContext::new(request_id, role.as_str());
                    let results = self
                        .executor
                        .execute(&mut conversation, &self.agent(role).tools, &ctx)
                        .await?;
                    let failures = conversation.messages()[before..]
                        .iter()
                        .filter(|message| matches!(message, Message::Tool { is_error: true, .. }))
                        .count();
                    trace.record(
                        StepKind::Tools {
                            role,
                            results,
                            failures,
                        },
                        started.elapsed(),
                    );
                    next_state(state, &conversation, &self.classifier, mode)
                }
                State::Terminal => State::Terminal,
            };

            tracing::debug!(from = %state, to = %next, step = steps, "State transition");
            state = next;
        }

        trace.complete();
        tracing::info!(
            steps,
            total_tokens = trace.total_tokens.total_tokens,
            "Request complete"
        );

        Ok(RouterOutput {
            conversation,
            route: route.unwrap_or(RoutingDecision::End),
            trace,
        })
    }

    fn count_step(&self, steps: &mut u32) -> Result<()> {
        if *steps >= self.max_steps {
            tracing::warn!(max_steps = self.max_steps, "Step limit reached");
            return Err(Error::MaxStepsExceeded(self.max_steps));
        }
        *steps += 1;
        Ok(())
    }
}

/// Supervisor builder
#[derive(Default)]
pub struct SupervisorBuilder {
    policy: RoutingPolicy,
    math_agent: Option<Agent>,
    research_agent: Option<Agent>,
    registry: Option<ProviderRegistry>,
    max_steps: Option<u32>,
}

impl SupervisorBuilder {
    /// Create a new supervisor builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the routing policy
    pub fn policy(mut self, policy: RoutingPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set the math agent
    pub fn math_agent(mut self, agent: Agent) -> Self {
        self.math_agent = Some(agent);
        self
    }

    /// Set the research agent
    pub fn research_agent(mut self, agent: Agent) -> Self {
        self.research_agent = Some(agent);
        self
    }

    /// Use the standard research agent over a search backend
    pub fn search_backend(self, backend: Arc<dyn SearchBackend>) -> Self {
        self.research_agent(Agent::research(backend))
    }

    /// Set the provider registry
    pub fn registry(mut self, registry: ProviderRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Register a single client as the default provider
    pub fn client(self, client: Arc<dyn LlmClient>) -> Self {
        let registry = self.registry.clone().unwrap_or_default();
        let provider = registry.default_provider();
        self.registry(registry.with_client(provider, client))
    }

    /// Set the step bound
    pub fn max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = Some(max_steps);
        self
    }

    /// Build the supervisor
    pub fn build(self) -> Result<Supervisor> {
        let research_agent = self
            .research_agent
            .ok_or_else(|| Error::config("Research agent (or a search backend) is required"))?;
        let registry = self
            .registry
            .ok_or_else(|| Error::config("At least one model client is required"))?;
        if registry.providers().is_empty() {
            return Err(Error::config("At least one model client is required"));
        }
        let max_steps = self.max_steps.unwrap_or(DEFAULT_MAX_STEPS);
        if max_steps == 0 {
            return Err(Error::config("max_steps must be at least 1"));
        }

        Ok(Supervisor {
            classifier: IntentClassifier::new(self.policy),
            math_agent: self.math_agent.unwrap_or_else(Agent::math),
            research_agent,
            registry,
            executor: ToolExecutor::new(),
            max_steps,
        })
    }
}

struct UnavailableSearch;

#[async_trait]
impl SearchBackend for UnavailableSearch {
    async fn search(&self, _query: &str) -> Result<String> {
        Err(Error::config(
            "web search requires the Google provider (set GOOGLE_API_KEY)",
        ))
    }

    fn name(&self) -> &str {
        "unavailable"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::TieBreak;
    use crate::config::ProviderConfig;
    use crate::llm_client::{ModelRequest, ModelResponse};
    use crate::message::ToolInvocation;
    use crate::providers::ModelProvider;
    use crate::types::TokenUsage;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::collections::VecDeque;

    /// Replays queued replies and records every request
    struct ScriptedClient {
        name: &'static str,
        replies: Mutex<VecDeque<Result<Message>>>,
        requests: Mutex<Vec<ModelRequest>>,
    }

    impl ScriptedClient {
        fn new(replies: Vec<Result<Message>>) -> Arc<Self> {
            Self::named("scripted", replies)
        }

        fn named(name: &'static str, replies: Vec<Result<Message>>) -> Arc<Self> {
            Arc::new(Self {
                name,
                replies: Mutex::new(replies.into()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.requests.lock().len()
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedClient {
        async fn complete(&self, request: ModelRequest) -> Result<ModelResponse> {
            self.requests.lock().push(request);
            let message = self
                .replies
                .lock()
                .pop_front()
                .unwrap_or_else(|| Ok(Message::assistant_with_tools(
                    "",
                    vec![ToolInvocation::new("again", "add", json!({ "a": 1, "b": 1 }))],
                )))?;
            Ok(ModelResponse {
                message,
                usage: TokenUsage::new(10, 2),
            })
        }

        fn provider(&self) -> &str {
            self.name
        }

        fn model(&self) -> &str {
            "scripted-model"
        }
    }

    struct StaticSearch;

    #[async_trait]
    impl SearchBackend for StaticSearch {
        async fn search(&self, query: &str) -> Result<String> {
            Ok(format!("Results for '{}': Eric Adams is the mayor of New York City.", query))
        }

        fn name(&self) -> &str {
            "static"
        }
    }

    fn supervisor(client: Arc<ScriptedClient>, policy: RoutingPolicy) -> Supervisor {
        Supervisor::builder()
            .policy(policy)
            .search_backend(Arc::new(StaticSearch))
            .client(client)
            .build()
            .unwrap()
    }

    fn call(id: &str, name: &str, arguments: serde_json::Value) -> Message {
        Message::assistant_with_tools("", vec![ToolInvocation::new(id, name, arguments)])
    }

    #[test]
    fn test_transition_table() {
        let classifier = IntentClassifier::default();
        let math = Conversation::from_user("Calculate 5 + 3");
        let empty = Conversation::new();

        assert_eq!(
            next_state(State::Classify, &math, &classifier, RoutingMode::Simple),
            State::Agent(AgentRole::Math)
        );
        assert_eq!(
            next_state(State::Classify, &empty, &classifier, RoutingMode::Simple),
            State::Terminal
        );

        let mut pending = math.clone();
        pending.push(call("c1", "add", json!({ "a": 5, "b": 3 })));
        assert_eq!(
            next_state(State::Agent(AgentRole::Math), &pending, &classifier, RoutingMode::Simple),
            State::Tools(AgentRole::Math)
        );

        let mut answered = math.clone();
        answered.push(Message::assistant("8"));
        assert_eq!(
            next_state(State::Agent(AgentRole::Math), &answered, &classifier, RoutingMode::Simple),
            State::Terminal
        );
        assert_eq!(
            next_state(State::Agent(AgentRole::Math), &answered, &classifier, RoutingMode::LoopBack),
            State::Classify
        );
        assert_eq!(
            next_state(State::Tools(AgentRole::Research), &answered, &classifier, RoutingMode::Simple),
            State::Agent(AgentRole::Research)
        );
    }

    #[tokio::test]
    async fn test_math_request_runs_tool_loop() {
        let client = ScriptedClient::new(vec![
            Ok(call("c1", "add", json!({ "a": 15, "b": 25 }))),
            Ok(call("c2", "multiply", json!({ "a": 40, "b": 3 }))),
            Ok(Message::assistant("15 + 25 = 40, and 40 × 3 = 120.")),
        ]);
        let supervisor = supervisor(client.clone(), RoutingPolicy::default());

        let output = supervisor
            .invoke(
                Conversation::from_user("Calculate 15 + 25 and then multiply by 3"),
                &RequestConfig::default(),
            )
            .await
            .unwrap();

        assert_eq!(output.route, RoutingDecision::MathAgent);
        assert_eq!(output.answer(), Some("15 + 25 = 40, and 40 × 3 = 120."));
        assert_eq!(output.conversation.len(), 6);
        assert_eq!(output.conversation.messages()[2], Message::tool("40", "c1", "add"));
        assert_eq!(output.conversation.messages()[4], Message::tool("120", "c2", "multiply"));
        assert_eq!(
            output.trace.visited(),
            vec![
                "classify",
                "math_agent",
                "math_tools",
                "math_agent",
                "math_tools",
                "math_agent"
            ]
        );
        assert_eq!(output.trace.total_tokens.total_tokens, 36);
        assert!(output.trace.is_complete());
        assert_eq!(client.calls(), 3);

        // The instruction goes to the model but never into the conversation.
        let requests = client.requests.lock();
        assert_eq!(requests[0].messages[0].role(), crate::message::Role::System);
        assert!(output
            .conversation
            .iter()
            .all(|message| message.role() != crate::message::Role::System));
    }

    #[tokio::test]
    async fn test_research_request_uses_search_only() {
        let client = ScriptedClient::new(vec![
            Ok(call("s1", "web_search", json!({ "query": "current mayor of New York" }))),
            Ok(Message::assistant("The current mayor of New York City is Eric Adams.")),
        ]);
        let supervisor = supervisor(client.clone(), RoutingPolicy::default());

        let output = supervisor
            .invoke(
                Conversation::from_user("Who is the current mayor of New York?"),
                &RequestConfig::default(),
            )
            .await
            .unwrap();

        assert_eq!(output.route, RoutingDecision::ResearchAgent);
        let tool_result = &output.conversation.messages()[2];
        assert!(tool_result.content().contains("Eric Adams"));
        assert!(matches!(tool_result, Message::Tool { is_error: false, .. }));

        let requests = client.requests.lock();
        let offered: Vec<_> = requests[0].tools.iter().map(|tool| tool.name.as_str()).collect();
        assert_eq!(offered, vec!["web_search"]);
    }

    #[tokio::test]
    async fn test_tool_outside_allow_list_is_an_error_result() {
        let client = ScriptedClient::new(vec![
            Ok(call("x1", "web_search", json!({ "query": "5 + 3" }))),
            Ok(Message::assistant("8")),
        ]);
        let supervisor = supervisor(client, RoutingPolicy::default());

        let output = supervisor
            .invoke(Conversation::from_user("Calculate 5 + 3"), &RequestConfig::default())
            .await
            .unwrap();

        assert!(matches!(
            &output.conversation.messages()[2],
            Message::Tool { is_error: true, name, .. } if name == "web_search"
        ));
        assert_eq!(output.answer(), Some("8"));
    }

    #[tokio::test]
    async fn test_loop_back_reclassifies_then_ends() {
        let client = ScriptedClient::new(vec![Ok(Message::assistant("Paris."))]);
        let supervisor = supervisor(
            client.clone(),
            RoutingPolicy::default().with_mode(RoutingMode::LoopBack),
        );

        let output = supervisor
            .invoke(
                Conversation::from_user("What is the capital of France?"),
                &RequestConfig::default(),
            )
            .await
            .unwrap();

        assert_eq!(output.route, RoutingDecision::ResearchAgent);
        assert_eq!(
            output.trace.decisions(),
            vec![RoutingDecision::ResearchAgent, RoutingDecision::End]
        );
        assert_eq!(client.calls(), 1);
        assert_eq!(output.conversation.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_conversation_ends_without_model_call() {
        let client = ScriptedClient::new(Vec::new());
        let supervisor = supervisor(client.clone(), RoutingPolicy::default());

        let output = supervisor
            .invoke(Conversation::new(), &RequestConfig::default())
            .await
            .unwrap();

        assert_eq!(output.route, RoutingDecision::End);
        assert!(output.conversation.is_empty());
        assert_eq!(output.answer(), None);
        assert_eq!(client.calls(), 0);
    }

    #[tokio::test]
    async fn test_step_limit_is_enforced() {
        // Replies never stop requesting tools.
        let client = ScriptedClient::new(Vec::new());
        let supervisor = Supervisor::builder()
            .search_backend(Arc::new(StaticSearch))
            .client(client.clone())
            .max_steps(3)
            .build()
            .unwrap();

        let err = supervisor
            .invoke(Conversation::from_user("What is 2 + 2?"), &RequestConfig::default())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::MaxStepsExceeded(3)));
        assert_eq!(client.calls(), 2);
    }

    #[tokio::test]
    async fn test_model_failure_propagates() {
        let client = ScriptedClient::new(vec![Err(Error::provider("scripted", 503, "overloaded"))]);
        let supervisor = supervisor(client, RoutingPolicy::default());

        let err = supervisor
            .invoke(Conversation::from_user("Calculate 5 + 3"), &RequestConfig::default())
            .await
            .unwrap_err();

        assert!(err.is_provider_failure());
    }

    #[tokio::test]
    async fn test_provider_selection() {
        let google = ScriptedClient::named("google", vec![Ok(Message::assistant("from google"))]);
        let openai = ScriptedClient::named("openai", vec![Ok(Message::assistant("from openai"))]);
        let registry = ProviderRegistry::new(ModelProvider::Google)
            .with_client(ModelProvider::Google, google.clone())
            .with_client(ModelProvider::OpenAi, openai.clone());
        let supervisor = Supervisor::builder()
            .search_backend(Arc::new(StaticSearch))
            .registry(registry)
            .build()
            .unwrap();

        let output = supervisor
            .invoke(
                Conversation::from_user("Calculate 5 + 3"),
                &RequestConfig::with_provider("openai"),
            )
            .await
            .unwrap();
        assert_eq!(output.answer(), Some("from openai"));

        // Unknown selectors fall back to the default provider.
        let output = supervisor
            .invoke(
                Conversation::from_user("Calculate 5 + 3"),
                &RequestConfig::with_provider("mistral"),
            )
            .await
            .unwrap();
        assert_eq!(output.answer(), Some("from google"));

        let err = supervisor
            .invoke(
                Conversation::from_user("Calculate 5 + 3"),
                &RequestConfig::with_provider("anthropic"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn test_tie_break_policy_reaches_agent_choice() {
        let client = ScriptedClient::new(vec![Ok(Message::assistant("done"))]);
        let supervisor = supervisor(
            client,
            RoutingPolicy::default().with_tie_break(TieBreak::PreferResearch),
        );

        let output = supervisor
            .invoke(
                Conversation::from_user("What is 4x4?"),
                &RequestConfig::default(),
            )
            .await
            .unwrap();
        assert_eq!(output.route, RoutingDecision::ResearchAgent);
    }

    #[test]
    fn test_builder_requires_client_and_search() {
        assert!(matches!(
            Supervisor::builder().client(ScriptedClient::new(Vec::new())).build(),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            Supervisor::builder().search_backend(Arc::new(StaticSearch)).build(),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_from_config_builds_without_google() {
        let config = RouterConfig::new()
            .with_provider(ProviderConfig::new(ModelProvider::Anthropic, "sk-ant"))
            .with_default_provider(ModelProvider::Anthropic)
            .with_max_steps(7);

        let supervisor = Supervisor::from_config(&config).unwrap();
        assert_eq!(supervisor.max_steps(), 7);
        assert_eq!(supervisor.registry().providers(), vec![ModelProvider::Anthropic]);
        assert_eq!(
            supervisor.agent(AgentRole::Research).tools.names(),
            vec!["web_search"]
        );
    }

    #[test]
    fn test_from_config_with_one_key_serves_default_requests() {
        let config =
            RouterConfig::new().with_provider(ProviderConfig::new(ModelProvider::OpenAi, "sk"));

        let supervisor = Supervisor::from_config(&config).unwrap();
        assert_eq!(supervisor.registry().default_provider(), ModelProvider::OpenAi);
        for selector in [None, Some("mistral"), Some("openai")] {
            let client = supervisor.registry().select(selector).unwrap();
            assert_eq!(client.provider(), "openai");
        }
    }

    #[test]
    fn test_from_config_rejects_empty_config() {
        assert!(Supervisor::from_config(&RouterConfig::new()).is_err());
    }
}
