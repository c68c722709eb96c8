//! Per-request run trace
//!
//! Records every state the supervisor visits for one request, with timings
//! and the token usage of each model call.

use crate::agent::AgentRole;
use crate::classifier::RoutingDecision;
use crate::types::{RequestId, TokenUsage};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What happened in one step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepKind {
    /// The classifier picked a route
    Classify {
        /// Decision taken
        decision: RoutingDecision,
    },
    /// An agent called its model
    Agent {
        /// Agent that ran
        role: AgentRole,
        /// Tool calls requested in the reply
        tool_calls: usize,
        /// Tokens spent on the call
        usage: TokenUsage,
    },
    /// Pending tool calls were executed
    Tools {
        /// Agent whose tools ran
        role: AgentRole,
        /// Results appended
        results: usize,
        /// Results that reported a failure
        failures: usize,
    },
}

impl StepKind {
    /// Node name of the step
    pub fn node(&self) -> String {
        match self {
            Self::Classify { .. } => "classify".to_string(),
            Self::Agent { role, .. } => role.as_str().to_string(),
            Self::Tools { role, .. } => format!("{}_tools", role.as_str().trim_end_matches("_agent")),
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Classify { decision } => format!("route -> {}", decision),
            Self::Agent {
                tool_calls, usage, ..
            } => format!("{} tool call(s), {} tokens", tool_calls, usage.total_tokens),
            Self::Tools {
                results, failures, ..
            } => format!("{} result(s), {} failed", results, failures),
        }
    }
}

/// One recorded step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    /// What happened
    #[serde(flatten)]
    pub kind: StepKind,
    /// When the step finished
    pub timestamp: DateTime<Utc>,
    /// Wall-clock time spent in the step
    pub elapsed_ms: u64,
}

/// Trace of one routed request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunTrace {
    /// Request this trace belongs to
    pub request_id: RequestId,
    /// Steps in execution order
    pub steps: Vec<StepRecord>,
    /// When the request started
    pub started_at: DateTime<Utc>,
    /// When the request reached the terminal state
    pub completed_at: Option<DateTime<Utc>>,
    /// Token usage summed over all model calls
    pub total_tokens: TokenUsage,
}

impl RunTrace {
    /// Create an empty trace
    pub fn new(request_id: RequestId) -> Self {
        Self {
            request_id,
            steps: Vec::new(),
            started_at: Utc::now(),
            completed_at: None,
            total_tokens: TokenUsage::default(),
        }
    }

    /// Record a step
    pub fn record(&mut self, kind: StepKind, elapsed: Duration) {
        if let StepKind::Agent { usage, .. } = &kind {
            self.total_tokens.add(*usage);
        }
        self.steps.push(StepRecord {
            kind,
            timestamp: Utc::now(),
            elapsed_ms: elapsed.as_millis() as u64,
        });
    }

    /// Mark the trace as completed
    pub fn complete(&mut self) {
        self.completed_at = Some(Utc::now());
    }

    /// Whether the request reached the terminal state
    pub fn is_complete(&self) -> bool {
        self.completed_at.is_some()
    }

    /// Every routing decision, in order
    pub fn decisions(&self) -> Vec<RoutingDecision> {
        self.steps
            .iter()
            .filter_map(|step| match step.kind {
                StepKind::Classify { decision } => Some(decision),
                _ => None,
            })
            .collect()
    }

    /// Number of agent and tool steps
    pub fn work_steps(&self) -> usize {
        self.steps
            .iter()
            .filter(|step| !matches!(step.kind, StepKind::Classify { .. }))
            .count()
    }

    /// Node names in visiting order
    pub fn visited(&self) -> Vec<String> {
        self.steps.iter().map(|step| step.kind.node()).collect()
    }

    /// Format the trace as a human-readable string
    pub fn format(&self) -> String {
        let mut output = format!("=== Request {} ===\n", self.request_id);
        for (i, step) in self.steps.iter().enumerate() {
            output.push_str(&format!(
                "{:>2}. {:<16} {} ({} ms)\n",
                i + 1,
                step.kind.node(),
                step.kind.describe(),
                step.elapsed_ms
            ));
        }
        output.push_str(&format!("Total tokens: {}\n", self.total_tokens.total_tokens));
        output
    }
}
