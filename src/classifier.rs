//! Keyword and pattern based intent classification
//!
//! Decides which specialist handles the current turn. This is a heuristic,
//! not a learned model: it has no confidence score and misroutes are
//! expected. It is a pure function of the conversation so it can be
//! re-run on every supervisor entry without caching.

use crate::message::Conversation;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

/// Substrings that signal an arithmetic request
pub const MATH_KEYWORDS: &[&str] = &[
    "calculate", "math", "multiply", "divide", "add", "subtract", "plus", "minus", "times",
    "equation", "solve", "=", "+", "-", "*", "/",
];

/// Substrings that signal an information lookup
pub const RESEARCH_KEYWORDS: &[&str] = &[
    "search", "find", "look up", "research", "who is", "what is", "when did", "where is",
    "how many", "current", "latest",
];

const BINARY_OPERATION: &str = r"\d\s*[-+*/x×÷]\s*\d";
const EXPONENT: &str = r"\d\s*\^\s*\d";
const PARENTHESIZED_NUMBER: &str = r"\([^()]*\d[^()]*\)";

static ARITHMETIC_PATTERNS: LazyLock<[Regex; 3]> = LazyLock::new(|| {
    [BINARY_OPERATION, EXPONENT, PARENTHESIZED_NUMBER]
        .map(|pattern| Regex::new(pattern).expect("valid arithmetic pattern"))
});

/// Where the supervisor goes next
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingDecision {
    /// Hand the turn to the math agent
    MathAgent,
    /// Hand the turn to the research agent
    ResearchAgent,
    /// Stop and return the conversation
    End,
}

impl RoutingDecision {
    /// Node name of the decision
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MathAgent => "math_agent",
            Self::ResearchAgent => "research_agent",
            Self::End => "end",
        }
    }
}

impl fmt::Display for RoutingDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happens after an agent answers without calling tools
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingMode {
    /// The run ends as soon as an agent gives a final answer
    #[default]
    Simple,
    /// Control returns to the classifier, which ends on a final answer
    LoopBack,
}

/// How to break a tie when both math and research signals are present
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// Math wins only if an arithmetic pattern matched
    #[default]
    PreferNumericPattern,
    /// Research always wins
    PreferResearch,
}

/// Tunable knobs of the classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingPolicy {
    /// Supervisor flavour
    #[serde(default)]
    pub mode: RoutingMode,
    /// Also match arithmetic-looking patterns, not just keywords
    #[serde(default = "default_numeric_patterns")]
    pub numeric_patterns: bool,
    /// Mixed-signal resolution
    #[serde(default)]
    pub tie_break: TieBreak,
}

fn default_numeric_patterns() -> bool {
    true
}

impl Default for RoutingPolicy {
    fn default() -> Self {
        Self {
            mode: RoutingMode::default(),
            numeric_patterns: default_numeric_patterns(),
            tie_break: TieBreak::default(),
        }
    }
}

impl RoutingPolicy {
    /// Set the routing mode
    pub fn with_mode(mut self, mode: RoutingMode) -> Self {
        self.mode = mode;
        self
    }

    /// Enable or disable the arithmetic patterns
    pub fn with_numeric_patterns(mut self, enabled: bool) -> Self {
        self.numeric_patterns = enabled;
        self
    }

    /// Set the tie-break rule
    pub fn with_tie_break(mut self, tie_break: TieBreak) -> Self {
        self.tie_break = tie_break;
        self
    }
}

/// Signals found in a single piece of text
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Signals {
    /// A math keyword matched
    pub math_keyword: bool,
    /// An arithmetic pattern matched
    pub numeric_pattern: bool,
    /// A research keyword matched
    pub research_keyword: bool,
}

impl Signals {
    /// Any math evidence at all
    pub fn has_math(&self) -> bool {
        self.math_keyword || self.numeric_pattern
    }
}

/// Heuristic intent classifier
#[derive(Debug, Clone)]
pub struct IntentClassifier {
    policy: RoutingPolicy,
}

impl IntentClassifier {
    /// Create a classifier for the given policy
    pub fn new(policy: RoutingPolicy) -> Self {
        Self { policy }
    }

    /// Policy this classifier was built with
    pub fn policy(&self) -> RoutingPolicy {
        self.policy
    }

    /// Classify the conversation
    pub fn classify(&self, conversation: &Conversation) -> RoutingDecision {
        let Some(last) = conversation.last() else {
            return RoutingDecision::End;
        };

        if self.policy.mode == RoutingMode::LoopBack && last.is_final_answer() {
            return RoutingDecision::End;
        }

        match conversation.last_user_message() {
            Some(message) => self.classify_text(message.content()),
            None => RoutingDecision::End,
        }
    }

    /// Classify a single user utterance
    pub fn classify_text(&self, text: &str) -> RoutingDecision {
        let signals = self.signals(text);

        match (signals.has_math(), signals.research_keyword) {
            (true, false) => RoutingDecision::MathAgent,
            (true, true) => match self.policy.tie_break {
                TieBreak::PreferNumericPattern if signals.numeric_pattern => {
                    RoutingDecision::MathAgent
                }
                _ => RoutingDecision::ResearchAgent,
            },
            _ => RoutingDecision::ResearchAgent,
        }
    }

    /// Collect the math and research signals of a piece of text
    pub fn signals(&self, text: &str) -> Signals {
        let text = text.to_lowercase();

        Signals {
            math_keyword: MATH_KEYWORDS.iter().any(|keyword| text.contains(keyword)),
            numeric_pattern: self.policy.numeric_patterns
                && ARITHMETIC_PATTERNS.iter().any(|pattern| pattern.is_match(&text)),
            research_keyword: RESEARCH_KEYWORDS.iter().any(|keyword| text.contains(keyword)),
        }
    }
}

impl Default for IntentClassifier {
    fn default() -> Self {
        Self::new(RoutingPolicy::default())
    }
}
