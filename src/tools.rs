//! Tool trait, the math and search tools, and per-agent tool sets

use crate::error::{Error, Result};
use crate::llm_client::ToolDefinition;
use crate::types::RequestId;
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;

/// Context provided to tools during execution
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// Request the tool runs for
    pub request_id: RequestId,
    /// Name of the agent that asked for the tool
    pub agent: String,
}

impl ToolContext {
    /// Create a new tool context
    pub fn new(request_id: RequestId, agent: impl Into<String>) -> Self {
        Self {
            request_id,
            agent: agent.into(),
        }
    }
}

/// Output from a tool execution
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    /// Whether the tool execution was successful
    pub success: bool,
    /// Output content
    pub content: String,
    /// Failure description
    pub error: Option<String>,
}

impl ToolOutput {
    /// Create a successful tool output
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            success: true,
            content: content.into(),
            error: None,
        }
    }

    /// Create a failed tool output
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            content: String::new(),
            error: Some(error.into()),
        }
    }

    /// Text to hand back to the model
    pub fn render(&self) -> String {
        if self.success {
            self.content.clone()
        } else {
            let error = self.error.as_deref().unwrap_or("unknown error");
            if self.content.is_empty() {
                format!("Error: {}", error)
            } else {
                format!("Error: {}\n{}", error, self.content)
            }
        }
    }
}

/// Tool trait defining the interface for agent capabilities
#[async_trait]
pub trait Tool: Send + Sync {
    /// Name the model uses to call this tool
    fn name(&self) -> &str;

    /// Description for LLM function calling
    fn description(&self) -> &str;

    /// JSON Schema for input parameters
    fn input_schema(&self) -> Value;

    /// Execute the tool with given parameters
    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<ToolOutput>;

    /// Validate parameters against the input schema
    fn validate(&self, params: &Value) -> Result<()> {
        let schema = self.input_schema();
        let validator = jsonschema::validator_for(&schema)
            .map_err(|e| Error::tool_execution(self.name(), format!("invalid schema: {}", e)))?;

        let errors: Vec<String> = match validator.validate(params) {
            Ok(()) => Vec::new(),
            Err(errors) => errors.map(|error| error.to_string()).collect(),
        };
        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::invalid_input(format!(
                "{}: {}",
                self.name(),
                errors.join("; ")
            )))
        }
    }

    /// Definition offered to the model
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.input_schema(),
        }
    }
}

/// Argument schema for `T`, without the draft and title noise some providers reject
pub fn schema_for<T: JsonSchema>() -> Value {
    let mut schema = serde_json::to_value(schemars::schema_for!(T))
        .unwrap_or_else(|_| json!({ "type": "object" }));
    if let Some(map) = schema.as_object_mut() {
        map.remove("$schema");
        map.remove("title");
    }
    schema
}

fn parse_args<T: for<'de> Deserialize<'de>>(tool: &str, params: Value) -> Result<T> {
    serde_json::from_value(params)
        .map_err(|e| Error::invalid_input(format!("{}: {}", tool, e)))
}

/// Render a number without a trailing `.0` for whole values
fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

/// Two operands
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct BinaryArgs {
    /// First operand
    pub a: f64,
    /// Second operand
    pub b: f64,
}

/// A single operand
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct UnaryArgs {
    /// The operand
    pub x: f64,
}

/// Binary arithmetic operations offered as separate tools
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithmeticOp {
    /// a + b
    Add,
    /// a - b
    Subtract,
    /// a * b
    Multiply,
    /// a / b
    Divide,
    /// a ^ b
    Power,
}

impl ArithmeticOp {
    fn name(&self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Subtract => "subtract",
            Self::Multiply => "multiply",
            Self::Divide => "divide",
            Self::Power => "power",
        }
    }

    fn description(&self) -> &'static str {
        match self {
            Self::Add => "Add two numbers: a + b",
            Self::Subtract => "Subtract b from a: a - b",
            Self::Multiply => "Multiply two numbers: a * b",
            Self::Divide => "Divide a by b: a / b",
            Self::Power => "Raise a to the power b: a ^ b",
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Subtract => "-",
            Self::Multiply => "*",
            Self::Divide => "/",
            Self::Power => "^",
        }
    }

    fn apply(&self, a: f64, b: f64) -> std::result::Result<f64, String> {
        let result = match self {
            Self::Add => a + b,
            Self::Subtract => a - b,
            Self::Multiply => a * b,
            Self::Divide => {
                if b == 0.0 {
                    return Err("Division by zero".to_string());
                }
                a / b
            }
            Self::Power => a.powf(b),
        };

        if result.is_finite() {
            Ok(result)
        } else {
            Err(format!("{} {} {} is not a finite number", a, self.symbol(), b))
        }
    }
}

/// One arithmetic operation as a tool
pub struct ArithmeticTool {
    op: ArithmeticOp,
}

impl ArithmeticTool {
    /// Create a tool for the operation
    pub fn new(op: ArithmeticOp) -> Self {
        Self { op }
    }
}

#[async_trait]
impl Tool for ArithmeticTool {
    fn name(&self) -> &str {
        self.op.name()
    }

    fn description(&self) -> &str {
        self.op.description()
    }

    fn input_schema(&self) -> Value {
        schema_for::<BinaryArgs>()
    }

    async fn execute(&self, params: Value, _ctx: &ToolContext) -> Result<ToolOutput> {
        let BinaryArgs { a, b } = parse_args(self.name(), params)?;

        match self.op.apply(a, b) {
            Ok(result) => Ok(ToolOutput::success(format_number(result))),
            Err(reason) => Ok(ToolOutput::failure(reason)),
        }
    }
}

/// Square root tool
pub struct SquareRootTool;

#[async_trait]
impl Tool for SquareRootTool {
    fn name(&self) -> &str {
        "square_root"
    }

    fn description(&self) -> &str {
        "Square root of a non-negative number x"
    }

    fn input_schema(&self) -> Value {
        schema_for::<UnaryArgs>()
    }

    async fn execute(&self, params: Value, _ctx: &ToolContext) -> Result<ToolOutput> {
        let UnaryArgs { x } = parse_args(self.name(), params)?;

        if x < 0.0 {
            return Ok(ToolOutput::failure(format!(
                "Cannot take the square root of negative number {}",
                x
            )));
        }

        let result = x.sqrt();
        Ok(ToolOutput::success(format_number(result)))
    }
}

/// External search collaborator
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Run one query and return unstructured text
    async fn search(&self, query: &str) -> Result<String>;

    /// Backend name, for logging
    fn name(&self) -> &str;
}

/// Search query arguments
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SearchArgs {
    /// The search query to search for
    pub query: String,
}

/// Web search tool backed by a [`SearchBackend`]
pub struct WebSearchTool {
    backend: Arc<dyn SearchBackend>,
}

impl WebSearchTool {
    /// Create a search tool over the given backend
    pub fn new(backend: Arc<dyn SearchBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web for current information and return source excerpts"
    }

    fn input_schema(&self) -> Value {
        schema_for::<SearchArgs>()
    }

    async fn execute(&self, params: Value, _ctx: &ToolContext) -> Result<ToolOutput> {
        let SearchArgs { query } = parse_args(self.name(), params)?;
        let query = query.trim();
        if query.is_empty() {
            return Ok(ToolOutput::failure("Empty search query"));
        }

        match self.backend.search(query).await {
            Ok(text) => Ok(ToolOutput::success(text)),
            Err(e) => {
                tracing::warn!(backend = self.backend.name(), error = %e, "Search failed");
                Ok(ToolOutput::failure(format!("Search failed: {}", e)))
            }
        }
    }
}

/// Named allow-list of tools offered to one agent
#[derive(Clone, Default)]
pub struct ToolSet {
    name: String,
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolSet {
    /// Create an empty tool set
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tools: Vec::new(),
        }
    }

    /// Arithmetic tools
    pub fn math() -> Self {
        let mut set = Self::new("math");
        for op in [
            ArithmeticOp::Add,
            ArithmeticOp::Subtract,
            ArithmeticOp::Multiply,
            ArithmeticOp::Divide,
            ArithmeticOp::Power,
        ] {
            set = set.with_tool(Arc::new(ArithmeticTool::new(op)));
        }
        set.with_tool(Arc::new(SquareRootTool))
    }

    /// The single web-search tool
    pub fn research(backend: Arc<dyn SearchBackend>) -> Self {
        Self::new("research").with_tool(Arc::new(WebSearchTool::new(backend)))
    }

    /// Add a tool, replacing any tool with the same name
    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.retain(|existing| existing.name() != tool.name());
        self.tools.push(tool);
        self
    }

    /// Set name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Look up a tool by name
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|tool| tool.name() == name)
    }

    /// Tool names in order
    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|tool| tool.name()).collect()
    }

    /// Definitions offered to the model
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|tool| tool.definition()).collect()
    }

    /// Number of tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl fmt::Debug for ToolSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolSet")
            .field("name", &self.name)
            .field("tools", &self.names())
            .finish()
    }
}
