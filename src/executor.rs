//! Tool execution step
//!
//! Runs the tool calls of the most recent assistant message, in order, and
//! appends one tool-result message per call. Failures never abort the run:
//! they come back to the agent as error results it can react to.

use crate::error::Result;
use crate::message::{Conversation, Message, ToolInvocation};
use crate::tools::{ToolContext, ToolSet};
use std::time::Instant;

/// Executes pending tool calls against an agent's tool set
#[derive(Debug, Clone, Copy, Default)]
pub struct ToolExecutor;

impl ToolExecutor {
    /// Create a new executor
    pub fn new() -> Self {
        Self
    }

    /// Execute every pending call and append the results.
    ///
    /// Returns the number of tool messages appended.
    pub async fn execute(
        &self,
        conversation: &mut Conversation,
        tools: &ToolSet,
        ctx: &ToolContext,
    ) -> Result<usize> {
        let calls: Vec<ToolInvocation> = conversation.pending_tool_calls().to_vec();

        for call in &calls {
            let message = self.invoke(call, tools, ctx).await;
            conversation.push(message);
        }

        Ok(calls.len())
    }

    async fn invoke(&self, call: &ToolInvocation, tools: &ToolSet, ctx: &ToolContext) -> Message {
        let Some(tool) = tools.get(&call.name) else {
            tracing::warn!(
                tool = %call.name,
                tool_set = tools.name(),
                "Model requested a tool outside its allow-list"
            );
            return Message::tool_error(
                format!(
                    "Error: unknown tool '{}'. Available tools: {}",
                    call.name,
                    tools.names().join(", ")
                ),
                &call.id,
                &call.name,
            );
        };

        if let Err(e) = tool.validate(&call.arguments) {
            tracing::warn!(tool = %call.name, error = %e, "Rejected tool arguments");
            return Message::tool_error(format!("Error: {}", e), &call.id, &call.name);
        }

        let started = Instant::now();
        match tool.execute(call.arguments.clone(), ctx).await {
            Ok(output) => {
                tracing::info!(
                    request_id = %ctx.request_id,
                    agent = %ctx.agent,
                    tool = %call.name,
                    success = output.success,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Tool executed"
                );
                if output.success {
                    Message::tool(output.render(), &call.id, &call.name)
                } else {
                    Message::tool_error(output.render(), &call.id, &call.name)
                }
            }
            Err(e) => {
                tracing::warn!(tool = %call.name, error = %e, "Tool execution failed");
                Message::tool_error(format!("Error: {}", e), &call.id, &call.name)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::tools::{Tool, ToolOutput};
    use crate::types::RequestId;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::Arc;

    struct FailingTool;

    #[async_trait]
    impl Tool for FailingTool {
        fn name(&self) -> &str {
            "explode"
        }

        fn description(&self) -> &str {
            "Always fails"
        }

        fn input_schema(&self) -> Value {
            json!({ "type": "object" })
        }

        async fn execute(&self, _params: Value, _ctx: &ToolContext) -> Result<ToolOutput> {
            Err(Error::tool_execution("explode", "kaboom"))
        }
    }

    fn ctx() -> ToolContext {
        ToolContext::new(RequestId::new(), "math_agent")
    }

    fn request_tools(calls: Vec<ToolInvocation>) -> Conversation {
        vec![
            Message::user("Calculate 15 + 25 and then multiply by 3"),
            Message::assistant_with_tools("", calls),
        ]
        .into()
    }

    #[tokio::test]
    async fn test_each_call_gets_one_tagged_result() {
        let mut conversation = request_tools(vec![
            ToolInvocation::new("c1", "add", json!({ "a": 15, "b": 25 })),
            ToolInvocation::new("c2", "multiply", json!({ "a": 40, "b": 3 })),
        ]);

        let appended = ToolExecutor::new()
            .execute(&mut conversation, &ToolSet::math(), &ctx())
            .await
            .unwrap();

        assert_eq!(appended, 2);
        assert_eq!(conversation.messages()[2], Message::tool("40", "c1", "add"));
        assert_eq!(conversation.messages()[3], Message::tool("120", "c2", "multiply"));
    }

    #[tokio::test]
    async fn test_failures_become_error_results() {
        let tools = ToolSet::math().with_tool(Arc::new(FailingTool));
        let mut conversation = request_tools(vec![
            ToolInvocation::new("c1", "web_search", json!({ "query": "x" })),
            ToolInvocation::new("c2", "divide", json!({ "a": 1, "b": 0 })),
            ToolInvocation::new("c3", "add", json!({ "a": 1 })),
            ToolInvocation::new("c4", "explode", json!({})),
        ]);

        ToolExecutor::new()
            .execute(&mut conversation, &tools, &ctx())
            .await
            .unwrap();

        let results = &conversation.messages()[2..];
        assert_eq!(results.len(), 4);
        for (result, id) in results.iter().zip(["c1", "c2", "c3", "c4"]) {
            match result {
                Message::Tool {
                    tool_call_id,
                    is_error,
                    content,
                    ..
                } => {
                    assert_eq!(tool_call_id, id);
                    assert!(is_error, "{id} should be an error result");
                    assert!(content.starts_with("Error:"), "{content}");
                }
                other => panic!("expected tool message, got {:?}", other),
            }
        }
        assert!(results[0].content().contains("unknown tool 'web_search'"));
        assert!(results[3].content().contains("kaboom"));
    }

    #[tokio::test]
    async fn test_nothing_pending_appends_nothing() {
        let mut conversation: Conversation =
            vec![Message::user("hi"), Message::assistant("hello")].into();

        let appended = ToolExecutor::new()
            .execute(&mut conversation, &ToolSet::math(), &ctx())
            .await
            .unwrap();

        assert_eq!(appended, 0);
        assert_eq!(conversation.len(), 2);
    }
}
