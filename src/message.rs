//! Conversation messages
//!
//! A [`Message`] is a single tagged variant: the role is the tag and each
//! variant carries exactly the fields that role can have. Loosely shaped
//! input (plain maps, fragment lists, `human`/`ai` role names) is normalized
//! once at deserialization time, so nothing downstream has to probe shapes.

use crate::error::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

/// Role of a message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instruction
    System,
    /// Human turn
    User,
    /// Model turn
    Assistant,
    /// Tool result
    Tool,
}

impl Role {
    /// Wire name of the role
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tool call requested by an assistant message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    /// Call identifier, echoed back by the tool result
    pub id: String,
    /// Name of the requested tool
    pub name: String,
    /// Structured arguments
    #[serde(default, deserialize_with = "deserialize_arguments")]
    pub arguments: Value,
}

impl ToolInvocation {
    /// Create a new tool invocation
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// A message in a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Message {
    /// Instruction message
    System {
        /// Text content
        #[serde(default, deserialize_with = "deserialize_content")]
        content: String,
    },
    /// Human message
    #[serde(alias = "human")]
    User {
        /// Text content
        #[serde(default, deserialize_with = "deserialize_content")]
        content: String,
    },
    /// Model message, possibly requesting tool calls
    #[serde(alias = "ai")]
    Assistant {
        /// Text content
        #[serde(default, deserialize_with = "deserialize_content")]
        content: String,
        /// Requested tool invocations
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolInvocation>,
    },
    /// Result of one tool invocation
    Tool {
        /// Tool output or failure description
        #[serde(default, deserialize_with = "deserialize_content")]
        content: String,
        /// Invocation this result answers
        tool_call_id: String,
        /// Name of the tool that produced it
        #[serde(default)]
        name: String,
        /// Whether the tool failed
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },
}

impl Message {
    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::System {
            content: content.into(),
        }
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::User {
            content: content.into(),
        }
    }

    /// Create an assistant message without tool calls
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::Assistant {
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }

    /// Create an assistant message that requests tool calls
    pub fn assistant_with_tools(content: impl Into<String>, tool_calls: Vec<ToolInvocation>) -> Self {
        Self::Assistant {
            content: content.into(),
            tool_calls,
        }
    }

    /// Create a successful tool result
    pub fn tool(
        content: impl Into<String>,
        tool_call_id: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self::Tool {
            content: content.into(),
            tool_call_id: tool_call_id.into(),
            name: name.into(),
            is_error: false,
        }
    }

    /// Create a failed tool result
    pub fn tool_error(
        content: impl Into<String>,
        tool_call_id: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self::Tool {
            content: content.into(),
            tool_call_id: tool_call_id.into(),
            name: name.into(),
            is_error: true,
        }
    }

    /// Build a message from loosely shaped JSON.
    ///
    /// Accepts `{"role": ..., "content": ...}` as well as maps that carry the
    /// role under `type` (`{"type": "human", ...}`). Content may be a string
    /// or a list of fragments; fragments are joined with spaces.
    pub fn from_value(value: Value) -> Result<Self> {
        let value = match value {
            Value::String(text) => return Ok(Self::user(text)),
            Value::Object(mut map) => {
                if !map.contains_key("role") {
                    if let Some(kind) = map.remove("type") {
                        map.insert("role".to_string(), kind);
                    }
                }
                Value::Object(map)
            }
            other => {
                return Err(Error::invalid_input(format!(
                    "message must be an object or a string, got {}",
                    other
                )))
            }
        };

        Ok(serde_json::from_value(value)?)
    }

    /// Role of this message
    pub fn role(&self) -> Role {
        match self {
            Self::System { .. } => Role::System,
            Self::User { .. } => Role::User,
            Self::Assistant { .. } => Role::Assistant,
            Self::Tool { .. } => Role::Tool,
        }
    }

    /// Normalized text content
    pub fn content(&self) -> &str {
        match self {
            Self::System { content }
            | Self::User { content }
            | Self::Assistant { content, .. }
            | Self::Tool { content, .. } => content,
        }
    }

    /// Tool calls requested by this message (empty unless assistant)
    pub fn tool_calls(&self) -> &[ToolInvocation] {
        match self {
            Self::Assistant { tool_calls, .. } => tool_calls,
            _ => &[],
        }
    }

    /// Whether this is an assistant message with tool calls still to run
    pub fn has_pending_tool_calls(&self) -> bool {
        !self.tool_calls().is_empty()
    }

    /// Whether this is an assistant message that answers without tool calls
    pub fn is_final_answer(&self) -> bool {
        matches!(self, Self::Assistant { tool_calls, .. } if tool_calls.is_empty())
    }
}

/// Ordered message history for one request.
///
/// Append-only: messages can be pushed but never removed or edited.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    /// Create an empty conversation
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a conversation holding a single user message
    pub fn from_user(content: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::user(content)],
        }
    }

    /// Build a conversation from a JSON array of loosely shaped messages
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Array(items) => items
                .into_iter()
                .map(Message::from_value)
                .collect::<Result<Vec<_>>>()
                .map(Self::from),
            other => Err(Error::invalid_input(format!(
                "conversation must be a JSON array, got {}",
                other
            ))),
        }
    }

    /// Append a message
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// All messages in order
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Iterate over the messages
    pub fn iter(&self) -> std::slice::Iter<'_, Message> {
        self.messages.iter()
    }

    /// Most recent message
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Most recent user message, scanning backwards
    pub fn last_user_message(&self) -> Option<&Message> {
        self.messages
            .iter()
            .rev()
            .find(|message| message.role() == Role::User)
    }

    /// Tool calls attached to the most recent message
    pub fn pending_tool_calls(&self) -> &[ToolInvocation] {
        self.last().map(Message::tool_calls).unwrap_or(&[])
    }

    /// Number of messages
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the conversation has no messages
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Consume into the underlying messages
    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }
}

impl From<Vec<Message>> for Conversation {
    fn from(messages: Vec<Message>) -> Self {
        Self { messages }
    }
}

impl FromIterator<Message> for Conversation {
    fn from_iter<I: IntoIterator<Item = Message>>(iter: I) -> Self {
        Self {
            messages: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Conversation {
    type Item = &'a Message;
    type IntoIter = std::slice::Iter<'a, Message>;

    fn into_iter(self) -> Self::IntoIter {
        self.messages.iter()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawContent {
    Text(String),
    Fragments(Vec<Fragment>),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Fragment {
    Text(String),
    Block {
        #[serde(default)]
        text: Option<String>,
    },
}

fn deserialize_content<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<RawContent>::deserialize(deserializer)?;
    Ok(match raw {
        None => String::new(),
        Some(RawContent::Text(text)) => text,
        Some(RawContent::Fragments(fragments)) => fragments
            .into_iter()
            .filter_map(|fragment| match fragment {
                Fragment::Text(text) => Some(text),
                Fragment::Block { text } => text,
            })
            .collect::<Vec<_>>()
            .join(" "),
    })
}

// Providers disagree on whether arguments are an object or a JSON-encoded string.
fn deserialize_arguments<'de, D>(deserializer: D) -> std::result::Result<Value, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(encoded) => serde_json::from_str(&encoded).unwrap_or(Value::String(encoded)),
        Value::Null => Value::Object(Default::default()),
        other => other,
    })
}
