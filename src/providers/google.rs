//! Google Gemini client
//!
//! Besides chat completions this module provides [`GoogleSearch`], the
//! backend of the web-search tool: a Gemini call with the built-in
//! `google_search` grounding tool enabled.

use crate::config::{ProviderConfig, SearchConfig};
use crate::error::{Error, Result};
use crate::llm_client::{LlmClient, ModelRequest, ModelResponse};
use crate::message::{Message, ToolInvocation};
use crate::providers::{endpoint, ensure_success, ModelProvider};
use crate::tools::SearchBackend;
use crate::types::TokenUsage;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

/// Gemini API client
pub struct GoogleClient {
    client: Client,
    config: ProviderConfig,
}

impl GoogleClient {
    /// Create a new Gemini client with the given configuration
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    /// Get the configuration
    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    fn build_request(&self, request: &ModelRequest) -> GenerateRequest {
        let mut contents: Vec<Content> = Vec::new();

        for message in request.dialogue() {
            let (role, parts) = match message {
                Message::User { content } => ("user", vec![Part::text(content)]),
                Message::Assistant { content, tool_calls } => {
                    let mut parts = Vec::new();
                    if !content.is_empty() {
                        parts.push(Part::text(content));
                    }
                    parts.extend(tool_calls.iter().map(|call| Part {
                        function_call: Some(FunctionCall {
                            name: call.name.clone(),
                            args: call.arguments.clone(),
                        }),
                        ..Part::default()
                    }));
                    ("model", parts)
                }
                Message::Tool {
                    content,
                    name,
                    is_error,
                    ..
                } => {
                    let response = if *is_error {
                        json!({ "error": content })
                    } else {
                        json!({ "result": content })
                    };
                    let part = Part {
                        function_response: Some(FunctionResponse {
                            name: name.clone(),
                            response,
                        }),
                        ..Part::default()
                    };
                    ("user", vec![part])
                }
                Message::System { .. } => continue,
            };

            if parts.is_empty() {
                continue;
            }

            match contents.last_mut() {
                Some(last) if last.role == role => last.parts.extend(parts),
                _ => contents.push(Content {
                    role: role.to_string(),
                    parts,
                }),
            }
        }

        let tools = if request.tools.is_empty() {
            Vec::new()
        } else {
            let declarations: Vec<Value> = request
                .tools
                .iter()
                .map(|tool| {
                    json!({
                        "name": tool.name,
                        "description": tool.description,
                        "parameters": tool.parameters,
                    })
                })
                .collect();
            vec![json!({ "functionDeclarations": declarations })]
        };

        GenerateRequest {
            system_instruction: request.system_instruction().map(|text| Content {
                role: "system".to_string(),
                parts: vec![Part::text(&text)],
            }),
            contents,
            tools,
            generation_config: GenerationConfig {
                temperature: self.config.temperature,
                max_output_tokens: self.config.max_tokens,
            },
        }
    }
}

#[async_trait]
impl LlmClient for GoogleClient {
    async fn complete(&self, request: ModelRequest) -> Result<ModelResponse> {
        let body = self.build_request(&request);
        let reply = generate(&self.client, &self.config, &self.config.model, &body).await?;
        reply.into_model_response()
    }

    fn provider(&self) -> &str {
        ModelProvider::Google.as_str()
    }

    fn model(&self) -> &str {
        &self.config.model
    }
}

/// Grounded web search through Gemini
pub struct GoogleSearch {
    client: Client,
    config: ProviderConfig,
    search: SearchConfig,
}

impl GoogleSearch {
    /// Create a search backend that reuses the Google provider credentials
    pub fn new(config: ProviderConfig, search: SearchConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            config,
            search,
        })
    }
}

#[async_trait]
impl SearchBackend for GoogleSearch {
    async fn search(&self, query: &str) -> Result<String> {
        let body = GenerateRequest {
            system_instruction: None,
            contents: vec![Content {
                role: "user".to_string(),
                parts: vec![Part::text(query)],
            }],
            tools: vec![json!({ "google_search": {} })],
            generation_config: GenerationConfig {
                temperature: self.search.temperature,
                max_output_tokens: self.config.max_tokens,
            },
        };

        let reply = generate(&self.client, &self.config, &self.search.model, &body).await?;
        let response = reply.into_model_response()?;
        Ok(response.message.content().to_string())
    }

    fn name(&self) -> &str {
        "google_search"
    }
}

async fn generate(
    client: &Client,
    config: &ProviderConfig,
    model: &str,
    body: &GenerateRequest,
) -> Result<GenerateResponse> {
    let url = endpoint(
        &config.base_url,
        &format!("v1beta/models/{}:generateContent", model),
    );

    let response = client
        .post(&url)
        .header("x-goog-api-key", config.api_key())
        .json(body)
        .send()
        .await?;
    let response = ensure_success(ModelProvider::Google, response).await?;

    Ok(response.json().await?)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Value>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    role: String,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_call: Option<FunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_response: Option<FunctionResponse>,
    #[serde(default, skip_serializing)]
    thought: Option<bool>,
}

impl Part {
    fn text(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FunctionCall {
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FunctionResponse {
    name: String,
    response: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
}

impl GenerateResponse {
    fn into_model_response(self) -> Result<ModelResponse> {
        let usage = self
            .usage_metadata
            .map(|usage| TokenUsage::new(usage.prompt_token_count, usage.candidates_token_count))
            .unwrap_or_default();

        let content = self
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .ok_or_else(|| Error::malformed(ModelProvider::Google.as_str(), "no candidates"))?;

        let mut text = Vec::new();
        let mut tool_calls = Vec::new();
        for part in content.parts {
            if part.thought == Some(true) {
                continue;
            }
            if let Some(part_text) = part.text {
                text.push(part_text);
            }
            // Gemini does not assign call ids.
            if let Some(call) = part.function_call {
                tool_calls.push(ToolInvocation::new(
                    format!("call_{}", Uuid::new_v4().simple()),
                    call.name,
                    call.args,
                ));
            }
        }

        Ok(ModelResponse {
            message: Message::assistant_with_tools(text.concat(), tool_calls),
            usage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_client::ToolDefinition;
    use url::Url;

    fn config_for(server: &mockito::ServerGuard) -> ProviderConfig {
        ProviderConfig::new(ModelProvider::Google, "g-test")
            .with_base_url(Url::parse(&server.url()).unwrap())
            .with_model("gemini-test")
    }

    #[test]
    fn test_request_translation() {
        let client = GoogleClient::new(ProviderConfig::new(ModelProvider::Google, "k")).unwrap();
        let request = ModelRequest::new(vec![
            Message::system("research only"),
            Message::user("Who is the mayor?"),
            Message::assistant_with_tools(
                "",
                vec![ToolInvocation::new("c1", "web_search", json!({"query": "mayor"}))],
            ),
            Message::tool("Someone", "c1", "web_search"),
        ])
        .with_tools(vec![ToolDefinition {
            name: "web_search".to_string(),
            description: "Search".to_string(),
            parameters: json!({"type": "object"}),
        }]);

        let wire = serde_json::to_value(client.build_request(&request)).unwrap();

        assert_eq!(wire["systemInstruction"]["parts"][0]["text"], "research only");
        assert_eq!(wire["contents"].as_array().unwrap().len(), 3);
        assert_eq!(wire["contents"][1]["role"], "model");
        assert_eq!(wire["contents"][1]["parts"][0]["functionCall"]["name"], "web_search");
        assert_eq!(
            wire["contents"][2]["parts"][0]["functionResponse"],
            json!({"name": "web_search", "response": {"result": "Someone"}})
        );
        assert_eq!(
            wire["tools"][0]["functionDeclarations"][0]["name"],
            "web_search"
        );
    }

    #[tokio::test]
    async fn test_complete_generates_call_ids() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1beta/models/gemini-test:generateContent")
            .match_header("x-goog-api-key", "g-test")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "candidates": [{
                        "content": {
                            "role": "model",
                            "parts": [
                                {"text": "thinking...", "thought": true},
                                {"functionCall": {"name": "multiply", "args": {"a": 40, "b": 3}}}
                            ]
                        }
                    }],
                    "usageMetadata": {"promptTokenCount": 30, "candidatesTokenCount": 4}
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = GoogleClient::new(config_for(&server)).unwrap();
        let response = client
            .complete(ModelRequest::new(vec![Message::user("40 times 3")]))
            .await
            .unwrap();
        mock.assert_async().await;

        assert_eq!(response.message.content(), "");
        let calls = response.message.tool_calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].id.starts_with("call_"));
        assert_eq!(calls[0].arguments, json!({"a": 40, "b": 3}));
        assert_eq!(response.usage, TokenUsage::new(30, 4));
    }

    #[tokio::test]
    async fn test_empty_candidates_is_malformed() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1beta/models/gemini-test:generateContent")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"promptFeedback": {"blockReason": "SAFETY"}}"#)
            .create_async()
            .await;

        let client = GoogleClient::new(config_for(&server)).unwrap();
        let err = client
            .complete(ModelRequest::new(vec![Message::user("hi")]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MalformedResponse { .. }));
    }

    #[tokio::test]
    async fn test_grounded_search_enables_google_search_tool() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1beta/models/gemini-search:generateContent")
            .match_body(mockito::Matcher::PartialJson(json!({
                "contents": [{"role": "user", "parts": [{"text": "mayor of new york"}]}],
                "tools": [{"google_search": {}}],
                "generationConfig": {"temperature": 0.0}
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "candidates": [{
                        "content": {"role": "model", "parts": [{"text": "The mayor is "}, {"text": "X."}]}
                    }]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let search = GoogleSearch::new(
            config_for(&server),
            SearchConfig {
                model: "gemini-search".to_string(),
                temperature: 0.0,
            },
        )
        .unwrap();

        let text = search.search("mayor of new york").await.unwrap();
        mock.assert_async().await;
        assert_eq!(text, "The mayor is X.");
    }
}
