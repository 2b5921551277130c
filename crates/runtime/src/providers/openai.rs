//! OpenAI-compatible chat completions backend.

use crate::model::{
    Backend, FinishReason, Message, ModelError, ModelRequest, ModelResponse, ToolCall, Usage,
};
use crate::tools::{ParameterSchema, ToolSchema};
use serde::{Deserialize, Serialize};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

// ─────────────────────────────────────────────────────────────────────────────
// API Wire Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    messages: Vec<ApiMessage<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ApiTool<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "role", rename_all = "lowercase")]
enum ApiMessage<'a> {
    System {
        content: &'a str,
    },
    User {
        content: &'a str,
    },
    Assistant {
        #[serde(skip_serializing_if = "Option::is_none")]
        content: Option<&'a str>,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ApiToolCall>,
    },
    Tool {
        tool_call_id: &'a str,
        content: &'a str,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    id: String,
    #[serde(rename = "type", default = "function_type")]
    call_type: String,
    function: ApiFunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

fn function_type() -> String {
    "function".to_string()
}

#[derive(Debug, Serialize)]
struct ApiTool<'a> {
    #[serde(rename = "type")]
    tool_type: &'static str,
    function: ApiFunction<'a>,
}

#[derive(Debug, Serialize)]
struct ApiFunction<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a ParameterSchema,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ApiToolCall>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

// ─────────────────────────────────────────────────────────────────────────────
// Backend Implementation
// ─────────────────────────────────────────────────────────────────────────────

/// Builder for creating an OpenAI backend.
#[derive(Debug, Clone)]
pub struct OpenAiBackendBuilder {
    api_key: String,
    model: String,
    base_url: String,
    max_tokens: Option<u32>,
}

impl OpenAiBackendBuilder {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            max_tokens: None,
        }
    }

    /// Point at any OpenAI-compatible endpoint.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn build(self) -> OpenAiBackend {
        OpenAiBackend {
            client: reqwest::Client::new(),
            api_key: self.api_key,
            model: self.model,
            endpoint: format!("{}/chat/completions", self.base_url.trim_end_matches('/')),
            max_tokens: self.max_tokens,
        }
    }
}

/// OpenAI chat completions backend.
pub struct OpenAiBackend {
    client: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
    max_tokens: Option<u32>,
}

impl OpenAiBackend {
    pub fn builder(api_key: impl Into<String>, model: impl Into<String>) -> OpenAiBackendBuilder {
        OpenAiBackendBuilder::new(api_key, model)
    }

    fn message_to_api(msg: &Message) -> ApiMessage<'_> {
        match msg {
            Message::System { content } => ApiMessage::System { content },
            Message::User { content } => ApiMessage::User { content },
            Message::Assistant {
                content,
                tool_calls,
            } => ApiMessage::Assistant {
                content: (!content.is_empty() || tool_calls.is_empty())
                    .then_some(content.as_str()),
                tool_calls: tool_calls.iter().map(Self::call_to_api).collect(),
            },
            Message::ToolResult {
                call_id, content, ..
            } => ApiMessage::Tool {
                tool_call_id: call_id,
                content,
            },
        }
    }

    fn call_to_api(call: &ToolCall) -> ApiToolCall {
        ApiToolCall {
            id: call.id.clone(),
            call_type: function_type(),
            function: ApiFunctionCall {
                name: call.name.clone(),
                arguments: if call.raw_arguments.is_empty() {
                    "{}".to_string()
                } else {
                    call.raw_arguments.clone()
                },
            },
        }
    }

    fn tool_to_api(schema: &ToolSchema) -> ApiTool<'_> {
        ApiTool {
            tool_type: "function",
            function: ApiFunction {
                name: &schema.name,
                description: &schema.description,
                parameters: &schema.parameters,
            },
        }
    }

    fn response_to_model(response: ApiResponse) -> Result<ModelResponse, ModelError> {
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ModelError::InvalidResponse("no choices in response".into()))?;

        let finish_reason = match choice.finish_reason.as_deref() {
            Some(reason) => FinishReason::parse(reason),
            None => FinishReason::Unknown("missing".into()),
        };

        let tool_calls = choice
            .message
            .tool_calls
            .into_iter()
            .map(|call| ToolCall::from_raw(call.id, call.function.name, call.function.arguments))
            .collect();

        let usage = response
            .usage
            .map(|u| Usage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            })
            .unwrap_or_default();

        Ok(ModelResponse {
            finish_reason,
            message: Message::assistant_with_calls(
                choice.message.content.unwrap_or_default(),
                tool_calls,
            ),
            usage,
        })
    }
}

impl std::fmt::Display for OpenAiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "openai({})", self.model)
    }
}

impl Backend for OpenAiBackend {
    async fn call(&self, request: ModelRequest<'_>) -> Result<ModelResponse, ModelError> {
        let api_request = ApiRequest {
            model: &self.model,
            messages: request.messages.iter().map(Self::message_to_api).collect(),
            tools: request.tools.iter().map(Self::tool_to_api).collect(),
            max_tokens: self.max_tokens,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&api_request)
            .send()
            .await
            .map_err(|e| ModelError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Api(format!("{status}: {body}")));
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| ModelError::InvalidResponse(e.to_string()))?;

        Self::response_to_model(api_response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::Arguments;
    use serde_json::json;

    #[test]
    fn messages_map_to_openai_roles() {
        let call = ToolCall::new(
            "call_1",
            "GetWeather",
            Arguments::new().with("Location", "Linz"),
        );
        let messages = [
            Message::system("Be brief"),
            Message::user("weather in Linz?"),
            Message::assistant_with_calls("", vec![call]),
            Message::ToolResult {
                call_id: "call_1".into(),
                content: "18°C".into(),
                is_error: false,
            },
        ];
        let api: Vec<_> = messages.iter().map(OpenAiBackend::message_to_api).collect();
        let json = serde_json::to_value(&api).unwrap();

        assert_eq!(json[0], json!({"role": "system", "content": "Be brief"}));
        assert_eq!(json[1]["role"], "user");
        assert_eq!(
            json[2],
            json!({
                "role": "assistant",
                "tool_calls": [{
                    "id": "call_1",
                    "type": "function",
                    "function": {"name": "GetWeather", "arguments": "{\"Location\":\"Linz\"}"}
                }]
            })
        );
        assert_eq!(
            json[3],
            json!({"role": "tool", "tool_call_id": "call_1", "content": "18°C"})
        );
    }

    #[test]
    fn tools_serialize_as_functions() {
        let schema = ToolSchema {
            name: "GetCurrentTime".into(),
            description: "Current time".into(),
            parameters: ParameterSchema::default(),
        };
        let json = serde_json::to_value(OpenAiBackend::tool_to_api(&schema)).unwrap();
        assert_eq!(
            json,
            json!({
                "type": "function",
                "function": {
                    "name": "GetCurrentTime",
                    "description": "Current time",
                    "parameters": {"type": "object", "properties": {}, "required": []}
                }
            })
        );
    }

    #[test]
    fn tool_call_response_is_parsed() {
        let response: ApiResponse = serde_json::from_value(json!({
            "choices": [{
                "finish_reason": "tool_calls",
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_9",
                        "type": "function",
                        "function": {"name": "GetWeather", "arguments": "{\"Location\":\"Linz\"}"}
                    }]
                }
            }],
            "usage": {"prompt_tokens": 12, "completion_tokens": 7, "total_tokens": 19}
        }))
        .unwrap();

        let model = OpenAiBackend::response_to_model(response).unwrap();
        assert_eq!(model.finish_reason, FinishReason::ToolCalls);
        assert_eq!(model.usage.input_tokens, 12);
        let calls = model.message.tool_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "call_9");
        assert_eq!(calls[0].arguments.get("Location"), Some("Linz"));
    }

    #[test]
    fn model_argument_text_is_sent_back_verbatim() {
        let raw = r#"{"Zeta":"a","Days":3,"Nested":{"x":1}}"#;
        let response: ApiResponse = serde_json::from_value(json!({
            "choices": [{
                "finish_reason": "tool_calls",
                "message": {
                    "tool_calls": [{
                        "id": "call_3",
                        "type": "function",
                        "function": {"name": "GetForecast", "arguments": raw}
                    }]
                }
            }]
        }))
        .unwrap();
        let assistant = OpenAiBackend::response_to_model(response).unwrap().message;

        let json = serde_json::to_value(OpenAiBackend::message_to_api(&assistant)).unwrap();
        assert_eq!(json["tool_calls"][0]["function"]["arguments"], raw);

        let garbled = ToolCall::from_raw("call_4", "GetForecast", "Days=3");
        assert_eq!(OpenAiBackend::call_to_api(&garbled).function.arguments, "Days=3");
    }

    #[test]
    fn stop_response_is_parsed() {
        let response: ApiResponse = serde_json::from_value(json!({
            "choices": [{"finish_reason": "length", "message": {"content": "It's 18"}}]
        }))
        .unwrap();
        let model = OpenAiBackend::response_to_model(response).unwrap();
        assert_eq!(model.finish_reason, FinishReason::Length);
        assert_eq!(model.message.text(), "It's 18");
    }

    #[test]
    fn empty_choices_is_invalid() {
        let response: ApiResponse = serde_json::from_value(json!({"choices": []})).unwrap();
        assert!(matches!(
            OpenAiBackend::response_to_model(response),
            Err(ModelError::InvalidResponse(_))
        ));
    }

    #[test]
    fn builder_normalizes_endpoint() {
        let backend = OpenAiBackend::builder("key", "gpt-4o")
            .base_url("http://localhost:8080/v1/")
            .build();
        assert_eq!(backend.endpoint, "http://localhost:8080/v1/chat/completions");
        assert_eq!(backend.to_string(), "openai(gpt-4o)");
    }
}
