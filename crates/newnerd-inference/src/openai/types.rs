//! OpenAI API request and response types.

use serde::{Deserialize, Serialize};

/// Request body for the embeddings endpoint.
#[derive(Debug, Serialize)]
pub struct EmbeddingRequest {
    pub model: String,
    pub input: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoding_format: Option<String>,
}

/// Response from the embeddings endpoint.
#[derive(Debug, Deserialize)]
pub struct EmbeddingResponse {
    pub data: Vec<EmbeddingData>,
    #[serde(default)]
    pub model: String,
    pub usage: Option<EmbeddingUsage>,
}

/// Single embedding data point.
#[derive(Debug, Deserialize)]
pub struct EmbeddingData {
    pub embedding: Vec<f32>,
    pub index: usize,
}

/// Token usage for embedding request.
#[derive(Debug, Deserialize)]
pub struct EmbeddingUsage {
    pub prompt_tokens: u32,
    pub total_tokens: u32,
}

// =============================================================================
// CHAT COMPLETION TYPES
// =============================================================================

/// Request body for the chat completions endpoint.
#[derive(Debug, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
}

/// `{"type": "json_object"}` constrains the reply to one JSON object.
#[derive(Debug, Serialize)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub format_type: String,
}

impl ResponseFormat {
    pub fn json_object() -> Self {
        Self {
            format_type: "json_object".to_string(),
        }
    }
}

/// A single chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: Option<String>,
}

/// Response from the chat completions endpoint.
#[derive(Debug, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
    pub usage: Option<ChatUsage>,
}

/// Single chat completion choice.
#[derive(Debug, Deserialize)]
pub struct ChatChoice {
    pub message: ChatMessage,
    pub finish_reason: Option<String>,
}

/// Token usage for a chat completion request.
#[derive(Debug, Deserialize)]
pub struct ChatUsage {
    #[serde(default)]
    pub total_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_request_serialization() {
        let request = EmbeddingRequest {
            model: "text-embedding-3-small".to_string(),
            input: vec!["a".to_string(), "b".to_string()],
            encoding_format: Some("float".to_string()),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "text-embedding-3-small");
        assert_eq!(json["input"][1], "b");
        assert_eq!(json["encoding_format"], "float");

        let bare = EmbeddingRequest {
            encoding_format: None,
            ..request
        };
        let json = serde_json::to_value(&bare).unwrap();
        assert!(json.get("encoding_format").is_none());
    }

    #[test]
    fn test_embedding_response_without_usage() {
        let response: EmbeddingResponse = serde_json::from_str(
            r#"{"data":[{"embedding":[0.1,0.2],"index":0}],"model":"m"}"#,
        )
        .unwrap();
        assert_eq!(response.data.len(), 1);
        assert!(response.usage.is_none());
    }

    #[test]
    fn test_chat_request_skips_unset_options() {
        let request = ChatCompletionRequest {
            model: "gpt-4o-mini".to_string(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: Some("oi".to_string()),
            }],
            temperature: Some(0.1),
            max_tokens: None,
            top_p: None,
            frequency_penalty: None,
            presence_penalty: None,
            response_format: Some(ResponseFormat::json_object()),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["response_format"]["type"], "json_object");
        assert!((json["temperature"].as_f64().unwrap() - 0.1).abs() < 1e-6);
        assert!(json.get("max_tokens").is_none());
        assert!(json.get("top_p").is_none());
    }

    #[test]
    fn test_chat_response_tolerates_null_content() {
        let response: ChatCompletionResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"role":"assistant","content":null},"finish_reason":"stop"}]}"#,
        )
        .unwrap();
        assert!(response.choices[0].message.content.is_none());
        assert!(response.usage.is_none());
    }
}
