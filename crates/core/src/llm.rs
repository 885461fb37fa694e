use async_trait::async_trait;
use tracing::{debug, warn};

use crate::{
    config::Config,
    error::{AdcaseError, Result},
};

#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub system: String,
    pub user: String,
    /// Image URLs attached to the user turn
    pub images: Vec<String>,
    /// Ask for a JSON object instead of free text
    pub json: bool,
}

/// A hosted chat-completion model
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, request: &ChatRequest) -> Result<String>;
}

/// OpenAI-compatible `/chat/completions` client
pub struct HttpChatModel {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
    fallback_model: Option<String>,
    temperature: f32,
    max_tokens: u32,
}

impl HttpChatModel {
    pub fn new(config: &Config, client: reqwest::Client) -> Self {
        Self {
            client,
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            fallback_model: config.fallback_model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }

    async fn complete_with(&self, model: &str, request: &ChatRequest) -> Result<String> {
        debug!(
            model,
            json = request.json,
            images = request.images.len(),
            "Calling chat completion"
        );

        let response = self
            .client
            .post(&self.api_url)
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request_body(model, request, self.temperature, self.max_tokens))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AdcaseError::Upstream {
                service: "chat completion",
                reason: format!("{status}: {}", truncate(&body, 500)),
            });
        }

        let response = response.json::<serde_json::Value>().await?;
        extract_content(&response)
    }
}

#[async_trait]
impl ChatModel for HttpChatModel {
    async fn complete(&self, request: &ChatRequest) -> Result<String> {
        match self.complete_with(&self.model, request).await {
            Ok(content) => Ok(content),
            Err(e) => match &self.fallback_model {
                Some(fallback) if fallback != &self.model => {
                    warn!(
                        model = %self.model,
                        %fallback,
                        error = %e,
                        "Primary model failed; downgrading"
                    );
                    self.complete_with(fallback, request).await
                }
                _ => Err(e),
            },
        }
    }
}

pub fn request_body(
    model: &str,
    request: &ChatRequest,
    temperature: f32,
    max_tokens: u32,
) -> serde_json::Value {
    let user_content = if request.images.is_empty() {
        serde_json::Value::String(request.user.clone())
    } else {
        let mut parts = vec![serde_json::json!({"type": "text", "text": request.user})];
        parts.extend(request.images.iter().map(|url| {
            serde_json::json!({"type": "image_url", "image_url": {"url": url}})
        }));
        serde_json::Value::Array(parts)
    };

    let mut body = serde_json::json!({
        "model": model,
        "messages": [
            {
                "role": "system",
                "content": request.system,
            },
            {
                "role": "user",
                "content": user_content,
            },
        ],
        "temperature": temperature,
        "max_tokens": max_tokens,
    });
    if request.json {
        body["response_format"] = serde_json::json!({"type": "json_object"});
    }
    body
}

pub fn extract_content(response: &serde_json::Value) -> Result<String> {
    response["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| AdcaseError::Upstream {
            service: "chat completion",
            reason: format!("Invalid API response: {}", truncate(&response.to_string(), 500)),
        })
}

fn truncate(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::{Json, Router, extract::State, http::StatusCode, routing::post};
    use serde_json::{Value, json};

    use super::*;
    use crate::{provider::Provider, testing};

    type Calls = Arc<Mutex<Vec<Value>>>;

    /// Fails every request for the model named `primary`, answers the rest
    async fn completions(
        State(calls): State<Calls>,
        Json(body): Json<Value>,
    ) -> (StatusCode, Json<Value>) {
        calls.lock().unwrap().push(body.clone());
        if body["model"] == "primary" {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": {"message": "overloaded"}})),
            );
        }
        let content = format!("answered by {}", body["model"].as_str().unwrap_or_default());
        (
            StatusCode::OK,
            Json(json!({"choices": [{"message": {"role": "assistant", "content": content}}]})),
        )
    }

    async fn model_against_mock(fallback: Option<&str>) -> (HttpChatModel, Calls) {
        let calls: Calls = Arc::new(Mutex::new(Vec::new()));
        let app = Router::new()
            .route("/v1/chat/completions", post(completions))
            .with_state(calls.clone());
        let addr = testing::serve(app).await;

        let mut config = Config::new(Provider::Openai, "sk-test");
        config.api_url = format!("http://{addr}/v1/chat/completions");
        config.model = "primary".into();
        config.fallback_model = fallback.map(str::to_string);
        (HttpChatModel::new(&config, reqwest::Client::new()), calls)
    }

    fn models_called(calls: &Calls) -> Vec<String> {
        calls
            .lock()
            .unwrap()
            .iter()
            .map(|body| body["model"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    #[tokio::test]
    async fn failed_primary_retries_once_on_the_fallback_model() {
        let (model, calls) = model_against_mock(Some("backup")).await;
        let answer = model.complete(&ChatRequest::default()).await.unwrap();
        assert_eq!(answer, "answered by backup");
        assert_eq!(models_called(&calls), vec!["primary", "backup"]);
    }

    #[tokio::test]
    async fn without_a_fallback_the_upstream_error_surfaces() {
        let (model, calls) = model_against_mock(None).await;
        let err = model.complete(&ChatRequest::default()).await.unwrap_err();
        assert!(matches!(err, AdcaseError::Upstream { .. }));
        assert!(err.to_string().contains("overloaded"));
        assert_eq!(models_called(&calls), vec!["primary"]);
    }

    #[tokio::test]
    async fn fallback_naming_the_primary_is_not_retried() {
        let (model, calls) = model_against_mock(Some("primary")).await;
        assert!(model.complete(&ChatRequest::default()).await.is_err());
        assert_eq!(models_called(&calls), vec!["primary"]);
    }

    #[tokio::test]
    async fn bearer_key_is_sent() {
        let app = Router::new().route(
            "/chat",
            post(|headers: axum::http::HeaderMap| async move {
                let auth = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                Json(json!({"choices": [{"message": {"content": auth}}]}))
            }),
        );
        let addr = testing::serve(app).await;

        let mut config = Config::new(Provider::Openai, "sk-test");
        config.api_url = format!("http://{addr}/chat");
        let model = HttpChatModel::new(&config, reqwest::Client::new());
        let answer = model.complete(&ChatRequest::default()).await.unwrap();
        assert_eq!(answer, "Bearer sk-test");
    }

    #[test]
    fn json_mode_requests_an_object() {
        let request = ChatRequest {
            system: "sys".into(),
            user: "hi".into(),
            images: vec![],
            json: true,
        };
        let body = request_body("gpt-4o", &request, 0.3, 1000);
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["response_format"]["type"], "json_object");
        assert_eq!(body["messages"][1]["content"], "hi");
        assert_eq!(body["max_tokens"], 1000);
    }

    #[test]
    fn images_become_content_parts() {
        let request = ChatRequest {
            system: "sys".into(),
            user: "look".into(),
            images: vec!["https://i.ytimg.com/vi/x/1.jpg".into()],
            json: false,
        };
        let body = request_body("m", &request, 0.0, 10);
        let parts = body["messages"][1]["content"].as_array().unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[1]["image_url"]["url"], "https://i.ytimg.com/vi/x/1.jpg");
        assert!(body.get("response_format").is_none());
    }

    #[test]
    fn content_is_read_from_the_first_choice() {
        let response = serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": "{\"a\":1}"}}]
        });
        assert_eq!(extract_content(&response).unwrap(), "{\"a\":1}");

        let err = extract_content(&serde_json::json!({"error": "nope"})).unwrap_err();
        assert!(matches!(err, AdcaseError::Upstream { .. }));
    }
}
