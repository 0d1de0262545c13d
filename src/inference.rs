//! Inference collaborator: a text completion service driven by role-tagged turns.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::TemplateError;
use crate::options::InferenceConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// A completion backend. Implementations are created once by the caller and
/// reused for every request of a run.
pub trait InferenceClient {
    fn complete(&mut self, messages: &[ChatMessage], temperature: f32)
    -> Result<String, TemplateError>;
}

impl<T: InferenceClient + ?Sized> InferenceClient for Box<T> {
    fn complete(
        &mut self,
        messages: &[ChatMessage],
        temperature: f32,
    ) -> Result<String, TemplateError> {
        (**self).complete(messages, temperature)
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// Client for OpenAI-compatible `chat/completions` endpoints, hosted or local.
pub struct OpenAiClient {
    agent: ureq::Agent,
    endpoint: Url,
    model: String,
    api_key: Option<String>,
}

impl OpenAiClient {
    pub fn new(config: &InferenceConfig) -> Result<Self, TemplateError> {
        let mut base = Url::parse(&config.base_url)?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(TemplateError::InvalidOption(format!(
                "inference base url must be http or https: {}",
                config.base_url
            )));
        }
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let endpoint = base.join("chat/completions")?;

        let agent = ureq::AgentBuilder::new().timeout(config.timeout).build();
        tracing::info!(endpoint = %endpoint, model = %config.model, "inference client ready");

        Ok(Self {
            agent,
            endpoint,
            model: config.model.clone(),
            api_key: config.api_key.clone(),
        })
    }

    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

impl InferenceClient for OpenAiClient {
    fn complete(
        &mut self,
        messages: &[ChatMessage],
        temperature: f32,
    ) -> Result<String, TemplateError> {
        let body = ChatRequest {
            model: &self.model,
            messages,
            temperature,
        };

        let mut request = self
            .agent
            .post(self.endpoint.as_str())
            .set("Content-Type", "application/json");
        if let Some(key) = &self.api_key {
            request = request.set("Authorization", &format!("Bearer {key}"));
        }

        let response: ChatResponse = request.send_json(&body)?.into_json().map_err(|error| {
            TemplateError::InferenceTransport(format!("unreadable completion body: {error}"))
        })?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(TemplateError::InferenceEmpty)
    }
}

#[cfg(test)]
mod tests {
    use super::{ChatMessage, ChatRequest, OpenAiClient};
    use crate::options::InferenceConfig;

    fn config(base_url: &str) -> InferenceConfig {
        InferenceConfig {
            base_url: base_url.to_string(),
            ..InferenceConfig::default()
        }
    }

    #[test]
    fn endpoint_keeps_base_path() {
        let client = OpenAiClient::new(&config("http://localhost:8080/v1")).expect("client");
        assert_eq!(
            client.endpoint().as_str(),
            "http://localhost:8080/v1/chat/completions"
        );
    }

    #[test]
    fn rejects_non_http_base_url() {
        assert!(OpenAiClient::new(&config("file:///tmp/model")).is_err());
        assert!(OpenAiClient::new(&config("not a url")).is_err());
    }

    #[test]
    fn request_body_uses_lowercase_roles() {
        let messages = [ChatMessage::system("rules"), ChatMessage::user("hello")];
        let body = serde_json::to_value(ChatRequest {
            model: "m",
            messages: &messages,
            temperature: 0.0,
        })
        .expect("serialize");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["temperature"], 0.0);
    }
}
