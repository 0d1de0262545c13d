use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const API_KEY_ENV: &str = "DOC2TPL_API_KEY";
pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_MODEL: &str = "google/gemma-3-4b-it";

/// Delimiters wrapped around a key to form a template token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceholderStyle {
    pub open: String,
    pub close: String,
}

impl PlaceholderStyle {
    #[must_use]
    pub fn render(&self, key: &str) -> String {
        format!("{}{}{}", self.open, key, self.close)
    }

    /// True when `text` is already a single template token in this style.
    #[must_use]
    pub fn is_placeholder(&self, text: &str) -> bool {
        let text = text.trim();
        text.len() > self.open.len() + self.close.len()
            && text.starts_with(&self.open)
            && text.ends_with(&self.close)
    }
}

impl Default for PlaceholderStyle {
    fn default() -> Self {
        Self {
            open: "[".to_string(),
            close: "]".to_string(),
        }
    }
}

impl FromStr for PlaceholderStyle {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (open, close) = value
            .split_once(',')
            .ok_or_else(|| format!("invalid placeholder style '{value}', expected open,close"))?;
        let open = open.trim();
        let close = close.trim();
        if open.is_empty() || close.is_empty() {
            return Err("placeholder delimiters must be non-empty".to_string());
        }
        Ok(Self {
            open: open.to_string(),
            close: close.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TemplateOptions {
    pub placeholder: PlaceholderStyle,
    pub temperature: f32,
    /// Apply a batch to every physical copy of its canonical table.
    pub replace_duplicates: bool,
    /// Use the original label as the placeholder key for unmatched results.
    pub label_fallback: bool,
    pub extract_prompt: Option<PathBuf>,
    pub match_prompt: Option<PathBuf>,
}

impl Default for TemplateOptions {
    fn default() -> Self {
        Self {
            placeholder: PlaceholderStyle::default(),
            temperature: 0.0,
            replace_duplicates: true,
            label_fallback: false,
            extract_prompt: None,
            match_prompt: None,
        }
    }
}

/// Connection settings for an OpenAI-compatible chat completions endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InferenceConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl InferenceConfig {
    /// Fills the API key from the environment when none was given.
    #[must_use]
    pub fn with_env_key(mut self) -> Self {
        if self.api_key.is_none() {
            self.api_key = std::env::var(API_KEY_ENV)
                .ok()
                .filter(|key| !key.trim().is_empty());
        }
        self
    }
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
            timeout: Duration::from_secs(300),
        }
    }
}
