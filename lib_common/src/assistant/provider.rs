use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// AI backend selected once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Google Gemini `generateContent`.
    #[default]
    Gemini,
    /// OpenAI chat completions.
    OpenAi,
    /// Azure OpenAI deployment, chat completions.
    Azure,
    /// xAI Grok, OpenAI-compatible chat completions.
    Xai,
}

impl Provider {
    /// Environment variable holding this provider's API key.
    pub fn api_key_env(&self) -> &'static str {
        match self {
            Provider::Gemini => "GEMINI_API_KEY",
            Provider::OpenAi => "OPENAI_API_KEY",
            Provider::Azure => "AZURE_OPENAI_API_KEY",
            Provider::Xai => "XAI_API_KEY",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Provider::Gemini => "gemini-2.0-flash-exp",
            Provider::OpenAi | Provider::Azure => "gpt-4o-mini",
            Provider::Xai => "grok-2-latest",
        }
    }

    /// Base URL of the public API. Azure has none; its endpoint is per resource.
    pub fn default_endpoint(&self) -> Option<&'static str> {
        match self {
            Provider::Gemini => Some("https://generativelanguage.googleapis.com"),
            Provider::OpenAi => Some("https://api.openai.com"),
            Provider::Azure => None,
            Provider::Xai => Some("https://api.x.ai"),
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Provider::Gemini => "gemini",
            Provider::OpenAi => "openai",
            Provider::Azure => "azure",
            Provider::Xai => "xai",
        })
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "gemini" | "google" => Ok(Provider::Gemini),
            "openai" | "open_ai" => Ok(Provider::OpenAi),
            "azure" | "azure_openai" => Ok(Provider::Azure),
            "xai" | "grok" => Ok(Provider::Xai),
            other => Err(format!(
                "unknown AI provider '{other}' (expected gemini, openai, azure or xai)"
            )),
        }
    }
}
