//! AI service — note organization and summarization.
//!
//! DESIGN
//! ======
//! Stateless from the engine's perspective: the caller hands over a
//! snapshot of note texts and an action, and gets back one natural-language
//! string. With `OPENROUTER_API_KEY` configured the request goes to an
//! OpenAI-style chat completion endpoint; without it, a deterministic
//! offline fallback runs so the feature never blocks on missing
//! configuration.
//!
//! ERROR HANDLING
//! ==============
//! [`AiClient::run`] never fails. An empty note list returns a defined
//! placeholder, and remote-call failures degrade to a short user-visible
//! diagnostic string instead of propagating.

use serde_json::json;
use tracing::warn;

const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
const DEFAULT_MODEL: &str = "openai/gpt-4o-mini";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Message shown when the board has no notes to analyze.
pub const NO_NOTES_RESULT: &str = "No notes on the board yet — add some sticky notes first.";

// =============================================================================
// ACTION
// =============================================================================

/// What the user asked the assistant to do with the notes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AiAction {
    /// Cluster notes into categories.
    Organize,
    /// Condense the notes into key themes.
    Summarize,
}

impl AiAction {
    /// Parse the wire selector. Unknown selectors are a caller input error.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "organize" => Some(Self::Organize),
            "summarize" => Some(Self::Summarize),
            _ => None,
        }
    }
}

// =============================================================================
// CLIENT
// =============================================================================

#[derive(Debug, thiserror::Error)]
enum RemoteError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected response shape")]
    BadShape,
}

/// Summarization client. Remote when an API key is configured, otherwise a
/// deterministic offline fallback.
pub struct AiClient {
    http: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
}

impl AiClient {
    /// Build from environment variables.
    ///
    /// - `OPENROUTER_API_KEY`: enables the remote path when present
    /// - `AI_BASE_URL`: OpenAI-compatible API base (OpenRouter default)
    /// - `AI_MODEL`: chat model name
    #[must_use]
    pub fn from_env() -> Self {
        let api_key = std::env::var("OPENROUTER_API_KEY").ok().filter(|k| !k.is_empty());
        let base_url = std::env::var("AI_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        let model = std::env::var("AI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();
        Self { http, api_key, base_url, model }
    }

    /// A client with no remote configured; always uses the fallback.
    #[must_use]
    pub fn offline() -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    #[must_use]
    pub fn is_remote(&self) -> bool {
        self.api_key.is_some()
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Run an action over the given note texts. Infallible by contract:
    /// every outcome is a displayable string.
    pub async fn run(&self, action: AiAction, notes: &[String]) -> String {
        if notes.is_empty() {
            return NO_NOTES_RESULT.to_string();
        }

        let Some(api_key) = &self.api_key else {
            return match action {
                AiAction::Organize => offline_organize(notes),
                AiAction::Summarize => offline_summarize(notes),
            };
        };

        match self.run_remote(api_key, action, notes).await {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "ai call failed");
                "The AI service could not be reached. Please try again.".to_string()
            }
        }
    }

    async fn run_remote(&self, api_key: &str, action: AiAction, notes: &[String]) -> Result<String, RemoteError> {
        let listing: String = notes
            .iter()
            .enumerate()
            .map(|(i, text)| format!("{}. {text}\n", i + 1))
            .collect();
        let prompt = match action {
            AiAction::Organize => format!(
                "You are a helpful assistant. Given these sticky notes from a whiteboard, \
                 organize and cluster them into categories. Return a clear, formatted summary.\n\nNotes:\n{listing}"
            ),
            AiAction::Summarize => format!(
                "You are a helpful assistant. Summarize the key themes and ideas from these \
                 whiteboard sticky notes into a concise summary.\n\nNotes:\n{listing}"
            ),
        };

        let body = json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
        });
        let response: serde_json::Value = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        response["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or(RemoteError::BadShape)
    }
}

// =============================================================================
// OFFLINE FALLBACK
// =============================================================================

/// Deterministic grouping by text length band.
fn offline_organize(notes: &[String]) -> String {
    let mut quick = Vec::new();
    let mut short = Vec::new();
    let mut detailed = Vec::new();
    for note in notes {
        let text = if note.is_empty() { "(empty)" } else { note.as_str() };
        match text.chars().count() {
            0..=10 => quick.push(text),
            11..=20 => short.push(text),
            _ => detailed.push(text),
        }
    }

    let mut out = format!("Organized notes ({} total)\n", notes.len());
    for (label, group) in [("Quick notes", quick), ("Short notes", short), ("Detailed notes", detailed)] {
        if group.is_empty() {
            continue;
        }
        out.push_str(&format!("\n{label}:\n"));
        for text in group {
            out.push_str(&format!("  - {text}\n"));
        }
    }
    out.push_str("\n(offline grouping — set OPENROUTER_API_KEY for real clustering)");
    out
}

/// Deterministic topics line from the non-empty texts.
fn offline_summarize(notes: &[String]) -> String {
    let topics: Vec<&str> = notes
        .iter()
        .filter(|t| !t.is_empty())
        .map(String::as_str)
        .collect();
    let joined = if topics.is_empty() { "No content yet".to_string() } else { topics.join(", ") };
    format!(
        "Board summary ({} notes)\n\nTopics covered: {joined}\n\n(offline summary — set OPENROUTER_API_KEY for real summarization)",
        notes.len()
    )
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn action_parse() {
        assert_eq!(AiAction::parse("organize"), Some(AiAction::Organize));
        assert_eq!(AiAction::parse("summarize"), Some(AiAction::Summarize));
        assert!(AiAction::parse("translate").is_none());
    }

    #[tokio::test]
    async fn zero_notes_returns_placeholder() {
        let client = AiClient::offline();
        assert_eq!(client.run(AiAction::Summarize, &[]).await, NO_NOTES_RESULT);
        assert_eq!(client.run(AiAction::Organize, &[]).await, NO_NOTES_RESULT);
    }

    #[tokio::test]
    async fn offline_organize_groups_by_length() {
        let client = AiClient::offline();
        let notes = texts(&["buy milk", "refactor the login flow", "ship it"]);

        let result = client.run(AiAction::Organize, &notes).await;
        assert!(result.contains("Organized notes (3 total)"));
        assert!(result.contains("Quick notes"));
        assert!(result.contains("Detailed notes"));
        assert!(result.contains("- buy milk"));
        assert!(result.contains("offline grouping"));
    }

    #[tokio::test]
    async fn offline_organize_labels_empty_text() {
        let client = AiClient::offline();
        let result = client.run(AiAction::Organize, &texts(&[""])).await;
        assert!(result.contains("(empty)"));
    }

    #[tokio::test]
    async fn offline_summarize_joins_topics() {
        let client = AiClient::offline();
        let result = client
            .run(AiAction::Summarize, &texts(&["alpha", "", "beta"]))
            .await;
        assert!(result.contains("Board summary (3 notes)"));
        assert!(result.contains("alpha, beta"));
    }

    #[tokio::test]
    async fn offline_summarize_of_blank_notes_has_defined_text() {
        let client = AiClient::offline();
        let result = client.run(AiAction::Summarize, &texts(&["", ""])).await;
        assert!(result.contains("No content yet"));
    }

    #[test]
    fn offline_client_is_not_remote() {
        assert!(!AiClient::offline().is_remote());
    }
}
