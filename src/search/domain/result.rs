//! Search and fetch result records.

use super::ParseResultKindError;
use crate::service::domain::ServiceKind;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Maximum snippet length in characters.
pub const SNIPPET_MAX_CHARS: usize = 200;

/// What a search hit refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultKind {
    /// A file or document.
    File,
    /// An issue.
    Issue,
    /// A pull request.
    Pr,
    /// A chat message or thread.
    Message,
}

impl ResultKind {
    /// Returns the canonical name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Issue => "issue",
            Self::Pr => "pr",
            Self::Message => "message",
        }
    }
}

impl fmt::Display for ResultKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl TryFrom<&str> for ResultKind {
    type Error = ParseResultKindError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(Self::File),
            "issue" => Ok(Self::Issue),
            "pr" | "pull_request" => Ok(Self::Pr),
            "message" => Ok(Self::Message),
            _ => Err(ParseResultKindError(value.to_owned())),
        }
    }
}

/// How to retrieve the full content behind a search hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "via")]
pub enum FetchTarget {
    /// Invoke a named tool.
    Tool {
        /// Tool name.
        name: String,
        /// Tool arguments.
        params: Value,
    },
    /// Read a resource.
    Resource {
        /// Resource URI.
        uri: String,
    },
}

/// One search hit, produced by a service adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Owning service.
    pub service: ServiceKind,
    /// What the hit refers to.
    pub kind: ResultKind,
    /// Display title.
    pub title: String,
    /// Short excerpt, at most [`SNIPPET_MAX_CHARS`] characters.
    pub snippet: String,
    /// Service-qualified identifier, unique across services.
    pub uri: String,
    /// Detail retrieval for the fetch phase.
    pub fetch: FetchTarget,
    /// Adapter-specific extras such as the web `url`.
    pub metadata: Map<String, Value>,
}

impl SearchResult {
    /// Returns the web link if the backend supplied one.
    #[must_use]
    pub fn web_url(&self) -> Option<&str> {
        self.metadata.get("url").and_then(Value::as_str)
    }
}

/// Fetched content for one search hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchResult {
    /// Owning service.
    pub service: ServiceKind,
    /// What the content refers to.
    pub kind: ResultKind,
    /// Display title.
    pub title: String,
    /// Service-qualified identifier.
    pub uri: String,
    /// Full content, or the search snippet when degraded.
    pub content: String,
    /// Search metadata carried forward.
    pub metadata: Map<String, Value>,
    /// Whether the content is the search snippet after a failed fetch.
    pub degraded: bool,
}

impl FetchResult {
    /// Builds a result from fetched content.
    #[must_use]
    pub fn fetched(result: &SearchResult, content: String) -> Self {
        Self::from_search(result, content, false)
    }

    /// Builds a result that falls back to the search snippet.
    #[must_use]
    pub fn degraded(result: &SearchResult) -> Self {
        Self::from_search(result, result.snippet.clone(), true)
    }

    fn from_search(result: &SearchResult, content: String, degraded: bool) -> Self {
        Self {
            service: result.service,
            kind: result.kind,
            title: result.title.clone(),
            uri: result.uri.clone(),
            content,
            metadata: result.metadata.clone(),
            degraded,
        }
    }

    /// Returns the link used when citing this result: the web `url` when
    /// present, otherwise the service URI.
    #[must_use]
    pub fn link(&self) -> &str {
        self.metadata
            .get("url")
            .and_then(Value::as_str)
            .filter(|url| !url.trim().is_empty())
            .unwrap_or(&self.uri)
    }
}

/// Truncates `text` to [`SNIPPET_MAX_CHARS`] characters on a char boundary,
/// collapsing surrounding whitespace.
#[must_use]
pub fn snippet_of(text: &str) -> String {
    text.trim().chars().take(SNIPPET_MAX_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> SearchResult {
        SearchResult {
            service: ServiceKind::Github,
            kind: ResultKind::Issue,
            title: "Flaky test".to_owned(),
            snippet: "It fails sometimes".to_owned(),
            uri: "github://acme/app/issues/7".to_owned(),
            fetch: FetchTarget::Tool {
                name: "get_issue".to_owned(),
                params: json!({"owner": "acme", "repo": "app", "issue_number": 7}),
            },
            metadata: Map::new(),
        }
    }

    #[test]
    fn snippets_truncate_on_char_boundaries() {
        let text = "é".repeat(SNIPPET_MAX_CHARS + 10);
        let snippet = snippet_of(&text);
        assert_eq!(snippet.chars().count(), SNIPPET_MAX_CHARS);
    }

    #[test]
    fn degraded_results_carry_the_snippet() {
        let result = sample();
        let degraded = FetchResult::degraded(&result);
        assert!(degraded.degraded);
        assert_eq!(degraded.content, result.snippet);
        assert_eq!(degraded.uri, result.uri);
    }

    #[test]
    fn link_prefers_web_url() {
        let mut result = sample();
        assert_eq!(FetchResult::degraded(&result).link(), "github://acme/app/issues/7");

        result.metadata.insert(
            "url".to_owned(),
            json!("https://github.com/acme/app/issues/7"),
        );
        assert_eq!(
            FetchResult::fetched(&result, "body".to_owned()).link(),
            "https://github.com/acme/app/issues/7"
        );
    }
}
