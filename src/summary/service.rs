//! Fail-soft summarisation of pipeline output.

use super::evidence::{EvidenceLink, format_evidence_links};
use super::ports::Summarizer;
use crate::search::domain::PipelineOutput;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Default bound on a summarizer call.
pub const DEFAULT_SUMMARY_TIMEOUT: Duration = Duration::from_secs(60);

const FALLBACK_HEADING: &str = "## Retrieved documents (fallback)";
const NOTHING_RETRIEVED: &str = "- no documents were retrieved";

/// The answer text with its citations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    /// Markdown answer.
    pub markdown: String,
    /// Numbered citations.
    pub links: Vec<EvidenceLink>,
    /// Pipeline, citation and summary warnings, as display lines.
    pub warnings: Vec<String>,
    /// Whether `markdown` is the document listing rather than a summary.
    pub used_fallback: bool,
}

/// Wraps an optional [`Summarizer`] with a timeout and a listing fallback.
#[derive(Clone)]
pub struct SummaryService {
    summarizer: Option<Arc<dyn Summarizer>>,
    timeout: Duration,
}

impl std::fmt::Debug for SummaryService {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("SummaryService")
            .field("summarizer", &self.summarizer.is_some())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Default for SummaryService {
    fn default() -> Self {
        Self::new(None)
    }
}

impl SummaryService {
    /// Creates a service. Without a summarizer every answer is the listing.
    #[must_use]
    pub const fn new(summarizer: Option<Arc<dyn Summarizer>>) -> Self {
        Self {
            summarizer,
            timeout: DEFAULT_SUMMARY_TIMEOUT,
        }
    }

    /// Overrides the summarizer timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Summarises `output` for `question`.
    ///
    /// Summarizer errors, empty answers and timeouts produce the fallback
    /// listing and a warning; this never fails.
    pub async fn summarize(&self, question: &str, output: &PipelineOutput) -> Summary {
        let evidence = format_evidence_links(&output.documents);
        let mut warnings: Vec<String> = output.warnings.iter().map(ToString::to_string).collect();
        warnings.extend(evidence.warnings);

        let failure = match &self.summarizer {
            None => "summary skipped: no summarizer configured".to_owned(),
            Some(summarizer) => {
                match tokio::time::timeout(self.timeout, summarizer.summarize(question, output)).await
                {
                    Ok(Ok(markdown)) if !markdown.trim().is_empty() => {
                        return Summary {
                            markdown,
                            links: evidence.links,
                            warnings,
                            used_fallback: false,
                        };
                    }
                    Ok(Ok(_)) => "summary failed: summarizer returned no text".to_owned(),
                    Ok(Err(err)) => format!("summary failed: {err}"),
                    Err(_) => format!("summary timeout after {:?}", self.timeout),
                }
            }
        };

        warn!(reason = %failure, "using document listing instead of a summary");
        warnings.push(failure);
        Summary {
            markdown: fallback_markdown(output),
            links: evidence.links,
            warnings,
            used_fallback: true,
        }
    }
}

/// Lists every document as `- <title> (<service>): <link>`.
#[must_use]
pub fn fallback_markdown(output: &PipelineOutput) -> String {
    let mut markdown = FALLBACK_HEADING.to_owned();
    if output.documents.is_empty() {
        markdown.push('\n');
        markdown.push_str(NOTHING_RETRIEVED);
        return markdown;
    }
    for document in &output.documents {
        let link = Some(document.link().trim())
            .filter(|link| !link.is_empty())
            .unwrap_or("link missing");
        markdown.push_str(&format!(
            "\n- {} ({}): {link}",
            document.title, document.service
        ));
    }
    markdown
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::domain::{FetchResult, PipelineWarning, ResultKind};
    use crate::service::domain::ServiceKind;
    use crate::summary::ports::SummarizerError;
    use async_trait::async_trait;
    use rstest::rstest;
    use serde_json::Map;

    struct Scripted(Result<String, SummarizerError>);

    #[async_trait]
    impl Summarizer for Scripted {
        async fn summarize(
            &self,
            _question: &str,
            _output: &PipelineOutput,
        ) -> Result<String, SummarizerError> {
            self.0.clone()
        }
    }

    struct Stalled;

    #[async_trait]
    impl Summarizer for Stalled {
        async fn summarize(
            &self,
            _question: &str,
            _output: &PipelineOutput,
        ) -> Result<String, SummarizerError> {
            std::future::pending().await
        }
    }

    fn output() -> PipelineOutput {
        PipelineOutput {
            documents: vec![FetchResult {
                service: ServiceKind::Drive,
                kind: ResultKind::File,
                title: "Roadmap".to_owned(),
                uri: "gdrive:///1".to_owned(),
                content: "Q3 goals".to_owned(),
                metadata: Map::new(),
                degraded: false,
            }],
            warnings: vec![PipelineWarning::SearchRateLimited {
                service: ServiceKind::Slack,
            }],
            alternatives: Vec::new(),
        }
    }

    #[tokio::test]
    async fn summarizer_text_is_used_when_available() {
        let service = SummaryService::new(Some(Arc::new(Scripted(Ok("Q3 is about search.".to_owned())))));

        let summary = service.summarize("what is planned?", &output()).await;

        assert!(!summary.used_fallback);
        assert_eq!(summary.markdown, "Q3 is about search.");
        assert_eq!(summary.links.len(), 1);
        assert_eq!(summary.warnings, ["slack: rate limited, search not retried"]);
    }

    #[rstest]
    #[case(Scripted(Err(SummarizerError::Failed("quota".to_owned()))), "summary failed: summarizer failed: quota")]
    #[case(Scripted(Ok("   ".to_owned())), "summary failed: summarizer returned no text")]
    #[tokio::test]
    async fn failures_fall_back_to_listing(#[case] summarizer: Scripted, #[case] warning: &str) {
        let service = SummaryService::new(Some(Arc::new(summarizer)));

        let summary = service.summarize("what is planned?", &output()).await;

        assert!(summary.used_fallback);
        assert_eq!(
            summary.markdown,
            "## Retrieved documents (fallback)\n- Roadmap (drive): gdrive:///1"
        );
        assert_eq!(summary.warnings.last().map(String::as_str), Some(warning));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_summarizer_times_out() {
        let service =
            SummaryService::new(Some(Arc::new(Stalled))).with_timeout(Duration::from_secs(5));

        let summary = service.summarize("what is planned?", &output()).await;

        assert!(summary.used_fallback);
        assert_eq!(
            summary.warnings.last().map(String::as_str),
            Some("summary timeout after 5s")
        );
    }

    #[tokio::test]
    async fn empty_output_lists_nothing_retrieved() {
        let summary = SummaryService::default()
            .summarize("anything?", &PipelineOutput::default())
            .await;

        assert!(summary.used_fallback);
        assert_eq!(
            summary.markdown,
            "## Retrieved documents (fallback)\n- no documents were retrieved"
        );
        assert_eq!(
            summary.warnings,
            ["summary skipped: no summarizer configured"]
        );
    }
}
