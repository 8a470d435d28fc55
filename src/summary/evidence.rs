//! Numbered evidence links for a document set.

use crate::search::domain::FetchResult;
use crate::service::domain::ServiceKind;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// One cited document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceLink {
    /// Citation number, starting at 1.
    pub number: usize,
    /// Document title.
    pub title: String,
    /// Owning service.
    pub service: ServiceKind,
    /// Web URL when known, otherwise the service URI.
    pub link: String,
}

impl fmt::Display for EvidenceLink {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            formatter,
            "[{}] {} ({})\n{}",
            self.number, self.title, self.service, self.link
        )
    }
}

/// Links plus the documents that could not be cited.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceLinks {
    /// Links in first-seen order.
    pub links: Vec<EvidenceLink>,
    /// One line per document without a link.
    pub warnings: Vec<String>,
}

/// Numbers `documents` across services, dropping repeated links.
#[must_use]
pub fn format_evidence_links(documents: &[FetchResult]) -> EvidenceLinks {
    let mut formatted = EvidenceLinks::default();
    let mut seen = HashSet::new();

    for document in documents {
        let link = document.link().trim();
        if link.is_empty() {
            formatted
                .warnings
                .push(format!("link missing for {} ({})", document.title, document.service));
            continue;
        }
        if !seen.insert(link.to_owned()) {
            continue;
        }
        formatted.links.push(EvidenceLink {
            number: formatted.links.len() + 1,
            title: document.title.clone(),
            service: document.service,
            link: link.to_owned(),
        });
    }
    formatted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::domain::ResultKind;
    use serde_json::{Map, json};

    fn document(service: ServiceKind, title: &str, uri: &str) -> FetchResult {
        FetchResult {
            service,
            kind: ResultKind::File,
            title: title.to_owned(),
            uri: uri.to_owned(),
            content: String::new(),
            metadata: Map::new(),
            degraded: false,
        }
    }

    #[test]
    fn numbers_links_across_services_and_skips_duplicates() {
        let mut issue = document(ServiceKind::Github, "#7 Flaky", "github://acme/app/issues/7");
        issue.metadata.insert(
            "url".to_owned(),
            json!("https://github.com/acme/app/issues/7"),
        );
        let documents = [
            document(ServiceKind::Drive, "Roadmap", "gdrive:///1"),
            issue,
            document(ServiceKind::Drive, "Roadmap copy", "gdrive:///1"),
            document(ServiceKind::Slack, "Message from ana", "slack://eng/1.2"),
        ];

        let formatted = format_evidence_links(&documents);

        let rendered: Vec<String> = formatted.links.iter().map(ToString::to_string).collect();
        assert_eq!(
            rendered,
            [
                "[1] Roadmap (drive)\ngdrive:///1",
                "[2] #7 Flaky (github)\nhttps://github.com/acme/app/issues/7",
                "[3] Message from ana (slack)\nslack://eng/1.2",
            ]
        );
        assert!(formatted.warnings.is_empty());
    }

    #[test]
    fn blank_links_are_reported() {
        let formatted = format_evidence_links(&[document(ServiceKind::Slack, "Orphan", "  ")]);

        assert!(formatted.links.is_empty());
        assert_eq!(formatted.warnings, ["link missing for Orphan (slack)"]);
    }
}
