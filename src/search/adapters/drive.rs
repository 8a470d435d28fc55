//! Drive adapter: free-text file listing, resource fetch.

use super::table::{ParsedSearch, SearchRequest, ServiceAdapter, query_params};
use crate::search::domain::{
    AdapterError, AdapterParseError, FetchTarget, ResultKind, SearchResult, snippet_of,
};
use crate::service::domain::ServiceKind;
use serde_json::{Map, Value, json};

const SEARCH_TOOL: &str = "search";
const ID_MARKER: &str = " - ID: ";
const URI_PREFIX: &str = "gdrive:///";

/// Adapter for the Drive backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct DriveAdapter;

impl ServiceAdapter for DriveAdapter {
    fn service(&self) -> ServiceKind {
        ServiceKind::Drive
    }

    fn search_request(&self, params: &Value, cap: usize) -> Result<SearchRequest, AdapterError> {
        // The backend takes no limit; the pipeline caps the listing.
        let parsed = query_params(ServiceKind::Drive, params, "query", None, cap)?;
        Ok(SearchRequest {
            tool: SEARCH_TOOL,
            arguments: json!({ "query": parsed.query }),
        })
    }

    fn parse_search(&self, payload: &str) -> Result<ParsedSearch, AdapterParseError> {
        let mut parsed = ParsedSearch::default();
        let mut lines = payload
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .peekable();

        if lines.peek().is_some_and(|line| is_count_header(line)) {
            lines.next();
        }
        for line in lines {
            parsed.push(file_result(line));
        }

        if parsed.results.is_empty() && !parsed.skipped.is_empty() {
            return Err(AdapterParseError::new(
                ServiceKind::Drive,
                "no line matched `name (type) - ID: id`",
                payload,
            ));
        }
        Ok(parsed)
    }
}

fn is_count_header(line: &str) -> bool {
    line.strip_prefix("Found ")
        .is_some_and(|rest| rest.ends_with("files:") || rest.ends_with("file:"))
}

fn file_result(line: &str) -> Result<SearchResult, AdapterParseError> {
    let skip = |reason: &str| AdapterParseError::new(ServiceKind::Drive, reason, line);

    let (described, raw_id) = line
        .rsplit_once(ID_MARKER)
        .ok_or_else(|| skip("line has no file id"))?;
    let id = raw_id.trim();
    if id.is_empty() || id.contains(char::is_whitespace) {
        return Err(skip("file id is malformed"));
    }
    let (name, mime_type) = split_mime_type(described);
    if name.is_empty() {
        return Err(skip("file has no name"));
    }

    let uri = format!("{URI_PREFIX}{id}");
    let mut metadata = Map::new();
    metadata.insert("id".to_owned(), Value::from(id));
    if let Some(mime) = mime_type {
        metadata.insert("mime_type".to_owned(), Value::from(mime));
    }

    Ok(SearchResult {
        service: ServiceKind::Drive,
        kind: ResultKind::File,
        title: name.to_owned(),
        snippet: snippet_of(described),
        uri: uri.clone(),
        fetch: FetchTarget::Resource { uri },
        metadata,
    })
}

/// Splits `Quarterly plan (application/pdf)` into name and type.
fn split_mime_type(described: &str) -> (&str, Option<&str>) {
    let trimmed = described.trim();
    trimmed
        .strip_suffix(')')
        .and_then(|open| open.rsplit_once(" ("))
        .filter(|(_, mime_type)| mime_type.contains('/'))
        .map_or((trimmed, None), |(name, mime_type)| {
            (name.trim(), Some(mime_type.trim()))
        })
}
