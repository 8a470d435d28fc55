//! GitHub adapter: code and issue search, per-kind fetch tools.

use super::table::{ParsedSearch, SearchRequest, ServiceAdapter, query_params, string_field};
use crate::search::domain::{
    AdapterError, AdapterParseError, FetchTarget, ResultKind, SearchResult, snippet_of,
};
use crate::service::domain::ServiceKind;
use serde_json::{Map, Value, json};

const SEARCH_CODE_TOOL: &str = "search_code";
const SEARCH_ISSUES_TOOL: &str = "search_issues";
const GET_ISSUE_TOOL: &str = "get_issue";
const GET_PULL_REQUEST_TOOL: &str = "get_pull_request";
const GET_FILE_CONTENTS_TOOL: &str = "get_file_contents";

const WEB_PREFIX: &str = "https://github.com/";
const API_REPOS_PREFIX: &str = "https://api.github.com/repos/";

/// Adapter for the GitHub backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct GithubAdapter;

impl ServiceAdapter for GithubAdapter {
    fn service(&self) -> ServiceKind {
        ServiceKind::Github
    }

    fn search_request(&self, params: &Value, cap: usize) -> Result<SearchRequest, AdapterError> {
        let parsed = query_params(ServiceKind::Github, params, "q", Some("per_page"), cap)?;
        let issues = params
            .get("scope")
            .and_then(Value::as_str)
            .is_some_and(|scope| scope.eq_ignore_ascii_case("issues"));
        Ok(SearchRequest {
            tool: if issues {
                SEARCH_ISSUES_TOOL
            } else {
                SEARCH_CODE_TOOL
            },
            arguments: json!({ "q": parsed.query, "per_page": parsed.limit }),
        })
    }

    fn parse_search(&self, payload: &str) -> Result<ParsedSearch, AdapterParseError> {
        let invalid = |reason: String| AdapterParseError::new(ServiceKind::Github, reason, payload);

        if payload.trim().is_empty() {
            return Ok(ParsedSearch::default());
        }
        let document: Value = serde_json::from_str(payload)
            .map_err(|err| invalid(format!("payload is not JSON: {err}")))?;
        let items = match &document {
            Value::Array(items) => items,
            Value::Object(map) => match map.get("items") {
                Some(Value::Array(items)) => items,
                _ => return Err(invalid("object payload has no items array".to_owned())),
            },
            _ => return Err(invalid("payload is neither a list nor an object".to_owned())),
        };

        let mut parsed = ParsedSearch::default();
        for item in items {
            parsed.push(item_result(item));
        }
        Ok(parsed)
    }
}

fn item_result(item: &Value) -> Result<SearchResult, AdapterParseError> {
    let skip = |reason: &str| AdapterParseError::new(ServiceKind::Github, reason, &item.to_string());

    let Value::Object(fields) = item else {
        return Err(skip("search item is not an object"));
    };
    let (owner, repo) = repository_of(fields).ok_or_else(|| skip("search item has no repository"))?;
    let html_url = string_field(fields, "html_url");

    let mut metadata = Map::new();
    metadata.insert("repository".to_owned(), Value::from(format!("{owner}/{repo}")));
    if let Some(url) = html_url {
        metadata.insert("url".to_owned(), Value::from(url));
    }

    if let Some(number) = fields.get("number").and_then(Value::as_u64) {
        let pull = fields.contains_key("pull_request")
            || html_url.is_some_and(|url| url.contains("/pull/"));
        let title = string_field(fields, "title")
            .map_or_else(|| format!("#{number}"), |title| format!("#{number} {title}"));
        let snippet = string_field(fields, "body").unwrap_or_default();
        metadata.insert("number".to_owned(), Value::from(number));
        if let Some(state) = string_field(fields, "state") {
            metadata.insert("state".to_owned(), Value::from(state));
        }

        let (kind, uri, fetch) = if pull {
            (
                ResultKind::Pr,
                format!("github://{owner}/{repo}/pull/{number}"),
                FetchTarget::Tool {
                    name: GET_PULL_REQUEST_TOOL.to_owned(),
                    params: json!({ "owner": owner, "repo": repo, "pullNumber": number }),
                },
            )
        } else {
            (
                ResultKind::Issue,
                format!("github://{owner}/{repo}/issues/{number}"),
                FetchTarget::Tool {
                    name: GET_ISSUE_TOOL.to_owned(),
                    params: json!({ "owner": owner, "repo": repo, "issue_number": number }),
                },
            )
        };
        return Ok(SearchResult {
            service: ServiceKind::Github,
            kind,
            title,
            snippet: snippet_of(snippet),
            uri,
            fetch,
            metadata,
        });
    }

    let path = string_field(fields, "path").ok_or_else(|| skip("search item has neither number nor path"))?;
    let fragment = fields
        .get("text_matches")
        .and_then(Value::as_array)
        .and_then(|matches| matches.first())
        .and_then(|first| first.get("fragment"))
        .and_then(Value::as_str)
        .unwrap_or(path);

    Ok(SearchResult {
        service: ServiceKind::Github,
        kind: ResultKind::File,
        title: format!("{owner}/{repo}: {path}"),
        snippet: snippet_of(fragment),
        uri: format!("github://{owner}/{repo}/blob/{path}"),
        fetch: FetchTarget::Tool {
            name: GET_FILE_CONTENTS_TOOL.to_owned(),
            params: json!({ "owner": owner, "repo": repo, "path": path }),
        },
        metadata,
    })
}

/// Finds the owning repository of a search item.
///
/// Code hits carry a `repository` object; issue hits carry
/// `repository_url`. The web URL is the last resort.
fn repository_of(fields: &Map<String, Value>) -> Option<(String, String)> {
    let from_repository = fields.get("repository").and_then(|repository| {
        repository
            .get("full_name")
            .and_then(Value::as_str)
            .and_then(split_full_name)
            .or_else(|| {
                let owner = repository.get("owner")?.get("login")?.as_str()?;
                let name = repository.get("name")?.as_str()?;
                Some((owner.to_owned(), name.to_owned()))
            })
    });

    from_repository
        .or_else(|| {
            string_field(fields, "repository_url")
                .and_then(|url| url.strip_prefix(API_REPOS_PREFIX))
                .and_then(split_full_name)
        })
        .or_else(|| {
            string_field(fields, "html_url")
                .and_then(|url| url.strip_prefix(WEB_PREFIX))
                .and_then(split_full_name)
        })
}

fn split_full_name(full_name: &str) -> Option<(String, String)> {
    let mut parts = full_name.split('/').filter(|part| !part.is_empty());
    let owner = parts.next()?;
    let repo = parts.next()?;
    Some((owner.to_owned(), repo.to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(json!({"query": "retry", "max_results": 3}), "search_code")]
    #[case(json!({"q": "is:open retry", "scope": "issues"}), "search_issues")]
    fn search_tool_follows_scope(#[case] params: Value, #[case] tool: &str) {
        let request = GithubAdapter
            .search_request(&params, 3)
            .expect("request should build");
        assert_eq!(request.tool, tool);
        assert_eq!(request.arguments.get("per_page"), Some(&json!(3)));
    }

    #[test]
    fn code_hits_fetch_file_contents() {
        let payload = json!({
            "total_count": 1,
            "items": [{
                "name": "retry.rs",
                "path": "src/retry.rs",
                "html_url": "https://github.com/acme/app/blob/main/src/retry.rs",
                "repository": {"full_name": "acme/app"},
                "text_matches": [{"fragment": "fn backoff(attempt: u32)"}]
            }]
        })
        .to_string();

        let parsed = GithubAdapter.parse_search(&payload).expect("payload should parse");
        let [hit] = parsed.results.as_slice() else {
            panic!("expected one result, got {:?}", parsed.results);
        };

        assert_eq!(hit.kind, ResultKind::File);
        assert_eq!(hit.uri, "github://acme/app/blob/src/retry.rs");
        assert_eq!(hit.snippet, "fn backoff(attempt: u32)");
        assert_eq!(
            hit.fetch,
            FetchTarget::Tool {
                name: "get_file_contents".to_owned(),
                params: json!({"owner": "acme", "repo": "app", "path": "src/retry.rs"}),
            }
        );
        assert_eq!(
            hit.web_url(),
            Some("https://github.com/acme/app/blob/main/src/retry.rs")
        );
    }

    #[test]
    fn issues_and_pull_requests_use_their_own_tools() {
        let payload = json!([
            {
                "number": 7,
                "title": "Flaky retry test",
                "body": "Fails on CI",
                "repository_url": "https://api.github.com/repos/acme/app",
                "html_url": "https://github.com/acme/app/issues/7"
            },
            {
                "number": 9,
                "title": "Add jitter",
                "pull_request": {},
                "repository_url": "https://api.github.com/repos/acme/app",
                "html_url": "https://github.com/acme/app/pull/9"
            }
        ])
        .to_string();

        let parsed = GithubAdapter.parse_search(&payload).expect("payload should parse");
        let [issue, pull] = parsed.results.as_slice() else {
            panic!("expected two results, got {:?}", parsed.results);
        };

        assert_eq!(issue.kind, ResultKind::Issue);
        assert_eq!(issue.uri, "github://acme/app/issues/7");
        assert_eq!(issue.title, "#7 Flaky retry test");
        assert!(matches!(&issue.fetch, FetchTarget::Tool { name, .. } if name == "get_issue"));

        assert_eq!(pull.kind, ResultKind::Pr);
        assert_eq!(pull.uri, "github://acme/app/pull/9");
        assert_eq!(
            pull.fetch,
            FetchTarget::Tool {
                name: "get_pull_request".to_owned(),
                params: json!({"owner": "acme", "repo": "app", "pullNumber": 9}),
            }
        );
    }

    #[test]
    fn items_without_repository_are_skipped() {
        let payload = json!([{"path": "README.md"}, {"path": "a.rs", "repository": {"full_name": "acme/app"}}])
            .to_string();

        let parsed = GithubAdapter.parse_search(&payload).expect("payload should parse");

        assert_eq!(parsed.results.len(), 1);
        assert_eq!(parsed.skipped.len(), 1);
    }

    #[rstest]
    #[case("not json at all")]
    #[case("{\"message\": \"Bad credentials\"}")]
    #[case("42")]
    fn unexpected_payloads_are_parse_errors(#[case] payload: &str) {
        let error = GithubAdapter
            .parse_search(payload)
            .expect_err("payload should be rejected");
        assert_eq!(error.raw, payload);
    }
}
