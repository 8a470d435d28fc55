//! The service adapter table.
//!
//! Each supported service has one adapter that knows the backend's search
//! tool, how to phrase its arguments, and how to turn the backend's payload
//! into [`SearchResult`] values with their fetch targets.

use super::{DriveAdapter, GithubAdapter, SlackAdapter};
use crate::search::domain::{AdapterError, AdapterParseError, SearchResult};
use crate::service::domain::ServiceKind;
use serde_json::{Map, Value};

/// Key holding the free-text query in uniform plans.
pub const QUERY_KEY: &str = "query";

/// Key holding the requested result count in uniform plans.
pub const MAX_RESULTS_KEY: &str = "max_results";

/// A search tool invocation built from planned parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    /// Tool to call.
    pub tool: &'static str,
    /// Tool arguments.
    pub arguments: Value,
}

/// Results parsed from one search payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedSearch {
    /// Parsed results in backend order.
    pub results: Vec<SearchResult>,
    /// Entries that could not be turned into results.
    pub skipped: Vec<AdapterParseError>,
}

impl ParsedSearch {
    pub(super) fn push(&mut self, entry: Result<SearchResult, AdapterParseError>) {
        match entry {
            Ok(result) => self.results.push(result),
            Err(error) => self.skipped.push(error),
        }
    }
}

/// Service-specific search request building and payload parsing.
pub trait ServiceAdapter: Send + Sync {
    /// Service this adapter handles.
    fn service(&self) -> ServiceKind;

    /// Builds the search call from planner parameters, asking for at most
    /// `cap` results where the backend supports a limit.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::InvalidSearchParams`] when the parameters carry
    /// no usable query.
    fn search_request(&self, params: &Value, cap: usize) -> Result<SearchRequest, AdapterError>;

    /// Parses the text returned by the search tool.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterParseError`] when the payload as a whole does not have
    /// the expected shape. Individual unusable entries are reported through
    /// [`ParsedSearch::skipped`] instead.
    fn parse_search(&self, payload: &str) -> Result<ParsedSearch, AdapterParseError>;
}

/// Returns the adapter registered for `service`.
#[must_use]
pub fn adapter_for(service: ServiceKind) -> &'static dyn ServiceAdapter {
    match service {
        ServiceKind::Slack => &SlackAdapter,
        ServiceKind::Github => &GithubAdapter,
        ServiceKind::Drive => &DriveAdapter,
    }
}

/// Query and limit extracted from planner parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct QueryParams {
    pub(super) query: String,
    pub(super) limit: usize,
}

/// Reads the query and limit from `params`.
///
/// Service-specific keys win over the uniform `query` and `max_results`
/// keys. A bare string is taken as the query. The limit never exceeds `cap`.
pub(super) fn query_params(
    service: ServiceKind,
    params: &Value,
    query_key: &str,
    limit_key: Option<&str>,
    cap: usize,
) -> Result<QueryParams, AdapterError> {
    let invalid = |reason: &str| AdapterError::InvalidSearchParams {
        service,
        reason: reason.to_owned(),
    };

    let (raw_query, raw_limit) = match params {
        Value::String(query) => (Some(query.as_str()), None),
        Value::Object(map) => {
            let query = string_field(map, query_key).or_else(|| string_field(map, QUERY_KEY));
            let limit = limit_key
                .and_then(|key| map.get(key))
                .or_else(|| map.get(MAX_RESULTS_KEY))
                .and_then(Value::as_u64);
            (query, limit)
        }
        _ => return Err(invalid("parameters must be an object or a string")),
    };

    let query = raw_query
        .map(str::trim)
        .filter(|query| !query.is_empty())
        .ok_or_else(|| invalid("missing query"))?;
    let limit = raw_limit
        .and_then(|requested| usize::try_from(requested).ok())
        .map_or(cap, |requested| requested.min(cap));

    Ok(QueryParams {
        query: query.to_owned(),
        limit,
    })
}

/// Returns a non-empty string field.
pub(super) fn string_field<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    map.get(key)
        .and_then(Value::as_str)
        .filter(|value| !value.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case(ServiceKind::Slack)]
    #[case(ServiceKind::Github)]
    #[case(ServiceKind::Drive)]
    fn table_has_one_adapter_per_service(#[case] service: ServiceKind) {
        assert_eq!(adapter_for(service).service(), service);
    }

    #[rstest]
    #[case(json!({"query": "tokio", "max_results": 10}), "tokio", 3)]
    #[case(json!({"query": "tokio", "max_results": 1}), "tokio", 1)]
    #[case(json!({"q": "repo:acme tokio", "per_page": 2}), "repo:acme tokio", 2)]
    #[case(json!({"q": "specific", "query": "generic"}), "specific", 3)]
    #[case(json!("  bare string  "), "bare string", 3)]
    fn query_params_prefer_service_keys_and_respect_cap(
        #[case] params: Value,
        #[case] query: &str,
        #[case] limit: usize,
    ) {
        let parsed = query_params(ServiceKind::Github, &params, "q", Some("per_page"), 3)
            .expect("params should parse");
        assert_eq!(parsed.query, query);
        assert_eq!(parsed.limit, limit);
    }

    #[rstest]
    #[case(json!({}))]
    #[case(json!({"query": "   "}))]
    #[case(json!(42))]
    fn query_params_reject_missing_queries(#[case] params: Value) {
        let error = query_params(ServiceKind::Slack, &params, "search_query", None, 3)
            .expect_err("params should be rejected");
        assert!(matches!(
            error,
            AdapterError::InvalidSearchParams {
                service: ServiceKind::Slack,
                ..
            }
        ));
    }
}
