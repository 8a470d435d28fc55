//! Slack adapter: CSV message search, thread fetch.

use super::table::{ParsedSearch, SearchRequest, ServiceAdapter, query_params};
use crate::search::domain::{
    AdapterError, AdapterParseError, FetchTarget, ResultKind, SearchResult, snippet_of,
};
use crate::service::domain::ServiceKind;
use csv::{ReaderBuilder, StringRecord, Trim};
use serde_json::{Map, Value, json};

const SEARCH_TOOL: &str = "conversations_search_messages";
const REPLIES_TOOL: &str = "conversations_replies";

const MSG_ID: &str = "MsgID";
const USER_NAME: &str = "UserName";
const REAL_NAME: &str = "RealName";
const CHANNEL: &str = "Channel";
const THREAD_TS: &str = "ThreadTs";
const TEXT: &str = "Text";
const TIME: &str = "Time";

/// Adapter for the Slack backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct SlackAdapter;

impl ServiceAdapter for SlackAdapter {
    fn service(&self) -> ServiceKind {
        ServiceKind::Slack
    }

    fn search_request(&self, params: &Value, cap: usize) -> Result<SearchRequest, AdapterError> {
        let parsed = query_params(ServiceKind::Slack, params, "search_query", Some("limit"), cap)?;
        Ok(SearchRequest {
            tool: SEARCH_TOOL,
            arguments: json!({ "search_query": parsed.query, "limit": parsed.limit }),
        })
    }

    fn parse_search(&self, payload: &str) -> Result<ParsedSearch, AdapterParseError> {
        let invalid = |reason: String| AdapterParseError::new(ServiceKind::Slack, reason, payload);

        // Rows may carry fewer trailing fields than the header.
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(Trim::All)
            .from_reader(payload.as_bytes());
        let header = reader
            .headers()
            .map_err(|err| invalid(err.to_string()))?
            .clone();
        if header.is_empty() {
            return Ok(ParsedSearch::default());
        }
        let columns = Columns::new(&header);
        if columns.position(MSG_ID).is_none() || columns.position(TEXT).is_none() {
            return Err(invalid(format!(
                "header lacks {MSG_ID} or {TEXT} column: {}",
                joined(&header)
            )));
        }

        let mut parsed = ParsedSearch::default();
        for row in reader.records() {
            let record = row.map_err(|err| invalid(err.to_string()))?;
            if record.iter().all(str::is_empty) {
                continue;
            }
            parsed.push(message_result(&columns, &record));
        }
        Ok(parsed)
    }
}

fn message_result(
    columns: &Columns<'_>,
    record: &StringRecord,
) -> Result<SearchResult, AdapterParseError> {
    let field = |name: &str| columns.get(record, name);

    let msg_id = field(MSG_ID);
    if msg_id.is_empty() {
        return Err(AdapterParseError::new(
            ServiceKind::Slack,
            "row has no message id",
            &joined(record),
        ));
    }
    let channel = field(CHANNEL);
    let thread_ts = Some(field(THREAD_TS))
        .filter(|ts| !ts.is_empty())
        .unwrap_or(msg_id);
    let user = Some(field(REAL_NAME))
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| field(USER_NAME));

    let title = match (user.is_empty(), channel.is_empty()) {
        (false, false) => format!("Message from {user} in {channel}"),
        (false, true) => format!("Message from {user}"),
        (true, false) => format!("Message in {channel}"),
        (true, true) => "Slack message".to_owned(),
    };

    let mut metadata = Map::new();
    for (key, value) in [
        ("channel", channel),
        ("user", user),
        ("time", field(TIME)),
        ("thread_ts", thread_ts),
        ("msg_id", msg_id),
    ] {
        if !value.is_empty() {
            metadata.insert(key.to_owned(), Value::from(value));
        }
    }

    Ok(SearchResult {
        service: ServiceKind::Slack,
        kind: ResultKind::Message,
        title,
        snippet: snippet_of(field(TEXT)),
        uri: format!("slack://{}/{msg_id}", channel.trim_start_matches('#')),
        fetch: FetchTarget::Tool {
            name: REPLIES_TOOL.to_owned(),
            params: json!({ "channel_id": channel, "thread_ts": thread_ts }),
        },
        metadata,
    })
}

/// Column positions from the CSV header.
struct Columns<'a> {
    names: &'a StringRecord,
}

impl<'a> Columns<'a> {
    const fn new(names: &'a StringRecord) -> Self {
        Self { names }
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|column| column == name)
    }

    fn get<'r>(&self, record: &'r StringRecord, name: &str) -> &'r str {
        self.position(name)
            .and_then(|index| record.get(index))
            .unwrap_or_default()
    }
}

fn joined(record: &StringRecord) -> String {
    record.iter().collect::<Vec<_>>().join(",")
}
