use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Map, Value};

/// Default number of hits returned by the query helpers.
pub const DEFAULT_SEARCH_SIZE: usize = 50;

/// Wrap a query clause into a search body: newest first, at most `size`
/// hits.
pub fn search_body(clause: Value, size: usize) -> Value {
    json!({
        "query": clause,
        "sort": [{ "timestamp": { "order": "desc" } }],
        "size": size,
    })
}

pub fn match_clause(field: &str, value: &str) -> Value {
    let mut term = Map::new();
    term.insert(field.to_string(), Value::String(value.to_string()));
    json!({ "match": term })
}

pub fn by_level(level: &str) -> Value {
    match_clause("level", level)
}

pub fn by_action(action: &str) -> Value {
    match_clause("action", action)
}

pub fn by_resource(resource: &str) -> Value {
    match_clause("resource", resource)
}

pub fn by_user(user_id: &str) -> Value {
    match_clause("userId", user_id)
}

/// Inclusive `timestamp` range.
pub fn by_time_range(start: DateTime<Utc>, end: DateTime<Utc>) -> Value {
    json!({
        "range": {
            "timestamp": {
                "gte": start.to_rfc3339_opts(SecondsFormat::Millis, true),
                "lte": end.to_rfc3339_opts(SecondsFormat::Millis, true),
            }
        }
    })
}

/// Optional equality filters combined with AND.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogFilter {
    pub level: Option<String>,
    pub action: Option<String>,
    pub resource: Option<String>,
    pub user_id: Option<String>,
}

impl LogFilter {
    pub fn is_empty(&self) -> bool {
        self.level.is_none() && self.action.is_none() && self.resource.is_none() && self.user_id.is_none()
    }

    /// `match_all` when no filter is set, otherwise a `bool.must` of
    /// `match` clauses.
    pub fn to_clause(&self) -> Value {
        let must: Vec<Value> = [
            ("level", &self.level),
            ("action", &self.action),
            ("resource", &self.resource),
            ("userId", &self.user_id),
        ]
        .into_iter()
        .filter_map(|(field, value)| value.as_deref().map(|v| match_clause(field, v)))
        .collect();

        if must.is_empty() {
            json!({ "match_all": {} })
        } else {
            json!({ "bool": { "must": must } })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn body_sorts_newest_first() {
        let body = search_body(by_level("error"), 10);
        assert_eq!(body["query"], json!({"match": {"level": "error"}}));
        assert_eq!(body["sort"][0]["timestamp"]["order"], "desc");
        assert_eq!(body["size"], 10);
    }

    #[test]
    fn time_range_is_inclusive_iso() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let clause = by_time_range(start, end);
        assert_eq!(clause["range"]["timestamp"]["gte"], "2024-01-01T00:00:00.000Z");
        assert_eq!(clause["range"]["timestamp"]["lte"], "2024-01-02T00:00:00.000Z");
    }

    #[test]
    fn empty_filter_matches_all() {
        assert!(LogFilter::default().is_empty());
        assert_eq!(LogFilter::default().to_clause(), json!({"match_all": {}}));
    }

    #[test]
    fn filter_combines_clauses() {
        let filter = LogFilter {
            level: Some("warn".into()),
            resource: Some("student".into()),
            ..LogFilter::default()
        };
        assert_eq!(
            filter.to_clause(),
            json!({"bool": {"must": [
                {"match": {"level": "warn"}},
                {"match": {"resource": "student"}}
            ]}})
        );
    }

    #[test]
    fn user_clause_uses_camel_case_field() {
        assert_eq!(by_user("u-1"), json!({"match": {"userId": "u-1"}}));
    }
}
