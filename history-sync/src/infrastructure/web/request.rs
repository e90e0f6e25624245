//! Web Request helpers

use std::{collections::HashMap, str::FromStr};

use log::warn;
use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue},
    Client, RequestBuilder,
};
use serde_json::{json, Value};
use url::Url;

use crate::{
    common::errors::ValidationError,
    domain::synchronization::value_objects::sample::HistoryQuery,
};

pub const HISTORY_SEARCH_PATH: &str = "/tsdb/point_data/v2/search";

/// Headers that cannot be represented are dropped with a warning.
pub fn build_headers(header_map: &HashMap<String, String>) -> HeaderMap {
    header_map
        .iter()
        .filter_map(|(name, val)| {
            match (
                HeaderName::from_str(name.to_lowercase().as_str()),
                HeaderValue::from_str(val.as_str()),
            ) {
                (Ok(k), Ok(v)) => Some((k, v)),
                _ => {
                    warn!("Dropping header '{}' that is not valid HTTP", name);
                    None
                }
            }
        })
        .collect()
}

/// Joins the configured base with the search path. The base may carry a path
/// prefix (e.g. `/openapi`), so this concatenates rather than resolving.
pub fn search_endpoint(base_url: &str) -> Result<Url, ValidationError> {
    let joined = format!("{}{}", base_url.trim_end_matches('/'), HISTORY_SEARCH_PATH);
    Url::parse(&joined).map_err(|e| ValidationError::InvalidEndpoint(format!("{}: {}", joined, e)))
}

pub fn search_body(query: &HistoryQuery) -> Value {
    json!({
        "startTime": query.window().start(),
        "endTime": query.window().end(),
        "interval": query.interval_seconds(),
        "function": query.aggregation().as_wire(),
        "pointList": query.identifiers(),
    })
}

pub fn build_search_request(
    http_client: &Client,
    endpoint: &Url,
    headers: HeaderMap,
    query: &HistoryQuery,
) -> RequestBuilder {
    http_client
        .post(endpoint.clone())
        .headers(headers)
        .json(&search_body(query))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::synchronization::value_objects::sample::{Aggregation, TimeWindow};

    #[test]
    fn it_should_keep_base_path_prefixes() {
        let url = search_endpoint("https://gateway.example.com/openapi/").unwrap();
        assert_eq!(
            url.as_str(),
            "https://gateway.example.com/openapi/tsdb/point_data/v2/search"
        );
        assert!(search_endpoint("not a url").is_err());
    }

    #[test]
    fn it_should_build_the_search_body() {
        let window = TimeWindow::new(Some(1000), Some(2000)).unwrap();
        let query =
            HistoryQuery::new(vec!["1.1".into()], window, "60", Aggregation::Avg).unwrap();
        assert_eq!(
            search_body(&query),
            json!({
                "startTime": 1000,
                "endTime": 2000,
                "interval": "60",
                "function": "avg",
                "pointList": ["1.1"]
            })
        );
    }

    #[test]
    fn it_should_drop_invalid_headers() {
        let mut raw = HashMap::new();
        raw.insert("Authorization".to_string(), "Basic abc".to_string());
        raw.insert("bad header".to_string(), "x".to_string());
        let headers = build_headers(&raw);
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("authorization").unwrap(), "Basic abc");
    }
}
