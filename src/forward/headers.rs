//! Header handling for captured and forwarded requests.
//!
//! # Responsibilities
//! - Decide which inbound headers are copied to the upstream call
//! - Serialize the inbound header map for the audit record
//!
//! # Design Decisions
//! - `Content-*` and `Host` are never copied; the transport recomputes them
//!   for the new destination
//! - Hop-by-hop headers describe the inbound connection only
//! - `Accept-Encoding` is left to the transport so it only negotiates
//!   encodings it can decode

use axum::http::{HeaderMap, HeaderName};
use std::collections::BTreeMap;

const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Whether an inbound header may be copied to the upstream request.
pub fn is_forwardable(name: &HeaderName) -> bool {
    // HeaderName is always lowercase.
    let name = name.as_str();
    !(name.starts_with("content-")
        || name == "host"
        || name == "accept-encoding"
        || HOP_BY_HOP.contains(&name))
}

/// Copy of `inbound` restricted to forwardable headers.
pub fn forwardable_headers(inbound: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(inbound.len());
    for (name, value) in inbound {
        if is_forwardable(name) {
            headers.append(name.clone(), value.clone());
        }
    }
    headers
}

/// Serialize headers as a JSON object of name to value.
///
/// Repeated headers are joined with `", "`; non-UTF-8 bytes are replaced.
/// Never fails: a map of strings always serializes.
pub fn serialize_headers(headers: &HeaderMap) -> String {
    let mut map: BTreeMap<&str, String> = BTreeMap::new();
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes());
        map.entry(name.as_str())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert_with(|| value.into_owned());
    }
    serde_json::to_string(&map).unwrap_or_else(|_| "{}".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn inbound() -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert("host", HeaderValue::from_static("decoy.example"));
        h.insert("content-type", HeaderValue::from_static("application/json"));
        h.insert("content-length", HeaderValue::from_static("9"));
        h.insert("content-encoding", HeaderValue::from_static("gzip"));
        h.insert("connection", HeaderValue::from_static("keep-alive"));
        h.insert("accept-encoding", HeaderValue::from_static("zstd"));
        h.insert("authorization", HeaderValue::from_static("Bearer abc"));
        h.insert("x-custom", HeaderValue::from_static("1"));
        h.append("x-custom", HeaderValue::from_static("2"));
        h.insert("user-agent", HeaderValue::from_static("curl/8.0"));
        h
    }

    #[test]
    fn test_content_and_host_headers_are_dropped() {
        let out = forwardable_headers(&inbound());

        assert!(out.keys().all(|k| !k.as_str().starts_with("content-")));
        assert!(!out.contains_key("host"));
        assert!(!out.contains_key("connection"));
        assert!(!out.contains_key("accept-encoding"));
        assert_eq!(out.get("authorization").unwrap(), "Bearer abc");
        assert_eq!(out.get("user-agent").unwrap(), "curl/8.0");
        assert_eq!(out.get_all("x-custom").iter().count(), 2);
    }

    #[test]
    fn test_serialize_joins_repeated_values() {
        let json = serialize_headers(&inbound());
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed["x-custom"], "1, 2");
        assert_eq!(parsed["host"], "decoy.example");
        assert_eq!(parsed["content-type"], "application/json");
    }

    #[test]
    fn test_serialize_empty_map() {
        assert_eq!(serialize_headers(&HeaderMap::new()), "{}");
    }
}
