//! Per-invocation projection of an inbound HTTP request.

use std::collections::HashMap;

use bytes::Bytes;
use http::header::AUTHORIZATION;
use http::request::Parts;
use http::{HeaderMap, HeaderName};

/// The read-only view of one inbound request that a plugin may query.
///
/// Built by the dispatcher right before an invocation and dropped when it
/// returns.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    bearer_token: Option<String>,
    body: Bytes,
    headers: HeaderMap,
    url: String,
    query: HashMap<String, String>,
}

impl RequestContext {
    /// Build a context from a path-and-query string, headers and a buffered body.
    pub fn new(url: impl Into<String>, headers: HeaderMap, body: Bytes) -> Self {
        let mut url = url.into();
        if url.is_empty() {
            url.push('/');
        }
        let query = url
            .split_once('?')
            .map(|(_, query)| parse_query(query))
            .unwrap_or_default();
        let bearer_token = bearer_token(&headers);

        Self {
            bearer_token,
            body,
            headers,
            url,
            query,
        }
    }

    /// Build a context from the head of a hyper request.
    pub fn from_parts(parts: &Parts, body: Bytes) -> Self {
        let url = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| parts.uri.path().to_string());
        Self::new(url, parts.headers.clone(), body)
    }

    pub fn bearer_token(&self) -> Option<&str> {
        self.bearer_token.as_deref()
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Case-insensitive header lookup. Empty or invalid names never match.
    pub fn header(&self, name: &str) -> Option<&str> {
        if name.is_empty() {
            return None;
        }
        let name = HeaderName::from_bytes(name.as_bytes()).ok()?;
        self.headers.get(name)?.to_str().ok()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// First-seen value of a query parameter.
    pub fn query(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }
}

fn parse_query(query: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    for (key, value) in form_urlencoded::parse(query.as_bytes()) {
        params
            .entry(key.into_owned())
            .or_insert_with(|| value.into_owned());
    }
    params
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?.trim();
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn query_first_value_wins() {
        let ctx = RequestContext::new("/v1/webhook/github?abc=123&abc=456", HeaderMap::new(), Bytes::new());
        assert_eq!(ctx.query("abc"), Some("123"));
        assert_eq!(ctx.query("xyz"), None);
    }

    #[test]
    fn query_decodes_and_tolerates_garbage() {
        let ctx = RequestContext::new("/hook?msg=hello%20world&=x&flag&bad=%zz", HeaderMap::new(), Bytes::new());
        assert_eq!(ctx.query("msg"), Some("hello world"));
        assert_eq!(ctx.query("flag"), Some(""));
        assert_eq!(ctx.query("bad"), Some("%zz"));
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let ctx = RequestContext::new("/", headers(&[("user-agent", "curl/8.0")]), Bytes::new());
        assert_eq!(ctx.header("User-Agent"), Some("curl/8.0"));
        assert_eq!(ctx.header(""), None);
        assert_eq!(ctx.header("not a header"), None);
        assert_eq!(ctx.header("x-missing"), None);
    }

    #[test]
    fn bearer_token_extraction() {
        let ctx = RequestContext::new("/", headers(&[("authorization", "bearer abc.def")]), Bytes::new());
        assert_eq!(ctx.bearer_token(), Some("abc.def"));

        let ctx = RequestContext::new("/", headers(&[("authorization", "Basic dXNlcg==")]), Bytes::new());
        assert_eq!(ctx.bearer_token(), None);

        let ctx = RequestContext::new("/", headers(&[("authorization", "Bearer ")]), Bytes::new());
        assert_eq!(ctx.bearer_token(), None);
    }

    #[test]
    fn url_is_never_empty() {
        let ctx = RequestContext::new("", HeaderMap::new(), Bytes::new());
        assert_eq!(ctx.url(), "/");
    }

    #[test]
    fn from_parts_keeps_path_and_query() {
        let (parts, _) = http::Request::post("http://localhost/v1/webhook/github?abc=123")
            .body(())
            .unwrap()
            .into_parts();
        let ctx = RequestContext::from_parts(&parts, Bytes::from_static(b"{}"));
        assert_eq!(ctx.url(), "/v1/webhook/github?abc=123");
        assert_eq!(ctx.body(), b"{}");
    }
}
