use bytes::Bytes;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    pub url: Url,
}

impl Request {
    pub fn new(method: Method, url: Url) -> Self {
        Self { method, url }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    /// Cache lookup key: the absolute URL without its fragment.
    pub fn cache_key(&self) -> String {
        let mut url = self.url.clone();
        url.set_fragment(None);
        url.into()
    }
}

/// How the response relates to the requesting origin.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResponseKind {
    /// Same-origin response.
    Basic,
    Cors,
    /// Cross-origin response whose contents are hidden.
    Opaque,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub kind: ResponseKind,
    pub url: Option<Url>,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl Response {
    pub fn new(status: u16, kind: ResponseKind, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            kind,
            url: None,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn basic(status: u16, body: impl Into<Bytes>) -> Self {
        Self::new(status, ResponseKind::Basic, body)
    }

    pub fn with_url(mut self, url: Url) -> Self {
        self.url = Some(url);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Only plain same-origin 200 responses are worth keeping.
    pub fn is_cacheable(&self) -> bool {
        self.status == 200 && self.kind == ResponseKind::Basic
    }
}

pub fn same_origin(a: &Url, b: &Url) -> bool {
    a.origin() == b.origin()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_drops_fragment() {
        let request = Request::get(Url::parse("https://todo.test/static/css/main.css#top").unwrap());
        assert_eq!(request.cache_key(), "https://todo.test/static/css/main.css");
    }

    #[test]
    fn only_basic_200_is_cacheable() {
        assert!(Response::basic(200, "x").is_cacheable());
        assert!(!Response::basic(204, "").is_cacheable());
        assert!(!Response::basic(404, "").is_cacheable());
        assert!(!Response::new(200, ResponseKind::Opaque, "").is_cacheable());
        assert!(!Response::new(200, ResponseKind::Cors, "").is_cacheable());
    }

    #[test]
    fn origin_includes_scheme_and_port() {
        let base = Url::parse("https://todo.test/").unwrap();
        assert!(same_origin(&base, &Url::parse("https://todo.test/a/b").unwrap()));
        assert!(!same_origin(&base, &Url::parse("http://todo.test/").unwrap()));
        assert!(!same_origin(&base, &Url::parse("https://todo.test:8443/").unwrap()));
        assert!(!same_origin(&base, &Url::parse("https://api.groq.com/").unwrap()));
    }

    #[test]
    fn header_lookup_ignores_case() {
        let response = Response::basic(200, "").with_header("Content-Type", "text/css");
        assert_eq!(response.header("content-type"), Some("text/css"));
    }
}
