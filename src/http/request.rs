use crate::http::parser::parse_content_length;

/// Represents a parsed HTTP request from a client.
///
/// Headers keep the order they arrived in. Names are stored verbatim; use
/// [`Request::header`] for lookups, which compares names case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Request {
    /// The method token (e.g. "GET"), not validated beyond being non-empty
    pub method: String,
    /// Raw request target, path plus query, exactly as received
    pub url: String,
    /// Header (name, value) pairs in arrival order
    pub headers: Vec<(String, String)>,
    /// Request body, exactly `Content-Length` bytes
    pub body: Vec<u8>,
}

/// Builder for constructing Request objects.
#[derive(Debug, Default)]
pub struct RequestBuilder {
    method: Option<String>,
    url: Option<String>,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl RequestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Appends a header; earlier headers with the same name are kept.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn build(self) -> Result<Request, &'static str> {
        Ok(Request {
            method: self.method.ok_or("method missing")?,
            url: self.url.ok_or("url missing")?,
            headers: self.headers,
            body: self.body,
        })
    }
}

/// ASCII case-insensitive header name comparison.
pub(crate) fn same_name(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

impl Request {
    /// Retrieves the first header value with the given name, ignoring ASCII case.
    ///
    /// # Example
    ///
    /// ```
    /// # use porthole::http::request::RequestBuilder;
    /// let req = RequestBuilder::new()
    ///     .method("GET")
    ///     .url("/")
    ///     .header("Content-Type", "text/plain")
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(req.header("content-type"), Some("text/plain"));
    /// ```
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(name, _)| same_name(name, key))
            .map(|(_, value)| value.as_str())
    }

    /// Iterates over every value stored under `key`, in arrival order.
    pub fn header_values<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.headers
            .iter()
            .filter(move |(name, _)| same_name(name, key))
            .map(|(_, value)| value.as_str())
    }

    /// The declared body length.
    ///
    /// `None` when the header is absent or malformed under the same
    /// digits-only rule the parser enforces. Requests produced by the parser
    /// never carry a malformed value.
    pub fn content_length(&self) -> Option<usize> {
        self.header("Content-Length")
            .and_then(|v| parse_content_length(v).ok())
    }

    /// The part of the URL before any `?`.
    pub fn path(&self) -> &str {
        self.url.split_once('?').map_or(self.url.as_str(), |(path, _)| path)
    }

    /// The part of the URL after the first `?`, if any.
    pub fn query(&self) -> Option<&str> {
        self.url.split_once('?').map(|(_, query)| query)
    }
}
