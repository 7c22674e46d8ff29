use std::fmt;

use bytes::BytesMut;

use crate::http::request::{Request, same_name};

const CRLF: &[u8] = b"\r\n";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Request line did not split into `METHOD SP URL SP VERSION`
    InvalidRequestLine,
    /// Version token did not start with `HTTP/1.`
    UnsupportedVersion,
    /// Header line without a `:` or with an empty name
    InvalidHeader,
    /// Continuation line before any header
    OrphanContinuation,
    InvalidContentLength,
    /// Request line or header name was not UTF-8
    InvalidEncoding,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            ParseError::InvalidRequestLine => "malformed request line",
            ParseError::UnsupportedVersion => "unsupported HTTP version",
            ParseError::InvalidHeader => "malformed header line",
            ParseError::OrphanContinuation => "header continuation with no preceding header",
            ParseError::InvalidContentLength => "invalid Content-Length",
            ParseError::InvalidEncoding => "request line or header name is not valid UTF-8",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for ParseError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseState {
    RequestLine,
    HeaderLine,
    Body,
}

/// Incremental HTTP/1.x request parser.
///
/// One parser lives for the whole connection. Bytes may be fed in arbitrary
/// chunks; every completed request is handed to the continuation and the
/// parser resets itself, so several pipelined requests can come out of one
/// `feed` call. After an error the parser must be discarded together with
/// its connection.
#[derive(Debug)]
pub struct RequestParser {
    state: ParseState,
    line: BytesMut,
    request: Request,
    body_remains: usize,
}

impl Default for RequestParser {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestParser {
    pub fn new() -> Self {
        Self {
            state: ParseState::RequestLine,
            line: BytesMut::new(),
            request: Request::default(),
            body_remains: 0,
        }
    }

    pub fn state(&self) -> ParseState {
        self.state
    }

    /// Consumes `bytes`, calling `on_request` once per completed request.
    ///
    /// Requests completed before an error in the same chunk are still
    /// delivered.
    pub fn feed<F>(&mut self, mut bytes: &[u8], mut on_request: F) -> Result<(), ParseError>
    where
        F: FnMut(Request),
    {
        while !bytes.is_empty() {
            match self.state {
                ParseState::RequestLine | ParseState::HeaderLine => {
                    let Some(newline) = bytes.iter().position(|&b| b == b'\n') else {
                        self.line.extend_from_slice(bytes);
                        return Ok(());
                    };
                    self.line.extend_from_slice(&bytes[..=newline]);
                    bytes = &bytes[newline + 1..];

                    // a bare LF is line content; only CRLF terminates
                    if !self.line.ends_with(CRLF) {
                        continue;
                    }
                    let mut line = self.line.split();
                    line.truncate(line.len() - CRLF.len());

                    if self.state == ParseState::RequestLine {
                        self.parse_request_line(&line)?;
                    } else if line.is_empty() {
                        self.finish_headers()?;
                        if self.body_remains == 0 {
                            self.complete(&mut on_request);
                        }
                    } else {
                        self.parse_header_line(&line)?;
                    }
                }
                ParseState::Body => {
                    let take = self.body_remains.min(bytes.len());
                    self.request.body.extend_from_slice(&bytes[..take]);
                    self.body_remains -= take;
                    bytes = &bytes[take..];
                    if self.body_remains == 0 {
                        self.complete(&mut on_request);
                    }
                }
            }
        }
        Ok(())
    }

    /// Convenience wrapper around [`RequestParser::feed`] that collects the
    /// completed requests.
    pub fn feed_collect(&mut self, bytes: &[u8]) -> Result<Vec<Request>, ParseError> {
        let mut completed = Vec::new();
        self.feed(bytes, |request| completed.push(request))?;
        Ok(completed)
    }

    fn parse_request_line(&mut self, line: &[u8]) -> Result<(), ParseError> {
        // stray CRLF between requests
        if line.is_empty() {
            return Ok(());
        }
        let line = std::str::from_utf8(line).map_err(|_| ParseError::InvalidEncoding)?;

        let mut parts = line.splitn(3, ' ');
        let (Some(method), Some(url), Some(version)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(ParseError::InvalidRequestLine);
        };
        if method.is_empty() || url.is_empty() || version.contains(' ') {
            return Err(ParseError::InvalidRequestLine);
        }
        if !version.starts_with("HTTP/1.") {
            return Err(ParseError::UnsupportedVersion);
        }

        self.request.method = method.to_string();
        self.request.url = url.to_string();
        self.state = ParseState::HeaderLine;
        Ok(())
    }

    fn parse_header_line(&mut self, line: &[u8]) -> Result<(), ParseError> {
        if line.starts_with(b" ") || line.starts_with(b"\t") {
            let (_, value) = self
                .request
                .headers
                .last_mut()
                .ok_or(ParseError::OrphanContinuation)?;
            // folding in finish_headers turns the leading run into one space
            value.push_str(&decode_value(line));
            return Ok(());
        }

        let colon = line
            .iter()
            .position(|&b| b == b':')
            .ok_or(ParseError::InvalidHeader)?;
        let name = std::str::from_utf8(&line[..colon]).map_err(|_| ParseError::InvalidEncoding)?;
        if name.is_empty() {
            return Err(ParseError::InvalidHeader);
        }
        self.request
            .headers
            .push((name.to_string(), decode_value(&line[colon + 1..])));
        Ok(())
    }

    fn finish_headers(&mut self) -> Result<(), ParseError> {
        for (_, value) in &mut self.request.headers {
            *value = fold_whitespace(value);
        }

        let mut content_length = None;
        for (name, value) in &self.request.headers {
            if !same_name(name, "Content-Length") {
                continue;
            }
            let parsed = parse_content_length(value)?;
            if content_length.is_some_and(|previous| previous != parsed) {
                return Err(ParseError::InvalidContentLength);
            }
            content_length = Some(parsed);
        }

        self.body_remains = content_length.unwrap_or(0);
        self.state = ParseState::Body;
        Ok(())
    }

    fn complete<F: FnMut(Request)>(&mut self, on_request: &mut F) {
        let request = std::mem::take(&mut self.request);
        self.state = ParseState::RequestLine;
        self.body_remains = 0;
        on_request(request);
    }
}

/// Collapses runs of spaces and tabs into a single space and trims both ends.
pub fn fold_whitespace(value: &str) -> String {
    let mut folded = String::with_capacity(value.len());
    for c in value.chars() {
        if c == ' ' || c == '\t' {
            if !folded.is_empty() && !folded.ends_with(' ') {
                folded.push(' ');
            }
        } else {
            folded.push(c);
        }
    }
    if folded.ends_with(' ') {
        folded.pop();
    }
    folded
}

/// Header values are text when they are UTF-8; any other bytes (obs-text)
/// are kept one `char` per byte, as Latin-1.
fn decode_value(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => bytes.iter().map(|&b| char::from(b)).collect(),
    }
}

/// Digits only; no sign, no whitespace.
pub(crate) fn parse_content_length(value: &str) -> Result<usize, ParseError> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ParseError::InvalidContentLength);
    }
    value.parse().map_err(|_| ParseError::InvalidContentLength)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_get() {
        let mut parser = RequestParser::new();
        let requests = parser
            .feed_collect(b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n")
            .unwrap();

        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].url, "/");
        assert_eq!(requests[0].header("Host"), Some("example.com"));
        assert_eq!(parser.state(), ParseState::RequestLine);
    }

    #[test]
    fn waits_for_body() {
        let mut parser = RequestParser::new();
        let requests = parser
            .feed_collect(b"POST / HTTP/1.1\r\nContent-Length: 3\r\n\r\nab")
            .unwrap();
        assert!(requests.is_empty());
        assert_eq!(parser.state(), ParseState::Body);

        let requests = parser.feed_collect(b"c").unwrap();
        assert_eq!(requests[0].body, b"abc");
        assert_eq!(parser.state(), ParseState::RequestLine);
    }

    #[test]
    fn bare_lf_does_not_end_a_line() {
        let mut parser = RequestParser::new();
        let requests = parser
            .feed_collect(b"GET / HTTP/1.1\r\nX-A: one\ntwo\r\n\r\n")
            .unwrap();
        assert_eq!(requests[0].header("X-A"), Some("one\ntwo"));
    }

    #[test]
    fn fold_whitespace_collapses_runs() {
        assert_eq!(fold_whitespace("a   b\t\tc"), "a b c");
        assert_eq!(fold_whitespace("  lead and trail \t"), "lead and trail");
        assert_eq!(fold_whitespace(""), "");
        assert_eq!(fold_whitespace(" \t "), "");
    }

    #[test]
    fn obs_text_header_value_is_kept_as_latin1() {
        let mut parser = RequestParser::new();
        let requests = parser
            .feed_collect(b"GET / HTTP/1.1\r\nX-Name: caf\xe9\r\n  cr\xe8me\r\n\r\n")
            .unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].header("X-Name"), Some("caf\u{e9} cr\u{e8}me"));
    }

    #[test]
    fn utf8_header_value_is_kept_as_text() {
        let mut parser = RequestParser::new();
        let requests = parser
            .feed_collect("GET / HTTP/1.1\r\nX-Name: café\r\n\r\n".as_bytes())
            .unwrap();
        assert_eq!(requests[0].header("X-Name"), Some("café"));
    }

    #[test]
    fn non_utf8_header_name_is_rejected() {
        let mut parser = RequestParser::new();
        assert_eq!(
            parser.feed_collect(b"GET / HTTP/1.1\r\nX-\xff: v\r\n\r\n"),
            Err(ParseError::InvalidEncoding)
        );
    }

    #[test]
    fn content_length_must_be_digits() {
        assert_eq!(parse_content_length("12"), Ok(12));
        assert_eq!(parse_content_length("+1"), Err(ParseError::InvalidContentLength));
        assert_eq!(parse_content_length("1 2"), Err(ParseError::InvalidContentLength));
        assert_eq!(parse_content_length(""), Err(ParseError::InvalidContentLength));
    }
}
