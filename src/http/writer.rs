use bytes::{BufMut, BytesMut};

use crate::http::request::same_name;
use crate::http::response::Status;

const HTTP_VERSION: &str = "HTTP/1.1";

/// Serializes a response into its exact wire form.
///
/// Layout: status line, the caller's headers in order, a computed
/// `Content-Length`, a blank line, then the body. Any `Content-Length`
/// among `headers` is dropped so the length is never sent twice.
pub fn serialize_response(status: &Status, headers: &[(String, String)], body: &[u8]) -> BytesMut {
    let mut buf = BytesMut::with_capacity(64 + body.len());

    // Status line
    buf.put_slice(HTTP_VERSION.as_bytes());
    buf.put_u8(b' ');
    buf.put_slice(status.code.to_string().as_bytes());
    buf.put_u8(b' ');
    buf.put_slice(status.message.as_bytes());
    buf.put_slice(b"\r\n");

    // Headers
    for (k, v) in headers {
        if same_name(k, "Content-Length") {
            tracing::debug!(value = %v, "Ignoring caller-supplied Content-Length");
            continue;
        }
        buf.put_slice(k.as_bytes());
        buf.put_slice(b": ");
        buf.put_slice(v.as_bytes());
        buf.put_slice(b"\r\n");
    }
    buf.put_slice(b"Content-Length: ");
    buf.put_slice(body.len().to_string().as_bytes());
    buf.put_slice(b"\r\n");

    // Header/body separator
    buf.put_slice(b"\r\n");

    // Body
    buf.put_slice(body);

    buf
}
