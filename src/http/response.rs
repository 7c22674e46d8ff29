use std::sync::Weak;

use bytes::BytesMut;

use crate::http::message::Message;
use crate::http::writer::serialize_response;
use crate::server::control::Control;

/// HTTP status codes with their standard reason phrases.
///
/// Shorthand for [`Response::set_status`]; any code/message pair can be
/// set through [`Response::status`] instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    /// 200 OK
    Ok,
    /// 201 Created
    Created,
    /// 204 No Content
    NoContent,
    /// 400 Bad Request
    BadRequest,
    /// 404 Not Found
    NotFound,
    /// 405 Method Not Allowed
    MethodNotAllowed,
    /// 500 Internal Server Error
    InternalServerError,
}

impl StatusCode {
    /// Returns the numeric HTTP status code.
    ///
    /// # Example
    ///
    /// ```
    /// # use porthole::http::response::StatusCode;
    /// assert_eq!(StatusCode::Ok.as_u16(), 200);
    /// assert_eq!(StatusCode::NotFound.as_u16(), 404);
    /// ```
    pub fn as_u16(&self) -> u16 {
        match self {
            StatusCode::Ok => 200,
            StatusCode::Created => 201,
            StatusCode::NoContent => 204,
            StatusCode::BadRequest => 400,
            StatusCode::NotFound => 404,
            StatusCode::MethodNotAllowed => 405,
            StatusCode::InternalServerError => 500,
        }
    }

    /// Returns the standard HTTP reason phrase for this status code.
    pub fn reason_phrase(&self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::Created => "Created",
            StatusCode::NoContent => "No Content",
            StatusCode::BadRequest => "Bad Request",
            StatusCode::NotFound => "Not Found",
            StatusCode::MethodNotAllowed => "Method Not Allowed",
            StatusCode::InternalServerError => "Internal Server Error",
        }
    }
}

/// Status line contents: numeric code and reason text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub code: u16,
    pub message: String,
}

impl Default for Status {
    fn default() -> Self {
        StatusCode::Ok.into()
    }
}

impl From<StatusCode> for Status {
    fn from(code: StatusCode) -> Self {
        Self {
            code: code.as_u16(),
            message: code.reason_phrase().to_string(),
        }
    }
}

/// Handle through which a callback shapes one response.
///
/// Dropping the handle finalizes it: the response is serialized into the
/// message slot reserved for its request, the slot is marked ready and the
/// reactor is woken. The handle may be moved to another thread and dropped
/// there. If its connection has already been closed the bytes are discarded.
///
/// `Content-Length` is always computed from `body`; a header of that name
/// set here is ignored.
#[derive(Debug)]
pub struct Response {
    pub status: Status,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    slot: Weak<Message>,
    control: Weak<Control>,
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

impl Response {
    /// Creates a handle bound to no connection; dropping it does nothing.
    pub fn new() -> Self {
        Self::bound(Weak::new(), Weak::new())
    }

    pub(crate) fn bound(slot: Weak<Message>, control: Weak<Control>) -> Self {
        Self {
            status: Status::default(),
            headers: Vec::new(),
            body: Vec::new(),
            slot,
            control,
        }
    }

    pub fn set_status(&mut self, code: StatusCode) -> &mut Self {
        self.status = code.into();
        self
    }

    pub fn status(&mut self, code: u16, message: impl Into<String>) -> &mut Self {
        self.status = Status {
            code,
            message: message.into(),
        };
        self
    }

    /// Appends a header.
    pub fn header(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    pub fn set_body(&mut self, body: impl Into<Vec<u8>>) -> &mut Self {
        self.body = body.into();
        self
    }

    /// Whether the connection this response belongs to is still open.
    pub fn is_connected(&self) -> bool {
        self.slot.strong_count() > 0
    }

    /// The exact bytes this response will put on the wire.
    pub fn to_bytes(&self) -> BytesMut {
        serialize_response(&self.status, &self.headers, &self.body)
    }

    /// Finalizes the response now. Same as dropping it.
    pub fn finish(self) {}
}

impl Drop for Response {
    fn drop(&mut self) {
        let Some(slot) = self.slot.upgrade() else {
            tracing::trace!(status = self.status.code, "Discarding response for closed connection");
            return;
        };
        slot.fill(self.to_bytes());
        drop(slot);

        if let Some(control) = self.control.upgrade() {
            control.wake();
        }
    }
}
