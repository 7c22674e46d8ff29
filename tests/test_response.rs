use porthole::http::response::{Response, Status, StatusCode};
use porthole::http::writer::serialize_response;

#[test]
fn test_status_code_as_u16() {
    assert_eq!(StatusCode::Ok.as_u16(), 200);
    assert_eq!(StatusCode::Created.as_u16(), 201);
    assert_eq!(StatusCode::NoContent.as_u16(), 204);
    assert_eq!(StatusCode::BadRequest.as_u16(), 400);
    assert_eq!(StatusCode::NotFound.as_u16(), 404);
    assert_eq!(StatusCode::MethodNotAllowed.as_u16(), 405);
    assert_eq!(StatusCode::InternalServerError.as_u16(), 500);
}

#[test]
fn test_status_code_reason_phrase() {
    assert_eq!(StatusCode::Ok.reason_phrase(), "OK");
    assert_eq!(StatusCode::NotFound.reason_phrase(), "Not Found");
    assert_eq!(
        StatusCode::InternalServerError.reason_phrase(),
        "Internal Server Error"
    );
}

#[test]
fn test_response_defaults() {
    let response = Response::new();
    assert_eq!(response.status, Status { code: 200, message: "OK".to_string() });
    assert!(response.headers.is_empty());
    assert!(response.body.is_empty());
}

#[test]
fn test_simple_body_serialization() {
    let mut response = Response::new();
    response.set_body("hi");

    assert_eq!(
        &response.to_bytes()[..],
        b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nhi"
    );
}

#[test]
fn test_not_found_serialization() {
    let mut response = Response::new();
    response.status(404, "Not Found").set_body("nope");

    let bytes = response.to_bytes();
    assert!(bytes.starts_with(b"HTTP/1.1 404 Not Found\r\n"));
    assert_eq!(&bytes[..], b"HTTP/1.1 404 Not Found\r\nContent-Length: 4\r\n\r\nnope");
}

#[test]
fn test_custom_status_text() {
    let mut response = Response::new();
    response.status(418, "I'm a teapot");

    assert!(response.to_bytes().starts_with(b"HTTP/1.1 418 I'm a teapot\r\n"));
}

#[test]
fn test_content_length_cannot_be_overridden() {
    let mut response = Response::new();
    response
        .header("Content-Length", "999")
        .header("CONTENT-LENGTH", "1")
        .header("Content-Type", "text/plain")
        .set_body("hello");

    assert_eq!(
        &response.to_bytes()[..],
        b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 5\r\n\r\nhello"
    );
}

#[test]
fn test_headers_serialized_in_insertion_order() {
    let headers = vec![
        ("X-First".to_string(), "1".to_string()),
        ("X-Second".to_string(), "2".to_string()),
        ("X-First".to_string(), "3".to_string()),
    ];
    let bytes = serialize_response(&Status::from(StatusCode::Created), &headers, b"");

    assert_eq!(
        &bytes[..],
        &b"HTTP/1.1 201 Created\r\nX-First: 1\r\nX-Second: 2\r\nX-First: 3\r\nContent-Length: 0\r\n\r\n"[..]
    );
}

#[test]
fn test_binary_body_is_copied_verbatim() {
    let mut response = Response::new();
    response.set_body(vec![0u8, 159, 146, 150]);

    let bytes = response.to_bytes();
    assert!(bytes.ends_with(b"Content-Length: 4\r\n\r\n\x00\x9f\x92\x96"));
}

#[test]
fn test_unbound_response_finish_is_harmless() {
    let mut response = Response::new();
    response.set_status(StatusCode::InternalServerError);
    assert!(!response.is_connected());
    response.finish();
}
