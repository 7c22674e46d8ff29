//! HTTP protocol implementation.
//!
//! # Architecture
//!
//! - **`parser`**: incremental request parser, one per connection, pipelining aware
//! - **`request`**: parsed request representation
//! - **`response`**: response handle that finalizes itself when dropped
//! - **`writer`**: serializes responses to their wire form
//! - **`message`**: per-connection FIFO of outgoing messages
//! - **`connection`**: a socket together with its parser and queue
//!
//! # Request/response flow
//!
//! ```text
//!   socket bytes ──▶ RequestParser ──▶ Request ──▶ Handler
//!                                         │           │
//!                         slot reserved   │           │ Response dropped
//!                         at queue tail ◀─┘           ▼
//!   socket ◀── MessageQueue (head first) ◀── serialize + mark ready
//! ```
//!
//! Slots are reserved in request order, and only the head is ever written,
//! so pipelined responses go out in order even when they finish out of order.

pub mod connection;
pub mod message;
pub mod parser;
pub mod request;
pub mod response;
pub mod writer;
