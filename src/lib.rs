//! Porthole - embeddable loopback HTTP/1.1 server
//!
//! A small server engine meant to live inside a host application, such as a
//! game loop or a runtime tuning bridge, rather than run as a daemon.

pub mod config;
pub mod http;
pub mod server;

pub use config::Config;
pub use http::request::Request;
pub use http::response::{Response, Status, StatusCode};
pub use server::{Handler, Server, ServerHandle, StopHandle};
