//! Reactor loop, wake channel and stop handshake.

pub mod control;
pub mod reactor;
pub mod wake;

pub use control::{RunState, StopHandle};
pub use reactor::{Handler, Server, ServerHandle};
