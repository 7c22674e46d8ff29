use std::io::{self, Read};
use std::net::SocketAddr;
use std::sync::Weak;

use mio::Interest;
use mio::net::TcpStream;

use crate::http::message::{MessageQueue, Transmit};
use crate::http::parser::RequestParser;
use crate::http::request::Request;
use crate::http::response::Response;
use crate::server::control::Control;

/// One accepted socket with its parser and outgoing queue.
pub struct Connection {
    stream: TcpStream,
    peer: SocketAddr,
    parser: RequestParser,
    queue: MessageQueue,
    /// Interest currently registered with the poller
    interest: Interest,
    /// Last send hit `WouldBlock`; wait for a writable event
    write_blocked: bool,
    state: ConnectionState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Open,
    Closed,
}

impl Connection {
    pub fn new(stream: TcpStream, peer: SocketAddr) -> Self {
        Self {
            stream,
            peer,
            parser: RequestParser::new(),
            queue: MessageQueue::new(),
            interest: Interest::READABLE,
            write_blocked: false,
            state: ConnectionState::Open,
        }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn stream_mut(&mut self) -> &mut TcpStream {
        &mut self.stream
    }

    pub fn is_closed(&self) -> bool {
        self.state == ConnectionState::Closed
    }

    pub fn close(&mut self) {
        self.state = ConnectionState::Closed;
    }

    pub fn interest(&self) -> Interest {
        self.interest
    }

    pub fn set_interest(&mut self, interest: Interest) {
        self.interest = interest;
    }

    /// Readable always; writable only while the head message is ready.
    pub fn desired_interest(&self) -> Interest {
        if self.queue.head_ready() {
            Interest::READABLE | Interest::WRITABLE
        } else {
            Interest::READABLE
        }
    }

    /// Reads until the socket would block, parsing as bytes arrive.
    ///
    /// Each completed request gets a message slot at the tail of the queue and
    /// is pushed to `completed` together with its bound response handle. Peer
    /// shutdown, transport errors and parse errors close the connection.
    pub fn receive(
        &mut self,
        buf: &mut [u8],
        control: &Weak<Control>,
        completed: &mut Vec<(Request, Response)>,
    ) {
        loop {
            match self.stream.read(buf) {
                Ok(0) => {
                    tracing::debug!(peer = %self.peer, "Peer closed connection");
                    self.close();
                    return;
                }
                Ok(n) => {
                    let queue = &mut self.queue;
                    let result = self.parser.feed(&buf[..n], |request| {
                        let response = Response::bound(queue.push_slot(), control.clone());
                        completed.push((request, response));
                    });
                    if let Err(e) = result {
                        tracing::warn!(peer = %self.peer, error = %e, "Failed parsing request, closing connection");
                        self.close();
                        return;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    tracing::warn!(peer = %self.peer, error = %e, "recv failed, closing connection");
                    self.close();
                    return;
                }
            }
        }
    }

    /// Sends ready messages unless an earlier send is still waiting for a
    /// writable event.
    pub fn flush(&mut self, writable: bool) {
        if writable {
            self.write_blocked = false;
        }
        if self.write_blocked || !self.queue.head_ready() {
            return;
        }
        match self.queue.transmit(&mut self.stream) {
            Ok(Transmit::Idle) => {}
            Ok(Transmit::Blocked) => self.write_blocked = true,
            Err(e) => {
                tracing::warn!(peer = %self.peer, error = %e, "send failed, closing connection");
                self.close();
            }
        }
    }

    pub fn pending_messages(&self) -> usize {
        self.queue.len()
    }
}
