use std::collections::{HashMap, HashSet};
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::Context;
use mio::net::TcpListener;
use mio::{Events, Interest, Poll, Token};

use crate::config::Config;
use crate::http::connection::Connection;
use crate::http::request::Request;
use crate::http::response::Response;
use crate::server::control::{Control, RunGuard, RunState, StopHandle};
use crate::server::wake::{self, WakeChannel};

const LISTENER: Token = Token(0);
const WAKE: Token = Token(1);
const FIRST_CONNECTION: usize = 2;

const EVENT_CAPACITY: usize = 256;

/// Callback invoked once per parsed request.
///
/// The response handle is owned by the callee: shape it and let it drop to
/// send, or move it elsewhere (another thread included) to answer later.
pub trait Handler {
    fn handle(&mut self, request: &Request, response: Response);
}

impl<F> Handler for F
where
    F: FnMut(&Request, Response),
{
    fn handle(&mut self, request: &Request, response: Response) {
        self(request, response)
    }
}

/// Single-threaded HTTP/1.1 reactor bound to the loopback interface.
///
/// Drive it either one iteration at a time with [`Server::poll`] (e.g. once
/// per frame of a host loop) or continuously with [`Server::run`] until a
/// [`StopHandle`] asks it to stop.
pub struct Server {
    poller: Poll,
    events: Events,
    listener: TcpListener,
    wake: WakeChannel,
    connections: HashMap<Token, Connection>,
    next_token: usize,
    /// The last accept succeeded, so more connections may be queued
    accept_pending: bool,
    buffer: Vec<u8>,
    poll_timeout: Duration,
    local_addr: SocketAddr,
    control: Arc<Control>,
}

impl Server {
    /// Binds `127.0.0.1:port` with default settings.
    pub fn bind(port: u16) -> anyhow::Result<Self> {
        Self::with_config(&Config {
            port,
            ..Config::default()
        })
    }

    pub fn with_config(config: &Config) -> anyhow::Result<Self> {
        let poll = Poll::new().context("failed to create poller")?;

        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, config.port));
        let mut listener = TcpListener::bind(addr)
            .with_context(|| format!("failed to listen on {addr}"))?;
        let local_addr = listener
            .local_addr()
            .context("listening socket has no local address")?;

        let (mut wake, signal) = wake::channel()?;

        poll.registry()
            .register(&mut listener, LISTENER, Interest::READABLE)
            .context("failed to register listening socket")?;
        poll.registry()
            .register(wake.source(), WAKE, Interest::READABLE)
            .context("failed to register wake channel")?;

        tracing::info!(addr = %local_addr, "Server started");

        Ok(Self {
            poller: poll,
            events: Events::with_capacity(EVENT_CAPACITY),
            listener,
            wake,
            connections: HashMap::new(),
            next_token: FIRST_CONNECTION,
            accept_pending: false,
            buffer: vec![0; config.recv_buffer_size.max(1)],
            poll_timeout: config.poll_timeout(),
            local_addr,
            control: Arc::new(Control::new(signal)),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle::new(Arc::clone(&self.control))
    }

    pub fn state(&self) -> RunState {
        self.control.state()
    }

    /// Runs the loop on the current thread until a stop is requested.
    pub fn run<H: Handler>(&mut self, mut handler: H) -> anyhow::Result<()> {
        self.control.begin()?;
        self.run_loop(&mut handler)
    }

    /// Starts the loop on a dedicated thread.
    ///
    /// Setup errors are reported here, before the thread exists.
    pub fn spawn<H>(config: &Config, handler: H) -> anyhow::Result<ServerHandle>
    where
        H: Handler + Send + 'static,
    {
        let mut server = Self::with_config(config)?;
        let stop = server.stop_handle();
        let local_addr = server.local_addr();

        // mark as running before the thread starts so an early stop waits for it
        server.control.begin()?;
        let thread = thread::Builder::new()
            .name("http-reactor".to_string())
            .spawn(move || {
                let mut handler = handler;
                server.run_loop(&mut handler)
            })
            .context("failed to spawn reactor thread")?;

        Ok(ServerHandle {
            stop,
            local_addr,
            thread: Some(thread),
        })
    }

    fn run_loop<H: Handler>(&mut self, handler: &mut H) -> anyhow::Result<()> {
        let control = Arc::clone(&self.control);
        let _guard = RunGuard::new(&control);

        while !control.quit_requested() {
            self.poll(handler, self.poll_timeout)
                .context("reactor poll failed")?;
        }
        tracing::info!(addr = %self.local_addr, "Server stopped");
        Ok(())
    }

    /// Runs one reactor iteration, waiting at most `timeout` for activity.
    pub fn poll<H: Handler>(&mut self, handler: &mut H, timeout: Duration) -> io::Result<()> {
        self.update_interests();

        let timeout = if self.accept_pending {
            Duration::ZERO
        } else {
            timeout
        };
        match self.poller.poll(&mut self.events, Some(timeout)) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Ok(()),
            Err(e) => return Err(e),
        }

        let mut woken = false;
        let mut listener_ready = self.accept_pending;
        let mut readable = Vec::new();
        let mut writable = HashSet::new();
        for event in self.events.iter() {
            match event.token() {
                LISTENER => listener_ready = true,
                WAKE => woken = true,
                token => {
                    if event.is_readable() || event.is_read_closed() || event.is_error() {
                        readable.push(token);
                    }
                    if event.is_writable() {
                        writable.insert(token);
                    }
                }
            }
        }

        if woken {
            self.wake.drain();
        }
        if listener_ready {
            self.accept_one();
        }

        let mut completed = Vec::new();
        let control = Arc::downgrade(&self.control);
        for token in &readable {
            if let Some(connection) = self.connections.get_mut(token) {
                connection.receive(&mut self.buffer, &control, &mut completed);
            }
        }
        Self::dispatch(handler, completed);

        for (token, connection) in self.connections.iter_mut() {
            if !connection.is_closed() {
                connection.flush(writable.contains(token));
            }
        }

        self.reap();
        Ok(())
    }

    fn dispatch<H: Handler>(handler: &mut H, completed: Vec<(Request, Response)>) {
        for (request, response) in completed {
            tracing::debug!(method = %request.method, url = %request.url, "Dispatching request");
            handler.handle(&request, response);
        }
    }

    fn update_interests(&mut self) {
        let registry = self.poller.registry();
        for (token, connection) in self.connections.iter_mut() {
            let desired = connection.desired_interest();
            if desired == connection.interest() {
                continue;
            }
            match registry.reregister(connection.stream_mut(), *token, desired) {
                Ok(()) => connection.set_interest(desired),
                Err(e) => {
                    tracing::warn!(peer = %connection.peer(), error = %e, "Failed to update interest, closing connection");
                    connection.close();
                }
            }
        }
    }

    /// Accepts at most one connection per iteration.
    fn accept_one(&mut self) {
        match self.listener.accept() {
            Ok((mut stream, peer)) => {
                // mio hands out accepted streams already in non-blocking mode
                let token = Token(self.next_token);
                self.next_token += 1;
                if let Err(e) = self
                    .poller
                    .registry()
                    .register(&mut stream, token, Interest::READABLE)
                {
                    tracing::warn!(peer = %peer, error = %e, "Failed to register connection");
                    self.accept_pending = true;
                    return;
                }
                tracing::debug!(peer = %peer, "Client connected");
                self.connections.insert(token, Connection::new(stream, peer));
                self.accept_pending = true;
            }
            Err(e) => {
                if e.kind() != io::ErrorKind::WouldBlock {
                    tracing::warn!(error = %e, "accept failed");
                }
                self.accept_pending = accept_may_retry(&e);
            }
        }
    }

    fn reap(&mut self) {
        let registry = self.poller.registry();
        self.connections.retain(|_, connection| {
            if !connection.is_closed() {
                return true;
            }
            if let Err(e) = registry.deregister(connection.stream_mut()) {
                tracing::debug!(peer = %connection.peer(), error = %e, "Failed to deregister connection");
            }
            tracing::debug!(
                peer = %connection.peer(),
                dropped_messages = connection.pending_messages(),
                "Connection closed"
            );
            false
        });
    }
}

/// Whether the backlog may still hold connections after a failed accept.
///
/// The listener is edge-triggered, so anything but an empty backlog or fd
/// exhaustion has to be retried without waiting for a new readiness event.
fn accept_may_retry(e: &io::Error) -> bool {
    e.kind() != io::ErrorKind::WouldBlock && !is_fd_exhaustion(e)
}

#[cfg(unix)]
fn is_fd_exhaustion(e: &io::Error) -> bool {
    const ENFILE: i32 = 23;
    const EMFILE: i32 = 24;
    matches!(e.raw_os_error(), Some(ENFILE | EMFILE))
}

#[cfg(not(unix))]
fn is_fd_exhaustion(_: &io::Error) -> bool {
    false
}

/// A server running on its own thread. Dropping it stops and joins the thread.
pub struct ServerHandle {
    stop: StopHandle,
    local_addr: SocketAddr,
    thread: Option<JoinHandle<anyhow::Result<()>>>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Stops the loop and waits for the thread, returning the loop's result.
    pub fn stop(mut self) -> anyhow::Result<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> anyhow::Result<()> {
        self.stop.stop();
        match self.thread.take() {
            Some(thread) => thread
                .join()
                .map_err(|_| anyhow::anyhow!("reactor thread panicked"))?,
            None => Ok(()),
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            tracing::error!(error = %e, "Reactor thread ended with an error");
        }
    }
}
