//! Loopback datagram pair used to interrupt the reactor's blocking wait.
//!
//! The receiving end is registered with the poller next to the listener.
//! Any thread holding the sending end can deposit a one-byte datagram; the
//! payload carries no meaning and is drained on the next wake-up.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};

use anyhow::Context;

const LOOPBACK: SocketAddr = SocketAddr::new(std::net::IpAddr::V4(Ipv4Addr::LOCALHOST), 0);

/// Receiving side, owned by the reactor.
pub struct WakeChannel {
    socket: mio::net::UdpSocket,
}

/// Sending side, shared with every thread that may need to wake the reactor.
#[derive(Debug)]
pub struct WakeSignal {
    socket: UdpSocket,
}

/// Creates a connected receiver/sender pair on 127.0.0.1.
pub fn channel() -> anyhow::Result<(WakeChannel, WakeSignal)> {
    let receiver = UdpSocket::bind(LOOPBACK).context("failed to bind wake receiver")?;
    let sender = UdpSocket::bind(LOOPBACK).context("failed to bind wake sender")?;

    let receiver_addr = receiver.local_addr().context("wake receiver has no address")?;
    let sender_addr = sender.local_addr().context("wake sender has no address")?;
    sender
        .connect(receiver_addr)
        .context("failed to connect wake sender")?;
    // only accept datagrams from our own sender
    receiver
        .connect(sender_addr)
        .context("failed to connect wake receiver")?;

    sender
        .set_nonblocking(true)
        .context("failed to make wake sender non-blocking")?;
    receiver
        .set_nonblocking(true)
        .context("failed to make wake receiver non-blocking")?;

    Ok((
        WakeChannel {
            socket: mio::net::UdpSocket::from_std(receiver),
        },
        WakeSignal { socket: sender },
    ))
}

impl WakeChannel {
    pub fn source(&mut self) -> &mut mio::net::UdpSocket {
        &mut self.socket
    }

    /// Discards every pending wake datagram. Returns how many were read.
    pub fn drain(&self) -> usize {
        let mut scratch = [0u8; 16];
        let mut drained = 0;
        loop {
            match self.socket.recv(&mut scratch) {
                Ok(_) => drained += 1,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    if e.kind() != io::ErrorKind::WouldBlock {
                        tracing::debug!(error = %e, "Wake channel recv failed");
                    }
                    return drained;
                }
            }
        }
    }
}

impl WakeSignal {
    /// Deposits one wake datagram. Never blocks.
    pub fn wake(&self) {
        match self.socket.send(&[1]) {
            Ok(_) => {}
            // the receive buffer is full, so a wake-up is already pending
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
            Err(e) => tracing::warn!(error = %e, "Failed to signal wake channel"),
        }
    }
}
