//! Outgoing message slots and the per-connection FIFO that orders them.
//!
//! A slot is reserved when a request completes, before the callback runs,
//! so responses leave the socket in request order no matter when each one
//! is finalized. The queue holds the only strong references; a response
//! keeps a `Weak`, which stops upgrading once the connection is reaped.

use std::collections::VecDeque;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use bytes::{Buf, BytesMut};

/// One response's wire bytes, filled in when its handle is disposed.
#[derive(Debug, Default)]
pub struct Message {
    ready: AtomicBool,
    data: Mutex<BytesMut>,
}

impl Message {
    /// Stores the finalized bytes and publishes the slot as ready.
    pub(crate) fn fill(&self, bytes: BytesMut) {
        let mut data = self.lock();
        *data = bytes;
        self.ready.store(true, Ordering::Release);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    fn lock(&self) -> MutexGuard<'_, BytesMut> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Outcome of offering the queue to a writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transmit {
    /// Every ready message went out; the queue is empty or its head is pending
    Idle,
    /// The writer would block with bytes still queued
    Blocked,
}

#[derive(Debug, Default)]
pub struct MessageQueue {
    messages: VecDeque<Arc<Message>>,
}

impl MessageQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an empty, not-ready slot at the tail.
    pub fn push_slot(&mut self) -> Weak<Message> {
        let message = Arc::new(Message::default());
        let slot = Arc::downgrade(&message);
        self.messages.push_back(message);
        slot
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn head_ready(&self) -> bool {
        self.messages.front().is_some_and(|m| m.is_ready())
    }

    /// Writes ready messages from the head until the queue runs dry, the head
    /// is not finalized yet, or the writer would block.
    ///
    /// Partially written messages keep their unsent suffix at the head.
    pub fn transmit<W: Write>(&mut self, out: &mut W) -> io::Result<Transmit> {
        while let Some(head) = self.messages.front() {
            if !head.is_ready() {
                return Ok(Transmit::Idle);
            }
            let mut data = head.lock();
            while !data.is_empty() {
                match out.write(&data) {
                    Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                    Ok(n) => data.advance(n),
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                        return Ok(Transmit::Blocked);
                    }
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                    Err(e) => return Err(e),
                }
            }
            drop(data);
            self.messages.pop_front();
        }
        Ok(Transmit::Idle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Accepts at most `budget` bytes, then reports `WouldBlock`.
    struct Throttled {
        written: Vec<u8>,
        budget: usize,
    }

    impl Write for Throttled {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.budget == 0 {
                return Err(io::ErrorKind::WouldBlock.into());
            }
            let n = buf.len().min(self.budget);
            self.budget -= n;
            self.written.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn fill(slot: &Weak<Message>, bytes: &[u8]) {
        slot.upgrade().unwrap().fill(BytesMut::from(bytes));
    }

    #[test]
    fn only_the_head_is_offered() {
        let mut queue = MessageQueue::new();
        let first = queue.push_slot();
        let second = queue.push_slot();
        fill(&second, b"second");

        let mut out = Vec::new();
        assert_eq!(queue.transmit(&mut out).unwrap(), Transmit::Idle);
        assert!(out.is_empty());
        assert_eq!(queue.len(), 2);

        fill(&first, b"first");
        assert_eq!(queue.transmit(&mut out).unwrap(), Transmit::Idle);
        assert_eq!(out, b"firstsecond");
        assert!(queue.is_empty());
    }

    #[test]
    fn partial_writes_resume_where_they_stopped() {
        let mut queue = MessageQueue::new();
        let slot = queue.push_slot();
        fill(&slot, b"hello world");

        let mut out = Throttled { written: Vec::new(), budget: 4 };
        assert_eq!(queue.transmit(&mut out).unwrap(), Transmit::Blocked);
        assert_eq!(out.written, b"hell");
        assert!(queue.head_ready());

        out.budget = 100;
        assert_eq!(queue.transmit(&mut out).unwrap(), Transmit::Idle);
        assert_eq!(out.written, b"hello world");
        assert!(queue.is_empty());
    }

    #[test]
    fn slots_expire_with_the_queue() {
        let mut queue = MessageQueue::new();
        let slot = queue.push_slot();
        assert!(slot.upgrade().is_some());
        drop(queue);
        assert!(slot.upgrade().is_none());
    }

    #[test]
    fn zero_length_write_is_an_error() {
        struct Closed;
        impl Write for Closed {
            fn write(&mut self, _: &[u8]) -> io::Result<usize> {
                Ok(0)
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let mut queue = MessageQueue::new();
        let slot = queue.push_slot();
        fill(&slot, b"x");
        let err = queue.transmit(&mut Closed).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WriteZero);
    }
}
