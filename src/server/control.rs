//! Run state shared between the reactor thread and everyone else.
//!
//! ```text
//!   Idle ──begin──▶ Running ──stop──▶ Stopping
//!    ▲                 │                  │
//!    └──────finish─────┴──────────────────┘
//! ```
//!
//! `stop` sets the quit flag and pokes the wake channel, then blocks until
//! the loop reports back through `finish`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

use crate::server::wake::WakeSignal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Stopping,
}

#[derive(Debug)]
struct Inner {
    state: RunState,
    loop_thread: Option<ThreadId>,
}

#[derive(Debug)]
pub struct Control {
    inner: Mutex<Inner>,
    stopped: Condvar,
    quit: AtomicBool,
    signal: WakeSignal,
}

impl Control {
    pub fn new(signal: WakeSignal) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: RunState::Idle,
                loop_thread: None,
            }),
            stopped: Condvar::new(),
            quit: AtomicBool::new(false),
            signal,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> RunState {
        self.lock().state
    }

    pub fn wake(&self) {
        self.signal.wake();
    }

    pub fn quit_requested(&self) -> bool {
        self.quit.load(Ordering::Acquire)
    }

    /// Moves `Idle` to `Running` and clears any stale quit request.
    pub fn begin(&self) -> anyhow::Result<()> {
        let mut inner = self.lock();
        if inner.state != RunState::Idle {
            anyhow::bail!("server is already running");
        }
        inner.state = RunState::Running;
        inner.loop_thread = None;
        self.quit.store(false, Ordering::Release);
        Ok(())
    }

    /// Records the calling thread as the one driving the loop.
    pub fn enter_loop(&self) {
        self.lock().loop_thread = Some(thread::current().id());
    }

    /// Returns to `Idle` and releases every thread blocked in `stop`.
    pub fn finish(&self) {
        let mut inner = self.lock();
        inner.state = RunState::Idle;
        inner.loop_thread = None;
        self.quit.store(false, Ordering::Release);
        drop(inner);
        self.stopped.notify_all();
    }

    /// Requests a stop and waits for the loop to acknowledge it.
    ///
    /// Returns at once when the loop is not running. Called from the loop
    /// thread itself (inside a handler) it only records the request.
    pub fn stop(&self) {
        let mut inner = self.lock();
        if inner.state == RunState::Idle {
            return;
        }
        inner.state = RunState::Stopping;
        self.quit.store(true, Ordering::Release);
        self.signal.wake();

        if inner.loop_thread == Some(thread::current().id()) {
            return;
        }
        while inner.state != RunState::Idle {
            inner = self
                .stopped
                .wait(inner)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

/// Cloneable handle for stopping a running server from any thread.
#[derive(Debug, Clone)]
pub struct StopHandle {
    control: Arc<Control>,
}

impl StopHandle {
    pub(crate) fn new(control: Arc<Control>) -> Self {
        Self { control }
    }

    /// Blocks until the reactor loop has exited. See [`Control::stop`].
    pub fn stop(&self) {
        tracing::info!("Stop requested");
        self.control.stop();
    }

    pub fn state(&self) -> RunState {
        self.control.state()
    }
}

/// Runs [`Control::finish`] on every exit path of the loop, panics included.
pub(crate) struct RunGuard<'a> {
    control: &'a Control,
}

impl<'a> RunGuard<'a> {
    pub(crate) fn new(control: &'a Control) -> Self {
        control.enter_loop();
        Self { control }
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.control.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::wake;
    use std::time::Duration;

    fn control() -> Arc<Control> {
        let (_channel, signal) = wake::channel().unwrap();
        Arc::new(Control::new(signal))
    }

    #[test]
    fn stop_while_idle_returns_immediately() {
        let control = control();
        control.stop();
        assert_eq!(control.state(), RunState::Idle);
        assert!(!control.quit_requested());
    }

    #[test]
    fn begin_twice_is_rejected() {
        let control = control();
        control.begin().unwrap();
        assert!(control.begin().is_err());
        control.finish();
        control.begin().unwrap();
    }

    #[test]
    fn stop_waits_for_finish() {
        let control = control();
        control.begin().unwrap();

        let looper = Arc::clone(&control);
        let handle = thread::spawn(move || {
            let _guard = RunGuard::new(&looper);
            while !looper.quit_requested() {
                thread::sleep(Duration::from_millis(1));
            }
        });

        control.stop();
        assert_eq!(control.state(), RunState::Idle);
        handle.join().unwrap();
    }

    #[test]
    fn stop_from_loop_thread_does_not_block() {
        let control = control();
        control.begin().unwrap();
        let guard = RunGuard::new(&control);
        control.stop();
        assert!(control.quit_requested());
        assert_eq!(control.state(), RunState::Stopping);
        drop(guard);
        assert_eq!(control.state(), RunState::Idle);
    }
}
