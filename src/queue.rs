//! The deferred callback queue.
//!
//! Native worker threads push completed events here; nothing runs until the
//! application calls `poll`/`flush`, which serves the queue on its own thread.

use crate::{
    log::trace,
    util::{lock, remaining},
};
use std::{
    collections::VecDeque,
    sync::{Condvar, Mutex, PoisonError},
    time::Instant,
};

pub(crate) struct EventQueue<E> {
    events: Mutex<VecDeque<E>>,
    ready: Condvar,
    dispatch: Mutex<()>,
}

impl<E> Default for EventQueue<E> {
    fn default() -> Self {
        Self {
            events: Mutex::new(VecDeque::new()),
            ready: Condvar::new(),
            dispatch: Mutex::new(()),
        }
    }
}

impl<E> EventQueue<E> {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Enqueues an event. Never runs user code.
    pub(crate) fn push(&self, event: E) {
        lock(&self.events).push_back(event);
        self.ready.notify_all();
    }

    pub(crate) fn len(&self) -> usize {
        lock(&self.events).len()
    }

    /// Waits until `deadline` for at least one event, then hands every
    /// queued event to `handler` in order and returns how many were served.
    ///
    /// Handlers run on the calling thread, without the queue lock held, and
    /// never concurrently with another `serve` on the same queue.
    pub(crate) fn serve<F>(&self, deadline: Option<Instant>, handler: F) -> usize
    where
        F: FnMut(E),
    {
        self.serve_while(deadline, || true, handler)
    }

    /// Like [`serve`](Self::serve), but gives up waiting for the first event
    /// as soon as `waiting` returns false.
    ///
    /// `waiting` is checked under the queue lock on entry, after every push
    /// and after every `serve` that handed out events, so state changed by a
    /// handler on another thread is never missed.
    pub(crate) fn serve_while<W, F>(&self, deadline: Option<Instant>, waiting: W, mut handler: F) -> usize
    where
        W: Fn() -> bool,
        F: FnMut(E),
    {
        if !self.wait_ready(deadline, waiting) {
            return 0;
        }

        let dispatch = lock(&self.dispatch);
        // events enqueued while serving wait for the next call
        let pending = lock(&self.events).len();
        let mut served = 0;
        while served < pending {
            let Some(event) = lock(&self.events).pop_front() else {
                break;
            };
            handler(event);
            served += 1;
        }
        drop(dispatch);

        if served > 0 {
            let _events = lock(&self.events);
            self.ready.notify_all();
        }
        trace!("served {served} queued events");
        served
    }

    fn wait_ready<W>(&self, deadline: Option<Instant>, waiting: W) -> bool
    where
        W: Fn() -> bool,
    {
        let mut events = lock(&self.events);
        while events.is_empty() {
            if !waiting() {
                return false;
            }
            match remaining(deadline) {
                None => {
                    events = self
                        .ready
                        .wait(events)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                Some(left) if left.is_zero() => return false,
                Some(left) => {
                    events = self
                        .ready
                        .wait_timeout(events, left)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0;
                }
            }
        }
        true
    }
}
