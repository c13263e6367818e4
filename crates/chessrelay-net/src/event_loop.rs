use std::io;
use std::time::Duration;

use mio::{Events, Poll, Token};

/// The bits of an mio readiness event this crate's callers care about,
/// copied out so the borrow on `Events` doesn't have to outlive the match
/// arm that consumes it.
#[derive(Debug, Clone, Copy)]
pub struct Readiness {
    pub token: Token,
    pub readable: bool,
    pub writable: bool,
    pub closed: bool,
    pub errored: bool,
}

/// Thin wrapper over `mio::Poll` + `mio::Events`: owns the event buffer and
/// drives one readiness pass at a time behind a short timeout, the way a
/// worker with a small, bounded set of peers polls without blocking the
/// thread indefinitely.
pub struct EventLoop {
    poll: Poll,
    events: Events,
}

impl EventLoop {
    pub fn new(events_capacity: usize) -> io::Result<Self> {
        Ok(Self { poll: Poll::new()?, events: Events::with_capacity(events_capacity) })
    }

    pub fn registry(&self) -> &mio::Registry {
        self.poll.registry()
    }

    /// Drives a single readiness pass, blocking for at most `timeout`, and
    /// returns the observed events collected into a plain `Vec` so callers
    /// can mutate the registered sources while iterating over them.
    pub fn poll(&mut self, timeout: Option<Duration>) -> io::Result<Vec<Readiness>> {
        self.poll.poll(&mut self.events, timeout)?;
        Ok(self
            .events
            .iter()
            .map(|ev| Readiness {
                token: ev.token(),
                readable: ev.is_readable(),
                writable: ev.is_writable(),
                closed: ev.is_read_closed() || ev.is_write_closed(),
                errored: ev.is_error(),
            })
            .collect())
    }
}
