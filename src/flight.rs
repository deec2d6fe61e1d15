//! In-flight bookkeeping shared by the controllers.
//!
//! Each controller guards against overlapping invocations of itself with a
//! busy flag. Every started operation gets a [`Ticket`] carrying the epoch it
//! was started under and a cancellation token. Resetting the owning session
//! bumps the epoch, so a completion that arrives afterwards can be told apart
//! from a current one and dropped.

use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct Ticket {
    seq: u64,
    epoch: u64,
    token: CancellationToken,
}

impl Ticket {
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Monotonic generation the operation was started under.
    pub fn generation(&self) -> u64 {
        self.epoch
    }
}

/// What became of a finished operation: the generation it ran under and
/// whether its result was applied to the state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    pub generation: u64,
    pub applied: bool,
}

impl Completion {
    pub fn of(ticket: &Ticket, applied: bool) -> Self {
        Self {
            generation: ticket.generation(),
            applied,
        }
    }
}

#[derive(Debug, Default)]
pub struct InFlight {
    busy: bool,
    seq: u64,
    epoch: u64,
    token: CancellationToken,
}

impl InFlight {
    pub fn is_busy(&self) -> bool {
        self.busy
    }

    /// Start an operation unless one is already running.
    pub fn try_begin(&mut self) -> Option<Ticket> {
        if self.busy {
            return None;
        }
        self.busy = true;
        self.seq += 1;
        self.token = CancellationToken::new();
        Some(Ticket {
            seq: self.seq,
            epoch: self.epoch,
            token: self.token.clone(),
        })
    }

    /// Mark the ticket's operation finished. Returns whether its result
    /// still belongs to the current session and should be applied.
    pub fn finish(&mut self, ticket: &Ticket) -> bool {
        if ticket.seq == self.seq {
            self.busy = false;
        }
        self.is_current(ticket)
    }

    pub fn is_current(&self, ticket: &Ticket) -> bool {
        ticket.epoch == self.epoch && !ticket.token.is_cancelled()
    }

    /// Invalidate results of operations started so far. The running
    /// operation, if any, keeps going and still clears the busy flag.
    pub fn reset(&mut self) {
        self.epoch += 1;
    }

    /// Invalidate and cancel the running operation, freeing the guard.
    pub fn cancel(&mut self) {
        self.epoch += 1;
        self.token.cancel();
        self.busy = false;
    }
}
