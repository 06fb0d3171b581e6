//! FIFO queue of acquire requests blocked on resource availability.
//!
//! Every method is called with the pool state lock held. A waiter's sender is
//! consumed either by [`WaitQueue::hand_off`] or by [`WaitQueue::remove`], so
//! its completion fires at most once even when a handoff races its timeout.

use std::collections::VecDeque;

use tokio::sync::oneshot;

use crate::slot::ResourceId;

/// A resource passed directly from a release to a waiter.
#[derive(Debug)]
pub(crate) struct Handoff<P> {
    pub(crate) id: ResourceId,
    pub(crate) session: P,
}

#[derive(Debug)]
struct Waiter<P> {
    ticket: u64,
    tx: oneshot::Sender<Handoff<P>>,
}

#[derive(Debug)]
pub(crate) struct WaitQueue<P> {
    waiters: VecDeque<Waiter<P>>,
    next_ticket: u64,
}

impl<P> WaitQueue<P> {
    pub(crate) fn new() -> Self {
        Self {
            waiters: VecDeque::new(),
            next_ticket: 0,
        }
    }

    /// Enqueue a waiter at the back. Returns its ticket and receiver.
    pub(crate) fn push(&mut self) -> (u64, oneshot::Receiver<Handoff<P>>) {
        let (tx, rx) = oneshot::channel();
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        self.waiters.push_back(Waiter { ticket, tx });
        (ticket, rx)
    }

    /// Remove a waiter whose timer fired. `false` means a handoff already
    /// consumed it and the resource is sitting in its receiver.
    pub(crate) fn remove(&mut self, ticket: u64) -> bool {
        match self.waiters.iter().position(|w| w.ticket == ticket) {
            Some(pos) => {
                self.waiters.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Give `handoff` to the oldest live waiter.
    ///
    /// Waiters whose acquire future was dropped are discarded on the way.
    /// Returns the handoff back if nobody could take it.
    pub(crate) fn hand_off(&mut self, mut handoff: Handoff<P>) -> Result<(), Handoff<P>> {
        while let Some(waiter) = self.waiters.pop_front() {
            match waiter.tx.send(handoff) {
                Ok(()) => return Ok(()),
                Err(returned) => handoff = returned,
            }
        }
        Err(handoff)
    }

    /// Drop every waiter; their receivers observe a closed channel.
    pub(crate) fn close_all(&mut self) -> usize {
        let n = self.waiters.len();
        self.waiters.clear();
        n
    }

    /// Waiters still listening
    pub(crate) fn len(&self) -> usize {
        self.waiters.iter().filter(|w| !w.tx.is_closed()).count()
    }
}
