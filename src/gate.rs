//! Generational and-gate: counts site arrivals and fires once per
//! generation.
//!
//! The gate tracks one bit per site, a monotonically increasing generation
//! counter, and the ready callbacks registered by arrivals of the current
//! generation. The communicator drives it under its own lock; the gate
//! itself carries no locking. Tasks waiting for a later generation park on
//! the [`watch`] channel published by [`AndGate::subscribe`] and are woken
//! by [`AndGate::next_generation`].

use tokio::sync::watch;

use crate::error::{Error, Result};

/// Generational arrival gate.
///
/// `F` is the ready-callback type stored per arrival; the gate only stores
/// the callbacks, the owner takes and runs them when the gate fires.
pub(crate) struct AndGate<F> {
    generation: u64,
    arrived: Vec<bool>,
    arrived_count: usize,
    ready: Vec<F>,
    generation_tx: watch::Sender<u64>,
}

impl<F> AndGate<F> {
    /// Create a gate for `num_sites` sites, starting at generation 1.
    pub(crate) fn new(num_sites: usize) -> Self {
        let (generation_tx, _) = watch::channel(1);
        AndGate {
            generation: 1,
            arrived: vec![false; num_sites],
            arrived_count: 0,
            ready: Vec::new(),
            generation_tx,
        }
    }

    /// The generation currently being assembled.
    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    /// A receiver observing the generation counter; await it with the
    /// communicator lock released to synchronize with a later generation.
    pub(crate) fn subscribe(&self) -> watch::Receiver<u64> {
        self.generation_tx.subscribe()
    }

    /// Capacity hint: every site of the generation will register one ready
    /// callback, so reserve the slots up front to avoid reallocation while
    /// the gate fires.
    pub(crate) fn reserve_ready(&mut self, num_sites: usize) {
        self.ready.reserve(num_sites.saturating_sub(self.ready.len()));
    }

    /// Register a ready callback for the current generation.
    pub(crate) fn push_ready(&mut self, callback: F) {
        self.ready.push(callback);
    }

    /// Mark the arrival of site `which`.
    ///
    /// Returns `true` when this arrival completes the generation, i.e. the
    /// gate fires and the owner must run the ready callbacks and advance.
    pub(crate) fn set(&mut self, which: usize) -> Result<bool> {
        let num_sites = self.arrived.len();
        let slot = self
            .arrived
            .get_mut(which)
            .ok_or(Error::SiteOutOfRange { which, num_sites })?;
        if *slot {
            return Err(Error::RepeatedArrival {
                which,
                generation: self.generation,
            });
        }
        *slot = true;
        self.arrived_count += 1;
        Ok(self.arrived_count == num_sites)
    }

    /// Take the ready callbacks registered for the current generation.
    pub(crate) fn take_ready(&mut self) -> Vec<F> {
        std::mem::take(&mut self.ready)
    }

    /// Unregister the most recently pushed ready callback. Used when the
    /// arrival it belongs to fails after registration and will not be part
    /// of the generation.
    pub(crate) fn pop_ready(&mut self) -> Option<F> {
        self.ready.pop()
    }

    /// Advance to the next generation: clear the arrival bits and wake any
    /// task parked on [`AndGate::subscribe`].
    pub(crate) fn next_generation(&mut self) {
        self.arrived.fill(false);
        self.arrived_count = 0;
        self.generation += 1;
        self.generation_tx.send_replace(self.generation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_only_on_last_arrival() {
        let mut gate: AndGate<u32> = AndGate::new(3);
        assert!(!gate.set(0).unwrap());
        assert!(!gate.set(2).unwrap());
        assert!(gate.set(1).unwrap());
    }

    #[test]
    fn repeated_arrival_is_rejected() {
        let mut gate: AndGate<u32> = AndGate::new(2);
        gate.set(1).unwrap();
        let err = gate.set(1).unwrap_err();
        assert!(matches!(
            err,
            Error::RepeatedArrival {
                which: 1,
                generation: 1,
            }
        ));
    }

    #[test]
    fn out_of_range_site_is_rejected() {
        let mut gate: AndGate<u32> = AndGate::new(2);
        let err = gate.set(2).unwrap_err();
        assert!(matches!(
            err,
            Error::SiteOutOfRange {
                which: 2,
                num_sites: 2,
            }
        ));
    }

    #[test]
    fn next_generation_rearms_the_gate() {
        let mut gate: AndGate<u32> = AndGate::new(2);
        gate.set(0).unwrap();
        gate.set(1).unwrap();
        gate.next_generation();
        assert_eq!(gate.generation(), 2);
        assert!(!gate.set(0).unwrap());
        assert!(gate.set(1).unwrap());
    }

    #[test]
    fn ready_callbacks_are_taken_in_registration_order() {
        let mut gate: AndGate<u32> = AndGate::new(4);
        gate.reserve_ready(4);
        gate.push_ready(10);
        gate.push_ready(20);
        gate.push_ready(30);
        assert_eq!(gate.pop_ready(), Some(30));
        assert_eq!(gate.take_ready(), vec![10, 20]);
        assert!(gate.take_ready().is_empty());
    }

    #[test]
    fn subscribers_observe_generation_advances() {
        let mut gate: AndGate<u32> = AndGate::new(1);
        let rx = gate.subscribe();
        assert_eq!(*rx.borrow(), 1);
        gate.next_generation();
        gate.next_generation();
        assert_eq!(*rx.borrow(), 3);
    }
}
