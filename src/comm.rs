//! The communicator: generational rendezvous for N collective sites.
//!
//! A [`Communicator`] coordinates `num_sites` tasks executing one collective
//! operation per generation. Arrivals are admitted in any order, contribute
//! their data under the communicator lock, and receive a future resolving to
//! their per-site result once the last site has arrived. All state lives
//! behind a single short-hold lock; the only suspension point is the
//! generation synchronization for sites that arrive ahead of the gate.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::gate::AndGate;
use crate::operation::{CollectiveGet, CollectiveSet, OperationId};
use crate::payload::Payload;

/// Ready callback registered per arrival; runs under the lock, on the
/// completing site's stack, when the gate fires.
type ReadyFn = Box<dyn FnOnce(FinalizeCx<'_>) + Send>;

/// Borrowed view of the communicator state handed to a ready callback.
struct FinalizeCx<'a> {
    data: &'a mut Payload,
    current_operation: Option<OperationId>,
    on_ready_count: &'a mut usize,
    num_sites: usize,
}

/// Lock-protected communicator state.
struct State {
    gate: AndGate<ReadyFn>,
    data: Payload,
    current_operation: Option<OperationId>,
    on_ready_count: usize,
}

impl State {
    /// Reset for the next generation. Storage in `data` is retained and
    /// reused or replaced on the next typed access.
    fn invalidate_data(&mut self) {
        self.data.invalidate();
        self.on_ready_count = 0;
        self.current_operation = None;
    }
}

/// Emits the paired entry/exit log events around an entry point; the exit
/// event fires on error paths too.
struct LogGuard {
    direction: &'static str,
    operation: &'static str,
    which: usize,
    generation: Option<u64>,
}

impl LogGuard {
    fn new(
        direction: &'static str,
        operation: &'static str,
        which: usize,
        generation: Option<u64>,
    ) -> Self {
        tracing::debug!(
            which,
            generation = ?generation,
            "{direction}(>>> {operation})"
        );
        LogGuard {
            direction,
            operation,
            which,
            generation,
        }
    }
}

impl Drop for LogGuard {
    fn drop(&mut self) {
        tracing::debug!(
            which = self.which,
            generation = ?self.generation,
            "{}(<<< {})",
            self.direction,
            self.operation
        );
    }
}

/// A generational collective communicator.
///
/// Created with a fixed site count; persists across generations. Each of
/// the `num_sites` sites arrives exactly once per generation through
/// [`Communicator::get_result`] or [`Communicator::set_result`], and every
/// site's call resolves to that site's result once all sites have arrived.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use lockstep::{AllReduce, Communicator};
///
/// # async fn demo() -> lockstep::Result<()> {
/// let comm = Arc::new(Communicator::named("sum", 3)?);
/// // Each of the three sites, from its own task:
/// let total: i32 = comm
///     .set_result::<AllReduce, _, _>(0, None, (10, |a: i32, b: i32| a + b))
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct Communicator {
    name: String,
    num_sites: usize,
    state: Mutex<State>,
}

impl Communicator {
    /// Create a communicator for `num_sites` sites.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ZeroSites`] if `num_sites` is 0.
    pub fn new(num_sites: usize) -> Result<Self> {
        Self::named("<unnamed>", num_sites)
    }

    /// Create a named communicator for `num_sites` sites. The name appears
    /// in log events and registry lookups.
    pub fn named(name: impl Into<String>, num_sites: usize) -> Result<Self> {
        if num_sites == 0 {
            return Err(Error::ZeroSites);
        }
        Ok(Communicator {
            name: name.into(),
            num_sites,
            state: Mutex::new(State {
                gate: AndGate::new(num_sites),
                data: Payload::new(),
                current_operation: None,
                on_ready_count: 0,
            }),
        })
    }

    /// The communicator's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The number of sites participating in each generation.
    pub fn num_sites(&self) -> usize {
        self.num_sites
    }

    /// The generation currently being assembled (1-based).
    pub fn generation(&self) -> u64 {
        self.state.lock().gate.generation()
    }

    /// Generic `get` entry point: dispatches to the operation strategy's
    /// [`CollectiveGet::get`]. Runs inline on the calling task (the direct
    /// action variant).
    pub async fn get_result<Op, R, A>(
        &self,
        which: usize,
        generation: Option<u64>,
        args: A,
    ) -> Result<R>
    where
        Op: CollectiveGet<R, A>,
        R: Send,
        A: Send,
    {
        let _log = LogGuard::new("get", Op::NAME, which, generation);
        Op::get(self, which, generation, args).await
    }

    /// Generic `set` entry point: dispatches to the operation strategy's
    /// [`CollectiveSet::set`]. Runs inline on the calling task (the direct
    /// action variant).
    pub async fn set_result<Op, R, A>(
        &self,
        which: usize,
        generation: Option<u64>,
        args: A,
    ) -> Result<R>
    where
        Op: CollectiveSet<R, A>,
        R: Send,
        A: Send,
    {
        let _log = LogGuard::new("set", Op::NAME, which, generation);
        Op::set(self, which, generation, args).await
    }

    /// [`Communicator::get_result`] on a newly spawned task.
    pub fn spawn_get_result<Op, R, A>(
        self: &Arc<Self>,
        which: usize,
        generation: Option<u64>,
        args: A,
    ) -> JoinHandle<Result<R>>
    where
        Op: CollectiveGet<R, A>,
        R: Send + 'static,
        A: Send + 'static,
    {
        let comm = Arc::clone(self);
        tokio::spawn(async move { comm.get_result::<Op, R, A>(which, generation, args).await })
    }

    /// [`Communicator::set_result`] on a newly spawned task.
    pub fn spawn_set_result<Op, R, A>(
        self: &Arc<Self>,
        which: usize,
        generation: Option<u64>,
        args: A,
    ) -> JoinHandle<Result<R>>
    where
        Op: CollectiveSet<R, A>,
        R: Send + 'static,
        A: Send + 'static,
    {
        let comm = Arc::clone(self);
        tokio::spawn(async move { comm.set_result::<Op, R, A>(which, generation, args).await })
    }

    /// The synchronizer every operation strategy calls, exactly once per
    /// site arrival.
    ///
    /// `step`, if provided, records the site's contribution in the
    /// generation's data vector; it runs under the lock at arrival time.
    /// `finalizer` produces the site's result from the assembled vector; it
    /// runs under the lock on the completing site's stack after all
    /// `num_sites` arrivals, receiving the data vector, the mutable
    /// availability flag (for fill-once operations) and the site index.
    /// Operations without a meaningful result pass a trivial finalizer
    /// returning `Ok(())`.
    ///
    /// `generation` requests an explicit generation (1-based); `None` means
    /// the current one. A site arriving for a later generation suspends
    /// until the gate has advanced to it. `num_values` overrides the length
    /// of the generation's data vector; `None` means `num_sites`.
    ///
    /// # Errors
    ///
    /// Sequencing violations ([`Error::OperationMismatch`],
    /// [`Error::ReadyBeforeStart`], [`Error::ExcessiveOnReady`],
    /// [`Error::IncompleteOnReady`]) and arrival problems
    /// ([`Error::SiteOutOfRange`], [`Error::RepeatedArrival`],
    /// [`Error::InvalidGeneration`]) surface on the offending site's call.
    /// An `Err` returned by the finalizer resolves only this site's future;
    /// the collective still completes and advances for the other sites.
    pub async fn handle_data<T, R, S, F>(
        &self,
        operation: OperationId,
        which: usize,
        generation: Option<u64>,
        step: Option<S>,
        finalizer: F,
        num_values: Option<usize>,
    ) -> Result<R>
    where
        T: Default + Send + 'static,
        R: Send + 'static,
        S: FnOnce(&mut Vec<T>, usize) + Send,
        F: FnOnce(&mut Vec<T>, &mut bool, usize) -> Result<R> + Send + 'static,
    {
        if which >= self.num_sites {
            return Err(Error::SiteOutOfRange {
                which,
                num_sites: self.num_sites,
            });
        }

        // Synchronize with the requested generation before admission. The
        // lock is released while parked; it cannot be held across the wait,
        // and every other path contends for it only to arrive.
        if let Some(target) = generation {
            if target == 0 {
                return Err(Error::InvalidGeneration);
            }
            loop {
                let mut generations = {
                    let state = self.state.lock();
                    if state.gate.generation() >= target {
                        break;
                    }
                    state.gate.subscribe()
                };
                loop {
                    let caught_up = *generations.borrow_and_update() >= target;
                    if caught_up {
                        break;
                    }
                    generations.changed().await.map_err(|_| {
                        Error::Internal("generation watch closed".to_string())
                    })?;
                }
            }
        }

        let result_rx = {
            let mut state = self.state.lock();

            // Admission: exactly one operation identity per generation.
            match state.current_operation {
                None => {
                    if state.on_ready_count != 0 {
                        return Err(Error::ReadyBeforeStart {
                            operation: operation.name(),
                        });
                    }
                    state.current_operation = Some(operation);
                }
                Some(ongoing) if ongoing != operation => {
                    return Err(Error::OperationMismatch {
                        requested: operation.name(),
                        ongoing: ongoing.name(),
                    });
                }
                Some(_) => {}
            }

            let num_values = num_values.unwrap_or(self.num_sites);
            let num_sites = self.num_sites;

            // Every site registers one ready callback; reserve the slots up
            // front so the gate does not reallocate while firing.
            state.gate.reserve_ready(num_sites);

            let (result_tx, result_rx) = oneshot::channel::<Result<R>>();
            let ready: ReadyFn = Box::new(move |cx| {
                let outcome = run_ready::<T, R, F>(cx, operation, which, num_values, finalizer);
                let _ = result_tx.send(outcome);
            });
            state.gate.push_ready(ready);

            // This task holds the lock from registration through arrival, so on
            // failure the callback to unregister is the one just pushed.
            if let Some(step) = step {
                match state.data.access::<T>(num_values) {
                    Ok(data) => step(data, which),
                    Err(err) => {
                        state.gate.pop_ready();
                        return Err(err);
                    }
                }
            }

            match state.gate.set(which) {
                Ok(true) => self.complete_generation(&mut state, operation)?,
                Ok(false) => {}
                Err(err) => {
                    state.gate.pop_ready();
                    return Err(err);
                }
            }

            result_rx
        };

        result_rx.await.map_err(|_| {
            Error::Internal("collective completed without delivering a result".to_string())
        })?
    }

    /// Completion path, entered by the arrival that fires the gate: run all
    /// registered finalizers, verify the count, reset state and advance the
    /// generation. Runs entirely under the lock, so the whole transition is
    /// atomic to every other site.
    fn complete_generation(&self, state: &mut State, operation: OperationId) -> Result<()> {
        for ready in state.gate.take_ready() {
            ready(FinalizeCx {
                data: &mut state.data,
                current_operation: state.current_operation,
                on_ready_count: &mut state.on_ready_count,
                num_sites: self.num_sites,
            });
        }

        // Every on_ready callback must have run before the generation may
        // advance.
        if state.on_ready_count != self.num_sites {
            return Err(Error::IncompleteOnReady {
                operation: operation.name(),
                expected: self.num_sites,
                observed: state.on_ready_count,
            });
        }

        state.invalidate_data();
        state.gate.next_generation();
        Ok(())
    }
}

impl std::fmt::Debug for Communicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Communicator")
            .field("name", &self.name)
            .field("num_sites", &self.num_sites)
            .field("generation", &self.generation())
            .finish()
    }
}

/// Per-site finalization, invoked once per registered callback while the
/// gate fires: re-check the operation identity (a stray callback from a
/// prior generation fails here), cap the invocation count at `num_sites`,
/// then run the site's finalizer against the assembled data.
fn run_ready<T, R, F>(
    cx: FinalizeCx<'_>,
    operation: OperationId,
    which: usize,
    num_values: usize,
    finalizer: F,
) -> Result<R>
where
    T: Default + Send + 'static,
    F: FnOnce(&mut Vec<T>, &mut bool, usize) -> Result<R>,
{
    match cx.current_operation {
        None => {
            return Err(Error::ReadyBeforeStart {
                operation: operation.name(),
            })
        }
        Some(ongoing) if ongoing != operation => {
            return Err(Error::OperationMismatch {
                requested: operation.name(),
                ongoing: ongoing.name(),
            });
        }
        Some(_) => {}
    }

    if *cx.on_ready_count >= cx.num_sites {
        return Err(Error::ExcessiveOnReady {
            operation: operation.name(),
            expected: cx.num_sites,
            observed: *cx.on_ready_count,
        });
    }

    let (data, available) = cx.data.access_with_available::<T>(num_values)?;
    let outcome = finalizer(data, available, which);
    *cx.on_ready_count += 1;
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::Operation;

    struct Probe;

    impl Operation for Probe {
        const NAME: &'static str = "probe";
    }

    #[test]
    fn zero_sites_is_rejected() {
        assert!(matches!(Communicator::new(0), Err(Error::ZeroSites)));
    }

    #[test]
    fn fresh_communicator_starts_at_generation_one() {
        let comm = Communicator::new(3).unwrap();
        assert_eq!(comm.generation(), 1);
        assert_eq!(comm.num_sites(), 3);
    }

    #[tokio::test]
    async fn out_of_range_site_fails_synchronously() {
        let comm = Communicator::new(2).unwrap();
        let err = comm
            .handle_data::<i32, i32, fn(&mut Vec<i32>, usize), _>(
                OperationId::of::<Probe>(),
                5,
                None,
                None,
                |_, _, _| Ok(0),
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SiteOutOfRange { which: 5, .. }));
    }

    #[tokio::test]
    async fn explicit_generation_zero_is_rejected() {
        let comm = Communicator::new(1).unwrap();
        let err = comm
            .handle_data::<i32, i32, fn(&mut Vec<i32>, usize), _>(
                OperationId::of::<Probe>(),
                0,
                Some(0),
                None,
                |_, _, _| Ok(0),
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidGeneration));
    }

    #[tokio::test]
    async fn single_site_collective_completes_inline() {
        let comm = Communicator::new(1).unwrap();
        let value = comm
            .handle_data::<i32, i32, _, _>(
                OperationId::of::<Probe>(),
                0,
                None,
                Some(|data: &mut Vec<i32>, which: usize| data[which] = 41),
                |data: &mut Vec<i32>, _: &mut bool, which: usize| Ok(data[which] + 1),
                None,
            )
            .await
            .unwrap();
        assert_eq!(value, 42);
        assert_eq!(comm.generation(), 2);
    }
}
