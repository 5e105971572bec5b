//! Built-in collective operation strategies.
//!
//! Every collective is a marker type plugging into the communicator through
//! [`CollectiveGet`] / [`CollectiveSet`]. Sites with data to contribute use
//! the `set` direction; sites that only consume use `get`. All strategies
//! funnel into [`Communicator::handle_data`]: a `step` records the arriving
//! site's contribution in the generation's data vector, a finalizer
//! produces the per-site result after all sites have arrived.
//!
//! | Operation | `set` (contributing side) | `get` (consuming side) |
//! |---|---|---|
//! | [`AllGather`] | `T` → `Vec<T>` | — |
//! | [`AllReduce`] | `(T, op)` → `T` | — |
//! | [`AllToAll`] | `Vec<T>` → `Vec<T>` | — |
//! | [`Barrier`] | `()` → `()` | — |
//! | [`Broadcast`] | root: `T` → `T` | `()` → `T` |
//! | [`Gather`] | non-root: `T` → `()` | root: `T` → `Vec<T>` |
//! | [`InclusiveScan`] | `(T, op)` → `T` | — |
//! | [`Reduce`] | non-root: `T` → `()` | root: `(T, op)` → `T` |
//! | [`Scatter`] | root: `Vec<T>` → `T` | `()` → `T` |

use async_trait::async_trait;

use crate::comm::Communicator;
use crate::error::{Error, Result};
use crate::operation::{CollectiveGet, CollectiveSet, Element, Operation};

/// Gather one value from every site and hand the full vector to all sites.
///
/// Every site calls the `set` direction with its contribution and receives
/// the vector of all contributions, indexed by site.
///
/// # Example
///
/// ```no_run
/// # use lockstep::{AllGather, Communicator};
/// # async fn demo(comm: &Communicator, which: usize) -> lockstep::Result<()> {
/// let everyone: Vec<u64> = comm
///     .set_result::<AllGather, _, _>(which, None, which as u64 * 10)
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Copy)]
pub struct AllGather;

impl Operation for AllGather {
    const NAME: &'static str = "all_gather";
}

#[async_trait]
impl<T: Element> CollectiveSet<Vec<T>, T> for AllGather {
    async fn set(
        comm: &Communicator,
        which: usize,
        generation: Option<u64>,
        args: T,
    ) -> Result<Vec<T>> {
        comm.handle_data::<T, Vec<T>, _, _>(
            Self::id(),
            which,
            generation,
            Some(move |data: &mut Vec<T>, which: usize| data[which] = args),
            |data: &mut Vec<T>, _: &mut bool, _: usize| Ok(data.clone()),
            None,
        )
        .await
    }
}

/// Reduce one value per site with a binary operator; all sites receive the
/// reduced result.
///
/// Every site calls the `set` direction with `(value, op)`. The operator
/// must be the same for all sites of a generation; for commutative
/// operators the result is independent of arrival order. The reduction
/// runs once, in the first finalizer, and the cached result is served to
/// the remaining sites.
///
/// # Example
///
/// ```no_run
/// # use lockstep::{AllReduce, Communicator};
/// # async fn demo(comm: &Communicator, which: usize) -> lockstep::Result<()> {
/// let sum: i32 = comm
///     .set_result::<AllReduce, _, _>(which, None, (10, |a: i32, b: i32| a + b))
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Copy)]
pub struct AllReduce;

impl Operation for AllReduce {
    const NAME: &'static str = "all_reduce";
}

#[async_trait]
impl<T, F> CollectiveSet<T, (T, F)> for AllReduce
where
    T: Element,
    F: Fn(T, T) -> T + Send + 'static,
{
    async fn set(
        comm: &Communicator,
        which: usize,
        generation: Option<u64>,
        args: (T, F),
    ) -> Result<T> {
        let (value, op) = args;
        comm.handle_data::<T, T, _, _>(
            Self::id(),
            which,
            generation,
            Some(move |data: &mut Vec<T>, which: usize| data[which] = value),
            move |data: &mut Vec<T>, available: &mut bool, _: usize| {
                if !*available {
                    let mut acc = data[0].clone();
                    for value in data.iter().skip(1) {
                        acc = op(acc, value.clone());
                    }
                    data[0] = acc;
                    *available = true;
                }
                Ok(data[0].clone())
            },
            None,
        )
        .await
    }
}

/// Personalized all-to-all exchange: site `i` contributes one value per
/// peer and receives the values every peer addressed to `i`.
#[derive(Debug, Clone, Copy)]
pub struct AllToAll;

impl Operation for AllToAll {
    const NAME: &'static str = "all_to_all";
}

#[async_trait]
impl<T: Element> CollectiveSet<Vec<T>, Vec<T>> for AllToAll {
    async fn set(
        comm: &Communicator,
        which: usize,
        generation: Option<u64>,
        args: Vec<T>,
    ) -> Result<Vec<T>> {
        if args.len() != comm.num_sites() {
            return Err(Error::CountMismatch {
                expected: comm.num_sites(),
                got: args.len(),
            });
        }
        comm.handle_data::<Vec<T>, Vec<T>, _, _>(
            Self::id(),
            which,
            generation,
            Some(move |data: &mut Vec<Vec<T>>, which: usize| data[which] = args),
            |data: &mut Vec<Vec<T>>, _: &mut bool, which: usize| {
                Ok(data.iter().map(|row| row[which].clone()).collect())
            },
            None,
        )
        .await
    }
}

/// Synchronization barrier: every site's call resolves once all sites have
/// arrived. No data is exchanged.
#[derive(Debug, Clone, Copy)]
pub struct Barrier;

impl Operation for Barrier {
    const NAME: &'static str = "barrier";
}

#[async_trait]
impl CollectiveSet<(), ()> for Barrier {
    async fn set(
        comm: &Communicator,
        which: usize,
        generation: Option<u64>,
        _args: (),
    ) -> Result<()> {
        comm.handle_data::<(), (), fn(&mut Vec<()>, usize), _>(
            Self::id(),
            which,
            generation,
            None,
            |_: &mut Vec<()>, _: &mut bool, _: usize| Ok(()),
            None,
        )
        .await
    }
}

/// One site distributes a single value to every site.
///
/// The root calls the `set` direction with the value; every other site
/// calls `get`. Any site may act as root, and the root's own call also
/// resolves to the value.
///
/// # Example
///
/// ```no_run
/// # use lockstep::{Broadcast, Communicator};
/// # async fn root(comm: &Communicator) -> lockstep::Result<()> {
/// let seen: String = comm
///     .set_result::<Broadcast, _, _>(0, None, "hi".to_string())
///     .await?;
/// # Ok(())
/// # }
/// # async fn site(comm: &Communicator, which: usize) -> lockstep::Result<()> {
/// let seen: String = comm.get_result::<Broadcast, _, _>(which, None, ()).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Broadcast;

impl Operation for Broadcast {
    const NAME: &'static str = "broadcast";
}

#[async_trait]
impl<T: Element> CollectiveSet<T, T> for Broadcast {
    async fn set(
        comm: &Communicator,
        which: usize,
        generation: Option<u64>,
        args: T,
    ) -> Result<T> {
        comm.handle_data::<T, T, _, _>(
            Self::id(),
            which,
            generation,
            Some(move |data: &mut Vec<T>, _: usize| data[0] = args),
            |data: &mut Vec<T>, _: &mut bool, _: usize| Ok(data[0].clone()),
            Some(1),
        )
        .await
    }
}

#[async_trait]
impl<T: Element> CollectiveGet<T, ()> for Broadcast {
    async fn get(
        comm: &Communicator,
        which: usize,
        generation: Option<u64>,
        _args: (),
    ) -> Result<T> {
        comm.handle_data::<T, T, fn(&mut Vec<T>, usize), _>(
            Self::id(),
            which,
            generation,
            None,
            |data: &mut Vec<T>, _: &mut bool, _: usize| Ok(data[0].clone()),
            Some(1),
        )
        .await
    }
}

/// Collect one value from every site at a single root.
///
/// The root calls the `get` direction with its own contribution and
/// receives the vector of all contributions; every other site calls `set`
/// with its value.
#[derive(Debug, Clone, Copy)]
pub struct Gather;

impl Operation for Gather {
    const NAME: &'static str = "gather";
}

#[async_trait]
impl<T: Element> CollectiveGet<Vec<T>, T> for Gather {
    async fn get(
        comm: &Communicator,
        which: usize,
        generation: Option<u64>,
        args: T,
    ) -> Result<Vec<T>> {
        comm.handle_data::<T, Vec<T>, _, _>(
            Self::id(),
            which,
            generation,
            Some(move |data: &mut Vec<T>, which: usize| data[which] = args),
            |data: &mut Vec<T>, _: &mut bool, _: usize| Ok(data.clone()),
            None,
        )
        .await
    }
}

#[async_trait]
impl<T: Element> CollectiveSet<(), T> for Gather {
    async fn set(
        comm: &Communicator,
        which: usize,
        generation: Option<u64>,
        args: T,
    ) -> Result<()> {
        comm.handle_data::<T, (), _, _>(
            Self::id(),
            which,
            generation,
            Some(move |data: &mut Vec<T>, which: usize| data[which] = args),
            |_: &mut Vec<T>, _: &mut bool, _: usize| Ok(()),
            None,
        )
        .await
    }
}

/// Inclusive prefix reduction.
///
/// Site `i` receives the reduction of the contributions from sites
/// `0..=i`; every site's own contribution is included in its result.
#[derive(Debug, Clone, Copy)]
pub struct InclusiveScan;

impl Operation for InclusiveScan {
    const NAME: &'static str = "inclusive_scan";
}

#[async_trait]
impl<T, F> CollectiveSet<T, (T, F)> for InclusiveScan
where
    T: Element,
    F: Fn(T, T) -> T + Send + 'static,
{
    async fn set(
        comm: &Communicator,
        which: usize,
        generation: Option<u64>,
        args: (T, F),
    ) -> Result<T> {
        let (value, op) = args;
        comm.handle_data::<T, T, _, _>(
            Self::id(),
            which,
            generation,
            Some(move |data: &mut Vec<T>, which: usize| data[which] = value),
            move |data: &mut Vec<T>, _: &mut bool, which: usize| {
                let mut acc = data[0].clone();
                for value in data.iter().take(which + 1).skip(1) {
                    acc = op(acc, value.clone());
                }
                Ok(acc)
            },
            None,
        )
        .await
    }
}

/// Reduce one value per site with a binary operator; only the root
/// receives the result.
///
/// The root calls the `get` direction with `(value, op)`; every other
/// site calls `set` with its value.
#[derive(Debug, Clone, Copy)]
pub struct Reduce;

impl Operation for Reduce {
    const NAME: &'static str = "reduce";
}

#[async_trait]
impl<T, F> CollectiveGet<T, (T, F)> for Reduce
where
    T: Element,
    F: Fn(T, T) -> T + Send + 'static,
{
    async fn get(
        comm: &Communicator,
        which: usize,
        generation: Option<u64>,
        args: (T, F),
    ) -> Result<T> {
        let (value, op) = args;
        comm.handle_data::<T, T, _, _>(
            Self::id(),
            which,
            generation,
            Some(move |data: &mut Vec<T>, which: usize| data[which] = value),
            move |data: &mut Vec<T>, _: &mut bool, _: usize| {
                let mut acc = data[0].clone();
                for value in data.iter().skip(1) {
                    acc = op(acc, value.clone());
                }
                Ok(acc)
            },
            None,
        )
        .await
    }
}

#[async_trait]
impl<T: Element> CollectiveSet<(), T> for Reduce {
    async fn set(
        comm: &Communicator,
        which: usize,
        generation: Option<u64>,
        args: T,
    ) -> Result<()> {
        comm.handle_data::<T, (), _, _>(
            Self::id(),
            which,
            generation,
            Some(move |data: &mut Vec<T>, which: usize| data[which] = args),
            |_: &mut Vec<T>, _: &mut bool, _: usize| Ok(()),
            None,
        )
        .await
    }
}

/// One site distributes a personalized value to every site.
///
/// The root calls the `set` direction with one value per site and receives
/// its own share; every other site calls `get` and receives the value at
/// its index.
///
/// # Errors
///
/// The root's call reports [`Error::CountMismatch`] if the contributed
/// vector does not hold exactly `num_sites` elements.
#[derive(Debug, Clone, Copy)]
pub struct Scatter;

impl Operation for Scatter {
    const NAME: &'static str = "scatter";
}

#[async_trait]
impl<T: Element> CollectiveSet<T, Vec<T>> for Scatter {
    async fn set(
        comm: &Communicator,
        which: usize,
        generation: Option<u64>,
        args: Vec<T>,
    ) -> Result<T> {
        if args.len() != comm.num_sites() {
            return Err(Error::CountMismatch {
                expected: comm.num_sites(),
                got: args.len(),
            });
        }
        comm.handle_data::<T, T, _, _>(
            Self::id(),
            which,
            generation,
            Some(move |data: &mut Vec<T>, _: usize| *data = args),
            |data: &mut Vec<T>, _: &mut bool, which: usize| Ok(data[which].clone()),
            None,
        )
        .await
    }
}

#[async_trait]
impl<T: Element> CollectiveGet<T, ()> for Scatter {
    async fn get(
        comm: &Communicator,
        which: usize,
        generation: Option<u64>,
        _args: (),
    ) -> Result<T> {
        comm.handle_data::<T, T, fn(&mut Vec<T>, usize), _>(
            Self::id(),
            which,
            generation,
            None,
            |data: &mut Vec<T>, _: &mut bool, which: usize| Ok(data[which].clone()),
            None,
        )
        .await
    }
}
