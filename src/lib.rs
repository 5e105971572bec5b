//! # lockstep
//!
//! Generational collective communicator for in-process tasks.
//!
//! A [`Communicator`] coordinates a fixed number of participating *sites*
//! (tokio tasks) executing one named collective operation per *generation*:
//! all-reduce, broadcast, scatter, gather, barrier and friends. Sites
//! arrive in any order; each contributes its data and awaits a future that
//! resolves to that site's result once the last site has arrived. The
//! communicator persists across generations and advances in lock-step,
//! exactly one operation kind per generation.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use lockstep::{AllReduce, Communicator};
//!
//! #[tokio::main]
//! async fn main() -> lockstep::Result<()> {
//!     let comm = Arc::new(Communicator::named("sum", 3)?);
//!
//!     let mut sites = Vec::new();
//!     for which in 0..comm.num_sites() {
//!         let value = [10, 20, 12][which];
//!         sites.push(comm.spawn_set_result::<AllReduce, i32, _>(
//!             which,
//!             None,
//!             (value, |a: i32, b: i32| a + b),
//!         ));
//!     }
//!
//!     for site in sites {
//!         let total = site.await.expect("site task panicked")?;
//!         assert_eq!(total, 42);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Built-in Collectives
//!
//! | Operation | Result per site |
//! |-----------|-----------------|
//! | [`AllGather`] | vector of every site's contribution |
//! | [`AllReduce`] | reduction of all contributions |
//! | [`AllToAll`] | the values each peer addressed to this site |
//! | [`Barrier`] | unit, once all sites arrived |
//! | [`Broadcast`] | the root's value |
//! | [`Gather`] | root: all contributions; others: unit |
//! | [`InclusiveScan`] | reduction of contributions from sites `0..=i` |
//! | [`Reduce`] | root: reduction; others: unit |
//! | [`Scatter`] | this site's share of the root's vector |
//!
//! New collectives plug in additively: define a marker type implementing
//! [`Operation`] plus [`CollectiveGet`] and/or [`CollectiveSet`], and call
//! [`Communicator::handle_data`] exactly once per arrival. See the
//! `operation` module docs for the contract.
//!
//! ## Generations
//!
//! Generations are numbered from 1. Entry points take `Option<u64>`:
//! `None` joins the current generation, `Some(g)` requests generation `g`
//! explicitly, suspending the caller until the communicator has advanced
//! that far. Within one communicator, every site observes generation G's
//! result before anything from generation G+1.
//!
//! ## Concurrency Model
//!
//! All communicator state sits behind a single short-hold lock. Arrival
//! bookkeeping, contribution steps and per-site finalizers run under it;
//! the lock is never held across a suspension. The per-site finalizers of
//! a generation all run on the completing site's stack, before the
//! generation advances, so a site awaiting its result never observes a
//! half-finalized generation.
//!
//! Misuse (mixing operation kinds within a generation, repeated or
//! out-of-range arrivals, stray finalizers) surfaces as structured
//! [`Error`] values classed by [`ErrorClass`]; see the `error` module.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]

mod collectives;
mod comm;
mod error;
mod gate;
mod operation;
mod payload;
mod registry;

pub use collectives::{
    AllGather, AllReduce, AllToAll, Barrier, Broadcast, Gather, InclusiveScan, Reduce, Scatter,
};
pub use comm::Communicator;
pub use error::{Error, ErrorClass, Result};
pub use operation::{CollectiveGet, CollectiveSet, Element, Operation, OperationId};
pub use registry::CommunicatorRegistry;
