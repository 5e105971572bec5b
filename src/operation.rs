//! Operation strategy contract and identity tokens.
//!
//! Each collective kind is a zero-sized marker type implementing
//! [`Operation`]; the communicator never hardcodes a collective. A marker
//! plugs in behavior through [`CollectiveGet`] and/or [`CollectiveSet`],
//! whose implementations call [`Communicator::handle_data`] exactly once
//! and return the per-site result. Adding a new collective is additive:
//! define a marker, implement the strategy traits for it, and the generic
//! [`Communicator::get_result`]/[`Communicator::set_result`] entry points
//! dispatch to it.
//!
//! [`Communicator::handle_data`]: crate::Communicator::handle_data
//! [`Communicator::get_result`]: crate::Communicator::get_result
//! [`Communicator::set_result`]: crate::Communicator::set_result

use std::any::TypeId;

use async_trait::async_trait;

use crate::comm::Communicator;
use crate::error::Result;

/// A collective operation kind.
///
/// Implementors are marker types; the blanket [`Operation::id`] derives a
/// unique, trivially comparable identity token from the marker's `TypeId`,
/// which the communicator uses to reject mixed-operation generations.
pub trait Operation: 'static {
    /// Short name of the collective, used in logging and error messages.
    const NAME: &'static str;

    /// The identity token of this operation kind.
    fn id() -> OperationId
    where
        Self: Sized,
    {
        OperationId {
            id: TypeId::of::<Self>(),
            name: Self::NAME,
        }
    }
}

/// Identity token distinguishing collective kinds.
///
/// Tokens are unique per [`Operation`] marker type and stable for the
/// lifetime of the process. Equality compares only the underlying type
/// identity; the name rides along for diagnostics.
#[derive(Debug, Clone, Copy)]
pub struct OperationId {
    id: TypeId,
    name: &'static str,
}

impl OperationId {
    /// The identity token for operation `Op`.
    pub fn of<Op: Operation>() -> Self {
        Op::id()
    }

    /// The operation's short name.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for OperationId {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for OperationId {}

impl std::fmt::Display for OperationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name)
    }
}

/// Element types exchangeable through a communicator.
///
/// Blanket-implemented; any owned, sendable type with a default value
/// works, including `bool` (the generation storage never bit-packs) and
/// nested vectors for all-to-all style exchanges.
pub trait Element: Clone + Default + Send + 'static {}

impl<T: Clone + Default + Send + 'static> Element for T {}

/// The `get` side of an operation strategy: retrieve this site's result of
/// the collective, optionally contributing data on the way in.
#[async_trait]
pub trait CollectiveGet<R, A>: Operation {
    /// Run the `get` direction for `which` in `generation` (`None` means
    /// the current generation).
    async fn get(
        comm: &Communicator,
        which: usize,
        generation: Option<u64>,
        args: A,
    ) -> Result<R>;
}

/// The `set` side of an operation strategy: contribute this site's data to
/// the collective.
#[async_trait]
pub trait CollectiveSet<R, A>: Operation {
    /// Run the `set` direction for `which` in `generation` (`None` means
    /// the current generation).
    async fn set(
        comm: &Communicator,
        which: usize,
        generation: Option<u64>,
        args: A,
    ) -> Result<R>;
}
