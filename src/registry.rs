//! Named registry of communicator instances.
//!
//! Collective endpoints are usually addressed by name: the first
//! participant creates the communicator and the remaining sites locate it.
//! The registry is cheaply cloneable and safe to share across tasks.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::comm::Communicator;
use crate::error::{Error, Result};

/// Registry creating and locating [`Communicator`] instances by name.
#[derive(Clone, Default)]
pub struct CommunicatorRegistry {
    communicators: Arc<DashMap<String, Arc<Communicator>>>,
}

impl CommunicatorRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and register a communicator under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyExists`] if the name is taken and
    /// [`Error::ZeroSites`] if `num_sites` is 0.
    pub fn create(&self, name: &str, num_sites: usize) -> Result<Arc<Communicator>> {
        match self.communicators.entry(name.to_string()) {
            Entry::Occupied(_) => Err(Error::AlreadyExists(name.to_string())),
            Entry::Vacant(entry) => {
                tracing::debug!(name, num_sites, "registering communicator");
                let comm = Arc::new(Communicator::named(name, num_sites)?);
                entry.insert(Arc::clone(&comm));
                Ok(comm)
            }
        }
    }

    /// Locate the communicator registered under `name`, creating it with
    /// `num_sites` sites if absent.
    ///
    /// The site count of an existing communicator is immutable; callers
    /// racing on the same name all receive the instance the first one
    /// created.
    pub fn get_or_create(&self, name: &str, num_sites: usize) -> Result<Arc<Communicator>> {
        if num_sites == 0 {
            return Err(Error::ZeroSites);
        }
        match self.communicators.entry(name.to_string()) {
            Entry::Occupied(entry) => Ok(Arc::clone(entry.get())),
            Entry::Vacant(entry) => {
                tracing::debug!(name, num_sites, "registering communicator");
                let comm = Arc::new(Communicator::named(name, num_sites)?);
                entry.insert(Arc::clone(&comm));
                Ok(comm)
            }
        }
    }

    /// Locate the communicator registered under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no communicator carries the name.
    pub fn lookup(&self, name: &str) -> Result<Arc<Communicator>> {
        self.communicators
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| Error::NotFound(name.to_string()))
    }

    /// Remove the communicator registered under `name`.
    ///
    /// Returns `true` if a communicator was removed. Sites still holding
    /// the `Arc` keep using it; removal only releases the name.
    pub fn remove(&self, name: &str) -> bool {
        self.communicators.remove(name).is_some()
    }

    /// Number of registered communicators.
    pub fn len(&self) -> usize {
        self.communicators.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.communicators.is_empty()
    }
}
