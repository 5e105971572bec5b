//! Type-erased storage for the current generation's data vector.
//!
//! A communicator is not generic over the element type exchanged by its
//! sites; instead each generation lazily materializes a `Vec<T>` for
//! whatever `T` the active operation uses. The storage is keyed on both the
//! element type and the required length: a fresh vector replaces the
//! contents only when the type differs or the existing vector is too short,
//! otherwise contents are retained across generations so fill-once
//! operations can skip redundant work.

use std::any::{self, Any};

use crate::error::{Error, Result};

/// Type-erased owner of the current generation's `Vec<T>`.
pub(crate) struct Payload {
    slot: Option<Box<dyn Any + Send>>,
    needs_init: bool,
    available: bool,
}

impl Payload {
    pub(crate) fn new() -> Self {
        Payload {
            slot: None,
            needs_init: true,
            available: false,
        }
    }

    /// Lazily (re)initialize the storage on the first typed access of a
    /// generation.
    fn ensure<T>(&mut self, len: usize)
    where
        T: Default + Send + 'static,
    {
        if !self.needs_init {
            return;
        }
        self.needs_init = false;
        self.available = false;

        let retained = self
            .slot
            .as_deref()
            .and_then(|slot| slot.downcast_ref::<Vec<T>>())
            .is_some_and(|data| data.len() >= len);
        if !retained {
            let data: Vec<T> = std::iter::repeat_with(T::default).take(len).collect();
            self.slot = Some(Box::new(data));
        }
    }

    /// Access the generation's data vector, initializing it to `len`
    /// default elements if this is the first typed access of the
    /// generation.
    ///
    /// Mid-generation accesses must use the element type the generation was
    /// initialized with; a mismatch reports [`Error::PayloadTypeMismatch`].
    pub(crate) fn access<T>(&mut self, len: usize) -> Result<&mut Vec<T>>
    where
        T: Default + Send + 'static,
    {
        self.ensure::<T>(len);
        self.slot
            .as_deref_mut()
            .and_then(|slot| slot.downcast_mut::<Vec<T>>())
            .ok_or(Error::PayloadTypeMismatch {
                expected: any::type_name::<T>(),
            })
    }

    /// Access the data vector together with the availability flag.
    ///
    /// The flag starts out `false` each generation; fill-once operations
    /// latch it to `true` after their first finalizer so the remaining
    /// finalizers can reuse the prepared contents.
    pub(crate) fn access_with_available<T>(
        &mut self,
        len: usize,
    ) -> Result<(&mut Vec<T>, &mut bool)>
    where
        T: Default + Send + 'static,
    {
        self.ensure::<T>(len);
        match self
            .slot
            .as_deref_mut()
            .and_then(|slot| slot.downcast_mut::<Vec<T>>())
        {
            Some(data) => Ok((data, &mut self.available)),
            None => Err(Error::PayloadTypeMismatch {
                expected: any::type_name::<T>(),
            }),
        }
    }

    /// Mark the storage for reinitialization on the next typed access.
    ///
    /// The backing allocation is not freed; it is reused or replaced when
    /// the next generation first touches its data.
    pub(crate) fn invalidate(&mut self) {
        if !self.needs_init {
            self.needs_init = true;
            self.available = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_access_initializes_defaults() {
        let mut payload = Payload::new();
        let data = payload.access::<i32>(3).unwrap();
        assert_eq!(data, &vec![0, 0, 0]);
    }

    #[test]
    fn contents_retained_across_generations_for_same_type() {
        let mut payload = Payload::new();
        payload.access::<i32>(3).unwrap()[1] = 42;
        payload.invalidate();
        let data = payload.access::<i32>(3).unwrap();
        assert_eq!(data, &vec![0, 42, 0]);
    }

    #[test]
    fn type_switch_replaces_contents() {
        let mut payload = Payload::new();
        payload.access::<i32>(2).unwrap()[0] = 7;
        payload.invalidate();
        let data = payload.access::<String>(2).unwrap();
        assert_eq!(data, &vec![String::new(), String::new()]);
    }

    #[test]
    fn shorter_storage_is_regrown() {
        let mut payload = Payload::new();
        payload.access::<u8>(2).unwrap();
        payload.invalidate();
        let data = payload.access::<u8>(5).unwrap();
        assert_eq!(data.len(), 5);
    }

    #[test]
    fn longer_storage_is_kept() {
        let mut payload = Payload::new();
        payload.access::<u8>(5).unwrap()[4] = 9;
        payload.invalidate();
        let data = payload.access::<u8>(2).unwrap();
        assert_eq!(data.len(), 5);
        assert_eq!(data[4], 9);
    }

    #[test]
    fn mid_generation_type_mismatch_is_reported() {
        let mut payload = Payload::new();
        payload.access::<i32>(2).unwrap();
        let err = payload.access::<String>(2).unwrap_err();
        assert!(matches!(err, Error::PayloadTypeMismatch { .. }));
    }

    #[test]
    fn availability_flag_resets_on_invalidate() {
        let mut payload = Payload::new();
        {
            let (_, available) = payload.access_with_available::<bool>(3).unwrap();
            *available = true;
        }
        {
            let (_, available) = payload.access_with_available::<bool>(3).unwrap();
            assert!(*available);
        }
        payload.invalidate();
        let (_, available) = payload.access_with_available::<bool>(3).unwrap();
        assert!(!*available);
    }

    #[test]
    fn bool_elements_are_individually_addressable() {
        let mut payload = Payload::new();
        let data = payload.access::<bool>(3).unwrap();
        data[0] = true;
        data[2] = true;
        let copied: Vec<bool> = data.iter().copied().collect();
        assert_eq!(copied, vec![true, false, true]);
    }
}
