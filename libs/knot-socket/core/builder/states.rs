/// Type-state markers for the builder pattern
///
/// These types are used to track at compile time whether connection options
/// have been set, so `build()` is only reachable once they are.

use std::marker::PhantomData;

/// Marker trait for options state
pub trait OptionsState {}

/// Options have not been set
pub struct NoOptions;
impl OptionsState for NoOptions {}

/// Options have been set
pub struct HasOptions;
impl OptionsState for HasOptions {}

/// Phantom marker to prevent direct construction
#[derive(Debug, Clone, Copy)]
pub struct TypeState<O> {
    _options: PhantomData<O>,
}

impl<O> TypeState<O> {
    pub(crate) fn new() -> Self {
        Self {
            _options: PhantomData,
        }
    }
}

impl<O> Default for TypeState<O> {
    fn default() -> Self {
        Self::new()
    }
}
