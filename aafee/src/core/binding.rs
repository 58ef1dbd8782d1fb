//! Shared mutable cells exposed as get/set closures.

use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

type Getter<T> = Arc<dyn Fn() -> T + Send + Sync>;
type Setter<T> = Arc<dyn Fn(T) + Send + Sync>;

/// A readable and writable handle to state owned elsewhere.
///
/// Clones share the same underlying state.
pub struct Binding<T> {
    get: Getter<T>,
    set: Setter<T>,
}

impl<T> Binding<T> {
    /// Creates a binding from accessor closures.
    pub fn new<G, S>(get: G, set: S) -> Self
    where
        G: Fn() -> T + Send + Sync + 'static,
        S: Fn(T) + Send + Sync + 'static,
    {
        Self {
            get: Arc::new(get),
            set: Arc::new(set),
        }
    }

    /// Reads the current value.
    pub fn get(&self) -> T {
        (self.get)()
    }

    /// Replaces the current value.
    pub fn set(&self, value: T) {
        (self.set)(value);
    }
}

impl<T: Clone + Send + Sync + 'static> Binding<T> {
    /// Creates a binding backed by its own shared cell.
    pub fn cell(initial: T) -> Self {
        let state = Arc::new(RwLock::new(initial));
        let reader = Arc::clone(&state);
        Self::new(move || reader.read().clone(), move |value| *state.write() = value)
    }

    /// Creates a binding that ignores writes.
    pub fn constant(value: T) -> Self {
        Self::new(move || value.clone(), |_| {})
    }
}

impl<T> Clone for Binding<T> {
    fn clone(&self) -> Self {
        Self {
            get: Arc::clone(&self.get),
            set: Arc::clone(&self.set),
        }
    }
}

impl<T> fmt::Debug for Binding<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding").finish_non_exhaustive()
    }
}
