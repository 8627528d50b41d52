//! Single-example preprocessing transform
//!
//! The transform is a pure function applied exactly once to every example
//! before it reaches the model, both by background producers and by the
//! eager dataset.

use crate::error::Result;

/// Stateless per-example transform, safe to call from several threads
pub trait Preprocess<E>: Send + Sync + 'static {
    /// Transform one raw example
    fn preprocess(&self, example: E) -> Result<E>;
}

impl<E, F> Preprocess<E> for F
where
    F: Fn(E) -> Result<E> + Send + Sync + 'static,
{
    fn preprocess(&self, example: E) -> Result<E> {
        self(example)
    }
}

/// Transform that returns examples unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl<E: Send + 'static> Preprocess<E> for Identity {
    fn preprocess(&self, example: E) -> Result<E> {
        Ok(example)
    }
}
