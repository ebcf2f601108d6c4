//! Fork-join helpers for spectrum-parallel loops.
//!
//! Every worker owns exactly one output spectrum at a time; shared results go
//! through a [`CriticalSection`].

use parking_lot::Mutex;
use rayon::prelude::*;

use crate::data::histogram::Histogram;
use crate::error::{FrameworkError, Result};
use crate::kernel::progress::CancellationToken;

/// Run `f` over every spectrum in parallel, polling `cancel` before each one.
///
/// The first error stops the loop and is returned; a cancelled run yields
/// [`FrameworkError::Cancelled`] carrying `owner`.
pub fn for_each_spectrum<F>(
    spectra: &mut [Histogram],
    cancel: &CancellationToken,
    owner: &str,
    f: F,
) -> Result<()>
where
    F: Fn(usize, &mut Histogram) -> Result<()> + Send + Sync,
{
    spectra
        .par_iter_mut()
        .enumerate()
        .try_for_each(|(index, spectrum)| {
            if cancel.is_cancelled() {
                return Err(FrameworkError::Cancelled(owner.to_string()));
            }
            f(index, spectrum)
        })
}

/// Compute one value per spectrum index in parallel, preserving order.
pub fn map_spectra<T, F>(n_spectra: usize, cancel: &CancellationToken, owner: &str, f: F) -> Result<Vec<T>>
where
    T: Send,
    F: Fn(usize) -> Result<T> + Send + Sync,
{
    (0..n_spectra)
        .into_par_iter()
        .map(|index| {
            if cancel.is_cancelled() {
                return Err(FrameworkError::Cancelled(owner.to_string()));
            }
            f(index)
        })
        .collect()
}

/// Coarse lock around the rare shared mutation inside a parallel loop.
#[derive(Debug, Default)]
pub struct CriticalSection<T> {
    inner: Mutex<T>,
}

impl<T> CriticalSection<T> {
    pub fn new(value: T) -> Self {
        CriticalSection {
            inner: Mutex::new(value),
        }
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.inner.lock())
    }

    pub fn into_inner(self) -> T {
        self.inner.into_inner()
    }
}

/// Size the global rayon pool. Only the first call in a process takes effect;
/// returns whether this one did.
pub fn configure_thread_pool(num_threads: Option<usize>) -> bool {
    let Some(n) = num_threads.filter(|&n| n > 0) else {
        return false;
    };
    match rayon::ThreadPoolBuilder::new().num_threads(n).build_global() {
        Ok(()) => {
            log::debug!("Spectrum loops use {n} worker threads");
            true
        }
        Err(e) => {
            log::warn!("Thread pool already configured: {e}");
            false
        }
    }
}
