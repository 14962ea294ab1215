//! Sizing of the global rayon pool backing the parallel routines.

use crate::{Error, Result};
use rayon::ThreadPoolBuilder;
use std::sync::OnceLock;

/// Environment variable consulted when no explicit thread count is given.
pub const THREADS_ENV_VAR: &str = "SHAPECORR_CPU_THREADS";

static POOL_OUTCOME: OnceLock<Option<String>> = OnceLock::new();

/// Builds the global rayon thread pool, once per process.
///
/// An explicit `num_threads` takes precedence over [`THREADS_ENV_VAR`];
/// with neither set, rayon's default sizing applies. The pool is never
/// resized afterwards, so later calls just return the first call's
/// outcome.
pub fn init_global_thread_pool(num_threads: Option<usize>) -> Result<()> {
    let outcome = POOL_OUTCOME.get_or_init(|| build_global_pool(num_threads).err());
    match outcome {
        None => Ok(()),
        Some(reason) => Err(Error::Precondition(reason.clone())),
    }
}

/// Number of threads the parallel routines currently run on.
pub fn current_cpu_threads() -> usize {
    rayon::current_num_threads()
}

fn build_global_pool(explicit: Option<usize>) -> std::result::Result<(), String> {
    let configured = match explicit {
        Some(n) => Some(n),
        None => match std::env::var(THREADS_ENV_VAR) {
            Ok(raw) => Some(raw.parse::<usize>().map_err(|_| {
                format!("{THREADS_ENV_VAR} must be a positive integer, got '{raw}'")
            })?),
            Err(std::env::VarError::NotPresent) => None,
            Err(e) => return Err(format!("failed to read {THREADS_ENV_VAR}: {e}")),
        },
    };

    let mut builder = ThreadPoolBuilder::new();
    match configured {
        Some(0) => return Err("thread count must be >= 1".into()),
        Some(n) => builder = builder.num_threads(n),
        None => {}
    }
    builder.build_global().map_err(|e| e.to_string())
}
