pub use shapecorr_core as core;
pub use shapecorr_filter as filter;
pub use shapecorr_mesh as mesh;

pub use shapecorr_core::{Correspondence, Error, Result};
pub use shapecorr_filter::{refine_correspondence, refine_soft, FilterParams};
pub use shapecorr_mesh::Mesh;

/// Builds the global rayon thread pool shared by all parallel routines.
///
/// Call this once at startup, before heavy workloads. An explicit
/// `num_threads` wins over the `SHAPECORR_CPU_THREADS` environment
/// variable; with neither set, rayon picks its default. Repeated calls
/// return the first call's outcome.
pub fn init_thread_pool(num_threads: Option<usize>) -> Result<()> {
    shapecorr_core::init_global_thread_pool(num_threads)
}
