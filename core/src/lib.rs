pub mod correspondence;
pub mod runtime;

pub use correspondence::*;
pub use runtime::*;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Geometry error: {0}")]
    Geometry(String),

    #[error("Eigensolve error: {0}")]
    Eigensolve(String),

    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error("Precondition violated: {0}")]
    Precondition(String),
}
