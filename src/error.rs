use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Rejected before any state is touched.
    #[error("{0}")]
    InvalidArgument(&'static str),
}
