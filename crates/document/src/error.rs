//! Document Error Types

use derive_more::{Display, Error};

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The filename template does not compile or does not render.
    #[display("invalid filename template")]
    Template,
    /// The rendered name is not a usable vault path.
    #[display("invalid document name: {_0:?}")]
    InvalidName(#[error(not(source))] String),
    /// Reading or writing the output folder failed.
    #[display("could not write document")]
    Storage,
}

impl ErrorKind {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage)
    }
}
