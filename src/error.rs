//! Application Error Types

use derive_more::{Display, Error};

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("could not load configuration")]
    Config,
    /// The vault, the ledger or a collaborator could not be set up.
    #[display("could not start")]
    Startup,
    #[display("could not watch the inbox")]
    Watch,
}
