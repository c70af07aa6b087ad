use core::fmt;

/// Error enum with all errors that can be returned by functions from this crate.
///
/// Every runtime protocol error (illegal command, address error, CRC
/// mismatch, framing error) is reported in-band over MISO per §7 of the
/// design notes, never through this type. `Error` only covers the one thing
/// that can fail out of band: opening the backing store.
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// Opening or sizing the backing store failed.
    Store(block_store::Error),
}

impl From<block_store::Error> for Error {
    fn from(e: block_store::Error) -> Self {
        Error::Store(e)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Store(e) => write!(f, "failed to open backing store: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Store(e) => Some(e),
        }
    }
}
