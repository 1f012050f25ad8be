//! Additive secret sharing over `GF(2^61 - 1)` with a preprocessing dealer.
//!
//! Every computing party runs a [`Session`] that holds its shares and talks to the other parties
//! (and to the [`dealer`](dealer::dealer)) over a [`Channel`](crate::channel::Channel). The session
//! offers the arithmetic the dispatch core is written against: local linear operations on
//! [`SecretInt`], multiplication with Beaver triples, comparisons with masked openings, oblivious
//! selection, inner and matrix products, argmin and scoped reveals.
//!
//! All parties must issue the same sequence of operations. The sequence never depends on a secret
//! value, which is also what keeps the requests to the dealer consistent across parties.

mod data_types;
pub mod dealer;
mod session;

pub use data_types::SecretInt;
pub use session::{Session, simulate};

use crate::channel;

/// The statistical security parameter used for masking values before opening them.
pub const STATISTICAL_SECURITY: u32 = 40;

/// The largest supported bit length of compared values.
///
/// A comparison opens `x + 2^l + r' + 2^l * r''` with `r'' < 2^(STATISTICAL_SECURITY + 1)`, which
/// must stay below the field modulus `2^61 - 1`.
pub const MAX_BIT_LENGTH: u32 = 59 - STATISTICAL_SECURITY - 1;

/// A custom error type for the secret-shared arithmetic and its communication.
#[derive(Debug)]
pub enum Error {
    /// A message could not be sent or received.
    ChannelError(channel::Error),
    /// The dealer aborted the preprocessing.
    DealerAborted(String),
    /// The dealer failed.
    DealerError(dealer::Error),
    /// The dealer answered with material of a different kind than requested.
    UnexpectedPreprocessing,
    /// The dealer sent less material than requested.
    MissingPreprocessing,
    /// The specified party does not exist.
    PartyDoesNotExist(usize),
    /// The number of provided input values does not match the number of expected values.
    WrongInputSize {
        /// The number of values announced to all parties.
        expected: usize,
        /// The number of values provided by the input party.
        actual: usize,
    },
    /// The recipient list of a reveal is empty.
    MissingOutputParties,
    /// Two vectors or matrices that need matching dimensions did not match.
    LengthMismatch {
        /// The length required by the operation.
        expected: usize,
        /// The length that was provided.
        actual: usize,
    },
    /// An operation that needs at least one element was called with none.
    EmptyVector,
    /// The bit length is zero or above [`MAX_BIT_LENGTH`].
    InvalidBitLength(u32),
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::ChannelError(e) => write!(f, "Channel error: {e:?}"),
            Error::DealerAborted(reason) => write!(f, "The dealer aborted: {reason}"),
            Error::DealerError(e) => write!(f, "Dealer error: {e}"),
            Error::UnexpectedPreprocessing => {
                f.write_str("The dealer sent an unexpected kind of preprocessing material")
            }
            Error::MissingPreprocessing => {
                f.write_str("The dealer sent less preprocessing material than requested")
            }
            Error::PartyDoesNotExist(p) => write!(f, "Party {p} does not exist"),
            Error::WrongInputSize { expected, actual } => {
                write!(f, "Wrong input, expected {expected} values, found {actual}")
            }
            Error::MissingOutputParties => f.write_str("Output parties are missing"),
            Error::LengthMismatch { expected, actual } => {
                write!(f, "Length mismatch, expected {expected}, found {actual}")
            }
            Error::EmptyVector => f.write_str("The operation requires a non-empty vector"),
            Error::InvalidBitLength(l) => {
                write!(f, "Bit length {l} is not in 1..={MAX_BIT_LENGTH}")
            }
        }
    }
}

impl From<channel::Error> for Error {
    fn from(e: channel::Error) -> Self {
        Self::ChannelError(e)
    }
}

impl From<dealer::Error> for Error {
    fn from(e: dealer::Error) -> Self {
        Self::DealerError(e)
    }
}
