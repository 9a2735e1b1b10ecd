
//! Error type used throughout this crate, and checked integer conversions.

use std::borrow::Cow;
use std::convert::TryFrom;

/// A result that may fail with a [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// A result that, if ok, contains nothing, and otherwise contains a [`Error`].
pub type UnitResult = Result<()>;

pub use std::io::Error as IoError;
pub use std::io::Result as IoResult;


/// All kinds of failures that compressing, decompressing,
/// or verifying a container can produce.
#[derive(Debug)]
pub enum Error {

    /// The file is not a container: wrong magic number or version,
    /// truncated header, footer pointer outside the file,
    /// or a chunk table that does not agree with the file size.
    BadFormat(Cow<'static, str>),

    /// A decompressed chunk, or the whole container,
    /// does not match its stored SHA-256 digest.
    CorruptChunk(Cow<'static, str>),

    /// The chunk bitstream could not be decoded:
    /// it ended before producing all symbols, contained a bit pattern
    /// that matches no canonical codeword, or referenced an absent symbol.
    DecodeFailure(Cow<'static, str>),

    /// Huffman construction required a code longer than 16 bits
    /// and the length-limiting procedure could not repair the assignment.
    LengthLimitExceeded,

    /// An underlying read or write failed. Includes short reads.
    Io(IoError),

    /// The operation was cancelled by the caller.
    Cancelled,

    /// The caller passed an unusable value,
    /// for example an out-of-range chunk size or a missing input path.
    InvalidArgument(Cow<'static, str>),
}

impl Error {

    /// Create an error of the kind [`Error::BadFormat`].
    pub fn bad_format(message: impl Into<Cow<'static, str>>) -> Self {
        Error::BadFormat(message.into())
    }

    /// Create an error of the kind [`Error::CorruptChunk`].
    pub fn corrupt(message: impl Into<Cow<'static, str>>) -> Self {
        Error::CorruptChunk(message.into())
    }

    /// Create an error of the kind [`Error::DecodeFailure`].
    pub fn decode(message: impl Into<Cow<'static, str>>) -> Self {
        Error::DecodeFailure(message.into())
    }

    /// Create an error of the kind [`Error::InvalidArgument`].
    pub fn argument(message: impl Into<Cow<'static, str>>) -> Self {
        Error::InvalidArgument(message.into())
    }
}

/// Enable using the `?` operator on `io::Result`.
impl From<IoError> for Error {
    fn from(error: IoError) -> Self {
        Error::Io(error)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::BadFormat(message) => write!(formatter, "invalid container: {}", message),
            Error::CorruptChunk(message) => write!(formatter, "integrity check failed: {}", message),
            Error::DecodeFailure(message) => write!(formatter, "cannot decode chunk: {}", message),
            Error::LengthLimitExceeded => write!(formatter, "huffman code length limit exceeded"),
            Error::Io(error) => write!(formatter, "io error: {}", error),
            Error::Cancelled => write!(formatter, "operation was cancelled"),
            Error::InvalidArgument(message) => write!(formatter, "invalid argument: {}", message),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(error) => Some(error),
            _ => None,
        }
    }
}


/// Panics on overflow. The container format uses `u64` offsets,
/// which do not fit into `usize` on 32-bit machines for huge files.
pub fn u64_to_usize(value: u64) -> usize {
    usize::try_from(value).expect("(u64 as usize) overflowed")
}

/// Panics on overflow.
pub fn usize_to_u64(value: usize) -> u64 {
    u64::try_from(value).expect("(usize as u64) overflowed")
}

/// Panics on overflow. Chunk sizes are bounded far below `u32::MAX`.
pub fn usize_to_u32(value: usize) -> u32 {
    u32::try_from(value).expect("(usize as u32) overflowed")
}
