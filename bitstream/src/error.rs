use std::fmt::Debug;
use thiserror::Error;

/// Things that can go wrong while reading or building coding tables.
#[derive(Error, Debug, Eq, PartialEq, Clone)]
pub enum Error {
    /// A declared payload region extends past the end of the buffer.
    ///
    /// Bit reads inside a payload never fail (short reads pad with zero
    /// bits; containers rely on CRC checks to catch truncation), so this
    /// only surfaces when slicing a sub-stream out of its parent buffer.
    #[error("bitstream drained past its end")]
    InvalidEof,

    /// A serialized Huffman table was malformed: the code sizes do not form
    /// a prefix code, a repeat meta-symbol had no previous code, or the
    /// declared symbol count was exceeded or left unfilled.
    #[error("invalid Huffman table")]
    InvalidHuffman,

    /// The code-length code count was outside `[1, 21]`, or the declared
    /// symbol count was above the format maximum.
    #[error("invalid Huffman code lengths")]
    InvalidCodeLengths,
}

pub type Result<T> = std::result::Result<T, Error>;
