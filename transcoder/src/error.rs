use std::fmt::Debug;
use thiserror::Error;

/// All transcoder failure modes. Errors are surfaced to the caller, never
/// retried internally; a failed slice leaves the `Transcoder` usable for
/// other slices.
#[derive(Error, Debug, Eq, PartialEq, Clone, Copy)]
pub enum Error {
    /// Bad magic, unsupported version, or an inconsistent size field.
    #[error("invalid container header")]
    InvalidHeader,

    /// A header or payload CRC16 did not match its stored value.
    #[error("container checksum mismatch")]
    CrcMismatch,

    /// A serialized Huffman table was malformed.
    #[error("invalid Huffman table")]
    InvalidHuffman,

    /// A codebook was out of range or an endpoint could not be represented
    /// as an ETC1 differential block.
    #[error("invalid codebook")]
    InvalidCodebook,

    /// A slice descriptor had bad dimensions, offsets, or flags.
    #[error("invalid slice")]
    InvalidSlice,

    /// A macroblock referenced an unknown template or an out-of-range
    /// endpoint/selector index.
    #[error("invalid macroblock")]
    InvalidMacroblock,

    /// The (source, target) format pair is not in the capability matrix.
    #[error("unsupported target format for this source format")]
    UnsupportedTargetFormat,

    /// The target format constrains slice dimensions (PVRTC1 requires
    /// power-of-two sizes) and this slice does not satisfy them.
    #[error("slice dimensions incompatible with target format")]
    IncompatibleTargetDimensions,

    /// The caller-supplied output buffer cannot hold the requested level.
    #[error("output buffer too small")]
    OutputBufferTooSmall,

    /// An operation that requires `start_transcoding` was called first.
    #[error("transcoder not ready")]
    NotReady,

    /// An internal invariant failed. User-supplied bytes can never cause a
    /// panic or abort; they land here instead.
    #[error("internal invariant violated")]
    InternalInvariantViolated,
}

impl From<tessera_bitstream::Error> for Error {
    fn from(e: tessera_bitstream::Error) -> Self {
        match e {
            tessera_bitstream::Error::InvalidEof => Error::InvalidSlice,
            tessera_bitstream::Error::InvalidHuffman
            | tessera_bitstream::Error::InvalidCodeLengths => Error::InvalidHuffman,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
