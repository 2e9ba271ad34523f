use std::fmt::Debug;
use thiserror::Error;

/// Backend encoding failures.
#[derive(Error, Debug, Eq, PartialEq, Clone, Copy)]
pub enum Error {
    /// A palette was empty, oversized, or contained an endpoint pair that
    /// cannot be represented as an ETC1 differential block.
    #[error("invalid codebook")]
    InvalidCodebook,

    /// Slice geometry or block references were inconsistent with the
    /// front-end output.
    #[error("invalid slice description")]
    InvalidSlice,

    /// A Huffman model could not be built from its histogram.
    #[error("huffman model construction failed")]
    HuffmanFailed,

    /// A structural invariant failed (for example, no endpoint-index
    /// template matched after the canonical fallback).
    #[error("internal invariant violated")]
    InternalInvariantViolated,
}

impl From<tessera_bitstream::Error> for Error {
    fn from(_: tessera_bitstream::Error) -> Self {
        Error::HuffmanFailed
    }
}

pub type Result<T> = std::result::Result<T, Error>;
