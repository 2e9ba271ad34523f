//! Bit-level plumbing shared by the tessera encoder and transcoder.
//!
//! Everything in here is wire-format critical: the unaligned bit reader and
//! writer, canonical Huffman coding (including the serialized table format),
//! the CRC16 used for container integrity, and the approximate move-to-front
//! buffer that drives selector-history coding. Encoder and decoder sides must
//! stay bit-exact mirrors of each other.

mod crc;
mod error;
mod huffman;
mod mtf;
mod prng;
mod reader;
mod writer;

pub use crc::crc16;
pub use error::{Error, Result};
pub use huffman::{
    DecodingTable, EncodingTable, HUFFMAN_CODELENGTH_CODES, HUFFMAN_FAST_BITS, HUFFMAN_MAX_CODE_SIZE,
    HUFFMAN_MAX_SYMS, HUFFMAN_MAX_SYMS_LOG2,
};
pub use mtf::ApproxMoveToFront;
pub use prng::Lcg;
pub use reader::BitReader;
pub use writer::BitWriter;
