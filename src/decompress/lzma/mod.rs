//! LZMA and LZMA2 decoding.
//!
//! - [`range_coder`] - binary arithmetic decoder
//! - [`decoder`] - literal/match model over the range coder
//! - [`dict`] - sliding window the model writes into
//! - [`lzma2`] - chunk framing, resets and input staging

pub mod decoder;
pub mod dict;
pub mod lzma2;
pub mod range_coder;

pub use decoder::{LzmaDecoder, LzmaProperties};
pub use dict::Dictionary;
pub use lzma2::Lzma2Decoder;
pub use range_coder::RangeDecoder;
