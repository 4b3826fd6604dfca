//! Core tokenization engine for trietok.
//!
//! # Architecture
//!
//! The core is organized into four main components:
//!
//! - [`Trie`]: multi-pattern matcher over code points; finds the longest
//!   registered token at each position in one pass
//! - [`Vocab`]: bidirectional token/id tables with a separately tracked
//!   special-token table
//! - [`Tokenizer`]: ties both together, adds byte fallback and the
//!   encode/decode API
//! - [`StreamingDecoder`]: UTF-8 safe streaming decoder for token-by-token
//!   model output
//!
//! [`byte_fallback`] holds the `<0xHH>` token codec shared by the tokenizer
//! and the streaming decoder.

pub mod byte_fallback;
mod streaming;
mod tokenizer;
mod trie;
mod vocab;

pub use streaming::StreamingDecoder;
pub use tokenizer::{Tokenizer, TokenizerError};
pub use trie::Trie;
pub use vocab::{build_decoder, SpecialToken, Vocab};
