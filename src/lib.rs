//! Trietok - trie-based longest-match tokenizer
//!
//! Splits text on every registered vocabulary and special token in a single
//! left-to-right pass, and falls back to `<0xHH>` byte tokens for anything the
//! vocabulary cannot cover:
//! - Arena-backed trie with lookahead so `extra_id_100` beats `extra_id_1`
//! - Special tokens that survive vocabulary reinstallation
//! - UTF-8 byte fallback in both directions
//! - UTF-8 safe streaming decoder for token-by-token output
//! - Rayon parallelism for batch operations

pub mod core;

pub use crate::core::{
    byte_fallback, SpecialToken, StreamingDecoder, Tokenizer, TokenizerError, Trie, Vocab,
};
