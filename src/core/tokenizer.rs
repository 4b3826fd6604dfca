use log::debug;
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use thiserror::Error;

use super::byte_fallback::{encode_fallback, join_tokens, parse_byte_token};
use super::trie::Trie;
use super::vocab::{SpecialToken, Vocab};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenizerError {
    #[error("Unknown token: {0}")]
    UnknownToken(String),
    #[error("Unknown id: {0}")]
    UnknownId(u32),
}

/// Trie-based tokenizer with special tokens and `<0xHH>` byte fallback.
///
/// # Tokenization
///
/// [`tokenize`](Tokenizer::tokenize) splits text on the longest vocabulary or
/// special token available at each position. Any run of text that no token
/// covers is spelled out as one `<0xHH>` token per UTF-8 byte, so tokenization
/// never fails. [`encode`](Tokenizer::encode) then maps tokens to ids; it only
/// fails when the vocabulary lacks a byte token it needs.
///
/// # Special tokens
///
/// Special tokens live in their own table. They match exactly like vocabulary
/// entries and survive [`install_vocab`](Tokenizer::install_vocab):
///
/// ```
/// use trietok::Tokenizer;
///
/// let mut tokenizer = Tokenizer::from_vocab([("Hello", 0), (" world", 1)]);
/// let id = tokenizer.add_special_token("<|im_start|>", None);
/// assert_eq!(id, 2);
///
/// let ids = tokenizer.encode("<|im_start|>Hello world").unwrap();
/// assert_eq!(ids, vec![2, 0, 1]);
/// assert_eq!(tokenizer.decode(&ids).unwrap(), "<|im_start|>Hello world");
/// ```
///
/// # Concurrency
///
/// Reads take `&self` and the batch methods run across inputs with Rayon.
/// Installing a vocabulary or adding special tokens takes `&mut self`, so no
/// read can observe a half-rebuilt matcher.
#[derive(Debug, Clone, Default)]
pub struct Tokenizer {
    vocab: Vocab,
    trie: Trie,
}

impl Tokenizer {
    /// Create a tokenizer with an empty vocabulary.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a tokenizer and install `vocab` as its base vocabulary.
    pub fn from_vocab<I, S>(vocab: I) -> Self
    where
        I: IntoIterator<Item = (S, u32)>,
        S: Into<String>,
    {
        let mut tokenizer = Self::new();
        tokenizer.install_vocab(vocab);
        tokenizer
    }

    /// Create a tokenizer from a base vocabulary and a list of special tokens.
    ///
    /// # Arguments
    /// * `vocab` - Pairs of token string and id
    /// * `special_tokens` - Bare tokens (next free id) or `(token, id)` pairs
    pub fn with_special_tokens<I, S, J, T>(vocab: I, special_tokens: J) -> Self
    where
        I: IntoIterator<Item = (S, u32)>,
        S: Into<String>,
        J: IntoIterator<Item = T>,
        T: Into<SpecialToken>,
    {
        let mut tokenizer = Self::from_vocab(vocab);
        tokenizer.add_special_tokens(special_tokens);
        tokenizer
    }

    /// Replace the base vocabulary and rebuild the matcher.
    ///
    /// Special tokens added earlier are kept and stay matchable.
    pub fn install_vocab<I, S>(&mut self, vocab: I)
    where
        I: IntoIterator<Item = (S, u32)>,
        S: Into<String>,
    {
        let encoder: FxHashMap<String, u32> =
            vocab.into_iter().map(|(k, v)| (k.into(), v)).collect();
        self.vocab.install(encoder);
        self.rebuild_trie();
        debug!(
            "installed vocabulary: {} entries, {} special tokens re-registered",
            self.vocab.encoder().len(),
            self.vocab.special_tokens().len()
        );
    }

    /// Register a special token and return its id.
    ///
    /// With `id == None` the token gets `max_id() + 1`.
    pub fn add_special_token(&mut self, token: impl Into<String>, id: Option<u32>) -> u32 {
        let token = token.into();
        self.trie.add(&token);
        let id = self.vocab.add_special(token.as_str(), id);
        debug!("added special token {:?} with id {}", token, id);
        id
    }

    /// Register several special tokens in order.
    ///
    /// Items are bare tokens or `(token, id)` pairs; ids are assigned one at a
    /// time, so consecutive bare tokens get consecutive ids.
    pub fn add_special_tokens<I, T>(&mut self, tokens: I)
    where
        I: IntoIterator<Item = T>,
        T: Into<SpecialToken>,
    {
        for special in tokens {
            let SpecialToken { token, id } = special.into();
            self.add_special_token(token, id);
        }
    }

    /// Drop every special token and rebuild the matcher from the base
    /// vocabulary alone.
    pub fn clear_special_tokens(&mut self) {
        self.vocab.clear_special();
        self.rebuild_trie();
    }

    fn rebuild_trie(&mut self) {
        let mut trie = Trie::new();
        for token in self.vocab.tokens() {
            trie.add(token);
        }
        self.trie = trie;
    }

    /// Split text into tokens.
    ///
    /// Pieces that are vocabulary or special tokens come out as-is; every
    /// other piece is replaced by one `<0xHH>` token per UTF-8 byte.
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        let mut tokens = Vec::new();
        for piece in self.trie.split(text) {
            if self.vocab.contains(piece) {
                tokens.push(piece.to_string());
            } else {
                encode_fallback(piece, &mut tokens);
            }
        }
        tokens
    }

    /// Encode text to token IDs.
    ///
    /// # Errors
    /// [`TokenizerError::UnknownToken`] if a needed `<0xHH>` byte token is not
    /// in the vocabulary.
    pub fn encode(&self, text: &str) -> Result<Vec<u32>, TokenizerError> {
        self.convert_tokens_to_ids(&self.tokenize(text))
    }

    /// Decode token IDs to a string.
    ///
    /// Each run of consecutive byte tokens is decoded as UTF-8 on its own;
    /// invalid or truncated sequences become U+FFFD. Use
    /// [`decode_bytes`](Tokenizer::decode_bytes) to validate strictly.
    pub fn decode(&self, ids: &[u32]) -> Result<String, TokenizerError> {
        let tokens = self.id_tokens(ids)?;
        Ok(join_tokens(&tokens))
    }

    /// Decode token IDs back to raw bytes.
    ///
    /// Byte tokens contribute their byte, every other token its UTF-8 text.
    pub fn decode_bytes(&self, ids: &[u32]) -> Result<Vec<u8>, TokenizerError> {
        let mut result = Vec::with_capacity(ids.len() * 4);
        for &id in ids {
            let token = self.vocab.id_to_token(id)?;
            match parse_byte_token(token) {
                Some(byte) => result.push(byte),
                None => result.extend_from_slice(token.as_bytes()),
            }
        }
        Ok(result)
    }

    /// Join tokens into a string, reassembling byte-token runs.
    ///
    /// # Errors
    /// [`TokenizerError::UnknownToken`] for the first token that is neither a
    /// vocabulary nor a special token.
    pub fn convert_tokens_to_string<S: AsRef<str>>(
        &self,
        tokens: &[S],
    ) -> Result<String, TokenizerError> {
        if let Some(unknown) = tokens.iter().find(|t| !self.valid_token(t.as_ref())) {
            return Err(TokenizerError::UnknownToken(unknown.as_ref().to_string()));
        }
        Ok(join_tokens(tokens))
    }

    pub fn convert_tokens_to_ids<S: AsRef<str>>(
        &self,
        tokens: &[S],
    ) -> Result<Vec<u32>, TokenizerError> {
        tokens
            .iter()
            .map(|token| self.token_to_id(token.as_ref()))
            .collect()
    }

    pub fn convert_ids_to_tokens(&self, ids: &[u32]) -> Result<Vec<String>, TokenizerError> {
        ids.iter()
            .map(|&id| self.id_to_token(id).map(str::to_string))
            .collect()
    }

    fn id_tokens(&self, ids: &[u32]) -> Result<Vec<&str>, TokenizerError> {
        ids.iter().map(|&id| self.vocab.id_to_token(id)).collect()
    }

    /// Look up a token's id, base vocabulary first.
    #[inline]
    pub fn token_to_id(&self, token: &str) -> Result<u32, TokenizerError> {
        self.vocab.token_to_id(token)
    }

    /// Look up an id's token, base vocabulary first.
    #[inline]
    pub fn id_to_token(&self, id: u32) -> Result<&str, TokenizerError> {
        self.vocab.id_to_token(id)
    }

    /// Snapshot of the base vocabulary merged with the special tokens.
    pub fn get_vocab(&self) -> FxHashMap<String, u32> {
        self.vocab.to_map()
    }

    #[inline]
    pub fn valid_token(&self, token: &str) -> bool {
        self.vocab.contains(token)
    }

    /// Number of registered entries, base plus special.
    ///
    /// Entries sharing an id are each counted.
    pub fn vocab_size(&self) -> usize {
        self.vocab.len()
    }

    /// Largest id in use, 0 for an empty tokenizer.
    pub fn max_id(&self) -> u32 {
        self.vocab.max_id()
    }

    /// Batch tokenize multiple texts in parallel.
    pub fn tokenize_batch(&self, texts: &[String]) -> Vec<Vec<String>> {
        texts.par_iter().map(|text| self.tokenize(text)).collect()
    }

    /// Batch encode multiple texts in parallel.
    pub fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<u32>>, TokenizerError> {
        texts.par_iter().map(|text| self.encode(text)).collect()
    }

    /// Batch decode multiple token lists in parallel.
    pub fn decode_batch(&self, id_lists: &[Vec<u32>]) -> Result<Vec<String>, TokenizerError> {
        id_lists.par_iter().map(|ids| self.decode(ids)).collect()
    }

    /// Get the vocabulary tables.
    pub fn vocab(&self) -> &Vocab {
        &self.vocab
    }

    /// Get the special tokens map.
    pub fn special_tokens(&self) -> &FxHashMap<String, u32> {
        self.vocab.special_tokens()
    }

    /// Get the matcher built from the current vocabulary.
    pub fn trie(&self) -> &Trie {
        &self.trie
    }
}
