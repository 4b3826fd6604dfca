//! Vocabulary tables.
//!
//! A [`Vocab`] maps token strings to ids and back. It keeps two layers:
//!
//! - the base vocabulary, replaced wholesale by [`Vocab::install`]
//! - special tokens, added one at a time and kept across reinstallation
//!
//! Lookups in both directions consult the base vocabulary first and fall back
//! to the special tokens.

use rustc_hash::FxHashMap;

use super::tokenizer::TokenizerError;

/// A special token to register, with an explicit id or `None` to assign the
/// next free one.
///
/// Converts from a bare token (`"<|im_start|>"`) or a `(token, id)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SpecialToken {
    pub token: String,
    pub id: Option<u32>,
}

impl SpecialToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            id: None,
        }
    }

    pub fn with_id(token: impl Into<String>, id: u32) -> Self {
        Self {
            token: token.into(),
            id: Some(id),
        }
    }
}

impl From<&str> for SpecialToken {
    fn from(token: &str) -> Self {
        Self::new(token)
    }
}

impl From<String> for SpecialToken {
    fn from(token: String) -> Self {
        Self::new(token)
    }
}

impl From<(&str, u32)> for SpecialToken {
    fn from((token, id): (&str, u32)) -> Self {
        Self::with_id(token, id)
    }
}

impl From<(String, u32)> for SpecialToken {
    fn from((token, id): (String, u32)) -> Self {
        Self::with_id(token, id)
    }
}

/// Bidirectional token/id tables with a separate special-token layer.
#[derive(Debug, Clone, Default)]
pub struct Vocab {
    encoder: FxHashMap<String, u32>,
    decoder: FxHashMap<u32, String>,
    special_tokens: FxHashMap<String, u32>,
    special_tokens_decoder: FxHashMap<u32, String>,
    max_id: u32,
}

impl Vocab {
    /// Create an empty vocabulary.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the base vocabulary. Special tokens are kept.
    pub fn install(&mut self, encoder: FxHashMap<String, u32>) {
        self.decoder = build_decoder(&encoder);
        self.encoder = encoder;
        self.refresh_max_id();
    }

    /// Register a special token and return its id.
    ///
    /// Without an explicit id the token gets `max_id() + 1`. Registering an
    /// existing special token again moves it to the new id.
    pub fn add_special(&mut self, token: impl Into<String>, id: Option<u32>) -> u32 {
        let token = token.into();
        let id = id.unwrap_or_else(|| self.max_id.saturating_add(1));

        let mut moved = false;
        if let Some(old_id) = self.special_tokens.insert(token.clone(), id) {
            if old_id != id {
                self.release_special_id(old_id, &token);
                moved = true;
            }
        }
        // The first special token registered for an id keeps it.
        self.special_tokens_decoder.entry(id).or_insert(token);

        if moved {
            self.refresh_max_id();
        } else {
            self.max_id = self.max_id.max(id);
        }
        id
    }

    /// Drop every special token.
    pub fn clear_special(&mut self) {
        self.special_tokens.clear();
        self.special_tokens_decoder.clear();
        self.refresh_max_id();
    }

    /// Look up the id of `token`.
    pub fn token_to_id(&self, token: &str) -> Result<u32, TokenizerError> {
        self.encoder
            .get(token)
            .or_else(|| self.special_tokens.get(token))
            .copied()
            .ok_or_else(|| TokenizerError::UnknownToken(token.to_string()))
    }

    /// Look up the token for `id`.
    pub fn id_to_token(&self, id: u32) -> Result<&str, TokenizerError> {
        self.decoder
            .get(&id)
            .or_else(|| self.special_tokens_decoder.get(&id))
            .map(String::as_str)
            .ok_or(TokenizerError::UnknownId(id))
    }

    /// Check whether `token` is a base or special entry.
    #[inline]
    pub fn contains(&self, token: &str) -> bool {
        self.encoder.contains_key(token) || self.special_tokens.contains_key(token)
    }

    /// Registered entries: base plus special, duplicates by id included.
    pub fn len(&self) -> usize {
        self.encoder.len() + self.special_tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.encoder.is_empty() && self.special_tokens.is_empty()
    }

    /// Largest id among base and special entries, 0 when empty.
    pub fn max_id(&self) -> u32 {
        self.max_id
    }

    /// Snapshot of every entry. Special tokens win on conflicting strings.
    pub fn to_map(&self) -> FxHashMap<String, u32> {
        let mut map = self.encoder.clone();
        map.extend(self.special_tokens.iter().map(|(k, v)| (k.clone(), *v)));
        map
    }

    /// Every token string that should be matchable, base first.
    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.encoder
            .keys()
            .chain(self.special_tokens.keys())
            .map(String::as_str)
    }

    /// Get the base encoder map (token -> ID).
    pub fn encoder(&self) -> &FxHashMap<String, u32> {
        &self.encoder
    }

    /// Get the base decoder map (ID -> token).
    pub fn decoder(&self) -> &FxHashMap<u32, String> {
        &self.decoder
    }

    /// Get the special tokens map.
    pub fn special_tokens(&self) -> &FxHashMap<String, u32> {
        &self.special_tokens
    }

    /// Get the special tokens decoder map.
    pub fn special_tokens_decoder(&self) -> &FxHashMap<u32, String> {
        &self.special_tokens_decoder
    }

    /// `token` moved off `old_id`; hand the id to another special token that
    /// still uses it, or free it.
    fn release_special_id(&mut self, old_id: u32, token: &str) {
        if self.special_tokens_decoder.get(&old_id).map(String::as_str) != Some(token) {
            return;
        }
        let heir = self
            .special_tokens
            .iter()
            .filter(|&(_, &id)| id == old_id)
            .map(|(t, _)| t)
            .min()
            .cloned();
        match heir {
            Some(heir) => {
                self.special_tokens_decoder.insert(old_id, heir);
            }
            None => {
                self.special_tokens_decoder.remove(&old_id);
            }
        }
    }

    fn refresh_max_id(&mut self) {
        self.max_id = self
            .decoder
            .keys()
            .chain(self.special_tokens_decoder.keys())
            .copied()
            .max()
            .unwrap_or(0);
    }
}

/// Build a decoder map (token ID → token) from an encoder map (token → ID).
///
/// Ids are expected to be unique. If several tokens share an id anyway, the
/// lexicographically smallest one is kept so the result does not depend on
/// hash order.
pub fn build_decoder(encoder: &FxHashMap<String, u32>) -> FxHashMap<u32, String> {
    let mut decoder: FxHashMap<u32, String> = FxHashMap::default();
    for (token, &id) in encoder {
        decoder
            .entry(id)
            .and_modify(|kept| {
                if token.as_str() < kept.as_str() {
                    kept.clone_from(token);
                }
            })
            .or_insert_with(|| token.clone());
    }
    decoder
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_test_vocab() -> Vocab {
        let mut encoder = FxHashMap::default();
        encoder.insert("Hello".to_string(), 10);
        encoder.insert("World".to_string(), 11);
        let mut vocab = Vocab::new();
        vocab.install(encoder);
        vocab
    }

    #[test]
    fn test_build_decoder() {
        let mut encoder = FxHashMap::default();
        encoder.insert("Hello".to_string(), 0);
        encoder.insert("World".to_string(), 1);

        let decoder = build_decoder(&encoder);
        assert_eq!(decoder.get(&0).map(String::as_str), Some("Hello"));
        assert_eq!(decoder.get(&1).map(String::as_str), Some("World"));
    }

    #[test]
    fn test_build_decoder_duplicate_ids() {
        let mut encoder = FxHashMap::default();
        encoder.insert("b".to_string(), 7);
        encoder.insert("a".to_string(), 7);

        let decoder = build_decoder(&encoder);
        assert_eq!(decoder.len(), 1);
        assert_eq!(decoder.get(&7).map(String::as_str), Some("a"));
    }

    #[test]
    fn test_lookups() {
        let vocab = make_test_vocab();
        assert_eq!(vocab.token_to_id("Hello").unwrap(), 10);
        assert_eq!(vocab.id_to_token(11).unwrap(), "World");
        assert!(matches!(
            vocab.token_to_id("nope"),
            Err(TokenizerError::UnknownToken(t)) if t == "nope"
        ));
        assert!(matches!(
            vocab.id_to_token(99),
            Err(TokenizerError::UnknownId(99))
        ));
    }

    #[test]
    fn test_auto_special_id() {
        let mut vocab = make_test_vocab();
        assert_eq!(vocab.max_id(), 11);
        assert_eq!(vocab.add_special("<|x|>", None), 12);
        assert_eq!(vocab.max_id(), 12);
        assert_eq!(vocab.add_special("<|y|>", None), 13);
        assert_eq!(vocab.token_to_id("<|y|>").unwrap(), 13);
        assert_eq!(vocab.id_to_token(12).unwrap(), "<|x|>");
    }

    #[test]
    fn test_empty_vocab_starts_at_one() {
        let mut vocab = Vocab::new();
        assert_eq!(vocab.max_id(), 0);
        assert_eq!(vocab.add_special("<s>", None), 1);
    }

    #[test]
    fn test_base_wins_on_shared_id() {
        let mut vocab = make_test_vocab();
        vocab.add_special("<|hello|>", Some(10));
        assert_eq!(vocab.id_to_token(10).unwrap(), "Hello");
        assert_eq!(vocab.token_to_id("<|hello|>").unwrap(), 10);
    }

    #[test]
    fn test_base_wins_on_shared_token() {
        let mut vocab = make_test_vocab();
        vocab.add_special("Hello", Some(50));
        assert_eq!(vocab.token_to_id("Hello").unwrap(), 10);
        assert_eq!(vocab.id_to_token(50).unwrap(), "Hello");
        assert_eq!(vocab.to_map().get("Hello"), Some(&50));
    }

    #[test]
    fn test_len_counts_entries() {
        let mut vocab = make_test_vocab();
        vocab.add_special("<|a|>", Some(10));
        vocab.add_special("<|b|>", Some(10));
        assert_eq!(vocab.len(), 4);
    }

    #[test]
    fn test_first_special_keeps_shared_id() {
        let mut vocab = Vocab::new();
        vocab.add_special("<|a|>", Some(5));
        vocab.add_special("<|b|>", Some(5));
        assert_eq!(vocab.id_to_token(5).unwrap(), "<|a|>");
    }

    #[test]
    fn test_readding_special_moves_it() {
        let mut vocab = Vocab::new();
        vocab.add_special("<|a|>", Some(5));
        vocab.add_special("<|b|>", Some(5));
        vocab.add_special("<|a|>", Some(6));
        assert_eq!(vocab.token_to_id("<|a|>").unwrap(), 6);
        assert_eq!(vocab.id_to_token(5).unwrap(), "<|b|>");
        assert_eq!(vocab.id_to_token(6).unwrap(), "<|a|>");

        vocab.add_special("<|b|>", Some(7));
        assert!(vocab.id_to_token(5).is_err());
        assert_eq!(vocab.max_id(), 7);
    }

    #[test]
    fn test_install_keeps_special_tokens() {
        let mut vocab = make_test_vocab();
        vocab.add_special("<|x|>", None);

        let mut encoder = FxHashMap::default();
        encoder.insert("a".to_string(), 0);
        vocab.install(encoder);

        assert!(vocab.token_to_id("Hello").is_err());
        assert_eq!(vocab.token_to_id("<|x|>").unwrap(), 12);
        assert_eq!(vocab.max_id(), 12);
        assert_eq!(vocab.len(), 2);
    }

    #[test]
    fn test_clear_special() {
        let mut vocab = make_test_vocab();
        vocab.add_special("<|x|>", Some(100));
        vocab.clear_special();
        assert_eq!(vocab.max_id(), 11);
        assert!(!vocab.contains("<|x|>"));
    }

    #[test]
    fn test_special_token_conversions() {
        assert_eq!(SpecialToken::from("<s>"), SpecialToken::new("<s>"));
        assert_eq!(
            SpecialToken::from(("<s>", 1)),
            SpecialToken {
                token: "<s>".to_string(),
                id: Some(1)
            }
        );
        assert_eq!(SpecialToken::from(("<s>".to_string(), 1)).id, Some(1));
    }
}
