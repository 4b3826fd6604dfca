//! UTF-8 safe streaming decoder for token-by-token model output.
//!
//! A character that the vocabulary only covers through byte fallback arrives
//! as several `<0xHH>` ids. This decoder buffers those bytes and only emits
//! complete characters, so callers can print output as it is generated.
//!
//! Concatenating everything [`StreamingDecoder::add_token`] returns plus the
//! final [`StreamingDecoder::flush`] gives the same text as
//! [`Tokenizer::decode`] on the whole id sequence.

use super::byte_fallback::{flush_run, parse_byte_token};
use super::tokenizer::{Tokenizer, TokenizerError};

/// A streaming decoder that handles byte-token runs split across calls.
///
/// # Example
///
/// ```
/// use trietok::{StreamingDecoder, Tokenizer};
///
/// let tokenizer = Tokenizer::from_vocab([("<0xE4>", 0), ("<0xB8>", 1), ("<0x96>", 2)]);
/// let mut decoder = StreamingDecoder::new(&tokenizer);
///
/// assert_eq!(decoder.add_token(0).unwrap(), None);
/// assert_eq!(decoder.add_token(1).unwrap(), None);
/// assert_eq!(decoder.add_token(2).unwrap(), Some("世".to_string()));
/// assert_eq!(decoder.flush(), "");
/// ```
pub struct StreamingDecoder<'a> {
    tokenizer: &'a Tokenizer,
    buffer: Vec<u8>,
}

impl<'a> StreamingDecoder<'a> {
    /// Create a new streaming decoder for the given tokenizer.
    pub fn new(tokenizer: &'a Tokenizer) -> Self {
        Self {
            tokenizer,
            buffer: Vec::with_capacity(16),
        }
    }

    /// Add a token and return any text that is now complete.
    ///
    /// Returns `Ok(None)` while the pending bytes are still an incomplete
    /// character. An ordinary token ends the pending byte run: leftover bytes
    /// are flushed as U+FFFD ahead of the token's text.
    ///
    /// # Errors
    /// [`TokenizerError::UnknownId`] if `token_id` is not in the vocabulary;
    /// the buffer is left untouched.
    pub fn add_token(&mut self, token_id: u32) -> Result<Option<String>, TokenizerError> {
        let mut out = String::new();
        self.push(token_id, &mut out)?;
        self.extract_complete_utf8(&mut out);
        Ok(if out.is_empty() { None } else { Some(out) })
    }

    /// Add multiple tokens at once and return the text completed by them.
    ///
    /// On error, text completed by the ids before the failing one is lost but
    /// their pending bytes stay buffered.
    pub fn add_tokens(&mut self, token_ids: &[u32]) -> Result<Option<String>, TokenizerError> {
        let mut out = String::new();
        for &token_id in token_ids {
            self.push(token_id, &mut out)?;
        }
        self.extract_complete_utf8(&mut out);
        Ok(if out.is_empty() { None } else { Some(out) })
    }

    /// Flush any remaining buffered bytes.
    ///
    /// If there are incomplete UTF-8 sequences in the buffer, they will be
    /// replaced with the Unicode replacement character (U+FFFD).
    pub fn flush(&mut self) -> String {
        let mut out = String::new();
        flush_run(&mut self.buffer, &mut out);
        out
    }

    /// Reset the decoder state, discarding any buffered bytes.
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    /// Check if there are buffered bytes waiting for completion.
    pub fn has_pending(&self) -> bool {
        !self.buffer.is_empty()
    }

    /// Get the number of pending bytes in the buffer.
    pub fn pending_bytes(&self) -> usize {
        self.buffer.len()
    }

    fn push(&mut self, token_id: u32, out: &mut String) -> Result<(), TokenizerError> {
        let tokenizer = self.tokenizer;
        let token = tokenizer.id_to_token(token_id)?;
        match parse_byte_token(token) {
            Some(byte) => self.buffer.push(byte),
            None => {
                // Complete characters leave the buffer as they arrive, so
                // whatever is left here is an unfinished sequence.
                self.extract_complete_utf8(out);
                flush_run(&mut self.buffer, out);
                out.push_str(token);
            }
        }
        Ok(())
    }

    /// Move the decodable prefix of the buffer into `out`.
    ///
    /// Invalid bytes are replaced with U+FFFD as soon as they are known to be
    /// invalid; only a trailing sequence that could still complete is kept.
    fn extract_complete_utf8(&mut self, out: &mut String) {
        let keep = self.incomplete_tail_len();
        let ready = self.buffer.len() - keep;
        if ready == 0 {
            return;
        }
        out.push_str(&String::from_utf8_lossy(&self.buffer[..ready]));
        self.buffer.drain(..ready);
    }

    /// Length of the trailing bytes that may still become a valid character.
    fn incomplete_tail_len(&self) -> usize {
        match std::str::from_utf8(&self.buffer) {
            Ok(_) => 0,
            // `error_len() == None` means the input ended mid-sequence.
            Err(e) if e.error_len().is_none() => self.buffer.len() - e.valid_up_to(),
            Err(e) => {
                // An invalid sequence in the middle: everything up to the
                // end of the last error is final, check the rest again.
                let mut offset = 0;
                let mut err = e;
                loop {
                    let Some(bad) = err.error_len() else {
                        return self.buffer.len() - offset - err.valid_up_to();
                    };
                    offset += err.valid_up_to() + bad;
                    match std::str::from_utf8(&self.buffer[offset..]) {
                        Ok(_) => return 0,
                        Err(next) => err = next,
                    }
                }
            }
        }
    }
}
