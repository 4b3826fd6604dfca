//! Multi-pattern longest-match splitter.
//!
//! The [`Trie`] holds every vocabulary and special token as a path of code
//! points and splits text along the boundaries of the tokens it finds, in one
//! left-to-right pass.
//!
//! # Matching
//!
//! Every position that starts a path in the trie opens a partial match. When a
//! partial match reaches the end of a registered pattern, a lookahead over the
//! partial matches that started at or before it picks the longest completion,
//! the match is emitted and all partial matches are dropped. Scanning resumes
//! after the match, so a suffix of an emitted token is never matched again.
//!
//! ```
//! use trietok::Trie;
//!
//! let mut trie = Trie::new();
//! trie.add("[CLS]");
//! trie.add("extra_id_1");
//! trie.add("extra_id_100");
//!
//! assert_eq!(
//!     trie.split("[CLS] This is a extra_id_100"),
//!     vec!["[CLS]", " This is a ", "extra_id_100"]
//! );
//! ```

use std::collections::BTreeMap;
use std::ops::Range;

use log::warn;

/// Index of a node in the trie arena.
type NodeId = u32;

const ROOT: NodeId = 0;

#[derive(Debug, Clone, Default)]
struct Node {
    /// Sorted by code point; branching is small so binary search beats hashing.
    children: Vec<(char, NodeId)>,
    terminal: bool,
}

/// Trie over Unicode code points, used to split text on registered tokens.
///
/// Nodes live in a flat arena owned by the trie. Patterns can only be added;
/// when the registered set has to shrink, build a new trie.
#[derive(Debug, Clone)]
pub struct Trie {
    nodes: Vec<Node>,
    patterns: usize,
}

impl Default for Trie {
    fn default() -> Self {
        Self::new()
    }
}

impl Trie {
    /// Create an empty trie.
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::default()],
            patterns: 0,
        }
    }

    /// Register `pattern`.
    ///
    /// Empty patterns are ignored and adding the same pattern twice leaves the
    /// trie unchanged.
    pub fn add(&mut self, pattern: &str) {
        if pattern.is_empty() {
            return;
        }

        let mut node = ROOT;
        for ch in pattern.chars() {
            let slot = self.nodes[node as usize]
                .children
                .binary_search_by_key(&ch, |&(c, _)| c);
            node = match slot {
                Ok(i) => self.nodes[node as usize].children[i].1,
                Err(i) => {
                    let id = self.nodes.len() as NodeId;
                    self.nodes.push(Node::default());
                    self.nodes[node as usize].children.insert(i, (ch, id));
                    id
                }
            };
        }

        let end = &mut self.nodes[node as usize];
        if !end.terminal {
            end.terminal = true;
            self.patterns += 1;
        }
    }

    /// Number of distinct registered patterns.
    pub fn len(&self) -> usize {
        self.patterns
    }

    pub fn is_empty(&self) -> bool {
        self.patterns == 0
    }

    /// Check whether `pattern` was registered.
    pub fn contains(&self, pattern: &str) -> bool {
        if pattern.is_empty() {
            return false;
        }
        let mut node = ROOT;
        for ch in pattern.chars() {
            match self.child(node, ch) {
                Some(next) => node = next,
                None => return false,
            }
        }
        self.is_terminal(node)
    }

    /// Split `text` along the boundaries of the registered patterns.
    ///
    /// The pieces partition `text`: joining them gives back the input. Matched
    /// tokens come out as their own pieces; text between matches comes out as
    /// a single unmatched run.
    pub fn split<'t>(&self, text: &'t str) -> Vec<&'t str> {
        self.split_into_ranges(text)
            .into_iter()
            .map(|range| &text[range])
            .collect()
    }

    /// Same partition as [`Trie::split`], as byte ranges into `text`.
    pub fn split_into_ranges(&self, text: &str) -> Vec<Range<usize>> {
        let chars: Vec<(usize, char)> = text.char_indices().collect();
        let offsets = self.match_offsets(&chars);
        let byte_at = |i: usize| chars.get(i).map_or(text.len(), |&(b, _)| b);

        let mut ranges = Vec::with_capacity(offsets.len() + 1);
        let mut start = 0;
        for end in offsets.into_iter().chain(std::iter::once(chars.len())) {
            if start > end {
                warn!(
                    "trie produced a boundary ending at {} before its start {}, skipping it",
                    end, start
                );
                continue;
            }
            if start == end {
                continue;
            }
            ranges.push(byte_at(start)..byte_at(end));
            start = end;
        }

        ranges
    }

    #[inline]
    fn child(&self, node: NodeId, ch: char) -> Option<NodeId> {
        let children = &self.nodes[node as usize].children;
        children
            .binary_search_by_key(&ch, |&(c, _)| c)
            .ok()
            .map(|i| children[i].1)
    }

    #[inline]
    fn is_terminal(&self, node: NodeId) -> bool {
        self.nodes[node as usize].terminal
    }

    /// Scan `chars` and return the cut points (code point indices) of every
    /// match, as consecutive `start, end` pairs.
    fn match_offsets(&self, chars: &[(usize, char)]) -> Vec<usize> {
        // start position -> node reached by consuming chars from there
        let mut states: BTreeMap<usize, NodeId> = BTreeMap::new();
        let mut offsets = Vec::new();
        // Positions below `skip` were consumed by a lookahead match.
        let mut skip = 0;
        let mut dropped = Vec::new();

        for (current, &(_, ch)) in chars.iter().enumerate() {
            if current < skip {
                continue;
            }

            dropped.clear();
            let mut reset = false;

            let starts: Vec<usize> = states.keys().copied().collect();
            for start in starts {
                let Some(&node) = states.get(&start) else {
                    continue;
                };

                if self.is_terminal(node) {
                    let (start, end) =
                        self.lookahead(&states, &dropped, chars, start, current, &mut skip);
                    offsets.push(start);
                    offsets.push(end);
                    reset = true;
                    break;
                } else if let Some(next) = self.child(node, ch) {
                    states.insert(start, next);
                } else {
                    dropped.push(start);
                }
            }

            if reset {
                states.clear();
            } else {
                for start in &dropped {
                    states.remove(start);
                }
            }

            if current >= skip {
                if let Some(next) = self.child(ROOT, ch) {
                    states.insert(current, next);
                }
            }
        }

        // The lowest surviving start is the longest cut reaching the end.
        if let Some((&start, _)) = states.iter().find(|&(_, &node)| self.is_terminal(node)) {
            offsets.push(start);
            offsets.push(chars.len());
        }

        offsets
    }

    /// Extend a completed match at `start` to the longest completion among
    /// the live partial matches starting at or before it.
    ///
    /// Partial matches earlier than `start` have already consumed the char at
    /// `current`; the one at `start` has not. Returns the chosen `(start, end)`
    /// and moves `skip` past it.
    fn lookahead(
        &self,
        states: &BTreeMap<usize, NodeId>,
        dropped: &[usize],
        chars: &[(usize, char)],
        start: usize,
        current: usize,
        skip: &mut usize,
    ) -> (usize, usize) {
        let mut start = start;
        let mut end = current;

        for (&look_start, &node) in states {
            if look_start > start {
                break;
            }
            if dropped.contains(&look_start) {
                // Failed on the current char, its node was never advanced.
                continue;
            }

            let mut index = if look_start < start {
                current + 1
            } else {
                current
            };
            end = index;

            let mut node = node;
            if self.is_terminal(node) {
                start = look_start;
                end = index;
                *skip = index;
            }
            while let Some(&(_, next_ch)) = chars.get(index) {
                let Some(next) = self.child(node, next_ch) else {
                    break;
                };
                node = next;
                index += 1;
                if self.is_terminal(node) {
                    start = look_start;
                    end = index;
                    *skip = index;
                }
            }
        }

        (start, end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trie_of(patterns: &[&str]) -> Trie {
        let mut trie = Trie::new();
        for pattern in patterns {
            trie.add(pattern);
        }
        trie
    }

    #[test]
    fn test_empty_trie_returns_whole_text() {
        let trie = Trie::new();
        assert_eq!(
            trie.split("[CLS] This is a extra_id_100"),
            vec!["[CLS] This is a extra_id_100"]
        );
        assert!(trie.is_empty());
    }

    #[test]
    fn test_empty_text() {
        let trie = trie_of(&["a"]);
        assert!(trie.split("").is_empty());
    }

    #[test]
    fn test_add_is_idempotent() {
        let mut trie = trie_of(&["Hello", "Hello"]);
        assert_eq!(trie.len(), 1);
        let nodes = trie.nodes.len();
        trie.add("Hello");
        assert_eq!(trie.nodes.len(), nodes);
        assert!(trie.contains("Hello"));
        assert!(!trie.contains("Hell"));
    }

    #[test]
    fn test_add_ignores_empty_pattern() {
        let trie = trie_of(&[""]);
        assert!(trie.is_empty());
        assert!(!trie.contains(""));
    }

    #[test]
    fn test_prefix_patterns() {
        let trie = trie_of(&["Hello 友達", "Hello"]);
        assert_eq!(trie.len(), 2);
        assert!(trie.contains("Hello"));
        assert!(trie.contains("Hello 友達"));
        assert!(!trie.contains("Hello 友"));
    }

    #[test]
    fn test_single_pattern_is_greedy() {
        let trie = trie_of(&["[CLS]"]);
        assert_eq!(
            trie.split("[CLS] This is a extra_id_100"),
            vec!["[CLS]", " This is a extra_id_100"]
        );
    }

    #[test]
    fn test_longest_match_wins() {
        let trie = trie_of(&["[CLS]", "extra_id_1", "extra_id_100"]);
        assert_eq!(
            trie.split("[CLS] This is a extra_id_100"),
            vec!["[CLS]", " This is a ", "extra_id_100"]
        );
        assert_eq!(trie.split("extra_id_100"), vec!["extra_id_100"]);
    }

    #[test]
    fn test_shorter_match_when_longer_does_not_complete() {
        let trie = trie_of(&["extra_id_1", "extra_id_100"]);
        assert_eq!(trie.split("extra_id_10"), vec!["extra_id_1", "0"]);
    }

    #[test]
    fn test_no_match_inside_consumed_region() {
        let trie = trie_of(&["extra_id_100", "id_100"]);
        assert_eq!(trie.split("extra_id_100"), vec!["extra_id_100"]);
    }

    #[test]
    fn test_later_start_when_earlier_fails() {
        let trie = trie_of(&["blowing", "lower"]);
        assert_eq!(trie.split("blower"), vec!["b", "lower"]);
    }

    #[test]
    fn test_earlier_start_beats_nested_pattern() {
        let trie = trie_of(&["[CLS]", "L"]);
        assert_eq!(trie.split("[CLS]"), vec!["[CLS]"]);
        assert_eq!(trie.split("xLx"), vec!["x", "L", "x"]);
    }

    #[test]
    fn test_dropped_partial_match_does_not_resume() {
        // "ab" fails on 'c' in the same step "b" completes; it must not be
        // resumed one char later as "abd".
        let trie = trie_of(&["abd", "b"]);
        assert_eq!(trie.split("abcd"), vec!["a", "b", "cd"]);
        assert_eq!(trie.split("abd"), vec!["abd"]);
    }

    #[test]
    fn test_consecutive_matches() {
        let trie = trie_of(&["ab", "cd"]);
        assert_eq!(trie.split("abcdab"), vec!["ab", "cd", "ab"]);
    }

    #[test]
    fn test_match_at_end_of_text() {
        let trie = trie_of(&["end"]);
        assert_eq!(trie.split("the end"), vec!["the ", "end"]);
    }

    #[test]
    fn test_multibyte_code_points() {
        let trie = trie_of(&["友達", "🍺"]);
        assert_eq!(
            trie.split("Hello 友達 🍺!"),
            vec!["Hello ", "友達", " ", "🍺", "!"]
        );
    }

    #[test]
    fn test_ranges_are_byte_offsets() {
        let trie = trie_of(&["世界"]);
        let text = "你好世界";
        assert_eq!(trie.split_into_ranges(text), vec![0..6, 6..12]);
    }

    #[test]
    fn test_split_partitions_text() {
        let trie = trie_of(&["a", "ab", "abc", "bc", "c", "<|im_start|>", "<|"]);
        for text in [
            "abcabc",
            "xxabcxx",
            "<|im_start|>abc<|",
            "<|im_star",
            "cbacba",
        ] {
            assert_eq!(trie.split(text).concat(), text, "partition of {:?}", text);
        }
    }
}
