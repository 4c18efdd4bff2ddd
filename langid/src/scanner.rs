//! Aho-Corasick automaton compiled into a dense byte transition table.

use std::collections::VecDeque;

use bincode::{Decode, Encode};

use crate::errors::{LangidError, Result};

const ALPHABET_SIZE: usize = 256;

struct SparseTrie {
    nodes: Vec<Vec<(u8, u32)>>,
    outputs: Vec<Vec<u32>>,
}

impl SparseTrie {
    fn new() -> Self {
        Self {
            nodes: vec![vec![]],
            outputs: vec![vec![]],
        }
    }

    fn add(&mut self, pattern: &[u8], feature_id: u32) -> Result<()> {
        if pattern.is_empty() {
            return Err(LangidError::model_load(format!(
                "feature {} is empty",
                feature_id
            )));
        }
        let mut node_id = 0;
        for &c in pattern {
            node_id = if let Some(next_node_id) = self.get(node_id, c) {
                next_node_id
            } else {
                let next_node_id = u32::try_from(self.nodes.len())
                    .map_err(|_| LangidError::model_load("too many automaton states"))?;
                self.nodes.push(vec![]);
                self.outputs.push(vec![]);
                self.nodes[node_id as usize].push((c, next_node_id));
                next_node_id
            };
        }
        let outputs = &mut self.outputs[node_id as usize];
        if !outputs.is_empty() {
            return Err(LangidError::model_load(format!(
                "feature {} duplicates feature {}",
                feature_id, outputs[0]
            )));
        }
        outputs.push(feature_id);
        Ok(())
    }

    fn get(&self, node_id: u32, c: u8) -> Option<u32> {
        for trans in &self.nodes[node_id as usize] {
            if c == trans.0 {
                return Some(trans.1);
            }
        }
        None
    }
}

/// Deterministic automaton reporting every feature at the byte where it ends.
///
/// The transition table holds `n_states * 256` entries and is indexed by
/// `state * 256 + byte`. The features completed on entering a state are stored as a
/// range `output_offsets[state]..output_offsets[state + 1]` of `output_features`.
#[derive(Clone, Debug, Decode, Encode)]
pub struct Scanner {
    pub(crate) transitions: Vec<u32>,
    pub(crate) output_offsets: Vec<u32>,
    pub(crate) output_features: Vec<u32>,
}

impl Scanner {
    /// Compiles an automaton recognizing the given features.
    ///
    /// The `i`-th feature is reported with index `i`.
    ///
    /// # Errors
    ///
    /// [`LangidError::ModelLoad`] is returned when a feature is empty or appears twice.
    pub fn build<D, P>(features: D) -> Result<Self>
    where
        D: IntoIterator<Item = P>,
        P: AsRef<[u8]>,
    {
        let mut trie = SparseTrie::new();
        for (i, feature) in features.into_iter().enumerate() {
            let feature_id = u32::try_from(i)
                .map_err(|_| LangidError::model_load("too many features"))?;
            trie.add(feature.as_ref(), feature_id)?;
        }

        let n_states = trie.nodes.len();
        let mut transitions = vec![0; n_states * ALPHABET_SIZE];
        let mut fail = vec![0u32; n_states];
        let mut queue = VecDeque::new();

        for &(c, child_id) in &trie.nodes[0] {
            transitions[c as usize] = child_id;
            queue.push_back(child_id);
        }
        while let Some(node_id) = queue.pop_front() {
            let row = node_id as usize * ALPHABET_SIZE;
            let fail_row = fail[node_id as usize] as usize * ALPHABET_SIZE;
            for c in 0..ALPHABET_SIZE {
                transitions[row + c] = transitions[fail_row + c];
            }
            for i in 0..trie.nodes[node_id as usize].len() {
                let (c, child_id) = trie.nodes[node_id as usize][i];
                let child_fail = transitions[fail_row + c as usize];
                fail[child_id as usize] = child_fail;
                let mut fail_outputs = trie.outputs[child_fail as usize].clone();
                trie.outputs[child_id as usize].append(&mut fail_outputs);
                transitions[row + c as usize] = child_id;
                queue.push_back(child_id);
            }
        }

        let mut output_offsets = Vec::with_capacity(n_states + 1);
        let mut output_features = vec![];
        output_offsets.push(0);
        for mut outputs in trie.outputs {
            outputs.sort_unstable();
            output_features.append(&mut outputs);
            output_offsets.push(
                u32::try_from(output_features.len())
                    .map_err(|_| LangidError::model_load("too many automaton outputs"))?,
            );
        }

        Ok(Self {
            transitions,
            output_offsets,
            output_features,
        })
    }

    /// Gets the number of states.
    pub fn n_states(&self) -> usize {
        self.output_offsets.len().saturating_sub(1)
    }

    #[inline(always)]
    pub(crate) fn next_state(&self, state: u32, c: u8) -> u32 {
        self.transitions[(state as usize) << 8 | c as usize]
    }

    #[inline(always)]
    pub(crate) fn has_output(&self, state: u32) -> bool {
        let state = state as usize;
        self.output_offsets[state] != self.output_offsets[state + 1]
    }

    #[inline(always)]
    pub(crate) fn outputs(&self, state: u32) -> &[u32] {
        let state = state as usize;
        let start = self.output_offsets[state] as usize;
        let end = self.output_offsets[state + 1] as usize;
        &self.output_features[start..end]
    }

    /// Checks the structural consistency of the automaton against a vocabulary of
    /// `n_features` features.
    pub(crate) fn validate(&self, n_features: usize) -> Result<()> {
        if self.output_offsets.is_empty() {
            return Err(LangidError::model_load("the automaton has no states"));
        }
        let n_states = self.n_states();
        if n_states == 0 {
            return Err(LangidError::model_load("the automaton has no states"));
        }
        if self.transitions.len() != n_states * ALPHABET_SIZE {
            return Err(LangidError::model_load(format!(
                "transition table has {} entries, expected {} states * {}",
                self.transitions.len(),
                n_states,
                ALPHABET_SIZE
            )));
        }
        if let Some(&s) = self.transitions.iter().find(|&&s| s as usize >= n_states) {
            return Err(LangidError::model_load(format!(
                "transition to state {} is out of range ({} states)",
                s, n_states
            )));
        }
        if self.output_offsets[0] != 0 {
            return Err(LangidError::model_load("output offsets must start at 0"));
        }
        if self.output_offsets.windows(2).any(|w| w[0] > w[1]) {
            return Err(LangidError::model_load("output offsets must be monotonic"));
        }
        if self.output_offsets[n_states] as usize != self.output_features.len() {
            return Err(LangidError::model_load(format!(
                "output offsets end at {}, but {} outputs are stored",
                self.output_offsets[n_states],
                self.output_features.len()
            )));
        }
        if let Some(&f) = self
            .output_features
            .iter()
            .find(|&&f| f as usize >= n_features)
        {
            return Err(LangidError::model_load(format!(
                "automaton emits feature {}, but the vocabulary has {} features",
                f, n_features
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(scanner: &Scanner, text: &[u8]) -> Vec<(usize, u32)> {
        let mut result = vec![];
        let mut state = 0;
        for (i, &c) in text.iter().enumerate() {
            state = scanner.next_state(state, c);
            for &f in scanner.outputs(state) {
                result.push((i + 1, f));
            }
        }
        result
    }

    #[test]
    fn test_build_classic() {
        let scanner = Scanner::build(["he", "she", "his", "hers"]).unwrap();

        assert_eq!(vec![(4, 0), (4, 1), (6, 3)], run(&scanner, b"ushers"));
        scanner.validate(4).unwrap();
    }

    #[test]
    fn test_build_transitions_total() {
        let scanner = Scanner::build(["ab", "b"]).unwrap();

        assert_eq!(scanner.n_states() * 256, scanner.transitions.len());
        for c in 0..=255u8 {
            for state in 0..scanner.n_states() as u32 {
                assert!((scanner.next_state(state, c) as usize) < scanner.n_states());
            }
        }
    }

    #[test]
    fn test_build_suffix_outputs() {
        let scanner = Scanner::build(["abc", "bc", "c"]).unwrap();

        assert_eq!(vec![(3, 0), (3, 1), (3, 2)], run(&scanner, b"abc"));
    }

    #[test]
    fn test_build_overlapping_repeats() {
        let scanner = Scanner::build(["aa"]).unwrap();

        assert_eq!(vec![(2, 0), (3, 0), (4, 0)], run(&scanner, b"aaaa"));
    }

    #[test]
    fn test_build_empty_feature() {
        let result = Scanner::build(["a", ""]);

        assert_eq!(
            "ModelLoadError: feature 1 is empty",
            &result.unwrap_err().to_string()
        );
    }

    #[test]
    fn test_build_duplicate_feature() {
        let result = Scanner::build(["ab", "cd", "ab"]);

        assert_eq!(
            "ModelLoadError: feature 2 duplicates feature 0",
            &result.unwrap_err().to_string()
        );
    }

    #[test]
    fn test_build_no_features() {
        let scanner = Scanner::build(Vec::<Vec<u8>>::new()).unwrap();

        assert_eq!(1, scanner.n_states());
        assert!(run(&scanner, b"anything").is_empty());
        scanner.validate(0).unwrap();
    }

    #[test]
    fn test_matches_daachorse() {
        let features: Vec<&[u8]> = vec![
            b"a", b"ab", b"abc", b"bca", b"ca", b"cab", b"\xe3\x81", b"\x81\x82", b"\x00\xff",
            b"bb", b"bbb",
        ];
        let scanner = Scanner::build(&features).unwrap();
        let pma = daachorse::DoubleArrayAhoCorasick::<u32>::new(&features).unwrap();

        let alphabet = b"abc\xe3\x81\x82\x00\xff";
        let mut seed = 12345u32;
        for len in [0, 1, 2, 7, 64, 500] {
            let text: Vec<u8> = (0..len)
                .map(|_| {
                    seed = seed.wrapping_mul(1103515245).wrapping_add(12345);
                    alphabet[(seed >> 16) as usize % alphabet.len()]
                })
                .collect();
            let mut expected: Vec<_> = pma
                .find_overlapping_iter(&text)
                .map(|m| (m.end(), m.value()))
                .collect();
            expected.sort_unstable();
            let mut actual = run(&scanner, &text);
            actual.sort_unstable();
            assert_eq!(expected, actual);
        }
    }

    #[test]
    fn test_validate_bad_table_size() {
        let mut scanner = Scanner::build(["ab"]).unwrap();
        scanner.transitions.pop();

        assert!(scanner.validate(1).is_err());
    }

    #[test]
    fn test_validate_state_out_of_range() {
        let mut scanner = Scanner::build(["ab"]).unwrap();
        scanner.transitions[5] = 100;

        assert_eq!(
            "ModelLoadError: transition to state 100 is out of range (3 states)",
            &scanner.validate(1).unwrap_err().to_string()
        );
    }

    #[test]
    fn test_validate_feature_out_of_range() {
        let scanner = Scanner::build(["ab", "cd"]).unwrap();

        assert_eq!(
            "ModelLoadError: automaton emits feature 1, but the vocabulary has 1 features",
            &scanner.validate(1).unwrap_err().to_string()
        );
    }

    #[test]
    fn test_validate_offsets() {
        let mut scanner = Scanner::build(["ab"]).unwrap();
        let last = scanner.output_offsets.len() - 1;
        scanner.output_offsets[last] += 1;

        assert!(scanner.validate(1).is_err());
    }
}
