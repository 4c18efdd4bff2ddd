use hashbrown::HashMap;

use crate::scanner::Scanner;

/// Sparse feature counts of a single input, sorted by feature index.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FeatureCounts {
    entries: Vec<(u32, u64)>,
    total: u64,
}

impl FeatureCounts {
    fn from_map(map: HashMap<u32, u64>) -> Self {
        let mut entries: Vec<_> = map.into_iter().collect();
        entries.sort_unstable_by_key(|&(f, _)| f);
        let total = entries.iter().map(|&(_, n)| n).sum();
        Self { entries, total }
    }

    /// Iterates over `(feature index, count)` pairs in increasing feature order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, u64)> + '_ {
        self.entries.iter().map(|&(f, n)| (f as usize, n))
    }

    /// Gets the count of a feature.
    pub fn get(&self, feature: usize) -> u64 {
        u32::try_from(feature)
            .ok()
            .and_then(|f| self.entries.binary_search_by_key(&f, |&(f, _)| f).ok())
            .map_or(0, |i| self.entries[i].1)
    }

    /// Number of distinct features found.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of feature matches.
    pub const fn total(&self) -> u64 {
        self.total
    }
}

impl Scanner {
    /// Counts the features occurring in `text` in a single pass.
    ///
    /// Visits are first counted per state, then each visited state's outputs are
    /// expanded once, so the cost does not depend on the vocabulary size.
    ///
    /// # Examples
    ///
    /// ```
    /// use langid::Scanner;
    ///
    /// let scanner = Scanner::build(["ab", "b"]).unwrap();
    /// let counts = scanner.extract("abab");
    /// assert_eq!(2, counts.get(0));
    /// assert_eq!(2, counts.get(1));
    /// ```
    pub fn extract<P>(&self, text: P) -> FeatureCounts
    where
        P: AsRef<[u8]>,
    {
        let mut state_counts: HashMap<u32, u64> = HashMap::new();
        let mut state = 0;
        for &c in text.as_ref() {
            state = self.next_state(state, c);
            if self.has_output(state) {
                *state_counts.entry(state).or_insert(0) += 1;
            }
        }
        let mut feature_counts = HashMap::with_capacity(state_counts.len());
        for (state, n) in state_counts {
            for &f in self.outputs(state) {
                *feature_counts.entry(f).or_insert(0) += n;
            }
        }
        FeatureCounts::from_map(feature_counts)
    }
}
