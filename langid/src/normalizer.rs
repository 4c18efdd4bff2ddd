//! Length-bias correction of naive Bayes scores.

use bincode::{Decode, Encode};

use crate::feature::FeatureCounts;
use crate::model::ScoreValue;
use crate::scorer::ClassScore;

/// How normalization constants are combined with raw scores.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Decode, Encode)]
pub enum NormalizationScheme {
    /// `score - k`.
    Offset,

    /// `score - k * n`, where `n` is the number of feature matches in the input.
    LengthScaled,
}

/// Per-class normalization constants.
#[derive(Clone, Debug, PartialEq, Decode, Encode)]
pub struct Normalization {
    pub(crate) scheme: NormalizationScheme,
    pub(crate) constants: Vec<ScoreValue>,
}

impl Normalization {
    /// Creates a new normalization.
    ///
    /// # Arguments
    ///
    /// * `scheme` - How the constants are applied.
    /// * `constants` - One constant per class, in class order.
    pub const fn new(scheme: NormalizationScheme, constants: Vec<ScoreValue>) -> Self {
        Self { scheme, constants }
    }

    pub const fn scheme(&self) -> NormalizationScheme {
        self.scheme
    }

    pub fn constants(&self) -> &[ScoreValue] {
        &self.constants
    }

    #[inline]
    fn adjustment(&self, class_id: usize, n_matches: u64) -> ScoreValue {
        let k = self.constants[class_id];
        match self.scheme {
            NormalizationScheme::Offset => k,
            NormalizationScheme::LengthScaled => k * n_matches as ScoreValue,
        }
    }
}

/// Applies the model's normalization to raw scores in place.
///
/// Without normalization, the scores are left as they are. Classes are never added or
/// removed.
pub fn normalize(
    scores: &mut [ClassScore],
    normalization: Option<&Normalization>,
    counts: &FeatureCounts,
) {
    match normalization {
        None => {}
        Some(normalization) => {
            let n_matches = counts.total();
            for s in scores {
                s.score -= normalization.adjustment(s.class_id, n_matches);
            }
        }
    }
}
