use crate::feature::FeatureCounts;
use crate::model::{Model, ScoreValue};

/// Score of one class.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClassScore {
    /// Index of the class in the model's class list.
    pub class_id: usize,

    /// Log-domain score.
    pub score: ScoreValue,
}

/// Computes naive Bayes scores of the active classes.
///
/// The score of class `c` is `prior[c] + sum(count[f] * weight[f][c])`, accumulated in
/// increasing feature order. Inactive classes are not scored at all. An input without
/// matches scores every class with its prior.
///
/// # Arguments
///
/// * `counts` - Feature counts of the input.
/// * `model` - The model.
/// * `active` - Indices of the classes to score.
///
/// # Returns
///
/// One score per element of `active`, in the same order.
pub fn score(counts: &FeatureCounts, model: &Model, active: &[usize]) -> Vec<ClassScore> {
    let mut scores: Vec<_> = active
        .iter()
        .map(|&class_id| ClassScore {
            class_id,
            score: model.priors[class_id],
        })
        .collect();
    for (feature, n) in counts.iter() {
        let weights = model.feature_weights(feature);
        let n = n as ScoreValue;
        for s in &mut scores {
            s.score += n * weights[s.class_id];
        }
    }
    scores
}

/// Sorts scores in descending order, breaking ties by ascending class index.
pub(crate) fn sort_ranking(scores: &mut [ClassScore]) {
    scores.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.class_id.cmp(&b.class_id))
    });
}
