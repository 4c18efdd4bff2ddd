use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::RwLock;

use crate::errors::{LangidError, Result};
use crate::model::{Model, ScoreValue};
use crate::normalizer;
use crate::scorer::{self, ClassScore};

/// Best language of an input.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Detection<'a> {
    /// Language label.
    pub label: &'a str,

    /// Posterior probability of the language among the active languages, in `(0, 1]`.
    pub confidence: f64,
}

/// One entry of a ranking.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RankedLanguage<'a> {
    /// Language label.
    pub label: &'a str,

    /// Normalized log-domain score, or a probability for
    /// [`Classifier::rank_probabilities()`].
    pub score: ScoreValue,
}

/// Language classifier.
///
/// A classifier can be shared between threads. The set of active languages is
/// snapshotted once at the start of each call, so a concurrent [`Classifier::restrict()`]
/// never affects a call in progress.
pub struct Classifier {
    model: Model,
    class_ids: HashMap<String, usize>,
    active: RwLock<Arc<[usize]>>,
}

impl Classifier {
    /// Creates a new classifier with every language of the model active.
    ///
    /// # Arguments
    ///
    /// * `model` - A model data.
    ///
    /// # Returns
    ///
    /// A new classifier.
    pub fn new(model: Model) -> Self {
        let class_ids = model
            .classes()
            .iter()
            .enumerate()
            .map(|(i, label)| (label.clone(), i))
            .collect();
        let active = (0..model.n_classes()).collect();
        Self {
            model,
            class_ids,
            active: RwLock::new(active),
        }
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    fn snapshot(&self) -> Arc<[usize]> {
        Arc::clone(&self.active.read())
    }

    fn ranked_scores(&self, text: &[u8], active: &[usize]) -> Vec<ClassScore> {
        let counts = self.model.scanner().extract(text);
        let mut scores = scorer::score(&counts, &self.model, active);
        normalizer::normalize(&mut scores, self.model.normalization(), &counts);
        scorer::sort_ranking(&mut scores);
        scores
    }

    fn classify_with(&self, text: &[u8], active: &[usize]) -> Result<Detection<'_>> {
        let scores = self.ranked_scores(text, active);
        let best = scores.first().ok_or_else(LangidError::empty_model)?;
        let denominator: f64 = scores.iter().map(|s| (s.score - best.score).exp()).sum();
        Ok(Detection {
            label: &self.model.classes()[best.class_id],
            confidence: 1.0 / denominator,
        })
    }

    /// Identifies the language of a text.
    ///
    /// # Arguments
    ///
    /// * `text` - UTF-8 text or any other byte sequence.
    ///
    /// # Errors
    ///
    /// [`LangidError::EmptyModel`] is returned when no language is active.
    pub fn classify<P>(&self, text: P) -> Result<Detection<'_>>
    where
        P: AsRef<[u8]>,
    {
        let active = self.snapshot();
        self.classify_with(text.as_ref(), &active)
    }

    /// Ranks all active languages by descending score.
    ///
    /// Ties are ordered by the class order of the model. The ranking is empty when no
    /// language is active.
    pub fn rank<P>(&self, text: P) -> Vec<RankedLanguage<'_>>
    where
        P: AsRef<[u8]>,
    {
        let active = self.snapshot();
        self.ranked_scores(text.as_ref(), &active)
            .into_iter()
            .map(|s| RankedLanguage {
                label: &self.model.classes()[s.class_id],
                score: s.score,
            })
            .collect()
    }

    /// Ranks all active languages, replacing scores with posterior probabilities.
    ///
    /// The probabilities sum to 1 unless no language is active.
    pub fn rank_probabilities<P>(&self, text: P) -> Vec<RankedLanguage<'_>>
    where
        P: AsRef<[u8]>,
    {
        let mut ranking = self.rank(text);
        if let Some(best) = ranking.first().map(|r| r.score) {
            for r in &mut ranking {
                r.score = (r.score - best).exp();
            }
            let total: f64 = ranking.iter().map(|r| r.score).sum();
            for r in &mut ranking {
                r.score /= total;
            }
        }
        ranking
    }

    /// Restricts the candidates to the given languages.
    ///
    /// # Errors
    ///
    /// [`LangidError::InvalidLanguage`] is returned when a label is unknown to the model.
    /// The active languages are left unchanged in that case.
    pub fn restrict<I, S>(&self, labels: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut ids = vec![];
        for label in labels {
            let label = label.as_ref();
            let id = self
                .class_ids
                .get(label)
                .ok_or_else(|| LangidError::invalid_language(label))?;
            ids.push(*id);
        }
        ids.sort_unstable();
        ids.dedup();
        tracing::debug!(n_active = ids.len(), "restricted languages");
        *self.active.write() = ids.into();
        Ok(())
    }

    /// Makes every language of the model active again.
    pub fn reset(&self) {
        let all: Arc<[usize]> = (0..self.model.n_classes()).collect();
        tracing::debug!(n_active = all.len(), "reset languages");
        *self.active.write() = all;
    }

    /// Gets the labels of the active languages in class order.
    pub fn active_classes(&self) -> Vec<&str> {
        self.snapshot()
            .iter()
            .map(|&i| self.model.classes()[i].as_str())
            .collect()
    }

    /// Identifies the language of each text lazily.
    ///
    /// The active languages are snapshotted when this function is called, and every
    /// element is classified against that snapshot.
    pub fn classify_batch<I>(&self, texts: I) -> ClassifyBatch<'_, I::IntoIter>
    where
        I: IntoIterator,
        I::Item: AsRef<[u8]>,
    {
        ClassifyBatch {
            classifier: self,
            active: self.snapshot(),
            texts: texts.into_iter(),
        }
    }
}

/// Iterator returned by [`Classifier::classify_batch()`].
#[derive(Clone)]
pub struct ClassifyBatch<'a, I> {
    classifier: &'a Classifier,
    active: Arc<[usize]>,
    texts: I,
}

impl<'a, I> Iterator for ClassifyBatch<'a, I>
where
    I: Iterator,
    I::Item: AsRef<[u8]>,
{
    type Item = Result<Detection<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        let text = self.texts.next()?;
        Some(self.classifier.classify_with(text.as_ref(), &self.active))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.texts.size_hint()
    }
}
