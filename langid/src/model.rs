use std::io::{Read, Write};

use bincode::{Decode, Encode};
use hashbrown::{HashMap, HashSet};

use crate::errors::{LangidError, Result};
use crate::normalizer::Normalization;
use crate::scanner::Scanner;

pub type WeightValue = f64;
pub type ScoreValue = f64;

const MODEL_MAGIC: &[u8] = b"LangidModel 0.1\n";

/// Upper bound of the bytes decoded from a model file. Length prefixes claiming more
/// than this are rejected before anything is allocated.
const MAX_MODEL_SIZE: usize = 1 << 30;

/// Model data.
///
/// A model is immutable once constructed. Weights are stored feature-major: the
/// weights of feature `f` are `weights[f * n_classes..(f + 1) * n_classes]`.
#[derive(Decode, Encode)]
pub struct Model {
    pub(crate) features: Vec<Vec<u8>>,
    pub(crate) scanner: Scanner,
    pub(crate) weights: Vec<WeightValue>,
    pub(crate) priors: Vec<WeightValue>,
    pub(crate) classes: Vec<String>,
    pub(crate) normalization: Option<Normalization>,
}

impl Model {
    /// Creates a model from decoded parts, compiling the automaton for `features`.
    ///
    /// # Arguments
    ///
    /// * `features` - Byte n-grams, in feature index order.
    /// * `classes` - Class labels, in class index order.
    /// * `priors` - Log prior of each class.
    /// * `weights` - For each feature, its log-probability contribution to each class.
    /// * `normalization` - Optional length-bias correction.
    ///
    /// # Errors
    ///
    /// [`LangidError::ModelLoad`] is returned when the parts are inconsistent.
    pub fn new(
        features: Vec<Vec<u8>>,
        classes: Vec<String>,
        priors: Vec<WeightValue>,
        weights: Vec<Vec<WeightValue>>,
        normalization: Option<Normalization>,
    ) -> Result<Self> {
        if weights.len() != features.len() {
            return Err(LangidError::model_load(format!(
                "{} weight rows are given for {} features",
                weights.len(),
                features.len()
            )));
        }
        let mut flat_weights = Vec::with_capacity(features.len() * classes.len());
        for (i, row) in weights.into_iter().enumerate() {
            if row.len() != classes.len() {
                return Err(LangidError::model_load(format!(
                    "weight row {} has {} columns, but the model has {} classes",
                    i,
                    row.len(),
                    classes.len()
                )));
            }
            flat_weights.extend(row);
        }
        let scanner = Scanner::build(&features)?;
        let model = Self {
            features,
            scanner,
            weights: flat_weights,
            priors,
            classes,
            normalization,
        };
        model.validate()?;
        Ok(model)
    }

    /// Exports the model data.
    ///
    /// # Arguments
    ///
    /// * `wtr` - Byte-oriented sink object.
    ///
    /// # Errors
    ///
    /// When `wtr` generates an error, it will be returned as is.
    pub fn write<W>(&self, wtr: &mut W) -> Result<()>
    where
        W: Write,
    {
        wtr.write_all(MODEL_MAGIC)?;
        bincode::encode_into_std_write(self, wtr, bincode::config::standard())?;
        Ok(())
    }

    /// Creates a model from a reader.
    ///
    /// # Arguments
    ///
    /// * `rdr` - A data source.
    ///
    /// # Returns
    ///
    /// A model data read from `rdr`.
    ///
    /// # Errors
    ///
    /// [`LangidError::ModelLoad`] is returned when the data is truncated, malformed, or
    /// inconsistent. No partially loaded model is ever returned.
    pub fn read<R>(rdr: &mut R) -> Result<Self>
    where
        R: Read,
    {
        let mut magic = [0; MODEL_MAGIC.len()];
        rdr.read_exact(&mut magic)
            .map_err(|e| LangidError::model_load(format!("failed to read the header: {}", e)))?;
        if &magic[..] != MODEL_MAGIC {
            return Err(LangidError::model_load("unknown model format"));
        }
        let config = bincode::config::standard().with_limit::<MAX_MODEL_SIZE>();
        let model: Self = bincode::decode_from_std_read(rdr, config)?;
        model.validate()?;
        Ok(model)
    }

    fn validate(&self) -> Result<()> {
        let n_features = self.features.len();
        let n_classes = self.classes.len();
        if n_classes == 0 {
            return Err(LangidError::model_load("the model has no classes"));
        }
        let mut labels = HashSet::with_capacity(n_classes);
        for label in &self.classes {
            if !labels.insert(label.as_str()) {
                return Err(LangidError::model_load(format!(
                    "duplicate class label: {}",
                    label
                )));
            }
        }
        let mut feature_ids = HashMap::with_capacity(n_features);
        for (i, feature) in self.features.iter().enumerate() {
            if feature.is_empty() {
                return Err(LangidError::model_load(format!("feature {} is empty", i)));
            }
            if let Some(j) = feature_ids.insert(feature.as_slice(), i) {
                return Err(LangidError::model_load(format!(
                    "feature {} duplicates feature {}",
                    i, j
                )));
            }
        }
        if self.priors.len() != n_classes {
            return Err(LangidError::model_load(format!(
                "{} priors are given for {} classes",
                self.priors.len(),
                n_classes
            )));
        }
        if self.weights.len() != n_features * n_classes {
            return Err(LangidError::model_load(format!(
                "weight matrix has {} entries, expected {} features * {} classes",
                self.weights.len(),
                n_features,
                n_classes
            )));
        }
        if self.weights.iter().chain(&self.priors).any(|w| !w.is_finite()) {
            return Err(LangidError::model_load("weights must be finite"));
        }
        if let Some(normalization) = self.normalization.as_ref() {
            let constants = normalization.constants();
            if constants.len() != n_classes {
                return Err(LangidError::model_load(format!(
                    "{} normalization constants are given for {} classes",
                    constants.len(),
                    n_classes
                )));
            }
            if constants.iter().any(|k| !k.is_finite()) {
                return Err(LangidError::model_load(
                    "normalization constants must be finite",
                ));
            }
        }
        self.scanner.validate(n_features)?;
        tracing::debug!(
            n_features,
            n_classes,
            n_states = self.scanner.n_states(),
            normalization = ?self.normalization.as_ref().map(Normalization::scheme),
            "validated model"
        );
        Ok(())
    }

    /// Gets the class labels in class index order.
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    /// Gets the features in feature index order.
    pub fn features(&self) -> &[Vec<u8>] {
        &self.features
    }

    pub fn n_features(&self) -> usize {
        self.features.len()
    }

    pub fn n_classes(&self) -> usize {
        self.classes.len()
    }

    /// Gets the log prior of each class.
    pub fn priors(&self) -> &[WeightValue] {
        &self.priors
    }

    pub fn normalization(&self) -> Option<&Normalization> {
        self.normalization.as_ref()
    }

    /// Gets the automaton compiled for the features.
    pub fn scanner(&self) -> &Scanner {
        &self.scanner
    }

    /// Gets the weights of a feature, one per class.
    #[inline(always)]
    pub fn feature_weights(&self, feature: usize) -> &[WeightValue] {
        let n_classes = self.classes.len();
        &self.weights[feature * n_classes..(feature + 1) * n_classes]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::normalizer::NormalizationScheme;

    fn parts() -> (
        Vec<Vec<u8>>,
        Vec<String>,
        Vec<WeightValue>,
        Vec<Vec<WeightValue>>,
    ) {
        (
            vec![b"ab".to_vec(), b"b".to_vec(), b"\xe3\x81\x82".to_vec()],
            vec!["en".into(), "ja".into()],
            vec![-0.5, -1.0],
            vec![vec![-1.0, -4.0], vec![-2.0, -3.0], vec![-6.0, -0.5]],
        )
    }

    fn error_message(result: Result<Model>) -> String {
        match result {
            Ok(_) => panic!("the model must be rejected"),
            Err(e) => e.to_string(),
        }
    }

    #[test]
    fn test_new() {
        let (features, classes, priors, weights) = parts();
        let model = Model::new(features, classes, priors, weights, None).unwrap();

        assert_eq!(3, model.n_features());
        assert_eq!(2, model.n_classes());
        assert_eq!(&[-2.0, -3.0], model.feature_weights(1));
        assert_eq!(&[-6.0, -0.5], model.feature_weights(2));
        assert!(model.normalization().is_none());
    }

    #[test]
    fn test_new_column_mismatch() {
        let (features, classes, priors, mut weights) = parts();
        weights[1].push(0.0);

        assert_eq!(
            "ModelLoadError: weight row 1 has 3 columns, but the model has 2 classes",
            error_message(Model::new(features, classes, priors, weights, None))
        );
    }

    #[test]
    fn test_new_row_mismatch() {
        let (features, classes, priors, mut weights) = parts();
        weights.pop();

        assert_eq!(
            "ModelLoadError: 2 weight rows are given for 3 features",
            error_message(Model::new(features, classes, priors, weights, None))
        );
    }

    #[test]
    fn test_new_prior_mismatch() {
        let (features, classes, _, weights) = parts();

        assert_eq!(
            "ModelLoadError: 1 priors are given for 2 classes",
            error_message(Model::new(features, classes, vec![0.0], weights, None))
        );
    }

    #[test]
    fn test_new_duplicate_label() {
        let (features, _, priors, weights) = parts();
        let classes = vec!["en".into(), "en".into()];

        assert_eq!(
            "ModelLoadError: duplicate class label: en",
            error_message(Model::new(features, classes, priors, weights, None))
        );
    }

    #[test]
    fn test_new_no_classes() {
        assert_eq!(
            "ModelLoadError: the model has no classes",
            error_message(Model::new(vec![], vec![], vec![], vec![], None))
        );
    }

    #[test]
    fn test_new_not_finite() {
        let (features, classes, priors, mut weights) = parts();
        weights[0][0] = f64::NAN;

        assert_eq!(
            "ModelLoadError: weights must be finite",
            error_message(Model::new(features, classes, priors, weights, None))
        );
    }

    #[test]
    fn test_new_normalization_not_finite() {
        let (features, classes, priors, weights) = parts();
        let norm = Normalization::new(NormalizationScheme::Offset, vec![1.0, f64::NAN]);

        assert_eq!(
            "ModelLoadError: normalization constants must be finite",
            error_message(Model::new(features, classes, priors, weights, Some(norm)))
        );
    }

    #[test]
    fn test_new_normalization_mismatch() {
        let (features, classes, priors, weights) = parts();
        let norm = Normalization::new(NormalizationScheme::Offset, vec![1.0]);

        assert_eq!(
            "ModelLoadError: 1 normalization constants are given for 2 classes",
            error_message(Model::new(features, classes, priors, weights, Some(norm)))
        );
    }

    #[test]
    fn test_write_read() {
        let (features, classes, priors, weights) = parts();
        let norm = Normalization::new(NormalizationScheme::LengthScaled, vec![0.25, -0.125]);
        let model = Model::new(features, classes, priors, weights, Some(norm.clone())).unwrap();

        let mut buf = vec![];
        model.write(&mut buf).unwrap();
        assert!(buf.starts_with(MODEL_MAGIC));

        let loaded = Model::read(&mut buf.as_slice()).unwrap();
        assert_eq!(model.features(), loaded.features());
        assert_eq!(model.classes(), loaded.classes());
        assert_eq!(model.priors(), loaded.priors());
        assert_eq!(model.weights, loaded.weights);
        let loaded_norm = loaded.normalization().unwrap();
        assert_eq!(NormalizationScheme::LengthScaled, loaded_norm.scheme());
        assert_eq!(&[0.25, -0.125], loaded_norm.constants());
        assert_eq!(&norm, loaded_norm);
        assert_eq!(
            model.scanner().extract("abab\u{3042}"),
            loaded.scanner().extract("abab\u{3042}")
        );
    }

    #[test]
    fn test_read_truncated() {
        let (features, classes, priors, weights) = parts();
        let model = Model::new(features, classes, priors, weights, None).unwrap();
        let mut buf = vec![];
        model.write(&mut buf).unwrap();

        for len in [0, 5, MODEL_MAGIC.len(), buf.len() / 2, buf.len() - 1] {
            let result = Model::read(&mut &buf[..len]);
            assert!(matches!(result, Err(LangidError::ModelLoad(_))), "{}", len);
        }
    }

    #[test]
    fn test_read_huge_length() {
        // The number of features is declared as 2^40.
        let mut buf = MODEL_MAGIC.to_vec();
        buf.push(0xfd);
        buf.extend_from_slice(&(1u64 << 40).to_le_bytes());

        let result = Model::read(&mut buf.as_slice());
        assert!(matches!(result, Err(LangidError::ModelLoad(_))));

        // One feature whose length is declared as 2^40.
        let mut buf = MODEL_MAGIC.to_vec();
        buf.extend_from_slice(&[1, 0xfd]);
        buf.extend_from_slice(&(1u64 << 40).to_le_bytes());
        buf.extend_from_slice(b"abc");

        let result = Model::read(&mut buf.as_slice());
        assert!(matches!(result, Err(LangidError::ModelLoad(_))));
    }

    #[test]
    fn test_read_empty_feature() {
        let (features, classes, priors, weights) = parts();
        let mut model = Model::new(features, classes, priors, weights, None).unwrap();
        model.features[1].clear();
        let mut buf = vec![];
        model.write(&mut buf).unwrap();

        assert_eq!(
            "ModelLoadError: feature 1 is empty",
            error_message(Model::read(&mut buf.as_slice()))
        );
    }

    #[test]
    fn test_read_duplicate_feature() {
        let (features, classes, priors, weights) = parts();
        let mut model = Model::new(features, classes, priors, weights, None).unwrap();
        model.features[2] = b"ab".to_vec();
        let mut buf = vec![];
        model.write(&mut buf).unwrap();

        assert_eq!(
            "ModelLoadError: feature 2 duplicates feature 0",
            error_message(Model::read(&mut buf.as_slice()))
        );
    }

    #[test]
    fn test_read_bad_magic() {
        let mut buf = b"SomeOtherModel\n\n".to_vec();
        buf.extend_from_slice(&[0; 32]);

        assert_eq!(
            "ModelLoadError: unknown model format",
            error_message(Model::read(&mut buf.as_slice()))
        );
    }

    #[test]
    fn test_read_inconsistent() {
        let (features, classes, priors, weights) = parts();
        let mut model = Model::new(features, classes, priors, weights, None).unwrap();
        model.features.pop();
        let mut buf = vec![];
        model.write(&mut buf).unwrap();

        assert_eq!(
            "ModelLoadError: weight matrix has 6 entries, expected 2 features * 2 classes",
            error_message(Model::read(&mut buf.as_slice()))
        );
    }

    #[test]
    fn test_read_feature_out_of_range() {
        let (features, classes, priors, weights) = parts();
        let mut model = Model::new(features, classes, priors, weights, None).unwrap();
        model.features.pop();
        model.weights.truncate(4);
        let mut buf = vec![];
        model.write(&mut buf).unwrap();

        assert_eq!(
            "ModelLoadError: automaton emits feature 2, but the vocabulary has 2 features",
            error_message(Model::read(&mut buf.as_slice()))
        );
    }
}
