//! # Langid
//!
//! Langid is a fast byte n-gram language identifier based on naive Bayes.
//!
//! Features of a model are matched by a compiled automaton in a single pass over the
//! input, so the cost of identification is linear in the input length regardless of the
//! vocabulary size.
//!
//! ## Examples
//!
//! ```
//! use langid::{Classifier, Model};
//!
//! let model = Model::new(
//!     vec![b"the".to_vec(), b"der".to_vec()],
//!     vec!["en".to_string(), "de".to_string()],
//!     vec![-0.7, -0.7],
//!     vec![vec![-1.0, -6.0], vec![-6.0, -1.0]],
//!     None,
//! )
//! .unwrap();
//! let classifier = Classifier::new(model);
//!
//! let detection = classifier.classify("the weather").unwrap();
//! assert_eq!("en", detection.label);
//!
//! classifier.restrict(["de"]).unwrap();
//! assert_eq!("de", classifier.classify("the weather").unwrap().label);
//! ```
//!
//! Models are usually loaded with [`Model::read()`].

mod classifier;
mod errors;
mod feature;
mod model;
mod scanner;

pub mod normalizer;
pub mod scorer;

pub use classifier::{Classifier, ClassifyBatch, Detection, RankedLanguage};
pub use errors::{
    EmptyModelError, InvalidLanguageError, LangidError, ModelLoadError, Result,
};
pub use feature::FeatureCounts;
pub use model::{Model, ScoreValue, WeightValue};
pub use normalizer::{Normalization, NormalizationScheme};
pub use scanner::Scanner;
