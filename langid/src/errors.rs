//! Definition of errors.

use std::error::Error;
use std::fmt;

pub type Result<T, E = LangidError> = std::result::Result<T, E>;

#[derive(Debug)]
pub enum LangidError {
    ModelLoad(ModelLoadError),
    InvalidLanguage(InvalidLanguageError),
    EmptyModel(EmptyModelError),
    EncodeError(bincode::error::EncodeError),
    IOError(std::io::Error),
}

impl LangidError {
    pub(crate) fn model_load<S>(msg: S) -> Self
    where
        S: Into<String>,
    {
        Self::ModelLoad(ModelLoadError { msg: msg.into() })
    }

    pub(crate) fn invalid_language<S>(label: S) -> Self
    where
        S: Into<String>,
    {
        Self::InvalidLanguage(InvalidLanguageError {
            label: label.into(),
        })
    }

    pub(crate) const fn empty_model() -> Self {
        Self::EmptyModel(EmptyModelError)
    }
}

impl fmt::Display for LangidError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::ModelLoad(e) => e.fmt(f),
            Self::InvalidLanguage(e) => e.fmt(f),
            Self::EmptyModel(e) => e.fmt(f),
            Self::EncodeError(e) => e.fmt(f),
            Self::IOError(e) => e.fmt(f),
        }
    }
}

impl Error for LangidError {}

/// Error used when the model artifact or its parts are malformed or inconsistent.
#[derive(Debug)]
pub struct ModelLoadError {
    /// Error message.
    pub(crate) msg: String,
}

impl fmt::Display for ModelLoadError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ModelLoadError: {}", self.msg)
    }
}

impl Error for ModelLoadError {}

/// Error used when a language label is not known to the model.
#[derive(Debug)]
pub struct InvalidLanguageError {
    /// The rejected label.
    pub(crate) label: String,
}

impl InvalidLanguageError {
    /// Gets the label that was not found in the model.
    pub fn label(&self) -> &str {
        &self.label
    }
}

impl fmt::Display for InvalidLanguageError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "InvalidLanguageError: unknown language: {}", self.label)
    }
}

impl Error for InvalidLanguageError {}

/// Error used when classification is requested while no language is active.
#[derive(Debug)]
pub struct EmptyModelError;

impl fmt::Display for EmptyModelError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "EmptyModelError: no active languages")
    }
}

impl Error for EmptyModelError {}

impl From<bincode::error::DecodeError> for LangidError {
    fn from(error: bincode::error::DecodeError) -> Self {
        Self::model_load(format!("failed to decode the model: {}", error))
    }
}

impl From<bincode::error::EncodeError> for LangidError {
    fn from(error: bincode::error::EncodeError) -> Self {
        Self::EncodeError(error)
    }
}

impl From<std::io::Error> for LangidError {
    fn from(error: std::io::Error) -> Self {
        Self::IOError(error)
    }
}
