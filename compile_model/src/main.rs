use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, ValueEnum};
use langid::{Model, Normalization, NormalizationScheme};
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "compile_model",
    about = "A program to compile weight tables into a model file."
)]
struct Args {
    /// CSV file of feature weights (header: feature,<label1>,...,<labelN>)
    #[arg(long)]
    weights: PathBuf,

    /// CSV file of log priors (header: label,log_prior)
    #[arg(long)]
    priors: PathBuf,

    /// CSV file of normalization constants (header: label,constant)
    #[arg(long)]
    norm: Option<PathBuf>,

    /// How normalization constants are applied
    #[arg(long, value_enum, default_value_t = NormScheme::Offset)]
    norm_scheme: NormScheme,

    /// Output path of the zstd-compressed model file
    #[arg(long)]
    output: PathBuf,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum NormScheme {
    Offset,
    LengthScaled,
}

impl From<NormScheme> for NormalizationScheme {
    fn from(scheme: NormScheme) -> Self {
        match scheme {
            NormScheme::Offset => Self::Offset,
            NormScheme::LengthScaled => Self::LengthScaled,
        }
    }
}

#[derive(Deserialize)]
struct PriorRecord {
    label: String,
    log_prior: f64,
}

#[derive(Deserialize)]
struct NormRecord {
    label: String,
    constant: f64,
}

/// Error used when an input table is invalid.
#[derive(Debug)]
struct InputError {
    msg: String,
}

impl InputError {
    fn new<S>(msg: S) -> Self
    where
        S: Into<String>,
    {
        Self { msg: msg.into() }
    }
}

impl fmt::Display for InputError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "InputError: {}", self.msg)
    }
}

impl Error for InputError {}

fn hex_value(c: u8) -> Option<u8> {
    char::from(c).to_digit(16).map(|d| d as u8)
}

/// Decodes a feature written with `\xNN`, `\\`, `\n`, `\r`, and `\t` escapes.
fn unescape(s: &str) -> Result<Vec<u8>, InputError> {
    let mut result = vec![];
    let mut bytes = s.bytes();
    while let Some(b) = bytes.next() {
        if b != b'\\' {
            result.push(b);
            continue;
        }
        let c = match bytes.next() {
            Some(b'\\') => b'\\',
            Some(b'n') => b'\n',
            Some(b'r') => b'\r',
            Some(b't') => b'\t',
            Some(b'x') => {
                let hi = bytes.next().and_then(hex_value);
                let lo = bytes.next().and_then(hex_value);
                match (hi, lo) {
                    (Some(hi), Some(lo)) => hi << 4 | lo,
                    _ => return Err(InputError::new(format!("invalid \\x escape: {}", s))),
                }
            }
            _ => return Err(InputError::new(format!("invalid escape: {}", s))),
        };
        result.push(c);
    }
    Ok(result)
}

type WeightTable = (Vec<String>, Vec<Vec<u8>>, Vec<Vec<f64>>);

fn read_weights(path: &Path) -> Result<WeightTable, Box<dyn Error>> {
    let mut rdr = csv::Reader::from_path(path)?;
    let classes: Vec<String> = rdr.headers()?.iter().skip(1).map(String::from).collect();
    let mut features = vec![];
    let mut weights = vec![];
    for result in rdr.records() {
        let record = result?;
        let line = record.position().map_or(0, |p| p.line());
        let mut fields = record.iter();
        let feature = fields
            .next()
            .ok_or_else(|| InputError::new(format!("line {}: no feature", line)))?;
        features.push(unescape(feature)?);
        let row = fields
            .map(|w| {
                w.trim()
                    .parse()
                    .map_err(|e| InputError::new(format!("line {}: {}: {}", line, w, e)))
            })
            .collect::<Result<Vec<f64>, _>>()?;
        weights.push(row);
    }
    Ok((classes, features, weights))
}

/// Orders per-class values by class index.
fn align_to_classes(
    values: Vec<(String, f64)>,
    classes: &[String],
    what: &str,
) -> Result<Vec<f64>, InputError> {
    let mut map = HashMap::new();
    for (label, value) in values {
        if !classes.contains(&label) {
            return Err(InputError::new(format!("{}: unknown label: {}", what, label)));
        }
        if map.insert(label.clone(), value).is_some() {
            return Err(InputError::new(format!("{}: duplicate label: {}", what, label)));
        }
    }
    classes
        .iter()
        .map(|label| {
            map.get(label)
                .copied()
                .ok_or_else(|| InputError::new(format!("{}: missing label: {}", what, label)))
        })
        .collect()
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    tracing::info!(path = %args.weights.display(), "Loading weights...");
    let (classes, features, weights) = read_weights(&args.weights)?;

    tracing::info!(path = %args.priors.display(), "Loading priors...");
    let mut rdr = csv::Reader::from_path(&args.priors)?;
    let mut priors = vec![];
    for result in rdr.deserialize() {
        let record: PriorRecord = result?;
        priors.push((record.label, record.log_prior));
    }
    let priors = align_to_classes(priors, &classes, "priors")?;

    let normalization = if let Some(path) = args.norm.as_ref() {
        tracing::info!(path = %path.display(), "Loading normalization constants...");
        let mut rdr = csv::Reader::from_path(path)?;
        let mut constants = vec![];
        for result in rdr.deserialize() {
            let record: NormRecord = result?;
            constants.push((record.label, record.constant));
        }
        let constants = align_to_classes(constants, &classes, "norm")?;
        Some(Normalization::new(args.norm_scheme.into(), constants))
    } else {
        None
    };

    let model = Model::new(features, classes, priors, weights, normalization)?;
    tracing::info!(
        n_classes = model.n_classes(),
        n_features = model.n_features(),
        n_states = model.scanner().n_states(),
        "Compiled model"
    );

    tracing::info!(path = %args.output.display(), "Saving model file...");
    let mut f = zstd::Encoder::new(fs::File::create(&args.output)?, 19)?;
    model.write(&mut f)?;
    f.finish()?;

    Ok(())
}
