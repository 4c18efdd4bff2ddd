use std::fs::File;
use std::io::{prelude::*, stdin, stdout, BufWriter};
use std::path::PathBuf;
use std::time::Instant;

use clap::Parser;
use langid::{Classifier, Model, Normalization, RankedLanguage};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "identify", about = "A program to identify the language of text.")]
struct Args {
    /// The zstd-compressed model file to use when identifying text
    #[arg(long)]
    model: PathBuf,

    /// Comma-separated languages to consider (all languages of the model by default)
    #[arg(long, value_delimiter = ',')]
    langs: Vec<String>,

    /// Print the ranking of all languages instead of the best one
    #[arg(long)]
    dist: bool,

    /// Print probabilities instead of log scores in the ranking
    #[arg(long, requires = "dist")]
    probabilities: bool,

    /// Identify each line of the input separately
    #[arg(long)]
    line: bool,
}

fn write_ranking<W>(out: &mut W, ranking: &[RankedLanguage]) -> std::io::Result<()>
where
    W: Write,
{
    let mut sep = "";
    for r in ranking {
        write!(out, "{}{}:{}", sep, r.label, r.score)?;
        sep = " ";
    }
    writeln!(out)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    tracing::info!(model = %args.model.display(), "Loading model file...");
    let start = Instant::now();
    let mut f = zstd::Decoder::new(File::open(&args.model)?)?;
    let model = Model::read(&mut f)?;
    tracing::info!(
        n_classes = model.n_classes(),
        n_features = model.n_features(),
        normalization = ?model.normalization().map(Normalization::scheme),
        elapsed_sec = start.elapsed().as_secs_f64(),
        "Loaded model"
    );
    let classifier = Classifier::new(model);
    if !args.langs.is_empty() {
        classifier.restrict(&args.langs)?;
    }

    let rank = |text: &[u8]| {
        if args.probabilities {
            classifier.rank_probabilities(text)
        } else {
            classifier.rank(text)
        }
    };

    let mut out = BufWriter::new(stdout().lock());
    let mut n_docs = 0;
    let mut n_bytes = 0;
    let start = Instant::now();
    if args.line {
        let mut io_error = None;
        let lines = stdin().lock().split(b'\n').map_while(|line| {
            line.map_err(|e| io_error = Some(e)).ok().map(|mut line| {
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                n_bytes += line.len();
                line
            })
        });
        if args.dist {
            for line in lines {
                write_ranking(&mut out, &rank(line.as_slice()))?;
                n_docs += 1;
            }
        } else {
            for d in classifier.classify_batch(lines) {
                let d = d?;
                writeln!(out, "{}\t{}", d.label, d.confidence)?;
                n_docs += 1;
            }
        }
        if let Some(e) = io_error {
            return Err(e.into());
        }
    } else {
        let mut text = vec![];
        stdin().lock().read_to_end(&mut text)?;
        n_bytes = text.len();
        if args.dist {
            write_ranking(&mut out, &rank(text.as_slice()))?;
        } else {
            let d = classifier.classify(&text)?;
            writeln!(out, "{}\t{}", d.label, d.confidence)?;
        }
        n_docs = 1;
    }
    out.flush()?;

    let duration = start.elapsed();
    tracing::info!(
        n_docs,
        elapsed_sec = duration.as_secs_f64(),
        bytes_per_sec = n_bytes as f64 / duration.as_secs_f64(),
        "Finished"
    );

    Ok(())
}
