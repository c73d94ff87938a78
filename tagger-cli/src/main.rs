//! Command-line entry point: `--train | --tag | --evaluate | --crossvalidate`.
//!
//! Mirrors the reference tagger's `cli.py` argument surface, but built on
//! `clap`'s derive API the way this workspace's other tooling builds its
//! CLIs, rather than the reference's own argparse-based one.

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use rayon::prelude::*;
use tagger_core::corpus::{self, Corpus};
use tagger_core::error::TaggerErrorKind;
use tagger_core::model::Model;
use tagger_core::perceptron::{evaluate, Tagger, TrainConfig};
use tagger_core::resources;

/// An averaged structured perceptron part-of-speech tagger.
#[derive(Parser, Debug)]
#[command(name = "tagger", version, about)]
struct Cli {
    /// Train a new model and write it to this path.
    #[arg(long, value_name = "PATH")]
    train: Option<PathBuf>,

    /// Tag the corpus using the model at this path.
    #[arg(long, value_name = "PATH")]
    tag: Option<PathBuf>,

    /// Evaluate tagging accuracy against a gold corpus.
    #[arg(long, value_name = "PATH")]
    evaluate: Option<PathBuf>,

    /// Run 10-fold cross-validation over the corpus.
    #[arg(long)]
    crossvalidate: bool,

    /// Brown cluster file (cluster\tword\tfreq).
    #[arg(long, value_name = "FILE")]
    brown: Option<PathBuf>,

    /// Word2vec cluster file (word\tcluster).
    #[arg(long, value_name = "FILE")]
    w2v: Option<PathBuf>,

    /// Lexicon file (word\ttag).
    #[arg(long, value_name = "FILE")]
    lexicon: Option<PathBuf>,

    /// Fine-to-coarse tagset mapping (JSON object).
    #[arg(long, value_name = "FILE")]
    mapping: Option<PathBuf>,

    /// Gold label that marks a position as unannotated.
    #[arg(long = "ignore-tag", value_name = "LABEL")]
    ignore_tag: Option<String>,

    /// Prior model to adapt from. Only meaningful for --train and
    /// --crossvalidate; --tag and --evaluate load their own model directly.
    #[arg(long, value_name = "FILE")]
    prior: Option<PathBuf>,

    /// Number of training iterations.
    #[arg(short = 'i', long, default_value_t = 10)]
    iterations: usize,

    /// Beam size.
    #[arg(short = 'b', long = "beam-size", default_value_t = 5)]
    beam_size: usize,

    /// Number of worker threads for tagging (0 = let the runtime choose).
    #[arg(long, default_value_t = 0)]
    parallel: usize,

    /// Treat the corpus as XML, passing tag lines through untouched.
    #[arg(short = 'x', long = "xml")]
    xml: bool,

    /// Report progress with an ETA while processing.
    #[arg(long)]
    progress: bool,

    /// Corpus file, or "-" for stdin.
    #[arg(value_name = "CORPUS", default_value = "-")]
    corpus: String,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let mode_count = [cli.train.is_some(), cli.tag.is_some(), cli.evaluate.is_some(), cli.crossvalidate]
        .iter()
        .filter(|&&b| b)
        .count();
    if mode_count != 1 {
        bail!("exactly one of --train, --tag, --evaluate, --crossvalidate is required");
    }

    let reader: Box<dyn BufRead> = if cli.corpus == "-" {
        Box::new(BufReader::new(io::stdin()))
    } else {
        Box::new(BufReader::new(
            File::open(&cli.corpus).with_context(|| format!("opening corpus {}", cli.corpus))?,
        ))
    };

    if cli.progress {
        if cli.corpus == "-" {
            TaggerErrorKind::UnseekableStream.log_warn("cannot pre-scan stdin for --progress; continuing without an ETA");
        } else {
            match count_lines(&cli.corpus) {
                Ok(n) => tracing::info!(lines = n, "corpus pre-scanned for progress reporting"),
                Err(e) => TaggerErrorKind::UnseekableStream
                    .log_warn(format!("could not pre-scan corpus for --progress ({e}); continuing without an ETA")),
            }
        }
    }

    let lexicon = load_optional(&cli.lexicon, resources::read_lexicon)?;
    let brown_clusters = load_optional(&cli.brown, resources::read_brown_clusters)?;
    let word_to_vec = load_optional(&cli.w2v, resources::read_word_to_vec)?;
    let mapping = load_optional(&cli.mapping, resources::read_mapping)?;

    let config = TrainConfig {
        iterations: cli.iterations,
        beam_size: cli.beam_size,
        beam_history: 2,
        ignore_label: cli.ignore_tag.clone(),
    };

    let prior_model = cli
        .prior
        .as_ref()
        .map(|path| -> Result<Model> {
            let f = File::open(path).with_context(|| format!("opening prior model {}", path.display()))?;
            Ok(Model::load_prior(f)?)
        })
        .transpose()?;
    let prior_weights = prior_model.as_ref().map(|m| &m.weights);

    if let Some(out_path) = &cli.train {
        let corpus = corpus::read_tagged(reader)?;
        let mut tagger = match &prior_model {
            Some(prior) => Tagger::with_prior(&config, prior),
            None => Tagger::new(&config),
        };
        tagger.lexicon = lexicon;
        tagger.brown_clusters = brown_clusters;
        tagger.word_to_vec = word_to_vec;
        tagger.mapping = mapping;

        let stats = tagger.fit(&corpus, &config, prior_weights);
        for (i, s) in stats.iter().enumerate() {
            tracing::info!(
                iteration = i,
                sentences = s.sentences,
                erroneous = s.erroneous,
                early_updates = s.early_updates,
                accuracy = s.token_accuracy,
                "iteration summary"
            );
        }

        let model = Model {
            vocabulary: tagger.vocabulary.clone(),
            lexicon: tagger.lexicon.clone(),
            brown_clusters: tagger.brown_clusters.clone(),
            word_to_vec: tagger.word_to_vec.clone(),
            target_mapping: tagger.mapping.clone(),
            target_size: tagger.registry.size() as usize,
            weights: tagger.weights,
            registry: tagger.registry,
        };
        let out = File::create(out_path).with_context(|| format!("creating {}", out_path.display()))?;
        model.save(out)?;
        return Ok(());
    }

    if let Some(model_path) = &cli.tag {
        let f = File::open(model_path).with_context(|| format!("opening model {}", model_path.display()))?;
        let model = Model::load(f)?;
        let tagger = tagger_from_model(&model, &config);
        let stdout = io::stdout();
        let mut out = BufWriter::new(stdout.lock());

        if cli.xml {
            let lines = corpus::read_xml_lines(reader)?;
            let sentences = corpus::xml_sentences(&lines);
            let tags_per_sentence: Vec<Vec<String>> = sentences
                .iter()
                .map(|sentence| tagger.tag_sentence(sentence, None))
                .collect();
            for line in corpus::merge_xml_tags(&lines, &tags_per_sentence) {
                match line {
                    corpus::TaggedXmlLine::Tag(t) => writeln!(out, "{t}")?,
                    corpus::TaggedXmlLine::Token { word, tag } => match tagger.coarse_of(&tag) {
                        Some(coarse) => writeln!(out, "{word}\t{tag}\t{coarse}")?,
                        None => writeln!(out, "{word}\t{tag}")?,
                    },
                }
            }
        } else {
            let untagged = corpus::read_untagged(reader)?;
            let all_tags = tagger_core::parallel::tag_corpus_parallel(&tagger, &untagged, None, cli.parallel);
            for s in 0..untagged.num_sentences() {
                write_tagged_sentence(&mut out, untagged.sentence_words(s), &all_tags[s], &tagger)?;
            }
        }
        return Ok(());
    }

    if let Some(model_path) = &cli.evaluate {
        let f = File::open(model_path).with_context(|| format!("opening model {}", model_path.display()))?;
        let model = Model::load(f)?;
        let tagger = tagger_from_model(&model, &config);
        let gold = corpus::read_tagged(reader)?;
        let report = evaluate(&tagger, &gold, None);
        println!("accuracy: {:.4}", report.accuracy);
        println!("accuracy (in-vocabulary): {:.4}", report.accuracy_iv);
        println!("accuracy (out-of-vocabulary): {:.4}", report.accuracy_oov);
        if let Some(coarse) = report.coarse_accuracy {
            println!("coarse accuracy: {:.4}", coarse);
        }
        return Ok(());
    }

    if cli.crossvalidate {
        let corpus = corpus::read_tagged(reader)?;
        let (mean, ci) =
            crossvalidate(&corpus, &config, lexicon, brown_clusters, word_to_vec, mapping, prior_model.as_ref());
        println!("mean accuracy: {:.4} +/- {:.4} (95% CI)", mean, ci);
        return Ok(());
    }

    Ok(())
}

fn load_optional<T>(
    path: &Option<PathBuf>,
    reader: impl FnOnce(BufReader<File>) -> tagger_core::Result<T>,
) -> Result<Option<T>> {
    match path {
        Some(p) => {
            let f = File::open(p).with_context(|| format!("opening {}", p.display()))?;
            Ok(Some(reader(BufReader::new(f))?))
        }
        None => Ok(None),
    }
}

fn tagger_from_model(model: &Model, config: &TrainConfig) -> Tagger {
    let mut tagger = Tagger::new(config);
    tagger.vocabulary = model.vocabulary.clone();
    tagger.lexicon = model.lexicon.clone();
    tagger.brown_clusters = model.brown_clusters.clone();
    tagger.word_to_vec = model.word_to_vec.clone();
    tagger.mapping = model.target_mapping.clone();
    tagger.registry = model.registry.clone();
    tagger.weights = clone_weight_store(&model.weights, model.target_size);
    tagger
}

fn clone_weight_store(weights: &tagger_core::WeightStore, target_size: usize) -> tagger_core::WeightStore {
    let mut store = tagger_core::WeightStore::new(target_size);
    for feature in weights.features() {
        if let Some(v) = weights.vector(feature) {
            store.insert_vector(feature.to_string(), v.to_vec());
        }
    }
    store
}

fn write_tagged_sentence(
    out: &mut impl Write,
    words: &[String],
    tags: &[String],
    tagger: &Tagger,
) -> Result<()> {
    for (w, t) in words.iter().zip(tags.iter()) {
        match tagger.coarse_of(t) {
            Some(coarse) => writeln!(out, "{w}\t{t}\t{coarse}")?,
            None => writeln!(out, "{w}\t{t}")?,
        }
    }
    writeln!(out)?;
    Ok(())
}

fn count_lines(path: &str) -> io::Result<usize> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut buf = [0u8; 64 * 1024];
    let mut count = 0usize;
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        count += buf[..n].iter().filter(|&&b| b == b'\n').count();
    }
    Ok(count)
}

/// 10-fold cross-validation with the t-distribution critical value for 9
/// degrees of freedom (2.26), matching the reference's hardcoded constant.
fn crossvalidate(
    corpus: &Corpus,
    config: &TrainConfig,
    lexicon: Option<tagger_core::resources::Lexicon>,
    brown_clusters: Option<tagger_core::resources::BrownClusters>,
    word_to_vec: Option<tagger_core::resources::WordToVec>,
    mapping: Option<tagger_core::resources::Mapping>,
    prior_model: Option<&Model>,
) -> (f64, f64) {
    let prior = prior_model.map(|m| &m.weights);
    const FOLDS: usize = 10;
    const T_CRITICAL_9DF: f64 = 2.26;

    let num_sentences = corpus.num_sentences();
    let fold_size = num_sentences / FOLDS;

    let accuracies: Vec<f64> = (0..FOLDS)
        .into_par_iter()
        .map(|fold| {
            let held_out_start = fold * fold_size;
            let held_out_end = if fold == FOLDS - 1 { num_sentences } else { held_out_start + fold_size };

            let mut train_corpus = Corpus::default();
            let mut test_corpus = Corpus::default();
            for s in 0..num_sentences {
                let target = if s >= held_out_start && s < held_out_end {
                    &mut test_corpus
                } else {
                    &mut train_corpus
                };
                target.words.extend(corpus.sentence_words(s).iter().cloned());
                target.tags.extend(corpus.sentence_tags(s).iter().cloned());
                target.lengths.push(corpus.sentence_range(s).len());
            }

            let mut tagger = match prior_model {
                Some(prior) => Tagger::with_prior(config, prior),
                None => Tagger::new(config),
            };
            tagger.lexicon = lexicon.clone();
            tagger.brown_clusters = brown_clusters.clone();
            tagger.word_to_vec = word_to_vec.clone();
            tagger.mapping = mapping.clone();
            tagger.fit(&train_corpus, config, prior);
            // `fit` already folded `prior` into the averaged weights above;
            // passing it again here would add it to every score a second time.
            let report = evaluate(&tagger, &test_corpus, None);
            report.accuracy
        })
        .collect();

    let mean = accuracies.iter().sum::<f64>() / accuracies.len() as f64;
    let variance = accuracies.iter().map(|a| (a - mean).powi(2)).sum::<f64>() / (accuracies.len() - 1) as f64;
    let stdev = variance.sqrt();
    let ci = T_CRITICAL_9DF * stdev / (accuracies.len() as f64).sqrt();
    (mean, ci)
}
