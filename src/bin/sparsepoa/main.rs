use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, IsTerminal, Write};
use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use flate2::read::MultiGzDecoder;
use noodles::fasta;
use serde::Serialize;

use tracing::{debug, info, info_span, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Registry};

use sparsepoa::aligner::config::{AlignConfig, AlignParams};
use sparsepoa::errors::PoaError;
use sparsepoa::sparse_poa::{AddReadOptions, AlignmentSummary, SparsePoa};

mod cli;

/// Any object that supports writing and checking if it is a terminal.
trait SparsePoaWrite: Write + IsTerminal {}
impl<T> SparsePoaWrite for T where T: Write + IsTerminal {}

#[derive(Serialize)]
struct ReadSummary<'a> {
    name: &'a str,

    #[serde(flatten)]
    summary: &'a AlignmentSummary,
}

/// Stderr logging, `RUST_LOG` takes precedence over the verbosity flag.
fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let filter_layer = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    let stderr_log = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_file(false)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .with_filter(filter_layer);

    Registry::default().with(stderr_log).init();
}

fn main() -> Result<()> {
    let args = cli::CliArgs::parse();
    init_logging(args.verbose);

    match &args.command {
        Some(cli::CliSubcommand::Consensus(v)) => consensus_subcommand(v)?,
        None => anyhow::bail!("No subcommand given."),
    };

    Ok(())
}

fn open_fasta(sequences_fname: &Path) -> Result<fasta::io::Reader<Box<dyn io::BufRead>>> {
    let is_gzipped = sequences_fname
        .file_name()
        .map(|v| v.to_string_lossy().ends_with(".gz"))
        .unwrap_or(false);

    let file = File::open(sequences_fname)
        .with_context(|| format!("Could not open {}", sequences_fname.display()))?;

    let reader_inner: Box<dyn io::BufRead> = if is_gzipped {
        Box::new(BufReader::new(MultiGzDecoder::new(file)))
    } else {
        Box::new(BufReader::new(file))
    };

    Ok(fasta::io::Reader::new(reader_inner))
}

fn create_output(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?
    }

    File::create(path)
        .with_context(|| format!("Could not create {}", path.display()))
}

fn consensus_subcommand(args: &cli::ConsensusArgs) -> Result<()> {
    let span = info_span!("consensus_subcommand");
    let _enter = span.enter();

    let params = AlignParams::new(args.score_match, args.mismatch, args.gap_open, args.gap_extend);
    let config = AlignConfig::new(params, args.mode.into());
    let options = AddReadOptions {
        config,
        min_score_to_add: args.min_score.unwrap_or(i32::MIN),
    };

    let mut poa = SparsePoa::<u32>::new().with_consensus_config(config);
    let mut read_names = Vec::new();

    let mut reader = open_fasta(&args.sequences)?;
    for (i, result) in reader.records().enumerate() {
        let record = result.context("Could not parse FASTA record")?;
        let seq_name = String::from_utf8_lossy(record.name()).into_owned();
        let sequence = record.sequence().as_ref();

        if sequence.is_empty() {
            warn!("Skipping empty read {}", seq_name);
            continue;
        }

        info!("Adding #{} {}...", i + 1, seq_name);
        let key = if args.no_orient {
            poa.add_read(sequence, &options)
        } else {
            poa.orient_and_add_read(sequence, &options)
        }.with_context(|| format!("Could not add read {seq_name}"))?;

        match key {
            Some(key) => {
                debug!("Read {} added with key {}", seq_name, key);
                read_names.push(seq_name);
            },
            None => info!("Read {} rejected", seq_name),
        }

        if let Some(every) = args.prune_every {
            if every > 0 && read_names.len() % every == 0 && key.is_some() {
                let removed = poa.prune_graph(args.min_coverage)?;
                debug!("Pruned {} vertices", removed);
            }
        }
    }

    if poa.num_reads() == 0 {
        return Err(PoaError::NoSequences)
            .with_context(|| format!("No reads added from {}", args.sequences.display()));
    }

    let (consensus, summaries) = poa.find_consensus_with_summaries(args.min_coverage);
    info!("Consensus of length {} from {} reads", consensus.len(), poa.num_reads());

    let mut writer: Box<dyn SparsePoaWrite> = if let Some(path) = &args.output {
        Box::new(create_output(path)?)
    } else {
        Box::new(io::stdout())
    };

    writeln!(writer, ">consensus")?;
    writeln!(writer, "{}", consensus.sequence())?;
    writer.flush()?;

    if let Some(path) = &args.summaries {
        let records: Vec<_> = read_names.iter()
            .zip(&summaries)
            .map(|(name, summary)| ReadSummary { name, summary })
            .collect();

        let mut file = BufWriter::new(create_output(path)?);
        serde_json::to_writer_pretty(&mut file, &records)?;
        file.flush()?;
    }

    if let Some(path) = &args.dot {
        poa.write_graphviz_file(path)
            .with_context(|| format!("Could not write graph to {}", path.display()))?;
    }

    if let Some(path) = &args.csv {
        poa.write_graph_csv_file(path)
            .with_context(|| format!("Could not write graph to {}", path.display()))?;
    }

    Ok(())
}
